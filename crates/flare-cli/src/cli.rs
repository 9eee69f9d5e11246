//! CLI argument parsing for the flare operator tool.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Flare search index operator tool
///
/// Commits, removals and lookups against the configured Solr core.
#[derive(Parser, Debug)]
#[command(name = "flare")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/flare/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Solr core URL (overrides solr.url and SOLR_URL)
    #[arg(long, global = true)]
    pub solr_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Commit pending changes
    Commit {
        /// Soft commit (visible, not durable)
        #[arg(long)]
        soft: bool,
    },

    /// Merge index segments (also commits)
    Optimize,

    /// Remove documents of a type by record id
    Remove {
        /// Entity type name, e.g. Article
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Record ids
        #[arg(required = true)]
        ids: Vec<String>,

        /// Leave the removal uncommitted
        #[arg(long)]
        no_commit: bool,
    },

    /// Remove documents of a type matching a query
    RemoveBy {
        #[arg(short = 't', long = "type")]
        type_name: String,

        /// Query, scoped to the type
        query: String,

        #[arg(long)]
        no_commit: bool,
    },

    /// Show the indexed document for a record
    Find {
        #[arg(short = 't', long = "type")]
        type_name: String,

        id: String,
    },

    /// Page through query results
    Search {
        /// Scope the query to a type
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        query: String,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u64,

        #[arg(long, default_value_t = flare_search::DEFAULT_PER_PAGE)]
        per_page: u64,

        /// Sort clause, e.g. "_timestamp_ asc"
        #[arg(long)]
        sort: Option<String>,

        /// Fields to return (comma separated)
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
    },

    /// Run the periodic commit job until interrupted
    ///
    /// Uses indexer.commit_cron; a final hard commit runs on shutdown.
    CommitLoop {
        /// Cron expression (overrides indexer.commit_cron)
        #[arg(long)]
        cron: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Business-hours throttle commands
    Throttle {
        #[command(subcommand)]
        command: ThrottleCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ThrottleCommands {
    /// Show whether the business-hours window is open now
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_commit() {
        let cli = Cli::parse_from(["flare", "commit", "--soft"]);
        match cli.command {
            Commands::Commit { soft } => assert!(soft),
            _ => panic!("Expected Commit command"),
        }
    }

    #[test]
    fn test_cli_remove() {
        let cli = Cli::parse_from(["flare", "remove", "-t", "Article", "1", "2"]);
        match cli.command {
            Commands::Remove {
                type_name,
                ids,
                no_commit,
            } => {
                assert_eq!(type_name, "Article");
                assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
                assert!(!no_commit);
            }
            _ => panic!("Expected Remove command"),
        }
    }

    #[test]
    fn test_cli_remove_requires_ids() {
        assert!(Cli::try_parse_from(["flare", "remove", "-t", "Article"]).is_err());
    }

    #[test]
    fn test_cli_search_defaults() {
        let cli = Cli::parse_from(["flare", "search", "title:hello"]);
        match cli.command {
            Commands::Search {
                type_name,
                query,
                page,
                per_page,
                fields,
                ..
            } => {
                assert!(type_name.is_none());
                assert_eq!(query, "title:hello");
                assert_eq!(page, 1);
                assert_eq!(per_page, 20);
                assert!(fields.is_empty());
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_search_fields() {
        let cli = Cli::parse_from([
            "flare", "search", "*:*", "--fields", "uid,title", "--page", "3",
        ]);
        match cli.command {
            Commands::Search { fields, page, .. } => {
                assert_eq!(fields, vec!["uid".to_string(), "title".to_string()]);
                assert_eq!(page, 3);
            }
            _ => panic!("Expected Search command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::parse_from([
            "flare",
            "optimize",
            "--config",
            "/etc/flare.toml",
            "--solr-url",
            "http://solr:8983/solr/app",
        ]);
        assert_eq!(cli.config, Some("/etc/flare.toml".to_string()));
        assert_eq!(cli.solr_url, Some("http://solr:8983/solr/app".to_string()));
        assert!(matches!(cli.command, Commands::Optimize));
    }

    #[test]
    fn test_cli_commit_loop() {
        let cli = Cli::parse_from(["flare", "commit-loop", "--cron", "0 */5 * * * *"]);
        match cli.command {
            Commands::CommitLoop { cron } => assert_eq!(cron.as_deref(), Some("0 */5 * * * *")),
            _ => panic!("Expected CommitLoop command"),
        }
    }

    #[test]
    fn test_cli_throttle_status() {
        let cli = Cli::parse_from(["flare", "throttle", "status"]);
        assert!(matches!(
            cli.command,
            Commands::Throttle {
                command: ThrottleCommands::Status
            }
        ));
    }
}
