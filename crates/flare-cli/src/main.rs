//! Flare operator CLI
//!
//! # Usage
//!
//! ```bash
//! flare commit [--soft]
//! flare remove --type Article 42 43
//! flare search --type Article "title:rust" --page 2
//! flare commit-loop --cron "0 */5 * * * *"
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/flare/config.toml)
//! 3. Environment variables (FLARE_*, SOLR_URL)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use flare_cli::{
    commit, commit_loop, find, init_logging, load_settings, optimize, remove, remove_by, search,
    show_config, throttle_status, Cli, Commands, SearchArgs, ThrottleCommands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(
        cli.config.as_deref(),
        cli.log_level.as_deref(),
        cli.solr_url.as_deref(),
    )?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Commit { soft } => commit(&settings, soft).await?,
        Commands::Optimize => optimize(&settings).await?,
        Commands::Remove {
            type_name,
            ids,
            no_commit,
        } => remove(&settings, &type_name, &ids, no_commit).await?,
        Commands::RemoveBy {
            type_name,
            query,
            no_commit,
        } => remove_by(&settings, &type_name, &query, no_commit).await?,
        Commands::Find { type_name, id } => find(&settings, &type_name, &id).await?,
        Commands::Search {
            type_name,
            query,
            page,
            per_page,
            sort,
            fields,
        } => {
            let args = SearchArgs {
                type_name,
                query,
                page,
                per_page,
                sort,
                fields,
            };
            search(&settings, &args).await?;
        }
        Commands::CommitLoop { cron } => commit_loop(&settings, cron.as_deref()).await?,
        Commands::Config => show_config(&settings)?,
        Commands::Throttle { command } => match command {
            ThrottleCommands::Status => throttle_status(&settings)?,
        },
    }

    Ok(())
}
