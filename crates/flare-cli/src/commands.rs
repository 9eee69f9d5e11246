//! Command implementations for the flare CLI.
//!
//! Handles:
//! - commit / optimize: flush pending changes on the backend
//! - remove / remove-by: delete a type's documents, committing unless told not to
//! - find / search: read documents back through the type's scope
//! - commit-loop: run the cron commit job until SIGINT/SIGTERM
//! - config / throttle status: inspect local configuration

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use flare_scheduler::{CommitScheduler, Throttle};
use flare_search::{Page, SearchOptions, Session, TypeIndex};
use flare_types::Settings;

/// Shown in place of secrets when printing configuration.
const REDACTED: &str = "********";

/// Load settings and apply CLI overrides on top of every other source.
pub fn load_settings(
    config_path: Option<&str>,
    log_level: Option<&str>,
    solr_url: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;

    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    if let Some(url) = solr_url {
        settings.solr.url = Some(url.to_string());
    }

    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global tracing subscriber. `RUST_LOG` wins over `log_level`.
pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn open_session(settings: &Settings) -> Result<Arc<Session>> {
    let session = Session::from_settings(settings).context("Failed to create search session")?;
    Ok(Arc::new(session))
}

pub async fn commit(settings: &Settings, soft: bool) -> Result<()> {
    let session = open_session(settings)?;
    session.commit(soft).await.context("Commit failed")?;
    println!("{} commit complete", if soft { "Soft" } else { "Hard" });
    Ok(())
}

pub async fn optimize(settings: &Settings) -> Result<()> {
    let session = open_session(settings)?;
    session.optimize().await.context("Optimize failed")?;
    println!("Optimize complete");
    Ok(())
}

pub async fn remove(
    settings: &Settings,
    type_name: &str,
    ids: &[String],
    no_commit: bool,
) -> Result<()> {
    let index = TypeIndex::new(open_session(settings)?, type_name);
    let result = if no_commit {
        index.remove(ids).await
    } else {
        index.remove_now(ids).await
    };
    result.with_context(|| format!("Failed to remove {} documents", type_name))?;

    println!("Removed {} {} document(s)", ids.len(), type_name);
    Ok(())
}

pub async fn remove_by(
    settings: &Settings,
    type_name: &str,
    query: &str,
    no_commit: bool,
) -> Result<()> {
    let index = TypeIndex::new(open_session(settings)?, type_name);
    let queries = [query];
    let result = if no_commit {
        index.remove_by(&queries).await
    } else {
        index.remove_by_now(&queries).await
    };
    result.with_context(|| format!("Failed to remove {} documents by query", type_name))?;

    println!("Removed {} documents matching {}", type_name, query);
    Ok(())
}

pub async fn find(settings: &Settings, type_name: &str, id: &str) -> Result<()> {
    let index = TypeIndex::new(open_session(settings)?, type_name);
    match index.find(id).await.context("Lookup failed")? {
        Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
        None => println!("No {} document indexed for id {}", type_name, id),
    }
    Ok(())
}

#[derive(Debug)]
pub struct SearchArgs {
    pub type_name: Option<String>,
    pub query: String,
    pub page: u64,
    pub per_page: u64,
    pub sort: Option<String>,
    pub fields: Vec<String>,
}

impl SearchArgs {
    fn options(&self) -> SearchOptions {
        let mut options = SearchOptions::new();
        if let Some(sort) = &self.sort {
            options = options.sort(sort.clone());
        }
        if !self.fields.is_empty() {
            options = options.fields(self.fields.iter().cloned());
        }
        options
    }
}

pub async fn search(settings: &Settings, args: &SearchArgs) -> Result<()> {
    let session = open_session(settings)?;
    let options = args.options();
    let page = match &args.type_name {
        Some(type_name) => {
            TypeIndex::new(session, type_name)
                .paginate(args.page, args.per_page, &args.query, &options)
                .await
        }
        None => {
            session
                .paginate(args.page, args.per_page, &args.query, &options)
                .await
        }
    }
    .context("Search failed")?;

    print_page(&page)?;
    Ok(())
}

fn print_page(page: &Page) -> Result<()> {
    println!(
        "Page {} of {} ({} total)",
        page.page,
        page.total_pages(),
        page.total_entries
    );
    for document in &page.docs {
        println!("{}", serde_json::to_string(document)?);
    }
    if page.has_next() {
        println!("More results: --page {}", page.page + 1);
    }
    Ok(())
}

/// Run the cron commit job until interrupted, then hard-commit anything left.
pub async fn commit_loop(settings: &Settings, cron: Option<&str>) -> Result<()> {
    let cron = cron
        .map(str::to_string)
        .or_else(|| settings.indexer.commit_cron.clone())
        .context("No cron expression: pass --cron or set indexer.commit_cron")?;

    let session = open_session(settings)?;
    let mut scheduler = CommitScheduler::new()
        .await
        .context("Failed to create commit scheduler")?;
    scheduler
        .add_commit_job(
            session.clone(),
            &cron,
            &settings.indexer.timezone,
            settings.indexer.soft_commit,
        )
        .await
        .context("Failed to register commit job")?;
    scheduler
        .start()
        .await
        .context("Failed to start commit scheduler")?;

    shutdown_signal().await;

    if let Err(e) = scheduler.shutdown().await {
        warn!("Error stopping commit scheduler: {}", e);
    }
    session
        .shutdown()
        .await
        .context("Final commit on shutdown failed")?;

    let stats = scheduler.stats();
    info!(
        runs = stats.runs,
        commits = stats.commits,
        skipped = stats.skipped,
        failures = stats.failures,
        "Commit loop stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Effective configuration as TOML with the backend password masked.
pub fn render_config(settings: &Settings) -> Result<String> {
    let mut settings = settings.clone();
    if settings.solr.pass.is_some() {
        settings.solr.pass = Some(REDACTED.to_string());
    }
    toml::to_string_pretty(&settings).context("Failed to serialize configuration")
}

pub fn show_config(settings: &Settings) -> Result<()> {
    print!("{}", render_config(settings)?);
    Ok(())
}

pub fn throttle_status(settings: &Settings) -> Result<()> {
    let Some(throttle_settings) = &settings.throttle else {
        println!("Throttle: disabled");
        return Ok(());
    };
    let throttle =
        Throttle::from_settings(throttle_settings).context("Invalid throttle configuration")?;
    println!("{}", serde_json::to_string_pretty(&throttle.status())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config_masks_password() {
        let mut settings = Settings::for_url("http://localhost:8983/solr/app");
        settings.solr.user = Some("indexer".to_string());
        settings.solr.pass = Some("hunter2".to_string());

        let rendered = render_config(&settings).unwrap();
        assert!(rendered.contains("indexer"));
        assert!(rendered.contains(REDACTED));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_search_args_options() {
        let args = SearchArgs {
            type_name: None,
            query: "*:*".to_string(),
            page: 1,
            per_page: 20,
            sort: Some("_timestamp_ asc".to_string()),
            fields: vec!["uid".to_string()],
        };
        let options = args.options();
        assert_eq!(options.sort.as_deref(), Some("_timestamp_ asc"));
        assert_eq!(options.fields, vec!["uid".to_string()]);
    }

    #[test]
    fn test_throttle_status_disabled() {
        let settings = Settings::for_url("http://localhost:8983/solr/app");
        assert!(throttle_status(&settings).is_ok());
    }
}
