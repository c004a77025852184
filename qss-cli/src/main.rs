//! QSS CLI - Query Suggestion Store command-line interface

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use qss::{
    Actor, ArchiveConfig, ArchivePolicy, ArchiveReport, Config, RankingQuery, Store,
    SuggestionDraft, SuggestionStore, MANAGE_SUGGESTIONS,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "qss")]
#[command(
    author,
    version,
    about = "Query Suggestion Store - search suggestions and analytics archival"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Database path (default: ~/.cache/qss/suggestions.sqlite)
    #[arg(long, short = 'd', env = "QSS_DB_PATH", global = true)]
    database: Option<PathBuf>,

    /// Configuration file (default: ~/.config/qss/config.yaml)
    #[arg(long, short = 'c', env = "QSS_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Actor performing administrative commands
    #[arg(long, short = 'a', env = "QSS_ACTOR", global = true)]
    actor: Option<String>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Initialize a new database
    Init,

    /// Log an executed search (and learn its query as a suggestion)
    Record {
        /// Search scope (site section, search page, ...)
        scope: String,

        /// Query text as typed by the user
        query: String,

        /// Number of results the search returned
        #[arg(long, short = 'r', default_value = "0")]
        results: usize,
    },

    /// List suggestions for a scope
    Suggestions {
        /// Search scope
        scope: String,

        /// Include unapproved suggestions (management view)
        #[arg(long)]
        all: bool,

        /// Only suggestions starting with this prefix
        #[arg(long, short = 'p')]
        prefix: Option<String>,

        /// Maximum number of suggestions
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,

        /// Output format (text, json)
        #[arg(long, short = 'o', default_value = "text")]
        format: String,
    },

    /// Add a suggestion by hand
    Add {
        /// Search scope
        scope: String,

        /// Suggestion term
        term: String,

        /// Approve immediately
        #[arg(long)]
        approved: bool,
    },

    /// Approve a suggestion (or withdraw approval)
    Approve {
        /// Search scope
        scope: String,

        /// Suggestion term
        term: String,

        /// Withdraw approval instead
        #[arg(long)]
        revoke: bool,
    },

    /// Remove a suggestion
    Remove {
        /// Search scope
        scope: String,

        /// Suggestion term
        term: String,
    },

    /// Archive past search analytics once
    Archive {
        /// Keep analytics younger than this many days (overrides config)
        #[arg(long)]
        retention_days: Option<u32>,

        /// Output format (text, json)
        #[arg(long, short = 'o', default_value = "text")]
        format: String,
    },

    /// Archive on a recurring interval until interrupted
    Schedule {
        /// Seconds between archival runs
        #[arg(long, default_value = "86400")]
        interval_secs: u64,

        /// Stop after this many runs
        #[arg(long)]
        runs: Option<usize>,

        /// Keep analytics younger than this many days (overrides config)
        #[arg(long)]
        retention_days: Option<u32>,
    },

    /// Show database status and statistics
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let db_path = cli.database.clone().unwrap_or_else(qss::default_db_path);
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(qss::config::default_config_path);
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Loading config {}", config_path.display()))?;

    let actor = cli.actor.as_deref().map(|id| resolve_actor(&config, id));

    match cli.command {
        Commands::Init => cmd_init(&db_path),
        Commands::Record {
            scope,
            query,
            results,
        } => cmd_record(&db_path, &config, &scope, &query, results),
        Commands::Suggestions {
            scope,
            all,
            prefix,
            limit,
            format,
        } => cmd_suggestions(
            &db_path,
            &scope,
            all,
            prefix.as_deref(),
            limit,
            actor.as_ref(),
            &format,
        ),
        Commands::Add {
            scope,
            term,
            approved,
        } => cmd_add(&db_path, &config, &scope, &term, approved, require_actor(actor)?),
        Commands::Approve {
            scope,
            term,
            revoke,
        } => cmd_approve(&db_path, &config, &scope, &term, !revoke, require_actor(actor)?),
        Commands::Remove { scope, term } => {
            cmd_remove(&db_path, &config, &scope, &term, require_actor(actor)?)
        }
        Commands::Archive {
            retention_days,
            format,
        } => cmd_archive(&db_path, archive_config(&config, retention_days), &format),
        Commands::Schedule {
            interval_secs,
            runs,
            retention_days,
        } => {
            cmd_schedule(
                &db_path,
                archive_config(&config, retention_days),
                interval_secs,
                runs,
            )
            .await
        }
        Commands::Status => cmd_status(&db_path),
    }
}

/// Build the actor, granting management rights to configured managers
fn resolve_actor(config: &Config, id: &str) -> Actor {
    let actor = Actor::new(id);
    if config.is_manager(id) {
        actor.with_permission(MANAGE_SUGGESTIONS)
    } else {
        actor
    }
}

fn require_actor(actor: Option<Actor>) -> Result<Actor> {
    actor.context("This command needs an actor: pass --actor or set QSS_ACTOR")
}

fn archive_config(config: &Config, retention_days: Option<u32>) -> ArchiveConfig {
    match retention_days {
        Some(days) => ArchiveConfig {
            retention_days: Some(days),
        },
        None => config.archive,
    }
}

fn cmd_init(db_path: &Path) -> Result<()> {
    println!("Initializing QSS database at: {}", db_path.display());
    let _store = Store::open(db_path)?;
    println!("Database initialized successfully.");
    Ok(())
}

fn cmd_record(
    db_path: &Path,
    config: &Config,
    scope: &str,
    query: &str,
    results: usize,
) -> Result<()> {
    let store = Store::open(db_path)?;
    let suggestions = SuggestionStore::new(&store, config.suggestions);
    let recorded = suggestions.record_search(scope, query, results)?;

    match recorded.suggestion {
        Some(suggestion) => println!(
            "Logged search '{}' in {} ({} results); suggestion frequency {}",
            recorded.analytic.query, scope, results, suggestion.frequency
        ),
        None => println!(
            "Logged search '{}' in {} ({} results)",
            recorded.analytic.query, scope, results
        ),
    }
    Ok(())
}

fn cmd_suggestions(
    db_path: &Path,
    scope: &str,
    all: bool,
    prefix: Option<&str>,
    limit: usize,
    viewer: Option<&Actor>,
    format: &str,
) -> Result<()> {
    let store = Store::open(db_path)?;
    let ranking = RankingQuery::new(&store);

    let suggestions = match (all, prefix) {
        (true, Some(prefix)) => ranking
            .list_all(scope)?
            .into_iter()
            .filter(|s| qss::ranking::matches_prefix(&s.term, prefix))
            .collect(),
        (true, None) => ranking.list_all(scope)?,
        (false, Some(prefix)) => ranking.complete(scope, prefix, limit)?,
        (false, None) => ranking.list_suggestions(scope)?,
    };
    let suggestions: Vec<_> = suggestions.into_iter().take(limit).collect();

    if suggestions.is_empty() {
        println!("No suggestions in scope '{}'.", scope);
        return Ok(());
    }

    let views = suggestions
        .iter()
        .map(|s| ranking.present(s, viewer))
        .collect::<qss::Result<Vec<_>>>()?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    let width = views.iter().map(|v| v.term.chars().count()).max().unwrap_or(0);
    println!(
        "{:<width$}  {:>9}  {:>9}  Approved?",
        "Search Term",
        "Frequency",
        "%",
        width = width.max(11)
    );
    for view in views {
        println!(
            "{:<width$}  {:>9}  {:>9}  {}",
            view.term,
            view.frequency,
            view.frequency_percentage,
            if view.approved { "yes" } else { "no" },
            width = width.max(11)
        );
    }
    Ok(())
}

fn cmd_add(
    db_path: &Path,
    config: &Config,
    scope: &str,
    term: &str,
    approved: bool,
    actor: Actor,
) -> Result<()> {
    let store = Store::open(db_path)?;
    let suggestions = SuggestionStore::new(&store, config.suggestions);
    let draft = SuggestionDraft {
        approved,
        ..SuggestionDraft::new(scope, term)
    };
    let created = suggestions.create(&draft, &actor)?;
    println!("Added suggestion '{}' to {}", created.term, created.scope);
    Ok(())
}

fn cmd_approve(
    db_path: &Path,
    config: &Config,
    scope: &str,
    term: &str,
    approved: bool,
    actor: Actor,
) -> Result<()> {
    let store = Store::open(db_path)?;
    let suggestions = SuggestionStore::new(&store, config.suggestions);
    suggestions.set_approval(scope, term, approved, &actor)?;
    println!(
        "{} '{}' in {}",
        if approved { "Approved" } else { "Withdrew" },
        term,
        scope
    );
    Ok(())
}

fn cmd_remove(db_path: &Path, config: &Config, scope: &str, term: &str, actor: Actor) -> Result<()> {
    let store = Store::open(db_path)?;
    let suggestions = SuggestionStore::new(&store, config.suggestions);
    suggestions.delete(scope, term, &actor)?;
    println!("Removed suggestion '{}' from {}", term, scope);
    Ok(())
}

fn print_report(report: &ArchiveReport, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.archived.is_empty() && report.failures.is_empty() {
        println!("Nothing to archive.");
        return Ok(());
    }

    println!(
        "Archival complete:\n  Records archived: {}\n  Batches created: {}\n  Failed scopes: {}\n  Duration: {:?}",
        report.records_moved(),
        report.batches_created(),
        report.failures.len(),
        report.duration
    );
    for archived in &report.archived {
        println!(
            "  {}: {} records -> archive #{} ({})",
            archived.batch.scope, archived.records_moved, archived.batch.id, archived.batch.archive_date
        );
    }
    for failure in &report.failures {
        println!("  {}: FAILED ({})", failure.scope, failure.error);
    }
    Ok(())
}

fn cmd_archive(db_path: &Path, archive: ArchiveConfig, format: &str) -> Result<()> {
    let store = Store::open(db_path)?;
    let report = ArchivePolicy::new(&store, archive).run(Utc::now())?;
    print_report(&report, format)?;

    if !report.is_success() {
        anyhow::bail!("{} scope(s) failed to archive", report.failures.len());
    }
    Ok(())
}

async fn cmd_schedule(
    db_path: &Path,
    archive: ArchiveConfig,
    interval_secs: u64,
    runs: Option<usize>,
) -> Result<()> {
    if interval_secs == 0 {
        anyhow::bail!("--interval-secs must be at least 1");
    }

    let store = Arc::new(Store::open(db_path)?);
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    let mut completed = 0usize;

    tracing::info!(
        "Scheduling archival every {}s for {}",
        interval_secs,
        db_path.display()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let store = Arc::clone(&store);
                let report = tokio::task::spawn_blocking(move || {
                    ArchivePolicy::new(&store, archive).run(Utc::now())
                })
                .await??;

                // A failed scope is retried on the next tick
                print_report(&report, "text")?;
                completed += 1;

                if runs.is_some_and(|limit| completed >= limit) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, stopping scheduler");
                break;
            }
        }
    }

    println!("Scheduler stopped after {} run(s).", completed);
    Ok(())
}

fn cmd_status(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        println!("Database not initialized. Run 'qss init' first.");
        return Ok(());
    }

    let store = Store::open(db_path)?;
    let scopes = store.list_scopes()?;

    println!("QSS Status");
    println!("==========");
    println!("Database: {}", db_path.display());
    println!("Size: {} bytes", store.database_size()?);
    println!("Scopes: {}", scopes.len());
    println!("Suggestions: {}", store.count_suggestions(None)?);
    println!("Live analytics: {}", store.count_analytics(None)?);
    println!("Archived analytics: {}", store.count_archived(None)?);

    if !scopes.is_empty() {
        let ranking = RankingQuery::new(&store);
        println!("\nPer-scope stats:");
        for scope in &scopes {
            let approved = ranking.list_suggestions(scope)?.len();
            println!(
                "  {}: {} suggestions ({} approved), {} live analytics, {} archives",
                scope,
                store.count_suggestions(Some(scope))?,
                approved,
                store.count_analytics(Some(scope))?,
                store.list_archives(Some(scope))?.len()
            );
        }
    }

    Ok(())
}
