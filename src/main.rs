mod aggregate;
mod backend;
mod config;
mod error;
mod fetch;
mod ledger;
mod links;
mod markdown;
mod models;
mod sources;
mod store;
mod tui;

use aggregate::Aggregator;
use anyhow::{anyhow, Context, Result};
use backend::{Action, Backend, Dispatcher};
use clap::{Parser, Subcommand};
use config::Settings;
use fetch::{HttpFetcher, ResponseCache};
use ledger::Reconciler;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use store::SqliteSheetStore;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "apptrack")]
#[command(about = "Internship listing aggregator - collect, reconcile, and track applications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write default settings and create the ledger
    Init,

    /// Show listings that still need review
    List {
        /// Ignore cached listing documents
        #[arg(short, long)]
        force: bool,

        /// Print the listings as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Record the Nth listing from `list` as applied
    Apply {
        /// Position shown by `list`
        number: usize,
    },

    /// Record the Nth listing from `list` as discarded
    Discard {
        /// Position shown by `list`
        number: usize,
    },

    /// Look up the status of a single posting
    Status {
        company: String,
        title: String,
        location: String,
        url: String,
    },

    /// Interactive list view
    Browse,
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("apptrack=info"));

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn open_store(settings: &Settings) -> Result<SqliteSheetStore> {
    let path = settings.ledger_path();
    SqliteSheetStore::open(&path).with_context(|| format!("Failed to open ledger: {}", path.display()))
}

fn build_backend(settings: &Settings) -> Result<Backend<SqliteSheetStore>> {
    let cache_path = settings.cache_path();
    let cache = ResponseCache::open(&cache_path)
        .with_context(|| format!("Failed to open response cache: {}", cache_path.display()))?;
    let fetcher = HttpFetcher::new(cache, settings.cache_expiry_secs)?;

    let aggregator = Aggregator::from_settings(Box::new(fetcher), settings);
    let reconciler = Reconciler::from_settings(open_store(settings)?, settings);
    Ok(Backend::new(aggregator, reconciler))
}

fn record_nth(settings: &Settings, action: Action, number: usize) -> Result<()> {
    let mut backend = build_backend(settings)?;
    let listing = backend
        .refresh(false)?
        .get(number.wrapping_sub(1))
        .cloned()
        .ok_or_else(|| anyhow!("No listing #{} to review", number))?;

    let row = backend.record(action, &listing)?;
    println!(
        "{} '{}' at {} (row {} of '{}').",
        action.label(),
        listing.job_title,
        listing.company_name,
        row.row_id,
        match action {
            Action::Applied => &settings.applied_sheet,
            Action::Discarded => &settings.discarded_sheet,
        }
    );
    println!("Jobs Applied To: {}", backend.applied_count());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let log_file = match cli.command {
        Commands::Browse => Some(settings.log_path()),
        _ => None,
    };
    init_logging(log_file.as_deref())?;

    match cli.command {
        Commands::Init => {
            let settings_path = settings.save()?;
            let store = open_store(&settings)?;
            println!("Settings written to {}", settings_path.display());
            if let Some(path) = store.path() {
                println!("Ledger initialized at {}", path.display());
            }
            for (name, provider) in &settings.providers {
                println!(
                    "  [{}] {}",
                    if provider.enabled { "x" } else { " " },
                    name
                );
            }
        }

        Commands::List { force, json } => {
            let mut backend = build_backend(&settings)?;
            backend.refresh(force)?;

            let listings = backend.working_set();
            if json {
                println!("{}", serde_json::to_string_pretty(listings)?);
                return Ok(());
            }

            if listings.is_empty() {
                println!("Nothing to review.");
            } else {
                println!("{:<5} {:<22} {:<32} {:<20} {:<20}", "#", "COMPANY", "ROLE", "SOURCE", "LOCATION");
                println!("{}", "-".repeat(103));
                for (i, listing) in listings.iter().enumerate() {
                    println!(
                        "{:<5} {:<22} {:<32} {:<20} {:<20}",
                        i + 1,
                        truncate(&listing.company_name, 20),
                        truncate(&listing.job_title, 30),
                        truncate(&listing.source, 18),
                        truncate(&listing.location, 20)
                    );
                }
            }

            println!();
            println!("Sources: {}", backend.source_names().join(", "));
            println!("Jobs Applied To: {}", backend.applied_count());
            println!("Jobs Discarded:  {}", backend.reconciler().discarded_count());
            println!("Jobs To Review:  {}", listings.len());
        }

        Commands::Apply { number } => record_nth(&settings, Action::Applied, number)?,

        Commands::Discard { number } => record_nth(&settings, Action::Discarded, number)?,

        Commands::Status {
            company,
            title,
            location,
            url,
        } => {
            let mut reconciler = Reconciler::from_settings(open_store(&settings)?, &settings);
            reconciler.reload(true)?;
            let status = reconciler.status_of(&company, &title, &location, &url);
            println!("{} - {} ({}): {}", company, title, location, status.as_str());
        }

        Commands::Browse => {
            let mut dispatcher = Dispatcher::new(build_backend(&settings)?);
            tui::run_browse(&mut dispatcher)?;
        }
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("Acme", 10), "Acme");
        assert_eq!(truncate("Software Engineer Intern", 10), "Softwar...");
        assert_eq!(truncate("Zürich, Genève", 8), "Züric...");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["apptrack", "list", "--force"]).unwrap();
        assert!(matches!(cli.command, Commands::List { force: true, json: false }));

        let cli = Cli::try_parse_from(["apptrack", "list", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::List { force: false, json: true }));

        let cli = Cli::try_parse_from(["apptrack", "apply", "3"]).unwrap();
        assert!(matches!(cli.command, Commands::Apply { number: 3 }));

        assert!(Cli::try_parse_from(["apptrack", "discard"]).is_err());
    }
}
