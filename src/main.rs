// src/main.rs

use anyhow::Result;
use clap::{Parser, Subcommand};
use pkgtxn::base::Base;
use pkgtxn::config::Config;
use pkgtxn::db::models::ProvenanceRecord;
use pkgtxn::provenance::ProvenanceStore;
use pkgtxn::transaction::Reason;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Parser)]
#[command(name = "pkgtxn")]
#[command(author, version, about = "Package transaction core: locking, provenance and cache maintenance", long_about = None)]
struct Cli {
    /// Configuration file (JSON); built-in defaults when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the provenance database
    Init,
    /// List recorded install provenance
    Provenance {
        /// Only show records for this package name
        name: Option<String>,
        /// Only show records with this reason (user, dep, unknown)
        #[arg(short, long)]
        reason: Option<Reason>,
    },
    /// Remove cached solver indexes
    Clean,
    /// List package groups from repository comps data
    Groups,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => Ok(Config::default()),
    }
}

fn print_record(record: &ProvenanceRecord) {
    println!(
        "{:<40} {:<8} {:<16} {}",
        record.package.to_string(),
        record.reason,
        record.from_repo,
        record.releasever
    );
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Some(Commands::Init) => {
            info!("Initializing provenance database at: {}", config.db_path.display());
            pkgtxn::db::init(&config.db_path)?;
            println!(
                "Database initialized successfully at: {}",
                config.db_path.display()
            );
            Ok(())
        }
        Some(Commands::Provenance { name, reason }) => {
            let store = ProvenanceStore::open(&config.db_path)?;
            let mut records = match (name, reason) {
                (Some(ref name), _) => store.find_by_name(name)?,
                (None, Some(reason)) => store.find_by_reason(reason)?,
                (None, None) => store.list()?,
            };
            if let Some(reason) = reason {
                records.retain(|r| r.reason == reason);
            }

            if records.is_empty() {
                println!("No provenance records found.");
                return Ok(());
            }

            for record in &records {
                print_record(record);
            }
            println!("\nTotal: {} record(s)", records.len());
            Ok(())
        }
        Some(Commands::Clean) => {
            let mut base = Base::new(config)?;
            base.lock()?;
            let result = base.clean_binary_cache();
            base.unlock()?;

            let removed = result?;
            for path in &removed {
                println!("Removed {}", path.display());
            }
            println!("{} cache file(s) removed", removed.len());
            Ok(())
        }
        Some(Commands::Groups) => {
            let base = Base::new(config)?;
            let comps = base.read_comps()?;
            for group in &comps.groups {
                println!("{} ({}): {} package(s)", group.name, group.id, group.packages.len());
            }
            Ok(())
        }
        None => {
            println!("pkgtxn v{}", env!("CARGO_PKG_VERSION"));
            println!("Run 'pkgtxn --help' for usage information");
            Ok(())
        }
    }
}
