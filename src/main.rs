//! Entry point for the `copilot-db` CLI.
//!
//! Loads the configuration, opens the store and dispatches the subcommand.
//!
//! ```sh
//! copilot-db init
//! copilot-db migrate
//! copilot-db sessions -n 10
//! copilot-db show 3f2b8c1e-9a4d-4c6b-8e2f-1a2b3c4d5e6f
//! ```

use chrono::Utc;
use clap::Parser;
use copilot_db::{
    commands::{Cli, Commands, idle_cutoff},
    config::{self, CopilotDbConfig},
    config_dir, default_database_path,
    pretty,
    store::DebugStore,
};
use once_cell::sync::OnceCell;
use std::{error::Error, fs, io::stdout, path::PathBuf};
use tracing::{debug, info};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    run(Cli::parse())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config_dir()?.join("config.yaml"),
    };

    if let Commands::Init = cli.command {
        return init(config_path);
    }

    let config = config::load_config(&config_path)?;
    debug!("Config loaded: {:?}", config);

    // Migration commands manage the schema themselves.
    let store_config = match cli.command {
        Commands::Migrate | Commands::Revert | Commands::Status => CopilotDbConfig {
            auto_migrate: Some(false),
            ..config.clone()
        },
        _ => config.clone(),
    };
    let mut store = DebugStore::open(&store_config)?;
    let mut out = stdout();

    match cli.command {
        // Handled before the store is opened.
        Commands::Init => {}
        Commands::Migrate => {
            let applied = store.run_migrations()?;
            if applied.is_empty() {
                println!("Schema is up to date.");
            }
            for version in applied {
                println!("Applied {version}");
            }
        }
        Commands::Revert => {
            let version = store.revert_last_migration()?;
            println!("Reverted {version}");
        }
        Commands::Status => {
            let status = store.migration_status()?;
            for version in &status.applied {
                println!("applied  {version}");
            }
            for version in &status.pending {
                println!("pending  {version}");
            }
        }
        Commands::Sessions { limit } => {
            let summaries = store.list_sessions(limit)?;
            pretty::print_session_list(&summaries, &mut out)?;
        }
        Commands::Show { session, json } => {
            let detail = store.session_detail(session)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            } else {
                pretty::print_session_detail(&detail, &mut out)?;
            }
        }
        Commands::Delete { session } => {
            if store.delete_session(session)? {
                println!("Deleted session {session}");
            } else {
                println!("No session {session}");
            }
        }
        Commands::Prune { idle_days } => {
            let cutoff = idle_cutoff(Utc::now(), idle_days)?;
            let deleted = store.delete_sessions_idle_since(cutoff)?;
            println!("Deleted {deleted} idle session(s)");
        }
        Commands::Record(args) => {
            let (session_id, turn) = args.record(&mut store, &config)?;
            match turn.debug_result {
                Some(result) => println!(
                    "Recorded {} in session {session_id}: {}",
                    turn.assistant_message.id, result.error_type
                ),
                None => println!(
                    "Recorded {} in session {session_id} without a debug result (reply did not parse)",
                    turn.assistant_message.id
                ),
            }
        }
    }

    Ok(())
}

/// Write a default config file, pointing at a database in the config directory.
fn init(config_path: PathBuf) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = config_path.parent() {
        info!("Creating config directory: {}", parent.display());
        fs::create_dir_all(parent)?;
    }

    let database_path = default_database_path()?;
    let config = CopilotDbConfig::with_database_url(database_path.to_string_lossy());

    info!("Creating config file: {}", config_path.display());
    fs::write(&config_path, serde_yaml::to_string(&config)?)?;
    println!("Wrote {}", config_path.display());
    Ok(())
}
