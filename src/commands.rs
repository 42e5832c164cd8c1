//! This module defines the command-line interface for `copilot-db` using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options. `RecordArgs::record` and `idle_cutoff` hold the parts of `record`
//! and `prune` that go beyond a single store call.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use copilot_db::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Migrate => { /* apply pending migrations */ }
//!     _ => {}
//! }
//! ```

use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

use crate::config::CopilotDbConfig;
use crate::models::{NewMessage, RecordId};
use crate::store::{DebugStore, RecordedTurn};

/// Upper bound for `prune --idle-days` (about a century).
pub const MAX_IDLE_DAYS: i64 = 36_500;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Config file to use instead of the one in the config directory.
    #[arg(long, short = 'c', global = true, env = "COPILOT_DB_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write a default config file into the config directory.
    Init,

    /// Apply pending schema migrations.
    Migrate,

    /// Revert the most recent schema migration.
    Revert,

    /// Show applied and pending migrations.
    Status,

    /// List sessions, most recently active first.
    #[clap(name = "sessions", alias = "ls")]
    Sessions {
        /// Maximum number of sessions to list.
        #[arg(short = 'n', long, default_value_t = crate::store::DEFAULT_SESSION_LIMIT)]
        limit: u32,
    },

    /// Show a conversation with its debug results.
    Show {
        session: RecordId,

        /// Print JSON instead of formatted text.
        #[arg(long)]
        json: bool,
    },

    /// Delete a session together with its messages and results.
    #[clap(name = "delete", alias = "rm")]
    Delete { session: RecordId },

    /// Delete sessions that have been idle for a number of days.
    Prune {
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=MAX_IDLE_DAYS))]
        idle_days: u32,
    },

    /// Record one finished exchange: the user's report, the raw model reply
    /// and, when the reply parses, its debug result.
    Record(RecordArgs),
}

/// Options of the `record` subcommand.
#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Session to append to; a new one is created when omitted.
    #[arg(short = 's', long)]
    pub session: Option<RecordId>,

    /// Owning user for a newly created session.
    #[arg(short = 'u', long)]
    pub user: Option<String>,

    /// Error text the user reported.
    #[arg(short = 'e', long)]
    pub error_text: String,

    /// Programming language label.
    #[arg(short = 'l', long)]
    pub language: Option<String>,

    /// File containing the code snippet.
    #[arg(long)]
    pub code_file: Option<PathBuf>,

    /// File containing the raw model reply.
    #[arg(short = 'r', long)]
    pub raw_output_file: PathBuf,
}

impl RecordArgs {
    /// Read the input files, then write the whole turn.
    ///
    /// Files are read before anything touches the database, and a new session
    /// is created in the same transaction as the turn, so a failure leaves no
    /// rows behind.
    pub fn record(
        self,
        store: &mut DebugStore,
        config: &CopilotDbConfig,
    ) -> Result<(RecordId, RecordedTurn), Box<dyn Error>> {
        let code = self.code_file.map(fs::read_to_string).transpose()?;
        let raw = fs::read_to_string(&self.raw_output_file)?;

        let mut message = NewMessage::user(
            self.session.unwrap_or_else(|| RecordId::from(Uuid::nil())),
            self.error_text,
        );
        if let Some(language) = self.language {
            message = message.language(language);
        }
        if let Some(code) = code {
            message = message.code_snippet(code);
        }

        let (session_id, turn) = match self.session {
            Some(session_id) => {
                store.get_session(session_id)?;
                let turn =
                    store.record_turn(message, &raw, &config.model_name, &config.prompt_version)?;
                (session_id, turn)
            }
            None => {
                let (session, turn) = store.record_turn_in_new_session(
                    self.user.as_deref(),
                    message,
                    &raw,
                    &config.model_name,
                    &config.prompt_version,
                )?;
                (session.id, turn)
            }
        };

        Ok((session_id, turn))
    }
}

/// Start of the retention window for `prune --idle-days`.
pub fn idle_cutoff(now: DateTime<Utc>, idle_days: u32) -> Result<DateTime<Utc>, Box<dyn Error>> {
    now.checked_sub_signed(Duration::days(i64::from(idle_days)))
        .ok_or_else(|| format!("--idle-days {idle_days} reaches before the earliest date").into())
}
