//! # copilot_db (library root)
//!
//! Persistence for a debugging assistant: user sessions, the messages
//! exchanged in them (error reports and assistant replies), and the structured
//! debugging results a language model produced for those replies.
//!
//! - Schema and migrations (`schema`, `models`, `migrations`). The SQL lives
//!   in `migrations/` and is embedded at compile time.
//! - Store operations with classified errors (`store`, `error`).
//! - A typed view over raw model output (`analysis`).
//! - Configuration and connections (`config`).
//! - The `copilot-db` CLI surface and its terminal rendering (`commands`, `pretty`).
//!
//! ## Integrity at a glance
//! - Every message belongs to a live session and every debug result to a live
//!   message; deleting a session cascades to both.
//! - A message has at most one debug result.
//! - Identifiers are generated by the database when a row is inserted.
//! - The raw model reply is stored verbatim next to anything parsed from it.
//!
//! ## Quick start
//! ```no_run
//! use copilot_db::config::CopilotDbConfig;
//! use copilot_db::models::NewMessage;
//! use copilot_db::store::DebugStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = DebugStore::open(&CopilotDbConfig::with_database_url("copilot.db"))?;
//! let session = store.create_session(None)?;
//! store.append_message(NewMessage::user(session.id, "TypeError: x is not a function"))?;
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::error::Error;
use std::path::PathBuf;

pub mod analysis;
pub mod commands;
pub mod config;
pub mod error;
pub mod migrations;
pub mod models;
pub mod pretty;
pub mod schema;
pub mod store;

/// Return the per-platform configuration directory used by `copilot-db`.
///
/// The directory is **not** created by this function; callers that need it
/// should create it with `fs::create_dir_all`.
///
/// # Errors
/// Returns an error if the platform configuration directory cannot be determined.
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    let proj_dirs = ProjectDirs::from("com", "debug-copilot", "copilot-db")
        .ok_or("Unable to determine config directory")?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Default location of the SQLite database, next to the config file.
pub fn default_database_path() -> Result<PathBuf, Box<dyn Error>> {
    Ok(config_dir()?.join("copilot.db"))
}
