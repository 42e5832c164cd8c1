//! This module provides functionality for loading the application's configuration
//! and opening database connections with it.
//!
//! It defines the [`CopilotDbConfig`] struct, which holds the configuration
//! parameters, a [`load_config`] function to load it from a YAML file, and
//! [`establish_connection`], which opens a SQLite connection with the pragmas
//! the schema relies on.
//!
//! # Examples
//!
//! ```no_run
//! use copilot_db::config::{CopilotDbConfig, load_config};
//!
//! let config: CopilotDbConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use diesel::connection::SimpleConnection;
use diesel::prelude::*;

use serde::{Deserialize, Serialize};
use std::{error::Error, fs, path::Path};

use tracing::*;

use crate::error::StoreError;

/// Busy timeout applied when the config leaves it unset.
pub const DEFAULT_BUSY_TIMEOUT_MS: u32 = 5_000;

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct CopilotDbConfig {
    /// SQLite database path or URL (`:memory:` works for throwaway stores).
    pub database_url: String,

    /// How long a writer waits on a locked database, in milliseconds.
    #[serde(default)]
    pub busy_timeout_ms: Option<u32>,

    /// Apply pending migrations whenever a store is opened.
    #[serde(default)]
    pub auto_migrate: Option<bool>,

    /// Model name recorded on debug results written by `copilot-db record`.
    pub model_name: String,

    /// Prompt template version recorded alongside the model name.
    pub prompt_version: String,
}

impl CopilotDbConfig {
    /// A config pointing at `database_url` with the stock model settings.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            busy_timeout_ms: Some(DEFAULT_BUSY_TIMEOUT_MS),
            auto_migrate: Some(true),
            model_name: "qwen2.5:7b-instruct".to_string(),
            prompt_version: "v1".to_string(),
        }
    }

    pub fn busy_timeout_ms(&self) -> u32 {
        self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn auto_migrate(&self) -> bool {
        self.auto_migrate.unwrap_or(false)
    }
}

/// Loads the application's configuration from a YAML file.
///
/// # Returns
///
/// - `Ok(CopilotDbConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
pub fn load_config(file: impl AsRef<Path>) -> Result<CopilotDbConfig, Box<dyn Error>> {
    let file = file.as_ref();
    debug!("Loading config from {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: CopilotDbConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Open a SQLite connection ready for the debug schema.
///
/// Foreign keys are off by default in SQLite and are a per-connection setting,
/// so every connection goes through here. Without them neither the references
/// nor the cascading deletes are enforced.
pub fn establish_connection(
    db_url: &str,
    busy_timeout_ms: u32,
) -> Result<SqliteConnection, StoreError> {
    let mut conn =
        SqliteConnection::establish(db_url).map_err(|source| StoreError::Connection {
            url: db_url.to_string(),
            source,
        })?;

    conn.batch_execute(&format!(
        "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {busy_timeout_ms};"
    ))?;

    debug!("Connected to {}", db_url);
    Ok(conn)
}
