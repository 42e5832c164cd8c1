//! # Database models
//!
//! Data structures that map to the crate's SQLite schema via **Diesel**.
//!
//! - [`Session`]: one debugging conversation.
//! - [`Message`]: one turn (user error report or assistant reply) within a session.
//! - [`DebugResult`]: the structured analysis attached to one assistant message.
//!
//! Read types derive `Queryable`/`Selectable`/`Identifiable` (and `Associations`
//! where they point at a parent). Write types (`New*`) derive `Insertable` and
//! deliberately carry **no `id` field**: identifiers and creation timestamps
//! come from the column defaults in `migrations/`, so a caller can never supply
//! them.
//!
//! Two column newtypes bridge SQLite's `TEXT` storage and Rust types:
//!
//! - [`RecordId`] wraps a [`uuid::Uuid`] stored in canonical hyphenated form.
//! - [`Document`] wraps a [`serde_json::Value`] stored as JSON text. Its shape is
//!   whatever the model produced; see [`crate::analysis`] for the typed view.
//!
//! ## Basic usage
//!
//! ```no_run
//! use copilot_db::models::NewMessage;
//! use copilot_db::store::DebugStore;
//!
//! # fn demo(store: &mut DebugStore) -> Result<(), copilot_db::error::StoreError> {
//! let session = store.create_session(Some("alice"))?;
//! let msg = store.append_message(
//!     NewMessage::user(session.id, "NullPointerException").language("java"),
//! )?;
//! assert_eq!(msg.session_id, session.id);
//! # Ok(()) }
//! ```
use chrono::{DateTime, Utc};
use diesel::backend::Backend;
use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::sqlite::Sqlite;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{fmt, str::FromStr};
use uuid::Uuid;

use crate::schema::{debug_results, messages, sessions};

/// Opaque row identifier.
///
/// Generated by the database at insert time (a version 4 UUID built from
/// `randomblob()`), read back through `RETURNING`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    AsExpression,
    FromSqlRow,
    Serialize,
    Deserialize,
)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for RecordId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl FromSql<Text, Sqlite> for RecordId {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(Self(Uuid::parse_str(&text)?))
    }
}

impl ToSql<Text, Sqlite> for RecordId {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.to_string());
        Ok(IsNull::No)
    }
}

/// A schemaless JSON document column.
///
/// The storage layer only guarantees the text is valid JSON (`json_valid`
/// check constraint). Key order is not preserved; equality is structural.
#[derive(Debug, Clone, PartialEq, AsExpression, FromSqlRow, Serialize, Deserialize)]
#[diesel(sql_type = Text)]
#[serde(transparent)]
pub struct Document(JsonValue);

impl Document {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    /// A JSON array of strings, the shape used for analysis lists.
    pub fn from_strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(JsonValue::Array(
            items
                .into_iter()
                .map(|s| JsonValue::String(s.into()))
                .collect(),
        ))
    }

    pub fn as_value(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }
}

impl From<JsonValue> for Document {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

impl FromSql<Text, Sqlite> for Document {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let text = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Ok(Self(serde_json::from_str(&text)?))
    }
}

impl ToSql<Text, Sqlite> for Document {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(serde_json::to_string(&self.0)?);
        Ok(IsNull::No)
    }
}

/// Conventional message roles.
///
/// The `role` column itself is free text (at most 20 characters); this enum is
/// the application's vocabulary on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    /// Map a stored role string back to a known role, if it is one.
    pub fn parse(role: &str) -> Option<Role> {
        match role {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One debugging conversation.
///
/// ### Table
/// - `sessions`
///
/// `updated_at` is touched by [`crate::store::DebugStore::append_message`]; a
/// fresh row has `created_at == updated_at` because both defaults evaluate
/// `'now'` within the same statement.
#[derive(Queryable, Identifiable, Selectable, Debug, Clone, PartialEq, Serialize)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Session {
    pub id: RecordId,
    /// Owning user, when the caller knows one.
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a session that has an owning user.
///
/// Anonymous sessions are inserted with `DEFAULT VALUES`.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = sessions)]
pub struct NewSession {
    pub user_id: String,
}

/// One turn in a conversation.
///
/// A user turn carries `error_text`/`code_snippet`/`language`; an assistant turn
/// carries `assistant_json` and `raw_model_output`. The schema does not enforce
/// that split, it only bounds `role` to 20 and `language` to 50 characters.
///
/// ### Table
/// - `messages`
///
/// ### Associations
/// - `belongs_to(Session)`, deleted with it.
#[derive(Queryable, Identifiable, Selectable, Associations, Debug, Clone, PartialEq, Serialize)]
#[diesel(belongs_to(Session))]
#[diesel(table_name = messages)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Message {
    pub id: RecordId,
    pub session_id: RecordId,
    pub role: String,
    pub language: Option<String>,
    pub error_text: Option<String>,
    pub code_snippet: Option<String>,
    /// Structured assistant output, shape decided by the model.
    pub assistant_json: Option<Document>,
    /// Verbatim model reply the structured output was parsed from.
    pub raw_model_output: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The role as a known [`Role`], `None` for free-form values.
    pub fn role_kind(&self) -> Option<Role> {
        Role::parse(&self.role)
    }
}

/// Insert payload for a [`Message`].
///
/// Messages are immutable once written, so there is no changeset type.
#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = messages)]
pub struct NewMessage {
    pub session_id: RecordId,
    pub role: String,
    pub language: Option<String>,
    pub error_text: Option<String>,
    pub code_snippet: Option<String>,
    pub assistant_json: Option<Document>,
    pub raw_model_output: Option<String>,
}

impl NewMessage {
    /// A message with a free-form role and no content yet.
    pub fn new(session_id: RecordId, role: impl Into<String>) -> Self {
        Self {
            session_id,
            role: role.into(),
            language: None,
            error_text: None,
            code_snippet: None,
            assistant_json: None,
            raw_model_output: None,
        }
    }

    /// A user turn reporting `error_text`.
    pub fn user(session_id: RecordId, error_text: impl Into<String>) -> Self {
        Self::new(session_id, Role::User.as_str()).error_text(error_text)
    }

    /// An assistant turn. The raw reply is mandatory here so it is never lost,
    /// even when no structured document could be parsed from it.
    pub fn assistant(session_id: RecordId, raw_model_output: impl Into<String>) -> Self {
        let mut message = Self::new(session_id, Role::Assistant.as_str());
        message.raw_model_output = Some(raw_model_output.into());
        message
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn error_text(mut self, error_text: impl Into<String>) -> Self {
        self.error_text = Some(error_text.into());
        self
    }

    pub fn code_snippet(mut self, code_snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(code_snippet.into());
        self
    }

    pub fn assistant_json(mut self, document: Document) -> Self {
        self.assistant_json = Some(document);
        self
    }
}

/// Structured analysis for one assistant [`Message`].
///
/// ### Table
/// - `debug_results`, unique on `message_id`
///
/// ### Associations
/// - `belongs_to(Message)`, deleted with it.
#[derive(Queryable, Identifiable, Selectable, Associations, Debug, Clone, PartialEq, Serialize)]
#[diesel(belongs_to(Message))]
#[diesel(table_name = debug_results)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DebugResult {
    pub id: RecordId,
    pub message_id: RecordId,
    pub error_type: String,
    pub root_cause: Document,
    pub fix_suggestions: Document,
    pub prevention: Document,
    pub raw_model_output: String,
    /// Model that produced the analysis, e.g. `qwen2.5:7b-instruct`.
    pub model_name: String,
    /// Prompt template version, e.g. `v1`.
    pub prompt_version: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a [`DebugResult`].
///
/// Usually built by [`crate::analysis::Analysis::into_debug_result`].
#[derive(Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = debug_results)]
pub struct NewDebugResult {
    pub message_id: RecordId,
    pub error_type: String,
    pub root_cause: Document,
    pub fix_suggestions: Document,
    pub prevention: Document,
    pub raw_model_output: String,
    pub model_name: String,
    pub prompt_version: String,
}

/// A session with counts for listing by recency.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session: Session,
    pub message_count: i64,
    /// `None` when the session has no messages yet.
    pub last_message_at: Option<DateTime<Utc>>,
}

/// A full conversation: messages in chronological order, each with its result
/// when one has been attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDetail {
    pub session: Session,
    pub messages: Vec<(Message, Option<DebugResult>)>,
}
