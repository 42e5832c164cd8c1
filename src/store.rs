//! # Debug store
//!
//! Transactional operations over the debug schema: the minimum the surrounding
//! application needs to create a session, append messages, attach results and
//! read conversations back.
//!
//! ## What this module owns
//! - A [`DebugStore`] holding one SQLite connection (foreign keys enabled, see
//!   [`crate::config::establish_connection`]).
//! - Helpers to insert/query sessions, messages and debug results.
//! - Deletion: a single `DELETE` on `sessions`; the schema's cascading foreign
//!   keys remove the session's messages and their results in the same statement.
//!
//! ## Typical flow
//! 1. [`DebugStore::open`] with a [`CopilotDbConfig`].
//! 2. [`DebugStore::create_session`] when a conversation starts.
//! 3. [`DebugStore::append_message`] for the user's report, then for the reply.
//! 4. [`DebugStore::attach_debug_result`] once the structured analysis exists.
//!    Until then the assistant message simply has no result, which is normal.
//!
//! Messages and results are immutable: there are no update operations for them.

use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, sql};
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool, Nullable, Text, TimestamptzSqlite};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::{
    analysis::{Analysis, parse_model_output},
    config::{CopilotDbConfig, establish_connection},
    error::StoreError,
    migrations::{self, MigrationStatus},
    models::{
        DebugResult, Message, NewDebugResult, NewMessage, NewSession, RecordId, Role, Session,
        SessionDetail, SessionSummary,
    },
    schema::{debug_results, messages, sessions},
};

/// Current time in the same text layout as the column defaults, so that
/// comparing stored timestamps as text stays chronological.
const NOW_SQL: &str = "strftime('%Y-%m-%d %H:%M:%f+00:00', 'now')";

/// Default page size for [`DebugStore::list_sessions`].
pub const DEFAULT_SESSION_LIMIT: u32 = 20;

/// Everything written for one exchange by [`DebugStore::record_turn`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTurn {
    pub user_message: Message,
    pub assistant_message: Message,
    /// `None` when the reply could not be parsed; the raw text is still on
    /// `assistant_message.raw_model_output`.
    pub debug_result: Option<DebugResult>,
}

/// Owns a SQLite connection and exposes the schema's operations.
pub struct DebugStore {
    connection: SqliteConnection,
}

impl DebugStore {
    /// Open the database named by `config`.
    ///
    /// Applies pending migrations first when `auto_migrate` is set.
    ///
    /// # Errors
    /// [`StoreError::Connection`] when the database cannot be opened,
    /// [`StoreError::Migration`] when a migration fails.
    pub fn open(config: &CopilotDbConfig) -> Result<Self, StoreError> {
        let connection = establish_connection(&config.database_url, config.busy_timeout_ms())?;
        let mut store = Self { connection };

        if config.auto_migrate() {
            store.run_migrations()?;
        }

        Ok(store)
    }

    /// Wrap an existing connection. The caller is responsible for having
    /// enabled `PRAGMA foreign_keys`.
    pub fn from_connection(connection: SqliteConnection) -> Self {
        Self { connection }
    }

    /// Raw access for queries this module does not cover.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.connection
    }

    pub fn run_migrations(&mut self) -> Result<Vec<String>, StoreError> {
        migrations::run_pending(&mut self.connection)
    }

    pub fn revert_last_migration(&mut self) -> Result<String, StoreError> {
        migrations::revert_last(&mut self.connection)
    }

    pub fn migration_status(&mut self) -> Result<MigrationStatus, StoreError> {
        migrations::status(&mut self.connection)
    }

    /// Start a new conversation.
    ///
    /// The id and both timestamps come from column defaults evaluated in one
    /// statement, so the returned row has `created_at == updated_at`.
    pub fn create_session(&mut self, user_id: Option<&str>) -> Result<Session, StoreError> {
        let session = insert_session(&mut self.connection, user_id)?;
        info!(session_id = %session.id, "Created session");
        Ok(session)
    }

    pub fn get_session(&mut self, id: RecordId) -> Result<Session, StoreError> {
        find_session(&mut self.connection, id)
    }

    /// Bump `updated_at` to now.
    pub fn touch_session(&mut self, id: RecordId) -> Result<Session, StoreError> {
        diesel::update(sessions::table.find(id))
            .set(sessions::updated_at.eq(sql::<TimestamptzSqlite>(NOW_SQL)))
            .returning(Session::as_returning())
            .get_result(&mut self.connection)
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "session",
                id,
            })
    }

    /// Most recently active sessions first.
    pub fn list_sessions(&mut self, limit: u32) -> Result<Vec<SessionSummary>, StoreError> {
        let sessions: Vec<Session> = sessions::table
            .order(sessions::updated_at.desc())
            .limit(i64::from(limit))
            .select(Session::as_select())
            .load(&mut self.connection)?;

        let ids: Vec<RecordId> = sessions.iter().map(|session| session.id).collect();

        let stats: HashMap<RecordId, (i64, Option<DateTime<Utc>>)> = messages::table
            .filter(messages::session_id.eq_any(&ids))
            .group_by(messages::session_id)
            .select((
                messages::session_id,
                count_star(),
                sql::<Nullable<TimestamptzSqlite>>("max(messages.created_at)"),
            ))
            .load::<(RecordId, i64, Option<DateTime<Utc>>)>(&mut self.connection)?
            .into_iter()
            .map(|(id, count, last)| (id, (count, last)))
            .collect();

        Ok(sessions
            .into_iter()
            .map(|session| {
                let (message_count, last_message_at) =
                    stats.get(&session.id).copied().unwrap_or((0, None));
                SessionSummary {
                    session,
                    message_count,
                    last_message_at,
                }
            })
            .collect())
    }

    /// Append one turn to a session and touch the session, atomically.
    ///
    /// # Errors
    /// A [`StoreError::Constraint`] of kind `ForeignKey` when the session does
    /// not exist, `Check` when `role` or `language` is too long or the assistant
    /// document is not valid JSON.
    pub fn append_message(&mut self, message: NewMessage) -> Result<Message, StoreError> {
        let message = self
            .connection
            .transaction(|conn| insert_message(conn, &message))?;

        debug!(message_id = %message.id, session_id = %message.session_id, role = %message.role, "Appended message");
        Ok(message)
    }

    /// Messages of a session in chronological order; rows created within the
    /// same clock tick keep their insertion order.
    pub fn session_messages(&mut self, session_id: RecordId) -> Result<Vec<Message>, StoreError> {
        load_messages(&mut self.connection, session_id)
    }

    /// Persist the structured analysis for an assistant message.
    ///
    /// # Errors
    /// - [`StoreError::NotFound`] when the message does not exist.
    /// - [`StoreError::RoleMismatch`] when it is not an assistant message.
    /// - A `Unique` [`StoreError::Constraint`] when it already has a result.
    pub fn attach_debug_result(
        &mut self,
        result: NewDebugResult,
    ) -> Result<DebugResult, StoreError> {
        let result = self
            .connection
            .transaction(|conn| insert_debug_result(conn, &result))?;

        info!(result_id = %result.id, message_id = %result.message_id, error_type = %result.error_type, "Attached debug result");
        Ok(result)
    }

    /// The result for a message, `None` while none has been attached.
    pub fn debug_result_for(
        &mut self,
        message_id: RecordId,
    ) -> Result<Option<DebugResult>, StoreError> {
        Ok(debug_results::table
            .filter(debug_results::message_id.eq(message_id))
            .select(DebugResult::as_select())
            .first(&mut self.connection)
            .optional()?)
    }

    /// A session with all its messages and their results.
    pub fn session_detail(&mut self, id: RecordId) -> Result<SessionDetail, StoreError> {
        let conn = &mut self.connection;
        let session = find_session(conn, id)?;
        let messages = load_messages(conn, id)?;

        let results: Vec<DebugResult> = DebugResult::belonging_to(&messages)
            .select(DebugResult::as_select())
            .load(conn)?;
        let grouped = results.grouped_by(&messages);

        Ok(SessionDetail {
            session,
            messages: messages
                .into_iter()
                .zip(grouped)
                .map(|(message, mut results)| (message, results.pop()))
                .collect(),
        })
    }

    /// Delete a session together with its messages and results.
    ///
    /// Returns `false` when no such session existed.
    pub fn delete_session(&mut self, id: RecordId) -> Result<bool, StoreError> {
        let deleted = diesel::delete(sessions::table.find(id)).execute(&mut self.connection)?;
        if deleted > 0 {
            info!(session_id = %id, "Deleted session");
        }
        Ok(deleted > 0)
    }

    /// Retention sweep: delete every session not updated since `cutoff`.
    pub fn delete_sessions_idle_since(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let cutoff_text = cutoff.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        let idle = sql::<Bool>("sessions.updated_at < strftime('%Y-%m-%d %H:%M:%f+00:00', ")
            .bind::<Text, _>(cutoff_text)
            .sql(")");

        let deleted =
            diesel::delete(sessions::table.filter(idle)).execute(&mut self.connection)?;
        info!(%cutoff, deleted, "Pruned idle sessions");
        Ok(deleted)
    }

    /// Persist one finished exchange in a single transaction: the user's
    /// report, the assistant reply built from `raw_model_output`, and, when the
    /// reply parses, its debug result.
    pub fn record_turn(
        &mut self,
        user_message: NewMessage,
        raw_model_output: &str,
        model_name: &str,
        prompt_version: &str,
    ) -> Result<RecordedTurn, StoreError> {
        let analysis = analyse_reply(user_message.session_id, raw_model_output);
        self.connection.transaction(|conn| {
            write_turn(
                conn,
                &user_message,
                analysis,
                raw_model_output,
                model_name,
                prompt_version,
            )
        })
    }

    /// Like [`DebugStore::record_turn`], but the session is created in the same
    /// transaction. `user_message.session_id` is replaced by the new session's
    /// id. Nothing is left behind when any write fails.
    pub fn record_turn_in_new_session(
        &mut self,
        user_id: Option<&str>,
        mut user_message: NewMessage,
        raw_model_output: &str,
        model_name: &str,
        prompt_version: &str,
    ) -> Result<(Session, RecordedTurn), StoreError> {
        let (session, turn) = self.connection.transaction(|conn| {
            let session = insert_session(conn, user_id)?;
            user_message.session_id = session.id;
            let analysis = analyse_reply(session.id, raw_model_output);
            let turn = write_turn(
                conn,
                &user_message,
                analysis,
                raw_model_output,
                model_name,
                prompt_version,
            )?;
            Ok::<_, StoreError>((session, turn))
        })?;

        info!(session_id = %session.id, "Created session");
        // The turn touched the session after it was inserted.
        let session = self.get_session(session.id)?;
        Ok((session, turn))
    }
}

fn analyse_reply(session_id: RecordId, raw_model_output: &str) -> Option<Analysis> {
    match parse_model_output(raw_model_output) {
        Ok(analysis) => Some(analysis),
        Err(err) => {
            warn!(%session_id, "Storing reply without a debug result: {}", err);
            None
        }
    }
}

/// Insert the user's message, the reply and its result. Callers provide the
/// transaction.
fn write_turn(
    conn: &mut SqliteConnection,
    user_message: &NewMessage,
    analysis: Option<Analysis>,
    raw_model_output: &str,
    model_name: &str,
    prompt_version: &str,
) -> Result<RecordedTurn, StoreError> {
    let user_message_row = insert_message(conn, user_message)?;

    let mut reply = NewMessage::assistant(user_message.session_id, raw_model_output);
    if let Some(analysis) = &analysis {
        reply = reply.assistant_json(analysis.assistant_document());
    }
    let assistant_message = insert_message(conn, &reply)?;

    let debug_result = match analysis {
        Some(analysis) => Some(insert_debug_result(
            conn,
            &analysis.into_debug_result(
                assistant_message.id,
                raw_model_output,
                model_name,
                prompt_version,
            ),
        )?),
        None => None,
    };

    Ok(RecordedTurn {
        user_message: user_message_row,
        assistant_message,
        debug_result,
    })
}

/// Id and timestamps come from column defaults.
fn insert_session(conn: &mut SqliteConnection, user_id: Option<&str>) -> Result<Session, StoreError> {
    let session = match user_id {
        Some(user_id) => diesel::insert_into(sessions::table)
            .values(&NewSession {
                user_id: user_id.to_string(),
            })
            .returning(Session::as_returning())
            .get_result(conn)?,
        None => diesel::insert_into(sessions::table)
            .default_values()
            .returning(Session::as_returning())
            .get_result(conn)?,
    };
    Ok(session)
}

fn find_session(conn: &mut SqliteConnection, id: RecordId) -> Result<Session, StoreError> {
    sessions::table
        .find(id)
        .select(Session::as_select())
        .first(conn)
        .optional()?
        .ok_or(StoreError::NotFound {
            entity: "session",
            id,
        })
}

fn load_messages(
    conn: &mut SqliteConnection,
    session_id: RecordId,
) -> Result<Vec<Message>, StoreError> {
    Ok(messages::table
        .filter(messages::session_id.eq(session_id))
        .order((
            messages::created_at.asc(),
            sql::<BigInt>("messages.rowid").asc(),
        ))
        .select(Message::as_select())
        .load(conn)?)
}

/// Insert a message and touch its session. Callers provide the transaction.
fn insert_message(conn: &mut SqliteConnection, message: &NewMessage) -> Result<Message, StoreError> {
    let message: Message = diesel::insert_into(messages::table)
        .values(message)
        .returning(Message::as_returning())
        .get_result(conn)?;

    diesel::update(sessions::table.find(message.session_id))
        .set(sessions::updated_at.eq(sql::<TimestamptzSqlite>(NOW_SQL)))
        .execute(conn)?;

    Ok(message)
}

/// Check the target message, then insert. Callers provide the transaction.
fn insert_debug_result(
    conn: &mut SqliteConnection,
    result: &NewDebugResult,
) -> Result<DebugResult, StoreError> {
    let role: Option<String> = messages::table
        .find(result.message_id)
        .select(messages::role)
        .first(conn)
        .optional()?;

    match role {
        None => {
            return Err(StoreError::NotFound {
                entity: "message",
                id: result.message_id,
            });
        }
        Some(role) if Role::parse(&role) != Some(Role::Assistant) => {
            return Err(StoreError::RoleMismatch {
                id: result.message_id,
                role,
            });
        }
        Some(_) => {}
    }

    Ok(diesel::insert_into(debug_results::table)
        .values(result)
        .returning(DebugResult::as_returning())
        .get_result(conn)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConstraintKind;
    use crate::models::Document;
    use chrono::Duration;
    use serde_json::json;
    use uuid::Uuid;

    fn setup() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn store() -> DebugStore {
        setup();
        DebugStore::open(&CopilotDbConfig::with_database_url(":memory:"))
            .expect("in-memory store")
    }

    fn analysis_result(message_id: RecordId) -> NewDebugResult {
        NewDebugResult {
            message_id,
            error_type: "NullPointerException".to_string(),
            root_cause: Document::from_strings(["user is null"]),
            fix_suggestions: Document::from_strings(["check for null", "initialize user"]),
            prevention: Document::from_strings(["use Optional"]),
            raw_model_output: r#"{"error_type":"NullPointerException"}"#.to_string(),
            model_name: "qwen2.5:7b-instruct".to_string(),
            prompt_version: "v1".to_string(),
        }
    }

    #[test]
    fn test_fresh_session_timestamps_match() {
        let mut store = store();
        let session = store.create_session(None).unwrap();
        assert_eq!(session.created_at, session.updated_at);
        assert_eq!(session.user_id, None);
        assert_eq!(session.id.as_uuid().get_version_num(), 4);

        let owned = store.create_session(Some("alice")).unwrap();
        assert_eq!(owned.user_id.as_deref(), Some("alice"));
        assert_eq!(owned.created_at, owned.updated_at);
        assert_ne!(owned.id, session.id);
    }

    #[test]
    fn test_get_and_touch_session() {
        let mut store = store();
        let session = store.create_session(None).unwrap();
        assert_eq!(store.get_session(session.id).unwrap(), session);

        let touched = store.touch_session(session.id).unwrap();
        assert!(touched.updated_at >= touched.created_at);

        let missing = RecordId::from(Uuid::new_v4());
        assert!(matches!(
            store.get_session(missing),
            Err(StoreError::NotFound { entity: "session", .. })
        ));
        assert!(matches!(
            store.touch_session(missing),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_append_message_requires_live_session() {
        let mut store = store();
        let missing = RecordId::from(Uuid::new_v4());

        let err = store
            .append_message(NewMessage::user(missing, "boom"))
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_append_message_touches_session() {
        let mut store = store();
        let session = store.create_session(None).unwrap();
        let message = store
            .append_message(NewMessage::user(session.id, "boom"))
            .unwrap();

        let session = store.get_session(session.id).unwrap();
        assert!(session.updated_at >= message.created_at);
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn test_role_and_language_limits() {
        let mut store = store();
        let session = store.create_session(None).unwrap();

        let ok = store.append_message(NewMessage::new(session.id, "a".repeat(20)));
        assert!(ok.is_ok());

        let err = store
            .append_message(NewMessage::new(session.id, "a".repeat(21)))
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));

        let err = store
            .append_message(NewMessage::user(session.id, "boom").language("x".repeat(51)))
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));
    }

    #[test]
    fn test_assistant_json_round_trip() {
        let mut store = store();
        let session = store.create_session(None).unwrap();
        let document = json!({
            "error_type": "TypeError",
            "root_cause": ["x is undefined"],
            "details": {"nested": [1, 2.5, null, true], "empty": {}},
        });

        let message = store
            .append_message(
                NewMessage::assistant(session.id, "raw reply")
                    .assistant_json(Document::new(document.clone())),
            )
            .unwrap();

        let loaded = store.session_messages(session.id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, message.id);
        assert_eq!(loaded[0].assistant_json.as_ref().unwrap().as_value(), &document);
        assert_eq!(loaded[0].raw_model_output.as_deref(), Some("raw reply"));
    }

    #[test]
    fn test_debug_scenario() {
        let mut store = store();
        let s1 = store.create_session(None).unwrap();

        let m1 = store
            .append_message(NewMessage::user(s1.id, "NullPointerException").language("java"))
            .unwrap();
        let m2 = store
            .append_message(NewMessage::new(s1.id, "assistant"))
            .unwrap();

        let inserted = store.attach_debug_result(analysis_result(m2.id)).unwrap();
        assert_eq!(inserted.message_id, m2.id);

        let ordered: Vec<RecordId> = store
            .session_messages(s1.id)
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ordered, vec![m1.id, m2.id]);

        let result = store.debug_result_for(m2.id).unwrap().unwrap();
        assert_eq!(result, inserted);
        assert_eq!(result.error_type, "NullPointerException");
        assert_eq!(result.model_name, "qwen2.5:7b-instruct");
        assert_eq!(result.prompt_version, "v1");
        assert_eq!(result.analysis().fix_suggestions.len(), 2);
        assert!(store.debug_result_for(m1.id).unwrap().is_none());

        // A second result for the same message is rejected.
        let err = store
            .attach_debug_result(analysis_result(m2.id))
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Unique));

        // Deleting the session removes everything it owns.
        assert!(store.delete_session(s1.id).unwrap());
        assert!(store.session_messages(s1.id).unwrap().is_empty());
        assert!(store.debug_result_for(m2.id).unwrap().is_none());
        assert!(!store.delete_session(s1.id).unwrap());
    }

    #[test]
    fn test_attach_debug_result_checks_target() {
        let mut store = store();
        let session = store.create_session(None).unwrap();
        let user = store
            .append_message(NewMessage::user(session.id, "boom"))
            .unwrap();

        assert!(matches!(
            store.attach_debug_result(analysis_result(user.id)),
            Err(StoreError::RoleMismatch { .. })
        ));
        assert!(matches!(
            store.attach_debug_result(analysis_result(RecordId::from(Uuid::new_v4()))),
            Err(StoreError::NotFound { entity: "message", .. })
        ));
    }

    #[test]
    fn test_session_detail_pairs_results() {
        let mut store = store();
        let session = store.create_session(Some("bob")).unwrap();
        let user = store
            .append_message(NewMessage::user(session.id, "boom"))
            .unwrap();
        let pending = store
            .append_message(NewMessage::assistant(session.id, "thinking"))
            .unwrap();
        let answered = store
            .append_message(NewMessage::assistant(session.id, "{}"))
            .unwrap();
        store.attach_debug_result(analysis_result(answered.id)).unwrap();

        let detail = store.session_detail(session.id).unwrap();
        assert_eq!(detail.session.id, session.id);
        let shape: Vec<(RecordId, bool)> = detail
            .messages
            .iter()
            .map(|(message, result)| (message.id, result.is_some()))
            .collect();
        assert_eq!(
            shape,
            vec![(user.id, false), (pending.id, false), (answered.id, true)]
        );
    }

    #[test]
    fn test_list_sessions_by_recency() {
        let mut store = store();
        let quiet = store.create_session(None).unwrap();
        let busy = store.create_session(None).unwrap();
        store
            .append_message(NewMessage::user(busy.id, "one"))
            .unwrap();
        let last = store
            .append_message(NewMessage::user(busy.id, "two"))
            .unwrap();

        let summaries = store.list_sessions(DEFAULT_SESSION_LIMIT).unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].session.id, busy.id);
        assert_eq!(summaries[0].message_count, 2);
        assert_eq!(summaries[0].last_message_at, Some(last.created_at));
        assert_eq!(summaries[1].session.id, quiet.id);
        assert_eq!(summaries[1].message_count, 0);
        assert_eq!(summaries[1].last_message_at, None);

        assert_eq!(store.list_sessions(1).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_sessions_idle_since() {
        let mut store = store();
        let session = store.create_session(None).unwrap();
        store
            .append_message(NewMessage::user(session.id, "boom"))
            .unwrap();

        let past = Utc::now() - Duration::days(30);
        assert_eq!(store.delete_sessions_idle_since(past).unwrap(), 0);

        let future = Utc::now() + Duration::minutes(1);
        assert_eq!(store.delete_sessions_idle_since(future).unwrap(), 1);
        assert!(store.session_messages(session.id).unwrap().is_empty());
    }

    #[test]
    fn test_record_turn_with_parseable_reply() {
        let mut store = store();
        let session = store.create_session(None).unwrap();
        let raw = "```json\n{\"error_type\": \"TypeError\", \"root_cause\": [\"x\"], \"fix_suggestions\": [\"y\"], \"prevention\": [\"z\"]}\n```";

        let turn = store
            .record_turn(
                NewMessage::user(session.id, "TypeError: x is not a function").language("js"),
                raw,
                "qwen2.5:7b-instruct",
                "v1",
            )
            .unwrap();

        assert_eq!(turn.user_message.role, "user");
        assert_eq!(turn.assistant_message.role, "assistant");
        assert_eq!(turn.assistant_message.raw_model_output.as_deref(), Some(raw));
        assert!(turn.assistant_message.assistant_json.is_some());

        let result = turn.debug_result.unwrap();
        assert_eq!(result.raw_model_output, raw);
        assert_eq!(result.error_type, "TypeError");
        assert_eq!(result.message_id, turn.assistant_message.id);
    }

    #[test]
    fn test_record_turn_keeps_unparseable_reply() {
        let mut store = store();
        let session = store.create_session(None).unwrap();

        let turn = store
            .record_turn(
                NewMessage::user(session.id, "boom"),
                "Sorry, I cannot help with that.",
                "qwen2.5:7b-instruct",
                "v1",
            )
            .unwrap();

        assert!(turn.debug_result.is_none());
        assert!(turn.assistant_message.assistant_json.is_none());
        assert_eq!(
            turn.assistant_message.raw_model_output.as_deref(),
            Some("Sorry, I cannot help with that.")
        );
        assert_eq!(store.session_messages(session.id).unwrap().len(), 2);
    }

    #[test]
    fn test_record_turn_rolls_back_on_missing_session() {
        let mut store = store();
        let missing = RecordId::from(Uuid::new_v4());

        let err = store
            .record_turn(NewMessage::user(missing, "boom"), "{}", "m", "v1")
            .unwrap_err();
        assert_eq!(err.constraint_kind(), Some(ConstraintKind::ForeignKey));
        assert!(store.session_messages(missing).unwrap().is_empty());
    }

    #[test]
    fn test_record_turn_in_new_session() {
        let mut store = store();

        let placeholder = RecordId::from(Uuid::new_v4());
        let (session, turn) = store
            .record_turn_in_new_session(
                Some("alice"),
                NewMessage::user(placeholder, "KeyError: 'id'").language("python"),
                r#"{"error_type":"KeyError","root_cause":["missing key"],"fix_suggestions":["use .get"],"prevention":["validate input"]}"#,
                "qwen2.5:7b-instruct",
                "v1",
            )
            .unwrap();

        assert_eq!(session.user_id.as_deref(), Some("alice"));
        assert_eq!(turn.user_message.session_id, session.id);
        assert_eq!(turn.assistant_message.session_id, session.id);
        assert!(turn.debug_result.is_some());
        assert_eq!(store.session_messages(session.id).unwrap().len(), 2);
        assert!(store.session_messages(placeholder).unwrap().is_empty());
    }

    #[test]
    fn test_record_turn_in_new_session_leaves_nothing_on_failure() {
        let mut store = store();

        let too_long_role = NewMessage::new(RecordId::from(Uuid::new_v4()), "r".repeat(21));
        let err = store
            .record_turn_in_new_session(None, too_long_role, "{}", "m", "v1")
            .unwrap_err();

        assert_eq!(err.constraint_kind(), Some(ConstraintKind::Check));
        assert!(store.list_sessions(DEFAULT_SESSION_LIMIT).unwrap().is_empty());
    }

    #[test]
    fn test_list_sessions_zero_limit() {
        let mut store = store();
        store.create_session(None).unwrap();

        assert!(store.list_sessions(0).unwrap().is_empty());
        assert_eq!(store.list_sessions(u32::MAX).unwrap().len(), 1);
    }
}
