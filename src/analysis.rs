//! # Typed view over model output
//!
//! A model reply is expected to be a single JSON object with four keys:
//!
//! ```json
//! {
//!   "error_type": "NullPointerException",
//!   "root_cause": ["..."],
//!   "fix_suggestions": ["..."],
//!   "prevention": ["..."]
//! }
//! ```
//!
//! Models are sloppy about this, so parsing is lenient where it can be and
//! strict where it must be:
//!
//! - Markdown code fences around the object are stripped.
//! - Each list is normalized to `Vec<String>` ([`normalize_list`]).
//! - A missing key or invalid JSON is an [`AnalysisError`].
//!
//! Whatever happens, the caller keeps the raw text: [`Analysis::into_debug_result`]
//! takes it as a required argument and stores it next to the structured form.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tracing::warn;

use crate::models::{DebugResult, Document, NewDebugResult, RecordId};

/// The four keys a model reply must contain.
pub const REQUIRED_FIELDS: [&str; 4] = ["error_type", "root_cause", "fix_suggestions", "prevention"];

/// Keys tried, in order, when a list item is an object instead of a string.
const ITEM_TEXT_KEYS: [&str; 3] = ["cause", "suggestion", "advice"];

const LOG_SNIPPET_CHARS: usize = 800;

static OPENING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid regex"));
static CLOSING_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("model output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("model output is not a JSON object")]
    NotAnObject,

    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// Structured debugging analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub error_type: String,
    pub root_cause: Vec<String>,
    pub fix_suggestions: Vec<String>,
    pub prevention: Vec<String>,
}

impl Analysis {
    /// The document stored in `messages.assistant_json` for the reply.
    pub fn assistant_document(&self) -> Document {
        let mut object = Map::new();
        object.insert(
            "error_type".to_string(),
            JsonValue::String(self.error_type.clone()),
        );
        object.insert("root_cause".to_string(), strings(&self.root_cause));
        object.insert("fix_suggestions".to_string(), strings(&self.fix_suggestions));
        object.insert("prevention".to_string(), strings(&self.prevention));
        Document::new(JsonValue::Object(object))
    }

    /// Build the insert payload for `message_id`, keeping `raw_model_output`
    /// verbatim.
    pub fn into_debug_result(
        self,
        message_id: RecordId,
        raw_model_output: impl Into<String>,
        model_name: impl Into<String>,
        prompt_version: impl Into<String>,
    ) -> NewDebugResult {
        NewDebugResult {
            message_id,
            error_type: self.error_type,
            root_cause: Document::from_strings(self.root_cause),
            fix_suggestions: Document::from_strings(self.fix_suggestions),
            prevention: Document::from_strings(self.prevention),
            raw_model_output: raw_model_output.into(),
            model_name: model_name.into(),
            prompt_version: prompt_version.into(),
        }
    }
}

impl DebugResult {
    /// Read the stored documents back as an [`Analysis`].
    ///
    /// Documents written by other tools may not be plain string arrays; they are
    /// normalized the same way model output is.
    pub fn analysis(&self) -> Analysis {
        Analysis {
            error_type: self.error_type.clone(),
            root_cause: normalize_list(self.root_cause.as_value()),
            fix_suggestions: normalize_list(self.fix_suggestions.as_value()),
            prevention: normalize_list(self.prevention.as_value()),
        }
    }
}

fn strings(items: &[String]) -> JsonValue {
    JsonValue::Array(items.iter().cloned().map(JsonValue::String).collect())
}

/// Remove a surrounding Markdown code fence (```` ``` ```` or ```` ```json ````).
pub fn strip_code_fences(text: &str) -> String {
    let text = text.trim();
    let text = OPENING_FENCE.replace(text, "");
    let text = CLOSING_FENCE.replace(&text, "");
    text.trim().to_string()
}

/// Text of a scalar the way it reads to a person: strings unquoted, everything
/// else in JSON notation.
fn value_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Coerce a model-produced value into a list of strings.
///
/// - `null` becomes an empty list.
/// - A non-array becomes a one-element list.
/// - Array items that are objects contribute their `cause`, `suggestion` or
///   `advice` string when present, otherwise their JSON text.
pub fn normalize_list(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::Null => Vec::new(),
        JsonValue::Array(items) => items
            .iter()
            .map(|item| match item {
                JsonValue::Object(object) => ITEM_TEXT_KEYS
                    .iter()
                    .find_map(|key| object.get(*key).and_then(JsonValue::as_str))
                    .map(str::to_string)
                    .unwrap_or_else(|| item.to_string()),
                other => value_text(other),
            })
            .collect(),
        other => vec![value_text(other)],
    }
}

/// Parse a raw model reply into an [`Analysis`].
///
/// On failure a truncated copy of the raw text is logged; the caller still owns
/// the full text and should persist it regardless.
pub fn parse_model_output(raw: &str) -> Result<Analysis, AnalysisError> {
    let result = parse_stripped(&strip_code_fences(raw));
    if let Err(err) = &result {
        let snippet: String = raw.chars().take(LOG_SNIPPET_CHARS).collect();
        warn!(reason = %err, raw_snippet = %snippet, "Could not parse model output");
    }
    result
}

fn parse_stripped(text: &str) -> Result<Analysis, AnalysisError> {
    let value: JsonValue = serde_json::from_str(text)?;
    let object = value.as_object().ok_or(AnalysisError::NotAnObject)?;

    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(AnalysisError::MissingField(field));
        }
    }

    Ok(Analysis {
        error_type: value_text(&object["error_type"]),
        root_cause: normalize_list(&object["root_cause"]),
        fix_suggestions: normalize_list(&object["fix_suggestions"]),
        prevention: normalize_list(&object["prevention"]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    const REPLY: &str = r#"{
        "error_type": "NullPointerException",
        "root_cause": ["user is null when getName() is called"],
        "fix_suggestions": ["check for null before dereferencing", "initialize user"],
        "prevention": ["use Optional"]
    }"#;

    #[test]
    fn test_parse_plain_json() {
        let analysis = parse_model_output(REPLY).unwrap();
        assert_eq!(analysis.error_type, "NullPointerException");
        assert_eq!(analysis.root_cause.len(), 1);
        assert_eq!(analysis.fix_suggestions.len(), 2);
        assert_eq!(analysis.prevention, vec!["use Optional".to_string()]);
    }

    #[test]
    fn test_parse_fenced_json() {
        let fenced = format!("```JSON\n{REPLY}\n```");
        let analysis = parse_model_output(&fenced).unwrap();
        assert_eq!(analysis.error_type, "NullPointerException");

        let bare_fence = format!("  ```\n{REPLY}```  ");
        assert!(parse_model_output(&bare_fence).is_ok());
    }

    #[test]
    fn test_strip_code_fences_leaves_plain_text() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_missing_field() {
        let err = parse_model_output(r#"{"error_type": "E", "root_cause": []}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingField("fix_suggestions")));
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_model_output("I think the problem is a null pointer.").unwrap_err();
        assert!(matches!(err, AnalysisError::Json(_)));
    }

    #[test]
    fn test_not_an_object() {
        let err = parse_model_output("[1, 2]").unwrap_err();
        assert!(matches!(err, AnalysisError::NotAnObject));
    }

    #[test]
    fn test_normalize_list() {
        assert!(normalize_list(&JsonValue::Null).is_empty());
        assert_eq!(normalize_list(&json!("single")), vec!["single"]);
        assert_eq!(normalize_list(&json!(42)), vec!["42"]);
        assert_eq!(
            normalize_list(&json!([
                "plain",
                {"cause": "from cause"},
                {"advice": "from advice", "cause": 3},
                {"other": "x"},
                7,
                true
            ])),
            vec![
                "plain",
                "from cause",
                "from advice",
                r#"{"other":"x"}"#,
                "7",
                "true"
            ]
        );
    }

    #[test]
    fn test_non_string_error_type() {
        let analysis = parse_model_output(
            r#"{"error_type": 500, "root_cause": null, "fix_suggestions": [], "prevention": "be careful"}"#,
        )
        .unwrap();
        assert_eq!(analysis.error_type, "500");
        assert!(analysis.root_cause.is_empty());
        assert_eq!(analysis.prevention, vec!["be careful"]);
    }

    #[test]
    fn test_into_debug_result_keeps_raw_output() {
        let message_id = RecordId::from(Uuid::new_v4());
        let analysis = parse_model_output(REPLY).unwrap();
        let document = analysis.assistant_document();
        let new_result =
            analysis.into_debug_result(message_id, REPLY, "qwen2.5:7b-instruct", "v1");

        assert_eq!(new_result.message_id, message_id);
        assert_eq!(new_result.raw_model_output, REPLY);
        assert_eq!(new_result.model_name, "qwen2.5:7b-instruct");
        assert_eq!(new_result.prompt_version, "v1");
        assert_eq!(
            new_result.prevention.as_value(),
            &json!(["use Optional"])
        );
        assert_eq!(
            document.as_value()["error_type"],
            json!("NullPointerException")
        );
    }
}
