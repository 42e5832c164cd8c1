//! # Pretty printing for sessions and conversations
//!
//! Terminal rendering used by the `copilot-db` CLI:
//!
//! - [`print_session_list`]: one line per session, most recent first.
//! - [`print_session_detail`]: the whole conversation. User turns show their
//!   error text and a syntax-highlighted code snippet; assistant turns show the
//!   debug result as three bulleted sections, or the raw reply when no result
//!   has been attached.
//!
//! Everything writes to any [`std::io::Write`], so output can be captured.
//! Colours use Crossterm; code blocks use Syntect with the
//! `base16-ocean.dark` theme and 24-bit escapes.

use crossterm::{
    QueueableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use std::error::Error;
use std::io::Write;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::{LinesWithEndings, as_24_bit_terminal_escaped};

use crate::models::{DebugResult, Message, Role, SessionDetail, SessionSummary};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Print one line per session.
pub fn print_session_list<W: Write>(
    summaries: &[SessionSummary],
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    if summaries.is_empty() {
        writeln!(out, "No sessions.")?;
        return Ok(());
    }

    for summary in summaries {
        let session = &summary.session;
        out.queue(SetForegroundColor(Color::Cyan))?;
        write!(out, "{}", session.id)?;
        out.queue(SetForegroundColor(Color::Reset))?;
        write!(
            out,
            "  updated {}  messages {}",
            session.updated_at.format(TIME_FORMAT),
            summary.message_count
        )?;
        if let Some(user_id) = &session.user_id {
            write!(out, "  user {user_id}")?;
        }
        writeln!(out)?;
    }

    out.flush()?;
    Ok(())
}

/// Print a conversation with its results.
pub fn print_session_detail<W: Write>(
    detail: &SessionDetail,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let ps = SyntaxSet::load_defaults_newlines();
    let ts = ThemeSet::load_defaults();
    let theme = &ts.themes["base16-ocean.dark"];

    heading(out, &format!("Session {}", detail.session.id), Color::Cyan)?;
    writeln!(
        out,
        "created {}  updated {}",
        detail.session.created_at.format(TIME_FORMAT),
        detail.session.updated_at.format(TIME_FORMAT)
    )?;
    writeln!(out)?;

    for (message, result) in &detail.messages {
        match message.role_kind() {
            Some(Role::User) => print_user_message(message, &ps, theme, out)?,
            Some(Role::Assistant) => print_assistant_message(message, result.as_ref(), out)?,
            _ => {
                heading(out, &format!("[{}]", message.role), Color::DarkGrey)?;
                if let Some(text) = &message.error_text {
                    writeln!(out, "{text}")?;
                }
            }
        }
        writeln!(out)?;
    }

    out.flush()?;
    Ok(())
}

fn heading<W: Write>(out: &mut W, text: &str, color: Color) -> Result<(), Box<dyn Error>> {
    out.queue(SetForegroundColor(color))?;
    out.queue(SetAttribute(Attribute::Bold))?;
    writeln!(out, "{text}")?;
    out.queue(SetAttribute(Attribute::Reset))?;
    out.queue(SetForegroundColor(Color::Reset))?;
    Ok(())
}

fn print_user_message<W: Write>(
    message: &Message,
    ps: &SyntaxSet,
    theme: &Theme,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    let label = match &message.language {
        Some(language) => format!("user ({language}) {}", message.created_at.format(TIME_FORMAT)),
        None => format!("user {}", message.created_at.format(TIME_FORMAT)),
    };
    heading(out, &label, Color::Green)?;

    if let Some(error_text) = &message.error_text {
        out.queue(SetForegroundColor(Color::Red))?;
        writeln!(out, "{error_text}")?;
        out.queue(SetForegroundColor(Color::Reset))?;
    }

    if let Some(code) = &message.code_snippet {
        let language = message.language.as_deref().unwrap_or("text");
        print_code_block(code, language, ps, theme, out)?;
    }

    Ok(())
}

fn print_assistant_message<W: Write>(
    message: &Message,
    result: Option<&DebugResult>,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    heading(
        out,
        &format!("assistant {}", message.created_at.format(TIME_FORMAT)),
        Color::Blue,
    )?;

    match result {
        Some(result) => {
            let analysis = result.analysis();
            out.queue(SetAttribute(Attribute::Bold))?;
            writeln!(out, "{}", analysis.error_type)?;
            out.queue(SetAttribute(Attribute::Reset))?;
            bullets(out, "Root cause", &analysis.root_cause)?;
            bullets(out, "Fix suggestions", &analysis.fix_suggestions)?;
            bullets(out, "Prevention", &analysis.prevention)?;

            out.queue(SetForegroundColor(Color::DarkGrey))?;
            writeln!(out, "{} / prompt {}", result.model_name, result.prompt_version)?;
            out.queue(SetForegroundColor(Color::Reset))?;
        }
        None => match &message.raw_model_output {
            Some(raw) => writeln!(out, "{raw}")?,
            None => {
                out.queue(SetAttribute(Attribute::Italic))?;
                writeln!(out, "(no reply yet)")?;
                out.queue(SetAttribute(Attribute::Reset))?;
            }
        },
    }

    Ok(())
}

fn bullets<W: Write>(out: &mut W, title: &str, items: &[String]) -> Result<(), Box<dyn Error>> {
    if items.is_empty() {
        return Ok(());
    }
    out.queue(SetForegroundColor(Color::Cyan))?;
    writeln!(out, "{title}")?;
    out.queue(SetForegroundColor(Color::Reset))?;
    for item in items {
        writeln!(out, "  - {item}")?;
    }
    Ok(())
}

/// Find a syntax by token, extension, or a common alias.
fn find_syntax<'a>(ps: &'a SyntaxSet, language: &str) -> &'a SyntaxReference {
    ps.find_syntax_by_token(language)
        .or_else(|| ps.find_syntax_by_extension(language))
        .or_else(|| match language.to_lowercase().as_str() {
            "py" | "python" => ps.find_syntax_by_extension("py"),
            "js" | "javascript" => ps.find_syntax_by_extension("js"),
            "ts" | "typescript" => ps.find_syntax_by_extension("ts"),
            "rs" | "rust" => ps.find_syntax_by_extension("rs"),
            "sh" | "bash" | "shell" => ps.find_syntax_by_extension("sh"),
            "java" => ps.find_syntax_by_extension("java"),
            "yml" => ps.find_syntax_by_extension("yaml"),
            _ => None,
        })
        .unwrap_or_else(|| ps.find_syntax_plain_text())
}

fn print_code_block<W: Write>(
    code: &str,
    language: &str,
    ps: &SyntaxSet,
    theme: &Theme,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    out.queue(SetForegroundColor(Color::DarkGrey))?;
    out.queue(SetAttribute(Attribute::Italic))?;
    writeln!(out, "[{language}]")?;
    out.queue(SetAttribute(Attribute::Reset))?;
    out.queue(SetForegroundColor(Color::Reset))?;

    let mut highlighter = HighlightLines::new(find_syntax(ps, language), theme);
    for line in LinesWithEndings::from(code) {
        let ranges: Vec<(Style, &str)> = highlighter.highlight_line(line, ps)?;
        write!(out, "{}", as_24_bit_terminal_escaped(&ranges[..], false))?;
        out.queue(SetAttribute(Attribute::Reset))?;
    }
    if !code.ends_with('\n') {
        writeln!(out)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, RecordId, Session};
    use chrono::Utc;
    use uuid::Uuid;

    fn session() -> Session {
        let now = Utc::now();
        Session {
            id: RecordId::from(Uuid::new_v4()),
            user_id: Some("alice".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn message(session: &Session, role: &str) -> Message {
        Message {
            id: RecordId::from(Uuid::new_v4()),
            session_id: session.id,
            role: role.to_string(),
            language: None,
            error_text: None,
            code_snippet: None,
            assistant_json: None,
            raw_model_output: None,
            created_at: Utc::now(),
        }
    }

    fn render_detail(detail: &SessionDetail) -> String {
        let mut out = Vec::new();
        print_session_detail(detail, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_print_empty_session_list() {
        let mut out = Vec::new();
        print_session_list(&[], &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "No sessions.\n");
    }

    #[test]
    fn test_print_session_list() {
        let summary = SessionSummary {
            session: session(),
            message_count: 3,
            last_message_at: None,
        };
        let mut out = Vec::new();
        print_session_list(std::slice::from_ref(&summary), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&summary.session.id.to_string()));
        assert!(text.contains("messages 3"));
        assert!(text.contains("user alice"));
    }

    #[test]
    fn test_print_conversation() {
        let session = session();
        let mut user = message(&session, "user");
        user.language = Some("java".to_string());
        user.error_text = Some("NullPointerException".to_string());
        user.code_snippet = Some("String s = null;\ns.length();".to_string());

        let assistant = message(&session, "assistant");
        let result = DebugResult {
            id: RecordId::from(Uuid::new_v4()),
            message_id: assistant.id,
            error_type: "NullPointerException".to_string(),
            root_cause: Document::from_strings(["s is null"]),
            fix_suggestions: Document::from_strings(["initialize s"]),
            prevention: Document::from_strings(["annotate with @NonNull"]),
            raw_model_output: "{}".to_string(),
            model_name: "qwen2.5:7b-instruct".to_string(),
            prompt_version: "v1".to_string(),
            created_at: Utc::now(),
        };

        let mut pending = message(&session, "assistant");
        pending.raw_model_output = Some("still thinking".to_string());

        let detail = SessionDetail {
            session,
            messages: vec![(user, None), (assistant, Some(result)), (pending, None)],
        };

        let text = render_detail(&detail);
        assert!(text.contains("NullPointerException"));
        assert!(text.contains("[java]"));
        assert!(text.contains("  - s is null"));
        assert!(text.contains("  - initialize s"));
        assert!(text.contains("qwen2.5:7b-instruct / prompt v1"));
        assert!(text.contains("still thinking"));
    }

    #[test]
    fn test_print_unknown_role_and_language() {
        let session = session();
        let mut tool = message(&session, "tool");
        tool.error_text = Some("exit code 1".to_string());
        let mut user = message(&session, "user");
        user.language = Some("unknownlang".to_string());
        user.code_snippet = Some("some code here".to_string());

        let detail = SessionDetail {
            session,
            messages: vec![(tool, None), (user, None)],
        };

        let text = render_detail(&detail);
        assert!(text.contains("[tool]"));
        assert!(text.contains("exit code 1"));
        assert!(text.contains("[unknownlang]"));
    }
}
