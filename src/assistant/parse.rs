//! Tolerant parsing of the assistant's reply.
//!
//! Models mostly follow the JSON contract from the system prompt, but not
//! always: replies arrive fenced, wrapped in prose, or as plain text. The
//! parser peels those layers off and falls back to treating the whole
//! reply as text when no usable JSON is found.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::tasks::{TaskPriority, TASK_DESCRIPTION_MAX, TASK_TITLE_MAX};

/// Cap on task suggestions taken from a single reply.
pub const MAX_SUGGESTIONS: usize = 10;

/// A task the assistant proposes. Nothing is created until the client
/// posts it through the normal task endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_at: Option<DateTime<Utc>>,
}

/// The assistant's answer after parsing.
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub reply: String,
    pub suggested_tasks: Vec<SuggestedTask>,
}

#[derive(Debug, Deserialize)]
struct RawReply {
    reply: Option<String>,
    #[serde(default)]
    suggested_tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    title: Option<String>,
    description: Option<String>,
    priority: Option<String>,
    due_at: Option<String>,
}

/// Parse the model's reply into text plus sanitized suggestions.
pub fn parse_reply(content: &str) -> AssistantReply {
    let stripped = strip_code_fences(content);
    let candidate = extract_json(stripped).unwrap_or_else(|| stripped.to_string());

    match serde_json::from_str::<RawReply>(&candidate) {
        Ok(raw) => {
            let reply = raw
                .reply
                .map(|r| r.trim().to_string())
                .unwrap_or_default();
            let suggested_tasks = sanitize_tasks(raw.suggested_tasks);
            if reply.is_empty() && suggested_tasks.is_empty() {
                return fallback(content);
            }
            AssistantReply {
                reply,
                suggested_tasks,
            }
        }
        Err(_) => fallback(content),
    }
}

fn fallback(content: &str) -> AssistantReply {
    AssistantReply {
        reply: content.trim().to_string(),
        suggested_tasks: Vec::new(),
    }
}

fn sanitize_tasks(raw: Vec<RawTask>) -> Vec<SuggestedTask> {
    raw.into_iter()
        .filter_map(sanitize_task)
        .take(MAX_SUGGESTIONS)
        .collect()
}

fn sanitize_task(raw: RawTask) -> Option<SuggestedTask> {
    let title = raw.title?.trim().to_string();
    if title.is_empty() {
        return None;
    }
    let title: String = title.chars().take(TASK_TITLE_MAX).collect();

    let description = raw
        .description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .map(|d| d.chars().take(TASK_DESCRIPTION_MAX).collect::<String>());

    let priority = raw
        .priority
        .map(|p| p.to_lowercase())
        .as_deref()
        .and_then(TaskPriority::parse)
        .unwrap_or(TaskPriority::Medium);

    let due_at = raw.due_at.as_deref().and_then(parse_due_at);

    Some(SuggestedTask {
        title,
        description,
        priority,
        due_at,
    })
}

/// Accepts RFC 3339 timestamps or bare dates. A bare date lands at the
/// end of that day, UTC.
fn parse_due_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let dt = date.and_hms_opt(23, 59, 59)?;
    Some(Utc.from_utc_datetime(&dt))
}

fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Return the first balanced top-level JSON object in the input.
fn extract_json(input: &str) -> Option<String> {
    let mut depth = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escape = false;

    for (byte_pos, c) in input.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match c {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                if depth == 0 {
                    start = Some(byte_pos);
                }
                depth += 1;
            }
            '}' if !in_string && depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        let end = byte_pos + c.len_utf8();
                        return Some(input[s..end].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_structured_reply() {
        let content = json!({
            "reply": "Start with the permit.",
            "suggested_tasks": [
                {"title": "Apply for vendor permit", "priority": "high", "due_at": "2025-04-01"},
                {"title": "Price espresso machines", "description": "Compare lever vs pump"}
            ]
        })
        .to_string();

        let parsed = parse_reply(&content);
        assert_eq!(parsed.reply, "Start with the permit.");
        assert_eq!(parsed.suggested_tasks.len(), 2);
        assert_eq!(parsed.suggested_tasks[0].title, "Apply for vendor permit");
        assert_eq!(parsed.suggested_tasks[0].priority, TaskPriority::High);
        assert!(parsed.suggested_tasks[0].due_at.is_some());
        assert_eq!(
            parsed.suggested_tasks[1].description.as_deref(),
            Some("Compare lever vs pump")
        );
        assert_eq!(parsed.suggested_tasks[1].priority, TaskPriority::Medium);
    }

    #[test]
    fn test_parse_fenced_reply() {
        let content = "```json\n{\"reply\": \"ok\", \"suggested_tasks\": []}\n```";
        let parsed = parse_reply(content);
        assert_eq!(parsed.reply, "ok");
        assert!(parsed.suggested_tasks.is_empty());
    }

    #[test]
    fn test_parse_reply_with_surrounding_prose() {
        let content = "Sure, here you go: {\"reply\": \"three steps\"} hope that helps!";
        let parsed = parse_reply(content);
        assert_eq!(parsed.reply, "three steps");
    }

    #[test]
    fn test_plain_text_falls_back() {
        let content = "I could not produce a plan this time.";
        let parsed = parse_reply(content);
        assert_eq!(parsed.reply, content);
        assert!(parsed.suggested_tasks.is_empty());
    }

    #[test]
    fn test_unrelated_json_falls_back() {
        let content = r#"{"command": "ls", "done": true}"#;
        let parsed = parse_reply(content);
        assert_eq!(parsed.reply, content);
        assert!(parsed.suggested_tasks.is_empty());
    }

    #[test]
    fn test_blank_titles_dropped() {
        let content = json!({
            "reply": "two ideas",
            "suggested_tasks": [
                {"title": "  "},
                {"title": "Real task"},
                {"description": "no title at all"}
            ]
        })
        .to_string();

        let parsed = parse_reply(&content);
        assert_eq!(parsed.suggested_tasks.len(), 1);
        assert_eq!(parsed.suggested_tasks[0].title, "Real task");
    }

    #[test]
    fn test_unknown_priority_defaults_to_medium() {
        let content = json!({
            "reply": "r",
            "suggested_tasks": [{"title": "t", "priority": "URGENT!!!"}]
        })
        .to_string();

        let parsed = parse_reply(&content);
        assert_eq!(parsed.suggested_tasks[0].priority, TaskPriority::Medium);
    }

    #[test]
    fn test_uppercase_priority_accepted() {
        let content = json!({
            "reply": "r",
            "suggested_tasks": [{"title": "t", "priority": "High"}]
        })
        .to_string();

        let parsed = parse_reply(&content);
        assert_eq!(parsed.suggested_tasks[0].priority, TaskPriority::High);
    }

    #[test]
    fn test_due_at_formats() {
        assert_eq!(
            parse_due_at("2025-06-30T10:00:00Z"),
            Some(Utc.with_ymd_and_hms(2025, 6, 30, 10, 0, 0).unwrap())
        );
        assert_eq!(
            parse_due_at("2025-06-30"),
            Some(Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap())
        );
        assert_eq!(parse_due_at("next tuesday"), None);
    }

    #[test]
    fn test_suggestions_capped() {
        let tasks: Vec<_> = (0..15).map(|i| json!({"title": format!("task {}", i)})).collect();
        let content = json!({"reply": "many", "suggested_tasks": tasks}).to_string();

        let parsed = parse_reply(&content);
        assert_eq!(parsed.suggested_tasks.len(), MAX_SUGGESTIONS);
    }

    #[test]
    fn test_long_title_truncated() {
        let content = json!({
            "reply": "r",
            "suggested_tasks": [{"title": "x".repeat(400)}]
        })
        .to_string();

        let parsed = parse_reply(&content);
        assert_eq!(parsed.suggested_tasks[0].title.chars().count(), TASK_TITLE_MAX);
    }

    #[test]
    fn test_extract_json_ignores_braces_in_strings() {
        let input = r#"note {"reply": "use { and } carefully"} end"#;
        let extracted = extract_json(input).unwrap();
        assert_eq!(extracted, r#"{"reply": "use { and } carefully"}"#);
    }
}
