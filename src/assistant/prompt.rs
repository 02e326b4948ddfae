//! Prompt assembly for the assistant.

use chrono::{DateTime, Utc};

use crate::assistant::client::ChatMessage;
use crate::storage::assistant::StoredMessage;
use crate::storage::focuses::StoredFocus;
use crate::storage::tasks::StoredTask;

/// How many open tasks are replayed into the context block.
pub const CONTEXT_TASK_LIMIT: i64 = 30;

/// How much of the focus description makes it into the context.
const DESCRIPTION_CONTEXT_CHARS: usize = 1000;

const SYSTEM_PROMPT: &str = r#"You are a planning assistant inside a task management app. You help the user break their project down into concrete, actionable tasks.

RESPONSE FORMAT (JSON only):
{"reply": "your answer to the user", "suggested_tasks": [{"title": "short task title", "description": "optional details", "priority": "low|medium|high", "due_at": "YYYY-MM-DD"}]}

RULES:
- "reply" is always present and written for the user
- "suggested_tasks" may be empty; include it only when proposing new tasks
- Do not suggest tasks that already exist in the project
- "description", "priority" and "due_at" are optional per task
- Respond with valid JSON only, no other text"#;

/// Assemble the full conversation for one assistant turn.
pub fn build_messages(
    focus: &StoredFocus,
    open_tasks: &[StoredTask],
    history: &[StoredMessage],
    user_text: &str,
    now: DateTime<Utc>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 3);
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    messages.push(ChatMessage::system(context_block(focus, open_tasks, now)));

    for msg in history {
        messages.push(ChatMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        });
    }

    messages.push(ChatMessage::user(user_text));
    messages
}

/// The project snapshot the model plans against.
fn context_block(focus: &StoredFocus, open_tasks: &[StoredTask], now: DateTime<Utc>) -> String {
    let mut block = format!(
        "Today is {}.\n\nPROJECT: {}",
        now.format("%Y-%m-%d"),
        focus.title
    );

    if let Some(description) = &focus.description {
        let description = truncate_chars(description, DESCRIPTION_CONTEXT_CHARS);
        block.push_str(&format!("\nDESCRIPTION: {}", description));
    }

    if open_tasks.is_empty() {
        block.push_str("\n\nOPEN TASKS: none");
    } else {
        block.push_str("\n\nOPEN TASKS:");
        for task in open_tasks {
            block.push_str(&format!(
                "\n- {} ({}, priority: {}",
                task.title,
                task.status.as_str(),
                task.priority.as_str()
            ));
            if let Some(due_at) = task.due_at {
                block.push_str(&format!(", due: {}", due_at.format("%Y-%m-%d")));
            }
            block.push(')');
        }
    }

    block
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tasks::{TaskPriority, TaskStatus};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn sample_focus() -> StoredFocus {
        StoredFocus {
            id: Uuid::new_v4(),
            owner_id: 1,
            title: "Coffee cart launch".to_string(),
            description: Some("Street coffee cart in the old town".to_string()),
            archived: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_task(title: &str, due_at: Option<DateTime<Utc>>) -> StoredTask {
        StoredTask {
            id: Uuid::new_v4(),
            focus_id: Uuid::new_v4(),
            created_by: 1,
            assignee_id: None,
            title: title.to_string(),
            description: None,
            priority: TaskPriority::High,
            status: TaskStatus::Todo,
            due_at,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_system_prompt_first_user_text_last() {
        let focus = sample_focus();
        let messages = build_messages(&focus, &[], &[], "where do I start?", Utc::now());

        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("JSON only"));
        let last = messages.last().unwrap();
        assert_eq!(last.role, "user");
        assert_eq!(last.content, "where do I start?");
    }

    #[test]
    fn test_context_contains_focus_and_tasks() {
        let focus = sample_focus();
        let due = Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap();
        let tasks = vec![
            sample_task("Get vendor permit", Some(due)),
            sample_task("Buy espresso machine", None),
        ];
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

        let block = context_block(&focus, &tasks, now);
        assert!(block.contains("Today is 2025-03-01"));
        assert!(block.contains("Coffee cart launch"));
        assert!(block.contains("Get vendor permit"));
        assert!(block.contains("due: 2025-03-14"));
        assert!(block.contains("todo, priority: high"));
        assert!(block.contains("Buy espresso machine"));
    }

    #[test]
    fn test_history_is_replayed_in_order() {
        use crate::storage::assistant::MessageRole;

        let focus = sample_focus();
        let history = vec![
            StoredMessage {
                id: Uuid::new_v4(),
                thread_id: Uuid::new_v4(),
                role: MessageRole::User,
                content: "first question".to_string(),
                metadata: None,
                created_at: Utc::now(),
            },
            StoredMessage {
                id: Uuid::new_v4(),
                thread_id: Uuid::new_v4(),
                role: MessageRole::Assistant,
                content: "first answer".to_string(),
                metadata: None,
                created_at: Utc::now(),
            },
        ];

        let messages = build_messages(&focus, &[], &history, "follow-up", Utc::now());

        // system prompt, context, two history entries, new user message
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2].role, "user");
        assert_eq!(messages[2].content, "first question");
        assert_eq!(messages[3].role, "assistant");
        assert_eq!(messages[3].content, "first answer");
    }

    #[test]
    fn test_long_description_is_truncated() {
        let mut focus = sample_focus();
        focus.description = Some("x".repeat(5000));

        let block = context_block(&focus, &[], Utc::now());
        assert!(block.len() < 2000);
        assert!(block.contains("..."));
    }
}
