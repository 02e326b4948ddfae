//! API route handlers.
//!
//! Each submodule handles a specific group of endpoints:
//! - `account`: the caller's profile and notification history
//! - `focuses`: focus CRUD and membership
//! - `tasks`: tasks, subtasks, comments
//! - `assistant`: assistant threads and messages
//! - `invites`: invite codes and acceptance

use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::error::ApiError;
use crate::storage;
use crate::storage::focuses::{MemberRole, StoredFocus};
use crate::storage::pg::PgPool;
use crate::storage::tasks::StoredTask;

pub mod account;
pub mod assistant;
pub mod focuses;
pub mod invites;
pub mod tasks;

/// Load a focus and the caller's role in it. Unknown id is 404, known but
/// not a member is 403.
pub(crate) async fn focus_for_member(
    pool: &PgPool,
    focus_id: Uuid,
    user_id: i64,
) -> Result<(StoredFocus, MemberRole), ApiError> {
    let focus = storage::focuses::get_focus(pool, &focus_id).await?;
    let role = storage::focuses::member_role(pool, &focus_id, user_id)
        .await?
        .ok_or_else(|| ApiError::Forbidden("not a member of this focus".to_string()))?;
    Ok((focus, role))
}

/// Load a task and the caller's role in its focus.
pub(crate) async fn task_for_member(
    pool: &PgPool,
    task_id: Uuid,
    user_id: i64,
) -> Result<(StoredTask, MemberRole), ApiError> {
    let task = storage::tasks::get_task(pool, &task_id).await?;
    let role = storage::focuses::member_role(pool, &task.focus_id, user_id)
        .await?
        .ok_or_else(|| ApiError::Forbidden("not a member of this focus".to_string()))?;
    Ok((task, role))
}

/// Trim and bound a required text field.
pub(crate) fn require_text(field: &str, value: &str, max: usize) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation(format!("{} must not be empty", field)));
    }
    if value.chars().count() > max {
        return Err(ApiError::Validation(format!(
            "{} exceeds {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

/// Trim and bound an optional text field. Blank input clears the field.
pub(crate) fn optional_text(
    field: &str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, ApiError> {
    match value {
        Some(value) => {
            let value = value.trim().to_string();
            if value.is_empty() {
                return Ok(None);
            }
            if value.chars().count() > max {
                return Err(ApiError::Validation(format!(
                    "{} exceeds {} characters",
                    field, max
                )));
            }
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// For PATCH bodies: an absent field means "leave alone", an explicit null
/// means "clear". Use with `#[serde(default, deserialize_with = "double_option")]`.
pub(crate) fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_trims_and_bounds() {
        assert_eq!(require_text("title", "  hello  ", 10).unwrap(), "hello");
        assert!(require_text("title", "   ", 10).is_err());
        assert!(require_text("title", "elevenchars", 10).is_err());
    }

    #[test]
    fn test_optional_text_blank_clears() {
        assert_eq!(optional_text("d", Some("  ".to_string()), 10).unwrap(), None);
        assert_eq!(
            optional_text("d", Some(" x ".to_string()), 10).unwrap(),
            Some("x".to_string())
        );
        assert_eq!(optional_text("d", None, 10).unwrap(), None);
    }

    #[test]
    fn test_double_option_distinguishes_null_from_absent() {
        #[derive(Deserialize)]
        struct Patch {
            #[serde(default, deserialize_with = "double_option")]
            due_at: Option<Option<i64>>,
        }

        let absent: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.due_at, None);

        let null: Patch = serde_json::from_str(r#"{"due_at": null}"#).unwrap();
        assert_eq!(null.due_at, Some(None));

        let set: Patch = serde_json::from_str(r#"{"due_at": 5}"#).unwrap();
        assert_eq!(set.due_at, Some(Some(5)));
    }
}
