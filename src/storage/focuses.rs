use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::storage::pg::PgPool;
use crate::storage::{Result, StorageError};

pub const FOCUS_TITLE_MAX: usize = 200;
pub const FOCUS_DESCRIPTION_MAX: usize = 4000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MemberRole::Owner),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct StoredFocus {
    pub id: Uuid,
    pub owner_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A focus as seen from one member's perspective.
#[derive(Clone, Debug, Serialize)]
pub struct FocusListEntry {
    #[serde(flatten)]
    pub focus: StoredFocus,
    pub role: MemberRole,
    pub open_tasks: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct FocusMemberEntry {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

fn focus_from_row(row: &tokio_postgres::Row) -> StoredFocus {
    StoredFocus {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        description: row.get("description"),
        archived: row.get("archived"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn role_from_row(row: &tokio_postgres::Row) -> Result<MemberRole> {
    let raw: String = row.get("role");
    MemberRole::parse(&raw)
        .ok_or_else(|| StorageError::InvalidData(format!("unknown member role {:?}", raw)))
}

/// Creates the focus and its owner membership row in one transaction.
pub async fn insert_focus(
    pool: &PgPool,
    owner_id: i64,
    title: &str,
    description: Option<&str>,
) -> Result<StoredFocus> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let id = Uuid::new_v4();
    let row = tx
        .query_one(
            "INSERT INTO focuses (id, owner_id, title, description)
             VALUES ($1, $2, $3, $4)
             RETURNING id, owner_id, title, description, archived, created_at, updated_at",
            &[&id, &owner_id, &title, &description],
        )
        .await?;

    tx.execute(
        "INSERT INTO focus_members (focus_id, user_id, role) VALUES ($1, $2, 'owner')",
        &[&id, &owner_id],
    )
    .await?;

    tx.commit().await?;

    Ok(focus_from_row(&row))
}

pub async fn get_focus(pool: &PgPool, id: &Uuid) -> Result<StoredFocus> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, owner_id, title, description, archived, created_at, updated_at
             FROM focuses WHERE id = $1",
            &[id],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("focus {}", id)))?;

    Ok(focus_from_row(&row))
}

/// All focuses the user belongs to, with their role and the number of
/// tasks not yet done.
pub async fn list_focuses_for_user(
    pool: &PgPool,
    user_id: i64,
    include_archived: bool,
) -> Result<Vec<FocusListEntry>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT f.id, f.owner_id, f.title, f.description, f.archived,
                    f.created_at, f.updated_at, m.role,
                    COUNT(t.id) FILTER (WHERE t.status <> 'done') AS open_tasks
             FROM focuses f
             JOIN focus_members m ON m.focus_id = f.id AND m.user_id = $1
             LEFT JOIN tasks t ON t.focus_id = f.id
             WHERE $2 OR f.archived = FALSE
             GROUP BY f.id, m.role
             ORDER BY f.created_at DESC",
            &[&user_id, &include_archived],
        )
        .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        entries.push(FocusListEntry {
            focus: focus_from_row(row),
            role: role_from_row(row)?,
            open_tasks: row.get("open_tasks"),
        });
    }

    Ok(entries)
}

pub async fn update_focus(
    pool: &PgPool,
    id: &Uuid,
    title: &str,
    description: Option<&str>,
    archived: bool,
) -> Result<StoredFocus> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "UPDATE focuses
             SET title = $2, description = $3, archived = $4, updated_at = NOW()
             WHERE id = $1
             RETURNING id, owner_id, title, description, archived, created_at, updated_at",
            &[id, &title, &description, &archived],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("focus {}", id)))?;

    Ok(focus_from_row(&row))
}

/// Deletes the focus; tasks, members, threads and invites cascade.
pub async fn delete_focus(pool: &PgPool, id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let rows_affected = client
        .execute("DELETE FROM focuses WHERE id = $1", &[id])
        .await?;
    Ok(rows_affected > 0)
}

/// The caller's role in a focus, or None when not a member.
pub async fn member_role(pool: &PgPool, focus_id: &Uuid, user_id: i64) -> Result<Option<MemberRole>> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT role FROM focus_members WHERE focus_id = $1 AND user_id = $2",
            &[focus_id, &user_id],
        )
        .await?;

    match row {
        Some(row) => Ok(Some(role_from_row(&row)?)),
        None => Ok(None),
    }
}

pub async fn list_members(pool: &PgPool, focus_id: &Uuid) -> Result<Vec<FocusMemberEntry>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT m.user_id, u.username, u.first_name, u.last_name, m.role, m.joined_at
             FROM focus_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.focus_id = $1
             ORDER BY m.joined_at ASC",
            &[focus_id],
        )
        .await?;

    let mut members = Vec::with_capacity(rows.len());
    for row in &rows {
        members.push(FocusMemberEntry {
            user_id: row.get("user_id"),
            username: row.get("username"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            role: role_from_row(row)?,
            joined_at: row.get("joined_at"),
        });
    }

    Ok(members)
}

pub async fn add_member(pool: &PgPool, focus_id: &Uuid, user_id: i64) -> Result<()> {
    let client = pool.get().await?;

    client
        .execute(
            "INSERT INTO focus_members (focus_id, user_id, role) VALUES ($1, $2, 'member')
             ON CONFLICT (focus_id, user_id) DO NOTHING",
            &[focus_id, &user_id],
        )
        .await?;

    Ok(())
}

/// Removes a member and unassigns them from any tasks in the focus.
pub async fn remove_member(pool: &PgPool, focus_id: &Uuid, user_id: i64) -> Result<bool> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let rows_affected = tx
        .execute(
            "DELETE FROM focus_members WHERE focus_id = $1 AND user_id = $2",
            &[focus_id, &user_id],
        )
        .await?;

    tx.execute(
        "UPDATE tasks SET assignee_id = NULL, updated_at = NOW()
         WHERE focus_id = $1 AND assignee_id = $2",
        &[focus_id, &user_id],
    )
    .await?;

    tx.commit().await?;

    Ok(rows_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_role_round_trip() {
        assert_eq!(MemberRole::parse("owner"), Some(MemberRole::Owner));
        assert_eq!(MemberRole::parse("member"), Some(MemberRole::Member));
        assert_eq!(MemberRole::parse("admin"), None);
        assert_eq!(MemberRole::Owner.as_str(), "owner");
        assert_eq!(MemberRole::Member.as_str(), "member");
    }
}
