use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::storage::pg::PgPool;
use crate::storage::{Result, StorageError};

/// Code alphabet without 0/O/1/I, which read ambiguously in chat clients.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LEN: usize = 8;

#[derive(Clone, Debug, Serialize)]
pub struct StoredInvite {
    pub id: Uuid,
    pub focus_id: Uuid,
    pub code: String,
    pub created_by: i64,
    pub expires_at: DateTime<Utc>,
    pub max_uses: Option<i32>,
    pub use_count: i32,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl StoredInvite {
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        !self.revoked
            && self.expires_at > now
            && self.max_uses.map_or(true, |max| self.use_count < max)
    }
}

fn invite_from_row(row: &tokio_postgres::Row) -> StoredInvite {
    StoredInvite {
        id: row.get("id"),
        focus_id: row.get("focus_id"),
        code: row.get("code"),
        created_by: row.get("created_by"),
        expires_at: row.get("expires_at"),
        max_uses: row.get("max_uses"),
        use_count: row.get("use_count"),
        revoked: row.get("revoked"),
        created_at: row.get("created_at"),
    }
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNIQUE_VIOLATION)
}

/// Creates an invite with a fresh random code. A code collision is retried
/// once with a new code.
pub async fn insert_invite(
    pool: &PgPool,
    focus_id: &Uuid,
    created_by: i64,
    expires_at: DateTime<Utc>,
    max_uses: Option<i32>,
) -> Result<StoredInvite> {
    let client = pool.get().await?;

    for attempt in 0..2 {
        let id = Uuid::new_v4();
        let code = generate_code();

        let result = client
            .query_one(
                "INSERT INTO invites (id, focus_id, code, created_by, expires_at, max_uses)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING id, focus_id, code, created_by, expires_at, max_uses,
                           use_count, revoked, created_at",
                &[&id, focus_id, &code, &created_by, &expires_at, &max_uses],
            )
            .await;

        match result {
            Ok(row) => return Ok(invite_from_row(&row)),
            Err(err) if is_unique_violation(&err) && attempt == 0 => continue,
            Err(err) => return Err(err.into()),
        }
    }

    Err(StorageError::Database(
        "invite code collision after retry".to_string(),
    ))
}

pub async fn get_invite(pool: &PgPool, id: &Uuid) -> Result<StoredInvite> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, focus_id, code, created_by, expires_at, max_uses,
                    use_count, revoked, created_at
             FROM invites WHERE id = $1",
            &[id],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("invite {}", id)))?;

    Ok(invite_from_row(&row))
}

pub async fn get_invite_by_code(pool: &PgPool, code: &str) -> Result<StoredInvite> {
    let client = pool.get().await?;

    let row = client
        .query_opt(
            "SELECT id, focus_id, code, created_by, expires_at, max_uses,
                    use_count, revoked, created_at
             FROM invites WHERE code = $1",
            &[&code],
        )
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("invite code {}", code)))?;

    Ok(invite_from_row(&row))
}

pub async fn list_invites(pool: &PgPool, focus_id: &Uuid) -> Result<Vec<StoredInvite>> {
    let client = pool.get().await?;

    let rows = client
        .query(
            "SELECT id, focus_id, code, created_by, expires_at, max_uses,
                    use_count, revoked, created_at
             FROM invites WHERE focus_id = $1
             ORDER BY created_at DESC",
            &[focus_id],
        )
        .await?;

    Ok(rows.iter().map(invite_from_row).collect())
}

pub async fn revoke_invite(pool: &PgPool, id: &Uuid) -> Result<bool> {
    let client = pool.get().await?;
    let rows_affected = client
        .execute("UPDATE invites SET revoked = TRUE WHERE id = $1", &[id])
        .await?;
    Ok(rows_affected > 0)
}

/// Consumes one use of the invite and adds the user as a member, atomically.
/// The use count is only incremented while the invite is still valid, so a
/// concurrent redeem that exhausts the invite makes this return false.
pub async fn redeem_invite(pool: &PgPool, invite_id: &Uuid, user_id: i64) -> Result<bool> {
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let claimed = tx
        .execute(
            "UPDATE invites SET use_count = use_count + 1
             WHERE id = $1
               AND revoked = FALSE
               AND expires_at > NOW()
               AND (max_uses IS NULL OR use_count < max_uses)",
            &[invite_id],
        )
        .await?;

    if claimed == 0 {
        return Ok(false);
    }

    tx.execute(
        "INSERT INTO focus_members (focus_id, user_id, role)
         SELECT focus_id, $2, 'member' FROM invites WHERE id = $1
         ON CONFLICT (focus_id, user_id) DO NOTHING",
        &[invite_id, &user_id],
    )
    .await?;

    tx.commit().await?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_invite() -> StoredInvite {
        StoredInvite {
            id: Uuid::new_v4(),
            focus_id: Uuid::new_v4(),
            code: "ABCD2345".to_string(),
            created_by: 1,
            expires_at: Utc::now() + Duration::hours(24),
            max_uses: None,
            use_count: 0,
            revoked: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_generate_code_shape() {
        let code = generate_code();
        assert_eq!(code.len(), CODE_LEN);
        assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_generate_code_avoids_ambiguous_chars() {
        for _ in 0..50 {
            let code = generate_code();
            assert!(!code.contains('0'));
            assert!(!code.contains('O'));
            assert!(!code.contains('1'));
            assert!(!code.contains('I'));
        }
    }

    #[test]
    fn test_redeemable_fresh_invite() {
        let invite = sample_invite();
        assert!(invite.is_redeemable(Utc::now()));
    }

    #[test]
    fn test_not_redeemable_when_expired() {
        let mut invite = sample_invite();
        invite.expires_at = Utc::now() - Duration::minutes(1);
        assert!(!invite.is_redeemable(Utc::now()));
    }

    #[test]
    fn test_not_redeemable_when_revoked() {
        let mut invite = sample_invite();
        invite.revoked = true;
        assert!(!invite.is_redeemable(Utc::now()));
    }

    #[test]
    fn test_not_redeemable_when_exhausted() {
        let mut invite = sample_invite();
        invite.max_uses = Some(3);
        invite.use_count = 3;
        assert!(!invite.is_redeemable(Utc::now()));

        invite.use_count = 2;
        assert!(invite.is_redeemable(Utc::now()));
    }
}
