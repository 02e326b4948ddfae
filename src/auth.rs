//! Telegram Mini App Authentication
//!
//! Verifies the signed `initData` query string a Mini App receives from
//! Telegram and extracts the authenticated user from it. The chain is the
//! one the Bot API documents: the bot token is keyed with "WebAppData" to
//! derive a secret, and that secret signs the sorted key=value lines of
//! every field except `hash`.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Default freshness window for `auth_date` (24 hours).
pub const DEFAULT_INIT_DATA_MAX_AGE_SECS: i64 = 24 * 60 * 60;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,
    #[error("malformed init data: {0}")]
    Malformed(String),
    #[error("init data hash mismatch")]
    InvalidHash,
    #[error("init data expired")]
    Expired,
    #[error("init data has no user field")]
    MissingUser,
}

// ============================================================================
// TELEGRAM USER
// ============================================================================

/// The `user` payload inside initData.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub language_code: Option<String>,
}

// ============================================================================
// VERIFICATION
// ============================================================================

/// Verify an initData string against the bot token and return the user it
/// authenticates.
pub fn verify_init_data(
    init_data: &str,
    bot_token: &str,
    max_age_secs: i64,
) -> Result<TelegramUser, AuthError> {
    verify_init_data_at(init_data, bot_token, max_age_secs, chrono::Utc::now().timestamp())
}

/// Same as [`verify_init_data`] with an explicit clock, so the freshness
/// window can be tested.
pub fn verify_init_data_at(
    init_data: &str,
    bot_token: &str,
    max_age_secs: i64,
    now: i64,
) -> Result<TelegramUser, AuthError> {
    let mut pairs = parse_pairs(init_data)?;

    let hash_idx = pairs
        .iter()
        .position(|(key, _)| key == "hash")
        .ok_or_else(|| AuthError::Malformed("no hash field".to_string()))?;
    let (_, provided_hash) = pairs.remove(hash_idx);

    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let data_check_string = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n");

    verify_hash(&data_check_string, bot_token, &provided_hash)?;

    let auth_date: i64 = pairs
        .iter()
        .find(|(key, _)| key == "auth_date")
        .and_then(|(_, value)| value.parse().ok())
        .ok_or_else(|| AuthError::Malformed("missing or invalid auth_date".to_string()))?;

    if !is_auth_date_fresh(auth_date, now, max_age_secs) {
        return Err(AuthError::Expired);
    }

    let user_json = pairs
        .iter()
        .find(|(key, _)| key == "user")
        .map(|(_, value)| value.as_str())
        .ok_or(AuthError::MissingUser)?;

    serde_json::from_str(user_json)
        .map_err(|e| AuthError::Malformed(format!("invalid user payload: {}", e)))
}

/// Check that auth_date is within the acceptable window around now.
pub fn is_auth_date_fresh(auth_date: i64, now: i64, max_age_secs: i64) -> bool {
    (now - auth_date).abs() < max_age_secs
}

fn verify_hash(
    data_check_string: &str,
    bot_token: &str,
    provided_hash: &str,
) -> Result<(), AuthError> {
    let provided = hex::decode(provided_hash).map_err(|_| AuthError::InvalidHash)?;

    let mut secret = HmacSha256::new_from_slice(b"WebAppData")
        .map_err(|_| AuthError::Malformed("hmac init failed".to_string()))?;
    secret.update(bot_token.as_bytes());
    let secret_key = secret.finalize().into_bytes();

    let mut mac = HmacSha256::new_from_slice(&secret_key)
        .map_err(|_| AuthError::Malformed("hmac init failed".to_string()))?;
    mac.update(data_check_string.as_bytes());

    mac.verify_slice(&provided).map_err(|_| AuthError::InvalidHash)
}

fn parse_pairs(init_data: &str) -> Result<Vec<(String, String)>, AuthError> {
    let mut pairs = Vec::new();
    for part in init_data.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| AuthError::Malformed(format!("field without value: {}", part)))?;
        let key = urlencoding::decode(key)
            .map_err(|_| AuthError::Malformed("invalid percent encoding".to_string()))?;
        let value = urlencoding::decode(value)
            .map_err(|_| AuthError::Malformed("invalid percent encoding".to_string()))?;
        pairs.push((key.into_owned(), value.into_owned()));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOT_TOKEN: &str = "7000000001:AAtestBotTokenForSigningInitData";
    const USER_JSON: &str =
        r#"{"id":99281932,"first_name":"Dana","last_name":"Reyes","username":"dana_r","language_code":"en"}"#;

    /// Builds a signed initData string the way Telegram does, with values
    /// percent-encoded in the query string and decoded in the check string.
    fn sign_init_data(fields: &[(&str, &str)], bot_token: &str) -> String {
        let mut sorted: Vec<(&str, &str)> = fields.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let data_check_string = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        let mut secret = HmacSha256::new_from_slice(b"WebAppData").unwrap();
        secret.update(bot_token.as_bytes());
        let secret_key = secret.finalize().into_bytes();

        let mut mac = HmacSha256::new_from_slice(&secret_key).unwrap();
        mac.update(data_check_string.as_bytes());
        let hash = hex::encode(mac.finalize().into_bytes());

        let mut query: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect();
        query.push(format!("hash={}", hash));
        query.join("&")
    }

    fn sign_fresh(auth_date: i64) -> String {
        let auth_date = auth_date.to_string();
        let fields = vec![
            ("auth_date", auth_date.as_str()),
            ("query_id", "AAHcGwAQAAAAANwbABCXzb0p"),
            ("user", USER_JSON),
        ];
        sign_init_data(&fields, BOT_TOKEN)
    }

    #[test]
    fn test_valid_init_data() {
        let now = chrono::Utc::now().timestamp();
        let init_data = sign_fresh(now - 60);

        let user = verify_init_data_at(&init_data, BOT_TOKEN, 86400, now).unwrap();
        assert_eq!(user.id, 99281932);
        assert_eq!(user.first_name, "Dana");
        assert_eq!(user.username.as_deref(), Some("dana_r"));
        assert_eq!(user.language_code.as_deref(), Some("en"));
    }

    #[test]
    fn test_tampered_hash_rejected() {
        let now = chrono::Utc::now().timestamp();
        let init_data = sign_fresh(now);

        // Flip the last hex digit of the hash
        let mut tampered = init_data.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });

        assert_eq!(
            verify_init_data_at(&tampered, BOT_TOKEN, 86400, now),
            Err(AuthError::InvalidHash)
        );
    }

    #[test]
    fn test_tampered_user_rejected() {
        let now = chrono::Utc::now().timestamp();
        let init_data = sign_fresh(now);
        let tampered = init_data.replace("99281932", "11111111");

        assert_eq!(
            verify_init_data_at(&tampered, BOT_TOKEN, 86400, now),
            Err(AuthError::InvalidHash)
        );
    }

    #[test]
    fn test_wrong_bot_token_rejected() {
        let now = chrono::Utc::now().timestamp();
        let init_data = sign_fresh(now);

        assert_eq!(
            verify_init_data_at(&init_data, "7000000002:AAdifferentToken", 86400, now),
            Err(AuthError::InvalidHash)
        );
    }

    #[test]
    fn test_stale_auth_date_rejected() {
        let now = chrono::Utc::now().timestamp();
        let init_data = sign_fresh(now - 100_000);

        assert_eq!(
            verify_init_data_at(&init_data, BOT_TOKEN, 86400, now),
            Err(AuthError::Expired)
        );
    }

    #[test]
    fn test_missing_user_rejected() {
        let now = chrono::Utc::now().timestamp();
        let auth_date = now.to_string();
        let fields = vec![("auth_date", auth_date.as_str()), ("query_id", "AAH123")];
        let init_data = sign_init_data(&fields, BOT_TOKEN);

        assert_eq!(
            verify_init_data_at(&init_data, BOT_TOKEN, 86400, now),
            Err(AuthError::MissingUser)
        );
    }

    #[test]
    fn test_missing_hash_rejected() {
        let result = verify_init_data_at("auth_date=123&user=%7B%7D", BOT_TOKEN, 86400, 123);
        assert!(matches!(result, Err(AuthError::Malformed(_))));
    }

    #[test]
    fn test_auth_date_freshness_window() {
        let now = chrono::Utc::now().timestamp();

        assert!(is_auth_date_fresh(now, now, 86400));
        assert!(is_auth_date_fresh(now - 3600, now, 86400));
        assert!(!is_auth_date_fresh(now - 90_000, now, 86400));
        assert!(!is_auth_date_fresh(now + 90_000, now, 86400));
    }

    #[test]
    fn test_user_without_optional_fields() {
        let now = chrono::Utc::now().timestamp();
        let auth_date = now.to_string();
        let fields = vec![
            ("auth_date", auth_date.as_str()),
            ("user", r#"{"id":5,"first_name":"Ana"}"#),
        ];
        let init_data = sign_init_data(&fields, BOT_TOKEN);

        let user = verify_init_data_at(&init_data, BOT_TOKEN, 86400, now).unwrap();
        assert_eq!(user.id, 5);
        assert!(user.last_name.is_none());
        assert!(user.username.is_none());
    }
}
