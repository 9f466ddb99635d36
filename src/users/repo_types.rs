use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Where an account sits in its lifecycle. Only `Verified` accounts may log in
/// or refresh their session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Unverified,
    Verified,
    Banned,
}

impl AccountStatus {
    pub fn is_verified(self) -> bool {
        matches!(self, AccountStatus::Verified | AccountStatus::Banned)
    }

    /// Status after a successful email verification. Banned stays banned.
    pub fn after_verification(self) -> Self {
        match self {
            AccountStatus::Unverified => AccountStatus::Verified,
            other => other,
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub password_hash: String, // Argon2 PHC string
    pub avatar: String,
    pub refresh_token: Option<String>,
    pub status: AccountStatus,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
}

/// User as seen by the rest of the API: no password hash, no refresh token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub avatar: String,
    pub status: AccountStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for CurrentUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            full_name: u.full_name,
            email: u.email,
            avatar: u.avatar,
            status: u.status,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// One entry of a user's append-only answer history.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
    #[sqlx(rename = "question_id")]
    pub question: Uuid,
    pub selected_answer: String,
    pub submitted_at: i64, // unix seconds
}

/// An answer joined with the question it refers to.
#[derive(Debug, Clone, FromRow)]
pub struct AnswerHit {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub selected_answer: String,
    pub submitted_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_never_unbans() {
        assert_eq!(
            AccountStatus::Unverified.after_verification(),
            AccountStatus::Verified
        );
        assert_eq!(
            AccountStatus::Verified.after_verification(),
            AccountStatus::Verified
        );
        assert_eq!(AccountStatus::Banned.after_verification(), AccountStatus::Banned);
    }

    #[test]
    fn current_user_hides_secrets() {
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            avatar: String::new(),
            refresh_token: Some("rt".into()),
            status: AccountStatus::Verified,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&CurrentUser::from(user)).unwrap();
        assert!(json.contains("ada@example.com"));
        assert!(json.contains("\"status\":\"verified\""));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("\"rt\""));
    }
}
