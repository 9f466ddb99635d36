use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::db::PgStore;
use crate::users::repo_types::{AccountStatus, AnswerHit, AnswerSubmission, NewUser, User};

const USER_COLUMNS: &str = "id, full_name, email, password_hash, avatar, refresh_token, status, created_at, updated_at";

/// Persistent user records: credentials, account status, the single live
/// refresh token and the answer history.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Insert a new unverified user. `None` when the email is already taken.
    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>>;

    /// Move the account out of `Unverified`. `false` when the id is unknown.
    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<bool>;

    /// Overwrite the stored refresh token. `false` when the id is unknown.
    async fn set_refresh_token(&self, id: Uuid, token: &str) -> anyhow::Result<bool>;

    /// Replace `expected` with `next` in one conditional write. Succeeds only
    /// while `expected` is still the stored value and the account is verified.
    async fn swap_refresh_token(&self, id: Uuid, expected: &str, next: &str)
        -> anyhow::Result<bool>;

    async fn clear_refresh_token(&self, id: Uuid) -> anyhow::Result<()>;

    async fn update_profile(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>>;

    async fn update_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>>;

    /// Append to the answer history. `false` when the user is unknown.
    async fn push_answer(&self, user_id: Uuid, answer: &AnswerSubmission)
        -> anyhow::Result<bool>;

    /// The user's answers whose question text or selected answer contains
    /// `needle`, case-insensitively, oldest first.
    async fn search_answers(&self, user_id: Uuid, needle: &str) -> anyhow::Result<Vec<AnswerHit>>;

    async fn ping(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl UserRepo for PgStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, full_name, email, password_hash, status)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&new.full_name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(AccountStatus::Unverified)
        .fetch_optional(&self.pool)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET status = CASE WHEN status = 'unverified' THEN 'verified' ELSE status END,
                   updated_at = now()
             WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("mark user verified")?;
        Ok(res.rows_affected() == 1)
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("UPDATE users SET refresh_token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await
            .context("store refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET refresh_token = $3
             WHERE id = $1 AND refresh_token = $2 AND status = 'verified'
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .execute(&self.pool)
        .await
        .context("rotate refresh token")?;
        Ok(res.rows_affected() == 1)
    }

    async fn clear_refresh_token(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET refresh_token = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("clear refresh token")?;
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET full_name = $2, email = $3, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(full_name)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("update profile")?;
        Ok(user)
    }

    async fn update_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET avatar = $2, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(avatar)
        .fetch_optional(&self.pool)
        .await
        .context("update avatar")?;
        Ok(user)
    }

    async fn push_answer(
        &self,
        user_id: Uuid,
        answer: &AnswerSubmission,
    ) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO answer_submissions (id, user_id, question_id, selected_answer, submitted_at)
            SELECT $1, u.id, $3, $4, $5 FROM users u WHERE u.id = $2
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(answer.question)
        .bind(&answer.selected_answer)
        .bind(answer.submitted_at)
        .execute(&self.pool)
        .await
        .context("insert answer submission")?;
        Ok(res.rows_affected() == 1)
    }

    async fn search_answers(&self, user_id: Uuid, needle: &str) -> anyhow::Result<Vec<AnswerHit>> {
        let pattern = format!("%{}%", escape_like(needle));
        let rows = sqlx::query_as::<_, AnswerHit>(
            r#"
            SELECT q.question_text, q.options, q.correct_answer,
                   a.selected_answer, a.submitted_at
              FROM answer_submissions a
              JOIN questions q ON q.id = a.question_id
             WHERE a.user_id = $1
               AND (q.question_text ILIKE $2 OR a.selected_answer ILIKE $2)
             ORDER BY a.submitted_at ASC
            "#,
        )
        .bind(user_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .context("search answers")?;
        Ok(rows)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("ping database")?;
        Ok(())
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside ILIKE.
pub(crate) fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_like_quotes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }
}
