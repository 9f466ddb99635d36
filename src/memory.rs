//! In-process implementation of the repository traits. Backs
//! `AppState::fake()` so the whole router can run without Postgres.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::categories::repo::{Category, CategoryCount, CategoryRepo};
use crate::questions::repo::{group_by_category, QuestionRepo};
use crate::questions::repo_types::{CategoryWithQuestions, NewQuestion, Question};
use crate::users::repo::UserRepo;
use crate::users::repo_types::{AccountStatus, AnswerHit, AnswerSubmission, NewUser, User};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    categories: Vec<Category>,
    questions: Vec<Question>,
    answers: Vec<(Uuid, AnswerSubmission)>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    offline: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ping` fail, as if the database went away.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Force an account status; operators ban users out of band.
    pub async fn set_status(&self, id: Uuid, status: AccountStatus) -> bool {
        let mut t = self.tables.lock().await;
        match t.users.iter_mut().find(|u| u.id == id) {
            Some(u) => {
                u.status = status;
                true
            }
            None => false,
        }
    }

    pub async fn category_count(&self) -> usize {
        self.tables.lock().await.categories.len()
    }

    pub async fn question_count(&self) -> usize {
        self.tables.lock().await.questions.len()
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let t = self.tables.lock().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create(&self, new: NewUser) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.email == new.email) {
            return Ok(None);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            full_name: new.full_name,
            email: new.email,
            password_hash: new.password_hash,
            avatar: String::new(),
            refresh_token: None,
            status: AccountStatus::Unverified,
            created_at: now,
            updated_at: now,
        };
        t.users.push(user.clone());
        Ok(Some(user))
    }

    async fn mark_verified(&self, id: Uuid) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().await;
        match t.users.iter_mut().find(|u| u.id == id) {
            Some(u) => {
                u.status = u.status.after_verification();
                u.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_refresh_token(&self, id: Uuid, token: &str) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().await;
        match t.users.iter_mut().find(|u| u.id == id) {
            Some(u) => {
                u.refresh_token = Some(token.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn swap_refresh_token(
        &self,
        id: Uuid,
        expected: &str,
        next: &str,
    ) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().await;
        match t.users.iter_mut().find(|u| u.id == id) {
            Some(u)
                if u.status == AccountStatus::Verified
                    && u.refresh_token.as_deref() == Some(expected) =>
            {
                u.refresh_token = Some(next.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_refresh_token(&self, id: Uuid) -> anyhow::Result<()> {
        let mut t = self.tables.lock().await;
        if let Some(u) = t.users.iter_mut().find(|u| u.id == id) {
            u.refresh_token = None;
        }
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.lock().await;
        if t.users.iter().any(|u| u.email == email && u.id != id) {
            anyhow::bail!("duplicate key value violates unique constraint \"users_email_key\"");
        }
        Ok(t.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.full_name = full_name.to_string();
            u.email = email.to_string();
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn update_avatar(&self, id: Uuid, avatar: &str) -> anyhow::Result<Option<User>> {
        let mut t = self.tables.lock().await;
        Ok(t.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.avatar = avatar.to_string();
            u.updated_at = OffsetDateTime::now_utc();
            u.clone()
        }))
    }

    async fn push_answer(
        &self,
        user_id: Uuid,
        answer: &AnswerSubmission,
    ) -> anyhow::Result<bool> {
        let mut t = self.tables.lock().await;
        if !t.users.iter().any(|u| u.id == user_id) {
            return Ok(false);
        }
        t.answers.push((user_id, answer.clone()));
        Ok(true)
    }

    async fn search_answers(&self, user_id: Uuid, needle: &str) -> anyhow::Result<Vec<AnswerHit>> {
        let t = self.tables.lock().await;
        let needle = needle.to_lowercase();
        let mut hits: Vec<AnswerHit> = t
            .answers
            .iter()
            .filter(|(owner, _)| *owner == user_id)
            .filter_map(|(_, a)| {
                let q = t.questions.iter().find(|q| q.id == a.question)?;
                let matched = contains_ci(&q.question_text, &needle)
                    || contains_ci(&a.selected_answer, &needle);
                matched.then(|| AnswerHit {
                    question_text: q.question_text.clone(),
                    options: q.options.clone(),
                    correct_answer: q.correct_answer.clone(),
                    selected_answer: a.selected_answer.clone(),
                    submitted_at: a.submitted_at,
                })
            })
            .collect();
        hits.sort_by_key(|h| h.submitted_at);
        Ok(hits)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("memory store is offline");
        }
        Ok(())
    }
}

#[async_trait]
impl CategoryRepo for MemoryStore {
    async fn upsert_by_name(&self, name: &str) -> anyhow::Result<Category> {
        let mut t = self.tables.lock().await;
        if let Some(c) = t.categories.iter().find(|c| c.name == name) {
            return Ok(c.clone());
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        t.categories.push(category.clone());
        Ok(category)
    }

    async fn list(&self) -> anyhow::Result<Vec<Category>> {
        Ok(self.tables.lock().await.categories.clone())
    }

    async fn list_with_question_count(&self) -> anyhow::Result<Vec<CategoryCount>> {
        let t = self.tables.lock().await;
        Ok(t.categories
            .iter()
            .map(|c| CategoryCount {
                id: c.id,
                name: c.name.clone(),
                total_questions: t
                    .questions
                    .iter()
                    .filter(|q| q.categories.contains(&c.id))
                    .count() as i64,
            })
            .collect())
    }
}

#[async_trait]
impl QuestionRepo for MemoryStore {
    async fn insert_many(&self, questions: Vec<NewQuestion>) -> anyhow::Result<Vec<Question>> {
        let mut t = self.tables.lock().await;
        let now = OffsetDateTime::now_utc();
        let inserted: Vec<Question> = questions
            .into_iter()
            .map(|q| Question {
                id: Uuid::new_v4(),
                question_text: q.question_text,
                options: q.options,
                correct_answer: q.correct_answer,
                categories: q.categories,
                created_at: now,
                updated_at: now,
            })
            .collect();
        t.questions.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<Question>> {
        let t = self.tables.lock().await;
        Ok(t.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn list_by_category_name(
        &self,
        name_filter: Option<&str>,
    ) -> anyhow::Result<Vec<CategoryWithQuestions>> {
        let t = self.tables.lock().await;
        let needle = name_filter.map(str::to_lowercase);
        let categories: Vec<Category> = t
            .categories
            .iter()
            .filter(|c| needle.as_deref().map_or(true, |n| contains_ci(&c.name, n)))
            .cloned()
            .collect();
        Ok(group_by_category(categories, &t.questions))
    }
}
