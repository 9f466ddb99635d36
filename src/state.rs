use std::sync::Arc;

use crate::categories::repo::CategoryRepo;
use crate::config::AppConfig;
use crate::db::PgStore;
use crate::mail::{Mailer, RecordingMailer, SmtpMailer};
use crate::memory::MemoryStore;
use crate::questions::repo::QuestionRepo;
use crate::users::repo::UserRepo;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepo>,
    pub categories: Arc<dyn CategoryRepo>,
    pub questions: Arc<dyn QuestionRepo>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    /// Connects to Postgres and SMTP from the environment. A database that
    /// cannot be reached here is fatal for the process.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = PgStore::connect(&config.database_url).await?;
        if let Err(e) = store.migrate().await {
            tracing::warn!(error = %e, "migration failed; continuing with existing schema");
        }

        let mailer = Arc::new(SmtpMailer::new(&config.mail)?) as Arc<dyn Mailer>;

        Ok(Self::from_parts(config, store, mailer))
    }

    pub fn from_parts<S>(config: Arc<AppConfig>, store: S, mailer: Arc<dyn Mailer>) -> Self
    where
        S: UserRepo + CategoryRepo + QuestionRepo + Clone + 'static,
    {
        Self {
            config,
            users: Arc::new(store.clone()),
            categories: Arc::new(store.clone()),
            questions: Arc::new(store),
            mailer,
        }
    }

    /// State over an in-memory store and a recording mailer. The handles are
    /// returned so callers can inspect or manipulate them.
    pub fn fake() -> (Self, MemoryStore, RecordingMailer) {
        let store = MemoryStore::new();
        let mailer = RecordingMailer::new();
        let state = Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            store.clone(),
            Arc::new(mailer.clone()),
        );
        (state, store, mailer)
    }
}
