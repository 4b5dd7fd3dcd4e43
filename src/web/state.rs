use std::{env, sync::Arc};

use anyhow::{Context, Result};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::{config::CorrectionSettings, llm::LlmClient};

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    settings: Arc<CorrectionSettings>,
    llm: LlmClient,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;

        let llm_client = LlmClient::from_env().context("failed to initialize LLM client")?;

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        CorrectionSettings::ensure_defaults(&pool)
            .await
            .context("failed to seed default correction settings")?;
        let settings = CorrectionSettings::load(&pool)
            .await
            .context("failed to load correction settings")?;

        info!(model = %settings.models.correction_model, "correction settings loaded");

        Ok(Self {
            pool,
            settings: Arc::new(settings),
            llm: llm_client,
        })
    }

    pub fn llm_client(&self) -> &LlmClient {
        &self.llm
    }

    pub fn pool_ref(&self) -> &PgPool {
        &self.pool
    }

    pub fn correction_settings(&self) -> Arc<CorrectionSettings> {
        Arc::clone(&self.settings)
    }
}
