use std::sync::Arc;

use anyhow::Result;

use crate::{
    applier::MetadataApplier,
    auth::jwt::JwtService,
    config::AppConfig,
    inference::{InferenceClient, OllamaClient},
    paperless::{DocumentServiceFactory, PaperlessClientFactory},
    pipeline::{DocumentProcessor, PipelineSettings},
    repository::{MemoryRepository, PgRepository, Repository},
    workers::QueueManager,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Arc<dyn Repository>,
    pub inference: Arc<dyn InferenceClient>,
    pub clients: Arc<dyn DocumentServiceFactory>,
    pub applier: Arc<MetadataApplier>,
    pub manager: QueueManager,
    pub jwt: JwtService,
}

impl AppState {
    /// Wires the pipeline, applier and queue manager around the given
    /// collaborators.
    pub fn new(
        config: AppConfig,
        repo: Arc<dyn Repository>,
        inference: Arc<dyn InferenceClient>,
        clients: Arc<dyn DocumentServiceFactory>,
        jwt: JwtService,
    ) -> Self {
        let processor = Arc::new(DocumentProcessor::new(
            inference.clone(),
            PipelineSettings::from_config(&config),
        ));
        let applier = Arc::new(MetadataApplier::from_config(&config));
        let manager = QueueManager::new(
            repo.clone(),
            processor,
            applier.clone(),
            clients.clone(),
            config.processing.clone(),
        );
        Self {
            config: Arc::new(config),
            repo,
            inference,
            clients,
            applier,
            manager,
            jwt,
        }
    }

    /// Connects the production collaborators described by `config`.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let repo: Arc<dyn Repository> = match &config.database_url {
            Some(url) => Arc::new(PgRepository::connect(url, config.database_max_pool_size).await?),
            None => {
                tracing::warn!("DATABASE_URL not set; queue state is kept in memory");
                Arc::new(MemoryRepository::new())
            }
        };
        let inference: Arc<dyn InferenceClient> =
            Arc::new(OllamaClient::from_config(&config.inference)?);
        let clients: Arc<dyn DocumentServiceFactory> = Arc::new(PaperlessClientFactory::new(
            config.paperless_timeout,
            config.paperless_pool_size,
        ));
        let jwt = JwtService::from_config(&config)?;
        Ok(Self::new(config, repo, inference, clients, jwt))
    }
}
