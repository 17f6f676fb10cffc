use std::sync::Arc;
use std::time::Instant;

use crate::analysis::{ComplianceService, RuleCatalog};
use crate::core::config::{AppConfig, AppPaths, ConfigService};
use crate::embedding::{build_embedder, Embedder};
use crate::index::{build_index, corpus, VectorIndex};

pub mod error;

use error::InitializationError;

/// Application state shared across all routes.
///
/// The embedder, index and rule catalog are constructed once here and shared
/// with the compliance service; handlers never build their own.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: AppConfig,
    pub config_service: ConfigService,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub catalog: Arc<RuleCatalog>,
    pub service: Arc<ComplianceService>,
    pub started_at: Instant,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// This process includes:
    /// 1. Loading and validating configuration
    /// 2. Building the embedder and opening the reference index
    /// 3. Seeding the reference corpus when the index is empty
    /// 4. Loading the rule catalog and constructing the compliance service
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config_service = ConfigService::new(paths.clone());
        let config = config_service
            .load_app_config()
            .map_err(|e| InitializationError::Config(e.into()))?;

        let embedder = build_embedder(&config.embedding)
            .map_err(|e| InitializationError::Embedder(e.into()))?;

        let index = build_index(&config.index, &paths.index_path, embedder.dimension())
            .await
            .map_err(|e| InitializationError::Index(e.into()))?;

        if config.corpus.seed_on_startup {
            corpus::seed_if_empty(
                embedder.as_ref(),
                index.as_ref(),
                config.corpus.seed_path.as_deref(),
            )
            .await
            .map_err(|e| InitializationError::Corpus(e.into()))?;
        }

        let catalog = match &config.rules.path {
            Some(path) => RuleCatalog::from_path(path),
            None => RuleCatalog::builtin(),
        }
        .map_err(|e| InitializationError::Rules(e.into()))?;
        tracing::info!("Loaded rule catalog with {} rules", catalog.len());

        Self::from_components(
            paths,
            config,
            config_service,
            embedder,
            index,
            Arc::new(catalog),
        )
    }

    /// Assembles state from already-built collaborators.
    pub fn from_components(
        paths: Arc<AppPaths>,
        config: AppConfig,
        config_service: ConfigService,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        catalog: Arc<RuleCatalog>,
    ) -> Result<Arc<Self>, InitializationError> {
        let service = ComplianceService::new(
            config.analysis.clone(),
            embedder.clone(),
            index.clone(),
            catalog.clone(),
        )
        .map_err(|e| InitializationError::Service(e.into()))?;

        Ok(Arc::new(AppState {
            paths,
            config,
            config_service,
            embedder,
            index,
            catalog,
            service: Arc::new(service),
            started_at: Instant::now(),
        }))
    }
}
