pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod stores;
pub mod taxonomy;
pub mod utils;

pub use config::Config;
pub use error::{RecommendError, Result};
pub use models::*;

use anyhow::Result as AnyResult;
use services::features::FeatureVectorBuilder;
use services::preference::PreferenceAnalyzer;
use services::recommendation::RecommendationEngine;
use services::similarity::SimilarityEngine;
use std::sync::Arc;
use stores::memory::{
    MemoryBehaviorStore, MemoryCatalog, MemoryProfileStore, MemoryRecommendationStore,
    MemorySimilarityStore, MemoryVectorStore,
};
use stores::redis::RedisCache;
use stores::{
    BehaviorStore, Catalog, ProfileStore, RecommendationCache, RecommendationStore,
    SimilarityStore, VectorStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub behavior: Arc<dyn BehaviorStore>,
    pub catalog: Arc<dyn Catalog>,
    pub profiles: Arc<dyn ProfileStore>,
    pub vectors: Arc<dyn VectorStore>,
    pub similarities: Arc<dyn SimilarityStore>,
    pub recommendations: Arc<dyn RecommendationStore>,
    pub cache: Arc<dyn RecommendationCache>,
    pub analyzer: Arc<PreferenceAnalyzer>,
    pub feature_builder: Arc<FeatureVectorBuilder>,
    pub similarity_engine: Arc<SimilarityEngine>,
    pub recommendation_engine: Arc<RecommendationEngine>,
}

impl AppState {
    /// Default wiring: in-memory stores for the computed artifacts, redis
    /// for the response cache.
    pub async fn new(config: Config) -> AnyResult<Self> {
        let config = Arc::new(config);

        let behavior: Arc<dyn BehaviorStore> = Arc::new(MemoryBehaviorStore::new());
        let catalog: Arc<dyn Catalog> = Arc::new(MemoryCatalog::new());
        let profiles: Arc<dyn ProfileStore> = Arc::new(MemoryProfileStore::new());
        let vectors: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
        let similarities: Arc<dyn SimilarityStore> = Arc::new(MemorySimilarityStore::new());
        let recommendations: Arc<dyn RecommendationStore> =
            Arc::new(MemoryRecommendationStore::new());
        let cache: Arc<dyn RecommendationCache> =
            Arc::new(RedisCache::from_url(&config.redis.url)?);

        Ok(Self::with_stores(
            config,
            behavior,
            catalog,
            profiles,
            vectors,
            similarities,
            recommendations,
            cache,
        ))
    }

    /// Wiring over explicit store implementations, used by tests and by
    /// deployments that bring their own backends.
    #[allow(clippy::too_many_arguments)]
    pub fn with_stores(
        config: Arc<Config>,
        behavior: Arc<dyn BehaviorStore>,
        catalog: Arc<dyn Catalog>,
        profiles: Arc<dyn ProfileStore>,
        vectors: Arc<dyn VectorStore>,
        similarities: Arc<dyn SimilarityStore>,
        recommendations: Arc<dyn RecommendationStore>,
        cache: Arc<dyn RecommendationCache>,
    ) -> Self {
        let analyzer = Arc::new(PreferenceAnalyzer::new(
            behavior.clone(),
            catalog.clone(),
            profiles.clone(),
            config.clone(),
        ));

        let feature_builder = Arc::new(FeatureVectorBuilder::new(
            catalog.clone(),
            behavior.clone(),
            vectors.clone(),
            config.clone(),
        ));

        let similarity_engine = Arc::new(SimilarityEngine::new(
            behavior.clone(),
            vectors.clone(),
            similarities.clone(),
        ));

        let recommendation_engine = Arc::new(RecommendationEngine::new(
            analyzer.clone(),
            feature_builder.clone(),
            similarity_engine.clone(),
            behavior.clone(),
            catalog.clone(),
            vectors.clone(),
            similarities.clone(),
            recommendations.clone(),
            cache.clone(),
            config.clone(),
        ));

        Self {
            config,
            behavior,
            catalog,
            profiles,
            vectors,
            similarities,
            recommendations,
            cache,
            analyzer,
            feature_builder,
            similarity_engine,
            recommendation_engine,
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
