//! Collaborator seams. The engine owns none of the durable state: behavior
//! events and catalog attributes are read-only inputs, and the computed
//! artifacts (profiles, vectors, similarities, recommendations) go through
//! store traits so tests and deployments pick their own backends.

use crate::models::*;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

pub mod memory;
pub mod redis;

/// Filter for a window of behavior events. All fields are optional and
/// combine conjunctively.
#[derive(Debug, Clone, Default)]
pub struct BehaviorQuery {
    pub user_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub actions: Option<Vec<ActionType>>,
    pub since: Option<DateTime<Utc>>,
}

impl BehaviorQuery {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn for_item(item_id: Uuid) -> Self {
        Self {
            item_id: Some(item_id),
            ..Default::default()
        }
    }

    pub fn with_actions(mut self, actions: &[ActionType]) -> Self {
        self.actions = Some(actions.to_vec());
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn matches(&self, event: &BehaviorEvent) -> bool {
        if let Some(user_id) = self.user_id {
            if event.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(item_id) = self.item_id {
            if event.item_id != Some(item_id) {
                return false;
            }
        }
        if let Some(ref actions) = self.actions {
            if !actions.contains(&event.action) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.timestamp < since {
                return false;
            }
        }
        true
    }
}

/// Append-only event log owned by the platform; read-only here.
#[async_trait::async_trait]
pub trait BehaviorStore: Send + Sync {
    async fn query(&self, query: &BehaviorQuery) -> Result<Vec<BehaviorEvent>>;
}

/// The persistent item catalog; read-only here.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    async fn get(&self, item_id: Uuid) -> Result<Option<ItemAttributes>>;
    async fn all(&self) -> Result<Vec<ItemAttributes>>;
}

/// Pure optimization layer. Any failure here degrades to direct
/// computation; the engine never blocks on cache availability.
#[async_trait::async_trait]
pub trait RecommendationCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;
}

#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserPreferenceProfile>>;
    async fn upsert(&self, profile: &UserPreferenceProfile) -> Result<()>;
}

#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn get(&self, item_id: Uuid) -> Result<Option<ItemFeatureVector>>;
    async fn upsert(&self, vector: &ItemFeatureVector) -> Result<()>;
    async fn all(&self) -> Result<Vec<ItemFeatureVector>>;
}

#[async_trait::async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Stores under canonical pair order regardless of argument order.
    async fn upsert(&self, similarity: &ItemSimilarity) -> Result<()>;
    async fn get_pair(&self, a: Uuid, b: Uuid) -> Result<Option<ItemSimilarity>>;
    /// Every stored pair involving the item, either side.
    async fn for_item(&self, item_id: Uuid) -> Result<Vec<ItemSimilarity>>;
}

#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Upsert keyed by (user, item, model, session). Re-serving the same
    /// session replaces the row and keeps its id, so attached feedback
    /// stays addressable.
    async fn upsert(&self, recommendation: &RankedRecommendation) -> Result<RankedRecommendation>;
    async fn get(&self, id: Uuid) -> Result<Option<RankedRecommendation>>;
    async fn save(&self, recommendation: &RankedRecommendation) -> Result<()>;
}
