//! In-memory store implementations backing tests and the default wiring.

use super::*;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::time::Instant;

#[derive(Default)]
pub struct MemoryBehaviorStore {
    events: RwLock<Vec<BehaviorEvent>>,
}

impl MemoryBehaviorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: BehaviorEvent) {
        self.events.write().push(event);
    }

    pub fn extend(&self, events: impl IntoIterator<Item = BehaviorEvent>) {
        self.events.write().extend(events);
    }
}

#[async_trait::async_trait]
impl BehaviorStore for MemoryBehaviorStore {
    async fn query(&self, query: &BehaviorQuery) -> Result<Vec<BehaviorEvent>> {
        let events = self.events.read();
        Ok(events.iter().filter(|e| query.matches(e)).cloned().collect())
    }
}

#[derive(Default)]
pub struct MemoryCatalog {
    items: DashMap<Uuid, ItemAttributes>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: ItemAttributes) {
        self.items.insert(item.id, item);
    }
}

#[async_trait::async_trait]
impl Catalog for MemoryCatalog {
    async fn get(&self, item_id: Uuid) -> Result<Option<ItemAttributes>> {
        Ok(self.items.get(&item_id).map(|i| i.clone()))
    }

    async fn all(&self) -> Result<Vec<ItemAttributes>> {
        Ok(self.items.iter().map(|i| i.clone()).collect())
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RecommendationCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if Instant::now() < *expires_at {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<Uuid, UserPreferenceProfile>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserPreferenceProfile>> {
        Ok(self.profiles.get(&user_id).map(|p| p.clone()))
    }

    async fn upsert(&self, profile: &UserPreferenceProfile) -> Result<()> {
        self.profiles.insert(profile.user_id, profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryVectorStore {
    vectors: DashMap<Uuid, ItemFeatureVector>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl VectorStore for MemoryVectorStore {
    async fn get(&self, item_id: Uuid) -> Result<Option<ItemFeatureVector>> {
        Ok(self.vectors.get(&item_id).map(|v| v.clone()))
    }

    async fn upsert(&self, vector: &ItemFeatureVector) -> Result<()> {
        self.vectors.insert(vector.item_id, vector.clone());
        Ok(())
    }

    async fn all(&self) -> Result<Vec<ItemFeatureVector>> {
        Ok(self.vectors.iter().map(|v| v.clone()).collect())
    }
}

#[derive(Default)]
pub struct MemorySimilarityStore {
    pairs: DashMap<(Uuid, Uuid), ItemSimilarity>,
}

impl MemorySimilarityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SimilarityStore for MemorySimilarityStore {
    async fn upsert(&self, similarity: &ItemSimilarity) -> Result<()> {
        let key = ItemSimilarity::canonical_pair(similarity.item_a, similarity.item_b);
        let mut row = similarity.clone();
        (row.item_a, row.item_b) = key;
        self.pairs.insert(key, row);
        Ok(())
    }

    async fn get_pair(&self, a: Uuid, b: Uuid) -> Result<Option<ItemSimilarity>> {
        let key = ItemSimilarity::canonical_pair(a, b);
        Ok(self.pairs.get(&key).map(|s| s.clone()))
    }

    async fn for_item(&self, item_id: Uuid) -> Result<Vec<ItemSimilarity>> {
        Ok(self
            .pairs
            .iter()
            .filter(|entry| {
                let (a, b) = entry.key();
                *a == item_id || *b == item_id
            })
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryRecommendationStore {
    by_id: DashMap<Uuid, RankedRecommendation>,
    by_key: DashMap<(Uuid, Uuid, String, String), Uuid>,
}

impl MemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<RankedRecommendation> {
        self.by_id.iter().map(|r| r.clone()).collect()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryRecommendationStore {
    async fn upsert(&self, recommendation: &RankedRecommendation) -> Result<RankedRecommendation> {
        let key = (
            recommendation.user_id,
            recommendation.item_id,
            recommendation.model.clone(),
            recommendation.session_id.clone(),
        );

        let mut row = recommendation.clone();
        if let Some(existing_id) = self.by_key.get(&key) {
            row.id = *existing_id;
        } else {
            self.by_key.insert(key, row.id);
        }
        self.by_id.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<RankedRecommendation>> {
        Ok(self.by_id.get(&id).map(|r| r.clone()))
    }

    async fn save(&self, recommendation: &RankedRecommendation) -> Result<()> {
        self.by_id
            .insert(recommendation.id, recommendation.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionType;

    #[tokio::test]
    async fn test_behavior_query_filters() {
        let store = MemoryBehaviorStore::new();
        let user = Uuid::new_v4();
        let item = Uuid::new_v4();

        store.push(BehaviorEvent::new(Some(user), Some(item), ActionType::View));
        store.push(BehaviorEvent::new(None, Some(item), ActionType::Click));

        let all = store.query(&BehaviorQuery::for_item(item)).await.unwrap();
        assert_eq!(all.len(), 2);

        let mine = store.query(&BehaviorQuery::for_user(user)).await.unwrap();
        assert_eq!(mine.len(), 1);

        let strong = store
            .query(&BehaviorQuery::for_item(item).with_actions(&[ActionType::View]))
            .await
            .unwrap();
        assert_eq!(strong.len(), 1);
    }

    #[tokio::test]
    async fn test_cache_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        cache.set("k2", "v2", Duration::from_nanos(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(cache.get("k2").await.unwrap(), None);

        cache
            .set("recs:a", "x", Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete_prefix("recs:").await.unwrap();
        assert_eq!(cache.get("recs:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_similarity_canonical_order() {
        let store = MemorySimilarityStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let sim = ItemSimilarity {
            item_a: b.max(a),
            item_b: b.min(a),
            content_similarity: 0.5,
            location_similarity: 0.5,
            behavioral_similarity: 0.0,
            overall_similarity: 0.35,
            method: "hybrid".to_string(),
            computed_at: chrono::Utc::now(),
        };
        store.upsert(&sim).await.unwrap();

        let fetched = store.get_pair(a, b).await.unwrap().unwrap();
        assert!(fetched.item_a < fetched.item_b);
        let reversed = store.get_pair(b, a).await.unwrap().unwrap();
        assert_eq!(reversed.item_a, fetched.item_a);
    }

    #[tokio::test]
    async fn test_recommendation_upsert_keeps_id() {
        let store = MemoryRecommendationStore::new();
        let user = Uuid::new_v4();
        let item = Uuid::new_v4();

        let rec = RankedRecommendation {
            id: Uuid::new_v4(),
            user_id: user,
            item_id: item,
            model: "hybrid-v1".to_string(),
            session_id: "s1".to_string(),
            confidence: 0.5,
            relevance: 0.5,
            final_score: 0.5,
            reason_type: crate::models::ReasonType::Popularity,
            reason_details: serde_json::Value::Null,
            explanation: String::new(),
            rank: 1,
            served_at: chrono::Utc::now(),
            is_clicked: false,
            clicked_at: None,
            feedback_score: None,
            feedback_comment: None,
        };

        let first = store.upsert(&rec).await.unwrap();
        let mut again = rec.clone();
        again.id = Uuid::new_v4();
        again.final_score = 0.9;
        let second = store.upsert(&again).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.get(first.id).await.unwrap().unwrap().final_score, 0.9);
    }
}
