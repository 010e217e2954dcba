//! Pairwise item similarity: content, location and behavioral components
//! blended into one overall score. The full sweep is the most expensive
//! operation in the system; pairs are independent work units, computed on a
//! rayon pool and written to the similarity store only.

use crate::error::{RecommendError, Result as RecResult, SkipReason};
use crate::models::*;
use crate::services::SweepReport;
use crate::stores::{BehaviorQuery, BehaviorStore, SimilarityStore, VectorStore};
use crate::utils;
use chrono::Utc;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const CONTENT_WEIGHT: f64 = 0.4;
const LOCATION_WEIGHT: f64 = 0.3;
const BEHAVIORAL_WEIGHT: f64 = 0.3;

const METHOD_TAG: &str = "hybrid";

const STRONG_INTENT_ACTIONS: [ActionType; 3] =
    [ActionType::View, ActionType::Contact, ActionType::Bookmark];

pub struct SimilarityEngine {
    behavior: Arc<dyn BehaviorStore>,
    vectors: Arc<dyn VectorStore>,
    similarities: Arc<dyn SimilarityStore>,
}

impl SimilarityEngine {
    pub fn new(
        behavior: Arc<dyn BehaviorStore>,
        vectors: Arc<dyn VectorStore>,
        similarities: Arc<dyn SimilarityStore>,
    ) -> Self {
        Self {
            behavior,
            vectors,
            similarities,
        }
    }

    /// Computes and upserts the similarity row for one pair.
    pub async fn calculate_pair(&self, a: Uuid, b: Uuid) -> RecResult<ItemSimilarity> {
        let vector_a = self
            .vectors
            .get(a)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?
            .ok_or_else(|| RecommendError::not_found("feature vector", a))?;
        let vector_b = self
            .vectors
            .get(b)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?
            .ok_or_else(|| RecommendError::not_found("feature vector", b))?;

        let (users_a, users_b) =
            futures::join!(self.strong_intent_users(a), self.strong_intent_users(b));

        let similarity = compute_pair(&vector_a, &vector_b, &users_a, &users_b)
            .map_err(|reason| RecommendError::validation(format!("pair skipped: {reason}")))?;

        self.similarities
            .upsert(&similarity)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?;
        Ok(similarity)
    }

    /// Full O(n²) sweep over every unordered pair of items that have a
    /// feature vector.
    pub async fn calculate_all(&self) -> anyhow::Result<SweepReport> {
        self.calculate_shard(0, 1).await
    }

    /// One shard of the sweep, partitioned by pair index. Shared inputs are
    /// loaded once up front; each pair is then a pure computation with its
    /// own output row.
    pub async fn calculate_shard(
        &self,
        shard_index: u64,
        shard_count: u64,
    ) -> anyhow::Result<SweepReport> {
        let shard_count = shard_count.max(1);
        let mut vectors = self.vectors.all().await?;
        vectors.sort_by_key(|v| v.item_id);

        let total_pairs = vectors.len().saturating_mul(vectors.len().saturating_sub(1)) / 2;
        info!(
            items = vectors.len(),
            total_pairs, shard_index, shard_count, "starting similarity sweep"
        );

        let mut strong_users: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        for vector in &vectors {
            strong_users.insert(vector.item_id, self.strong_intent_users(vector.item_id).await);
        }

        let empty = HashSet::new();
        let pairs: Vec<(usize, usize)> = (0..vectors.len())
            .flat_map(|i| ((i + 1)..vectors.len()).map(move |j| (i, j)))
            .enumerate()
            .filter(|(pair_index, _)| *pair_index as u64 % shard_count == shard_index)
            .map(|(_, pair)| pair)
            .collect();

        let results: Vec<Result<ItemSimilarity, SkipReason>> = pairs
            .par_iter()
            .map(|&(i, j)| {
                let a = &vectors[i];
                let b = &vectors[j];
                compute_pair(
                    a,
                    b,
                    strong_users.get(&a.item_id).unwrap_or(&empty),
                    strong_users.get(&b.item_id).unwrap_or(&empty),
                )
            })
            .collect();

        let mut report = SweepReport::default();
        for result in results {
            match result {
                Ok(similarity) => match self.similarities.upsert(&similarity).await {
                    Ok(()) => report.processed += 1,
                    Err(e) => {
                        warn!(error = %e, "similarity upsert failed");
                        report.record_skip(SkipReason::StoreError);
                    }
                },
                Err(reason) => report.record_skip(reason),
            }
        }

        info!(
            processed = report.processed,
            skipped = report.total_skipped(),
            "similarity sweep finished"
        );
        Ok(report)
    }

    async fn strong_intent_users(&self, item_id: Uuid) -> HashSet<Uuid> {
        let query = BehaviorQuery::for_item(item_id).with_actions(&STRONG_INTENT_ACTIONS);
        match self.behavior.query(&query).await {
            Ok(events) => events.into_iter().filter_map(|e| e.user_id).collect(),
            Err(e) => {
                warn!(%item_id, error = %e, "behavior store unavailable for similarity");
                HashSet::new()
            }
        }
    }
}

/// Pure pairwise computation. Canonical order is applied before the row is
/// returned, so the stored pair always has the lower id first.
pub fn compute_pair(
    a: &ItemFeatureVector,
    b: &ItemFeatureVector,
    users_a: &HashSet<Uuid>,
    users_b: &HashSet<Uuid>,
) -> Result<ItemSimilarity, SkipReason> {
    let content = content_similarity(a, b);
    let location = location_similarity(&a.location, &b.location);
    let behavioral = utils::jaccard(users_a, users_b);

    let overall =
        content * CONTENT_WEIGHT + location * LOCATION_WEIGHT + behavioral * BEHAVIORAL_WEIGHT;

    if !overall.is_finite() {
        return Err(SkipReason::Unparsable);
    }

    let (item_a, item_b) = ItemSimilarity::canonical_pair(a.item_id, b.item_id);
    Ok(ItemSimilarity {
        item_a,
        item_b,
        content_similarity: content,
        location_similarity: location,
        behavioral_similarity: behavioral,
        overall_similarity: overall.clamp(0.0, 1.0),
        method: METHOD_TAG.to_string(),
        computed_at: Utc::now(),
    })
}

/// Average of subject cosine, facility cosine and price-band agreement.
fn content_similarity(a: &ItemFeatureVector, b: &ItemFeatureVector) -> f64 {
    let subject = utils::cosine_similarity_map(&a.subject, &b.subject);
    let facility = utils::cosine_similarity_map(&a.facility.as_map(), &b.facility.as_map());
    let price = price_band_agreement(&a.price, &b.price);
    (subject + facility + price) / 3.0
}

fn price_band_agreement(a: &PriceDescriptor, b: &PriceDescriptor) -> f64 {
    match (a.band, b.band) {
        (Some(band_a), Some(band_b)) => {
            if band_a == band_b {
                1.0
            } else {
                let gap = band_a.index().abs_diff(band_b.index());
                1.0 - 0.4 * gap as f64
            }
        }
        // Either side unknown: weak neutral agreement.
        _ => 0.3,
    }
}

fn location_similarity(a: &LocationDescriptor, b: &LocationDescriptor) -> f64 {
    if let (Some((lat_a, lng_a)), Some((lat_b, lng_b))) = (a.coordinates(), b.coordinates()) {
        let distance = utils::haversine_distance_km(lat_a, lng_a, lat_b, lng_b);
        return distance_decay(distance);
    }

    // Administrative-region fallback. Never exactly 0, so long-tail items
    // are not starved out entirely.
    if !a.district.is_empty() && a.district == b.district {
        0.9
    } else if !a.province.is_empty() && a.province == b.province {
        0.6
    } else {
        0.1
    }
}

/// Piecewise-linear decay of geodesic distance into similarity.
fn distance_decay(km: f64) -> f64 {
    if km <= 5.0 {
        1.0
    } else if km <= 20.0 {
        1.0 - (km - 5.0) / 15.0 * 0.5
    } else if km <= 50.0 {
        0.5 - (km - 20.0) / 30.0 * 0.4
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::{MemoryBehaviorStore, MemorySimilarityStore, MemoryVectorStore};

    fn vector(item_id: Uuid) -> ItemFeatureVector {
        ItemFeatureVector {
            item_id,
            subject: HashMap::new(),
            location: LocationDescriptor {
                province: String::new(),
                district: String::new(),
                latitude: None,
                longitude: None,
                region_cluster: None,
            },
            price: PriceDescriptor::unknown(),
            facility: FacilityDescriptor {
                has_shuttle: false,
                facility_score: 0.0,
            },
            popularity_score: 0.0,
            rating_score: 0.0,
            engagement_score: 0.0,
            schema_version: VECTOR_SCHEMA_VERSION.to_string(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_distance_decay_piecewise() {
        assert_eq!(distance_decay(3.0), 1.0);
        assert_eq!(distance_decay(5.0), 1.0);
        assert!((distance_decay(12.5) - 0.75).abs() < 1e-9);
        assert!((distance_decay(20.0) - 0.5).abs() < 1e-9);
        let d30 = distance_decay(30.0);
        assert!(d30 > 0.1 && d30 < 0.5);
        assert!((d30 - (0.5 - 10.0 / 30.0 * 0.4)).abs() < 1e-9);
        assert_eq!(distance_decay(80.0), 0.1);
    }

    #[test]
    fn test_decay_monotonic_within_50km() {
        let mut previous = f64::MAX;
        for km in [1.0, 5.0, 6.0, 15.0, 20.0, 25.0, 40.0, 50.0] {
            let sim = distance_decay(km);
            assert!(sim <= previous, "decay not monotonic at {km} km");
            previous = sim;
        }
    }

    #[test]
    fn test_price_band_agreement() {
        let low = PriceDescriptor {
            has_fee_info: true,
            band: Some(PriceBand::Low),
            fee_value: 50_000.0,
        };
        let high = PriceDescriptor {
            has_fee_info: true,
            band: Some(PriceBand::High),
            fee_value: 500_000.0,
        };
        let medium = PriceDescriptor {
            has_fee_info: true,
            band: Some(PriceBand::Medium),
            fee_value: 150_000.0,
        };

        assert_eq!(price_band_agreement(&low, &low), 1.0);
        assert!((price_band_agreement(&low, &medium) - 0.6).abs() < 1e-9);
        assert!((price_band_agreement(&low, &high) - 0.2).abs() < 1e-9);
        assert_eq!(price_band_agreement(&low, &PriceDescriptor::unknown()), 0.3);
    }

    #[test]
    fn test_admin_region_fallback() {
        let mut a = vector(Uuid::new_v4()).location;
        let mut b = vector(Uuid::new_v4()).location;

        a.province = "Seoul".to_string();
        a.district = "Gangnam".to_string();
        b.province = "Seoul".to_string();
        b.district = "Gangnam".to_string();
        assert_eq!(location_similarity(&a, &b), 0.9);

        b.district = "Mapo".to_string();
        assert_eq!(location_similarity(&a, &b), 0.6);

        b.province = "Busan".to_string();
        assert_eq!(location_similarity(&a, &b), 0.1);
    }

    #[test]
    fn test_compute_pair_symmetry_and_canonical_order() {
        let id_a = Uuid::new_v4();
        let id_b = Uuid::new_v4();
        let mut a = vector(id_a);
        let mut b = vector(id_b);
        a.subject.insert(AgeGroup::Elementary, 2.0);
        b.subject.insert(AgeGroup::Elementary, 3.0);

        let users_a: HashSet<Uuid> = [Uuid::new_v4()].into_iter().collect();
        let users_b = users_a.clone();

        let forward = compute_pair(&a, &b, &users_a, &users_b).unwrap();
        let backward = compute_pair(&b, &a, &users_b, &users_a).unwrap();

        assert!((forward.overall_similarity - backward.overall_similarity).abs() < 1e-12);
        assert!(forward.item_a < forward.item_b);
        assert_eq!(forward.item_a, backward.item_a);
        assert_eq!(forward.item_b, backward.item_b);
    }

    #[test]
    fn test_behavioral_zero_when_either_set_empty() {
        let a = vector(Uuid::new_v4());
        let b = vector(Uuid::new_v4());
        let users: HashSet<Uuid> = [Uuid::new_v4()].into_iter().collect();

        let sim = compute_pair(&a, &b, &users, &HashSet::new()).unwrap();
        assert_eq!(sim.behavioral_similarity, 0.0);
    }

    #[test]
    fn test_nearby_coordinates_score_full_location_similarity() {
        let mut a = vector(Uuid::new_v4());
        let mut b = vector(Uuid::new_v4());
        a.location.latitude = Some(37.5);
        a.location.longitude = Some(127.0);
        // Roughly 3 km north.
        b.location.latitude = Some(37.5 + 3.0 / 111.19);
        b.location.longitude = Some(127.0);

        assert_eq!(location_similarity(&a.location, &b.location), 1.0);
    }

    #[tokio::test]
    async fn test_sweep_covers_all_pairs_and_shards_partition() {
        let behavior = Arc::new(MemoryBehaviorStore::new());
        let vectors = Arc::new(MemoryVectorStore::new());
        let similarities = Arc::new(MemorySimilarityStore::new());

        for _ in 0..5 {
            vectors.upsert(&vector(Uuid::new_v4())).await.unwrap();
        }

        let engine = SimilarityEngine::new(behavior.clone(), vectors.clone(), similarities.clone());
        let report = engine.calculate_all().await.unwrap();
        assert_eq!(report.processed, 10); // 5 choose 2

        let sharded = Arc::new(MemorySimilarityStore::new());
        let engine = SimilarityEngine::new(behavior, vectors, sharded);
        let a = engine.calculate_shard(0, 3).await.unwrap();
        let b = engine.calculate_shard(1, 3).await.unwrap();
        let c = engine.calculate_shard(2, 3).await.unwrap();
        assert_eq!(a.processed + b.processed + c.processed, 10);
    }

    #[tokio::test]
    async fn test_calculate_pair_requires_vectors() {
        let behavior = Arc::new(MemoryBehaviorStore::new());
        let vectors = Arc::new(MemoryVectorStore::new());
        let similarities = Arc::new(MemorySimilarityStore::new());
        let engine = SimilarityEngine::new(behavior, vectors.clone(), similarities);

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let result = engine.calculate_pair(a, b).await;
        assert!(matches!(
            result,
            Err(crate::error::RecommendError::NotFound { .. })
        ));
    }
}
