//! Construction of normalized per-item feature vectors from catalog
//! attributes and aggregated behavior statistics. No pairwise work happens
//! here; items are independent units, safe to shard by id.

use crate::config::Config;
use crate::error::SkipReason;
use crate::models::*;
use crate::services::SweepReport;
use crate::stores::{BehaviorQuery, BehaviorStore, Catalog, VectorStore};
use crate::taxonomy;
use crate::utils;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Fixed currency-unit thresholds for the catalog-side price bands.
const PRICE_LOW_CEILING: f64 = 100_000.0;
const PRICE_MEDIUM_CEILING: f64 = 300_000.0;

/// Weighted 30-day action sum is divided by this before capping, keeping
/// popularity on the platform's 5-point scale.
const POPULARITY_DIVISOR: f64 = 100.0;
const SCORE_CAP: f64 = 5.0;

pub struct FeatureVectorBuilder {
    catalog: Arc<dyn Catalog>,
    behavior: Arc<dyn BehaviorStore>,
    vectors: Arc<dyn VectorStore>,
    config: Arc<Config>,
}

impl FeatureVectorBuilder {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        behavior: Arc<dyn BehaviorStore>,
        vectors: Arc<dyn VectorStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            catalog,
            behavior,
            vectors,
            config,
        }
    }

    pub async fn build(&self, item: &ItemAttributes) -> ItemFeatureVector {
        let (popularity_score, rating_score, engagement_score) =
            self.behavior_scores(item.id).await;

        ItemFeatureVector {
            item_id: item.id,
            subject: extract_subject_strengths(item),
            location: extract_location(item),
            price: extract_price(item),
            facility: extract_facility(item),
            popularity_score,
            rating_score,
            engagement_score,
            schema_version: VECTOR_SCHEMA_VERSION.to_string(),
            last_updated: Utc::now(),
        }
    }

    /// Rebuilds and upserts one vector per catalog item. Per-item failures
    /// are skipped and counted; the sweep itself only fails when the
    /// catalog is unreadable.
    pub async fn build_all(&self) -> anyhow::Result<SweepReport> {
        self.build_shard(0, 1).await
    }

    /// One shard of the wholesale rebuild. Items are partitioned by id so
    /// independent workers cover disjoint slices with no shared mutable
    /// state beyond the output store.
    pub async fn build_shard(
        &self,
        shard_index: u64,
        shard_count: u64,
    ) -> anyhow::Result<SweepReport> {
        let shard_count = shard_count.max(1);
        let items = self.catalog.all().await?;
        info!(
            total = items.len(),
            shard_index, shard_count, "building item feature vectors"
        );

        let mut report = SweepReport::default();
        for item in items {
            if item.id.as_u128() % shard_count as u128 != shard_index as u128 {
                continue;
            }

            let vector = self.build(&item).await;
            match self.vectors.upsert(&vector).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "vector upsert failed");
                    report.record_skip(SkipReason::StoreError);
                }
            }
        }

        info!(
            processed = report.processed,
            skipped = report.total_skipped(),
            "item feature vector sweep finished"
        );
        Ok(report)
    }

    /// Popularity, rating and engagement from the item's recent event
    /// window, all on the 0-5 scale.
    async fn behavior_scores(&self, item_id: uuid::Uuid) -> (f64, f64, f64) {
        let since = Utc::now() - Duration::days(self.config.analysis.popularity_window_days);
        let query = BehaviorQuery::for_item(item_id).since(since);

        let events = match self.behavior.query(&query).await {
            Ok(events) => events,
            Err(e) => {
                warn!(%item_id, error = %e, "behavior store unavailable, scoring item as cold");
                return (0.0, 0.0, 0.0);
            }
        };

        let weighted_sum: f64 = events.iter().map(|e| e.action.weight()).sum();
        let popularity = (weighted_sum / POPULARITY_DIVISOR).min(SCORE_CAP);

        let review_count = events
            .iter()
            .filter(|e| e.action == ActionType::Review)
            .count();
        let rating = (review_count as f64 * 0.5).min(SCORE_CAP);

        let engagement = if events.is_empty() {
            0.0
        } else {
            let mean_seconds =
                events.iter().map(|e| e.duration as f64).sum::<f64>() / events.len() as f64;
            (mean_seconds / 60.0).min(SCORE_CAP)
        };

        (popularity, rating, engagement)
    }
}

fn extract_subject_strengths(item: &ItemAttributes) -> HashMap<AgeGroup, f64> {
    let mut strengths = HashMap::new();
    for age in AgeGroup::ALL {
        if let Some(listing) = item.subjects.get(&age) {
            let trimmed = listing.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
                continue;
            }
            let count = trimmed.split(',').filter(|s| !s.trim().is_empty()).count();
            if count > 0 {
                strengths.insert(age, count as f64);
            }
        }
    }
    strengths
}

fn extract_location(item: &ItemAttributes) -> LocationDescriptor {
    let region_cluster = match (item.latitude, item.longitude) {
        (Some(lat), Some(lng)) => Some(taxonomy::region_cluster(lat, lng)),
        _ => None,
    };

    LocationDescriptor {
        province: item.province.clone(),
        district: item.district.clone(),
        latitude: item.latitude,
        longitude: item.longitude,
        region_cluster,
    }
}

fn extract_price(item: &ItemAttributes) -> PriceDescriptor {
    let Some(tuition) = &item.tuition else {
        return PriceDescriptor::unknown();
    };
    if tuition.trim().is_empty() || tuition.trim().eq_ignore_ascii_case("nan") {
        return PriceDescriptor::unknown();
    }

    match utils::parse_fee(tuition) {
        Some(fee) => {
            let band = if fee < PRICE_LOW_CEILING {
                PriceBand::Low
            } else if fee < PRICE_MEDIUM_CEILING {
                PriceBand::Medium
            } else {
                PriceBand::High
            };
            PriceDescriptor {
                has_fee_info: true,
                band: Some(band),
                fee_value: fee,
            }
        }
        // Fee text exists but carries no parsable figure; the band stays
        // unknown rather than defaulting to zero.
        None => PriceDescriptor {
            has_fee_info: true,
            band: None,
            fee_value: 0.0,
        },
    }
}

fn extract_facility(item: &ItemAttributes) -> FacilityDescriptor {
    let mut has_shuttle = false;
    let mut facility_score = 0.0;

    if let Some(shuttle) = &item.shuttle {
        let text = shuttle.to_lowercase();
        if text != "nan"
            && taxonomy::SHUTTLE_POSITIVE_KEYWORDS
                .iter()
                .any(|kw| text.contains(kw))
        {
            has_shuttle = true;
            facility_score += 1.0;
        }
    }

    let combined = format!("{} {}", item.name, item.extra_info).to_lowercase();
    for keyword in taxonomy::FACILITY_KEYWORDS {
        if combined.contains(keyword) {
            facility_score += 0.5;
        }
    }

    FacilityDescriptor {
        has_shuttle,
        facility_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::{MemoryBehaviorStore, MemoryCatalog, MemoryVectorStore};
    use uuid::Uuid;

    fn builder() -> (
        FeatureVectorBuilder,
        Arc<MemoryCatalog>,
        Arc<MemoryBehaviorStore>,
        Arc<MemoryVectorStore>,
    ) {
        let catalog = Arc::new(MemoryCatalog::new());
        let behavior = Arc::new(MemoryBehaviorStore::new());
        let vectors = Arc::new(MemoryVectorStore::new());
        let builder = FeatureVectorBuilder::new(
            catalog.clone(),
            behavior.clone(),
            vectors.clone(),
            Arc::new(Config::default()),
        );
        (builder, catalog, behavior, vectors)
    }

    #[test]
    fn test_subject_strengths_count_sub_values() {
        let item = ItemAttributes::new(Uuid::new_v4(), "A")
            .with_subject(AgeGroup::Elementary, "math, english, science")
            .with_subject(AgeGroup::Middle, "nan")
            .with_subject(AgeGroup::High, "  ");

        let strengths = extract_subject_strengths(&item);
        assert_eq!(strengths[&AgeGroup::Elementary], 3.0);
        assert!(!strengths.contains_key(&AgeGroup::Middle));
        assert!(!strengths.contains_key(&AgeGroup::High));
    }

    #[test]
    fn test_price_classification() {
        let low = ItemAttributes::new(Uuid::new_v4(), "A").with_tuition("90,000 monthly");
        assert_eq!(extract_price(&low).band, Some(PriceBand::Low));

        let medium = ItemAttributes::new(Uuid::new_v4(), "B").with_tuition("150000");
        assert_eq!(extract_price(&medium).band, Some(PriceBand::Medium));

        let high = ItemAttributes::new(Uuid::new_v4(), "C").with_tuition("300,000");
        assert_eq!(extract_price(&high).band, Some(PriceBand::High));

        let unknown = ItemAttributes::new(Uuid::new_v4(), "D");
        let descriptor = extract_price(&unknown);
        assert!(!descriptor.has_fee_info);
        assert_eq!(descriptor.band, None);

        let unparsable = ItemAttributes::new(Uuid::new_v4(), "E").with_tuition("negotiable");
        let descriptor = extract_price(&unparsable);
        assert!(descriptor.has_fee_info);
        assert_eq!(descriptor.band, None);
    }

    #[test]
    fn test_facility_extraction() {
        let mut item = ItemAttributes::new(Uuid::new_v4(), "Study Hub");
        item.shuttle = Some("operating daily".to_string());
        item.extra_info = "free parking, quiet lounge".to_string();

        let facility = extract_facility(&item);
        assert!(facility.has_shuttle);
        // 1.0 shuttle + 0.5 parking + 0.5 lounge.
        assert!((facility.facility_score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_region_cluster_assigned_from_coordinates() {
        let item = ItemAttributes::new(Uuid::new_v4(), "A").with_coordinates(37.55, 127.0);
        let location = extract_location(&item);
        assert_eq!(location.region_cluster, Some(RegionCluster::Metro));

        let bare = ItemAttributes::new(Uuid::new_v4(), "B");
        assert_eq!(extract_location(&bare).region_cluster, None);
    }

    #[tokio::test]
    async fn test_popularity_from_weighted_window() {
        let (builder, _, behavior, _) = builder();
        let item = ItemAttributes::new(Uuid::new_v4(), "Busy Academy");

        // 20 contacts at weight 3.0 = 60 -> 0.6 after the /100 normalize.
        for _ in 0..20 {
            behavior.push(BehaviorEvent::new(
                Some(Uuid::new_v4()),
                Some(item.id),
                ActionType::Contact,
            ));
        }

        let vector = builder.build(&item).await;
        assert!((vector.popularity_score - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_popularity_capped_at_five() {
        let (builder, _, behavior, _) = builder();
        let item = ItemAttributes::new(Uuid::new_v4(), "Viral Academy");

        for _ in 0..300 {
            behavior.push(BehaviorEvent::new(
                Some(Uuid::new_v4()),
                Some(item.id),
                ActionType::Contact,
            ));
        }

        let vector = builder.build(&item).await;
        assert!((vector.popularity_score - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_build_all_upserts_every_item() {
        let (builder, catalog, _, vectors) = builder();
        for i in 0..5 {
            catalog.insert(ItemAttributes::new(Uuid::new_v4(), format!("A{i}")));
        }

        let report = builder.build_all().await.unwrap();
        assert_eq!(report.processed, 5);
        assert_eq!(report.total_skipped(), 0);
        assert_eq!(vectors.all().await.unwrap().len(), 5);

        // Rebuild is an upsert, not an append.
        builder.build_all().await.unwrap();
        assert_eq!(vectors.all().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_shards_partition_the_catalog() {
        let (builder, catalog, _, vectors) = builder();
        for i in 0..8 {
            catalog.insert(ItemAttributes::new(Uuid::new_v4(), format!("A{i}")));
        }

        let a = builder.build_shard(0, 2).await.unwrap();
        let b = builder.build_shard(1, 2).await.unwrap();
        assert_eq!(a.processed + b.processed, 8);
        assert_eq!(vectors.all().await.unwrap().len(), 8);
    }
}
