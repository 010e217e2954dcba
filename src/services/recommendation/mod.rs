//! Hybrid ranking engine. Combines three candidate generators (content
//! profile match, collaborative neighbors, popularity fallback), blends their
//! raw scores with diversity and freshness bonuses, persists the served rows
//! and caches the response.

use crate::config::Config;
use crate::error::{RecommendError, Result as RecResult};
use crate::models::*;
use crate::services::features::FeatureVectorBuilder;
use crate::services::preference::{clean_region_token, PreferenceAnalyzer};
use crate::services::similarity::SimilarityEngine;
use crate::services::SweepReport;
use crate::stores::{
    BehaviorQuery, BehaviorStore, Catalog, RecommendationCache, RecommendationStore,
    SimilarityStore, VectorStore,
};
use crate::utils::validation;
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

const RAW_WEIGHT: f64 = 0.8;
const DIVERSITY_WEIGHT: f64 = 0.1;
const FRESHNESS_WEIGHT: f64 = 0.1;

/// Content score blend over the four profile dimensions.
const SUBJECT_WEIGHT: f64 = 0.4;
const LOCATION_WEIGHT: f64 = 0.3;
const PRICE_WEIGHT: f64 = 0.2;
const QUALITY_WEIGHT: f64 = 0.1;

/// Price match for an item whose fee band is unknown.
const UNKNOWN_PRICE_MATCH: f64 = 0.3;

/// Item scores live on a 0-5 platform scale; quality terms are brought back
/// to 0-1 before blending.
const SCORE_SCALE: f64 = 5.0;

/// Freshness decays linearly over this window down to the floor.
const FRESHNESS_WINDOW_DAYS: f64 = 30.0;
const FRESHNESS_DECAY: f64 = 0.3;
const FRESHNESS_FLOOR: f64 = 0.7;

const CACHE_KEY_PREFIX: &str = "recommendations:";

struct Candidate {
    item_id: Uuid,
    raw_score: f64,
    reason_type: ReasonType,
    reason_details: serde_json::Value,
}

pub struct RecommendationEngine {
    analyzer: Arc<PreferenceAnalyzer>,
    feature_builder: Arc<FeatureVectorBuilder>,
    similarity: Arc<SimilarityEngine>,
    behavior: Arc<dyn BehaviorStore>,
    catalog: Arc<dyn Catalog>,
    vectors: Arc<dyn VectorStore>,
    similarities: Arc<dyn SimilarityStore>,
    recommendations: Arc<dyn RecommendationStore>,
    cache: Arc<dyn RecommendationCache>,
    config: Arc<Config>,
}

impl RecommendationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        analyzer: Arc<PreferenceAnalyzer>,
        feature_builder: Arc<FeatureVectorBuilder>,
        similarity: Arc<SimilarityEngine>,
        behavior: Arc<dyn BehaviorStore>,
        catalog: Arc<dyn Catalog>,
        vectors: Arc<dyn VectorStore>,
        similarities: Arc<dyn SimilarityStore>,
        recommendations: Arc<dyn RecommendationStore>,
        cache: Arc<dyn RecommendationCache>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            analyzer,
            feature_builder,
            similarity,
            behavior,
            catalog,
            vectors,
            similarities,
            recommendations,
            cache,
            config,
        }
    }

    /// Serves a ranked, deduplicated recommendation list for the user.
    /// Cache and behavior-store failures degrade gracefully; only malformed
    /// input is an error.
    pub async fn get_recommendations(
        &self,
        user_id: Uuid,
        limit: usize,
        context: &RecommendationContext,
    ) -> RecResult<Vec<RecommendedItem>> {
        validation::validate_recommendation_request(user_id, limit, context)?;
        if !context.exclude_item_ids.is_empty() {
            self.verify_exclusions(context).await?;
        }
        let started = Instant::now();

        let cache_key = format!("{CACHE_KEY_PREFIX}{user_id}:{limit}");
        if let Some(cached) = self.cache_lookup(&cache_key).await {
            info!(%user_id, limit, "recommendation cache hit");
            return Ok(cached);
        }

        let profile = self.analyzer.extract(user_id).await;
        let interacted = self.interacted_items(user_id).await;

        let (catalog_rows, vector_rows) = futures::join!(self.catalog.all(), self.vectors.all());

        // Items the user already engaged with are out of every candidate
        // pool; recommending them back carries no information.
        let items: HashMap<Uuid, ItemAttributes> = catalog_rows
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?
            .into_iter()
            .filter(|item| Self::passes_context_filters(item, context))
            .filter(|item| !context.exclude_item_ids.contains(&item.id))
            .filter(|item| !interacted.contains(&item.id))
            .map(|item| (item.id, item))
            .collect();

        let vectors: HashMap<Uuid, ItemFeatureVector> = match vector_rows {
            Ok(all) => all
                .into_iter()
                .filter(|v| items.contains_key(&v.item_id))
                .map(|v| (v.item_id, v))
                .collect(),
            Err(e) => {
                warn!(error = %e, "vector store unavailable, ranking without vectors");
                HashMap::new()
            }
        };

        // First-wins dedupe order: content, then collaborative, then the
        // popularity top-up.
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();

        if profile_has_signal(&profile) {
            for candidate in self.score_content(&profile, &items, &vectors) {
                if seen.insert(candidate.item_id) {
                    candidates.push(candidate);
                }
            }
        }

        for candidate in self.score_collaborative(user_id, &items).await {
            if seen.insert(candidate.item_id) {
                candidates.push(candidate);
            }
        }

        if candidates.len() < limit {
            for candidate in self.score_popularity(&items, &vectors) {
                if seen.insert(candidate.item_id) {
                    candidates.push(candidate);
                }
                if candidates.len() >= limit {
                    break;
                }
            }
        }

        let mut ranked: Vec<(Candidate, f64)> = candidates
            .into_iter()
            .map(|c| {
                let freshness = items
                    .get(&c.item_id)
                    .map(|item| freshness_score(item))
                    .unwrap_or(FRESHNESS_FLOOR);
                let final_score = c.raw_score.clamp(0.0, 1.0) * RAW_WEIGHT
                    + c.reason_type.diversity_bonus() * DIVERSITY_WEIGHT
                    + freshness * FRESHNESS_WEIGHT;
                (c, final_score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);

        let mut results = Vec::with_capacity(ranked.len());
        for (rank, (candidate, final_score)) in ranked.into_iter().enumerate() {
            let name = items
                .get(&candidate.item_id)
                .map(|item| item.name.as_str())
                .unwrap_or("this academy");
            let explanation = explanation_for(candidate.reason_type, name);

            let row = RankedRecommendation {
                id: Uuid::new_v4(),
                user_id,
                item_id: candidate.item_id,
                model: self.config.recommendation.model_tag.clone(),
                session_id: context.session_id.clone(),
                confidence: candidate.raw_score.clamp(0.0, 1.0),
                relevance: final_score.clamp(0.0, 1.0),
                final_score,
                reason_type: candidate.reason_type,
                reason_details: candidate.reason_details.clone(),
                explanation: explanation.clone(),
                rank: rank + 1,
                served_at: Utc::now(),
                is_clicked: false,
                clicked_at: None,
                feedback_score: None,
                feedback_comment: None,
            };
            if let Err(e) = self.recommendations.upsert(&row).await {
                warn!(%user_id, item_id = %candidate.item_id, error = %e, "failed to persist recommendation");
            }

            results.push(RecommendedItem {
                item_id: candidate.item_id,
                final_score,
                confidence: candidate.raw_score.clamp(0.0, 1.0),
                reason_type: candidate.reason_type,
                explanation,
                reason_details: candidate.reason_details,
            });
        }

        self.cache_store(&cache_key, &results).await;

        info!(
            %user_id,
            limit,
            returned = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recommendations served"
        );
        Ok(results)
    }

    /// Precomputed similarity rows for one item, highest overall first.
    pub async fn get_similar_items(&self, item_id: Uuid, limit: usize) -> RecResult<Vec<SimilarItem>> {
        validation::validate_similar_items_request(item_id, limit)?;

        let exists = self
            .catalog
            .get(item_id)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?;
        if exists.is_none() {
            return Err(RecommendError::not_found("item", item_id));
        }

        let rows = self
            .similarities
            .for_item(item_id)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?;

        let mut similar: Vec<SimilarItem> = rows
            .into_iter()
            .map(|row| SimilarItem {
                item_id: if row.item_a == item_id {
                    row.item_b
                } else {
                    row.item_a
                },
                overall_similarity: row.overall_similarity,
                content_similarity: row.content_similarity,
                location_similarity: row.location_similarity,
                behavioral_similarity: row.behavioral_similarity,
            })
            .collect();
        similar.sort_by(|a, b| {
            b.overall_similarity
                .partial_cmp(&a.overall_similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        similar.truncate(limit);
        Ok(similar)
    }

    pub async fn record_feedback(
        &self,
        recommendation_id: Uuid,
        score: u8,
        comment: Option<String>,
    ) -> RecResult<()> {
        validation::validate_feedback_score(score)?;

        let mut row = self
            .recommendations
            .get(recommendation_id)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?
            .ok_or_else(|| RecommendError::not_found("recommendation", recommendation_id))?;

        row.add_feedback(score, comment);
        self.recommendations
            .save(&row)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn record_click(&self, recommendation_id: Uuid) -> RecResult<()> {
        let mut row = self
            .recommendations
            .get(recommendation_id)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?
            .ok_or_else(|| RecommendError::not_found("recommendation", recommendation_id))?;

        row.mark_clicked();
        self.recommendations
            .save(&row)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?;
        Ok(())
    }

    pub async fn rebuild_feature_vectors(&self) -> RecResult<SweepReport> {
        Ok(self.feature_builder.build_all().await?)
    }

    pub async fn recalculate_similarities(&self) -> RecResult<SweepReport> {
        Ok(self.similarity.calculate_all().await?)
    }

    pub async fn clear_recommendation_cache(&self) -> RecResult<()> {
        self.cache
            .delete_prefix(CACHE_KEY_PREFIX)
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Rejects exclude lists that name items the catalog has never seen.
    async fn verify_exclusions(&self, context: &RecommendationContext) -> RecResult<()> {
        let known: HashSet<Uuid> = self
            .catalog
            .all()
            .await
            .map_err(|e| RecommendError::DependencyUnavailable(e.to_string()))?
            .into_iter()
            .map(|item| item.id)
            .collect();
        if let Some(unknown) = context
            .exclude_item_ids
            .iter()
            .find(|id| !known.contains(id))
        {
            return Err(RecommendError::validation(format!(
                "unknown item id in exclude list: {unknown}"
            )));
        }
        Ok(())
    }

    /// Every item the user has touched, regardless of action or age. A flaky
    /// behavior store degrades to an empty set rather than failing the request.
    async fn interacted_items(&self, user_id: Uuid) -> HashSet<Uuid> {
        let query = BehaviorQuery::for_user(user_id);
        match self.behavior.query(&query).await {
            Ok(events) => events.into_iter().filter_map(|e| e.item_id).collect(),
            Err(e) => {
                warn!(%user_id, error = %e, "behavior store unavailable, skipping interaction filter");
                HashSet::new()
            }
        }
    }

    fn score_content(
        &self,
        profile: &UserPreferenceProfile,
        items: &HashMap<Uuid, ItemAttributes>,
        vectors: &HashMap<Uuid, ItemFeatureVector>,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        for item in items.values() {
            let subject = subject_match(profile, item);
            let location = location_match(profile, item);
            let vector = vectors.get(&item.id);
            let price = vector.map(|v| price_match(profile, v)).unwrap_or(0.0);
            let quality = vector.map(quality_score).unwrap_or(0.0);

            let raw = subject * SUBJECT_WEIGHT
                + location * LOCATION_WEIGHT
                + price * PRICE_WEIGHT
                + quality * QUALITY_WEIGHT;
            if raw <= 0.0 {
                continue;
            }

            candidates.push(Candidate {
                item_id: item.id,
                raw_score: raw,
                reason_type: ReasonType::ContentMatch,
                reason_details: json!({
                    "subject_match": subject,
                    "location_match": location,
                    "price_match": price,
                    "quality_score": quality,
                }),
            });
        }
        candidates
    }

    /// Neighbor lookup over strong-intent item sets. A flaky behavior store
    /// yields no neighbors, which leaves the popularity path to fill in.
    async fn score_collaborative(
        &self,
        user_id: Uuid,
        items: &HashMap<Uuid, ItemAttributes>,
    ) -> Vec<Candidate> {
        let since = Utc::now() - Duration::days(self.config.analysis.window_days);
        let strong = [ActionType::View, ActionType::Contact, ActionType::Bookmark];
        let query = BehaviorQuery::default().with_actions(&strong).since(since);

        let events = match self.behavior.query(&query).await {
            Ok(events) => events,
            Err(e) => {
                warn!(%user_id, error = %e, "behavior store unavailable, skipping collaborative scoring");
                return Vec::new();
            }
        };

        // Per-user strong-intent item sets for the Jaccard overlap, plus the
        // full per-user event list for weighting. Every event counts: three
        // views carry more signal than one bookmark.
        let mut item_sets: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        let mut events_by_user: HashMap<Uuid, Vec<(Uuid, ActionType)>> = HashMap::new();
        for event in &events {
            let (Some(uid), Some(iid)) = (event.user_id, event.item_id) else {
                continue;
            };
            item_sets.entry(uid).or_default().insert(iid);
            events_by_user.entry(uid).or_default().push((iid, event.action));
        }

        let Some(own_items) = item_sets.get(&user_id).cloned() else {
            return Vec::new();
        };

        let mut neighbors: Vec<(Uuid, f64)> = item_sets
            .iter()
            .filter(|(uid, _)| **uid != user_id)
            .map(|(uid, set)| (*uid, crate::utils::jaccard(&own_items, set)))
            .filter(|(_, sim)| *sim > self.config.recommendation.neighbor_similarity_threshold)
            .collect();
        neighbors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        neighbors.truncate(self.config.recommendation.max_neighbors);

        let mut scores: HashMap<Uuid, f64> = HashMap::new();
        let mut supporters: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        for (neighbor_id, similarity) in &neighbors {
            let Some(neighbor_events) = events_by_user.get(neighbor_id) else {
                continue;
            };
            for (item_id, action) in neighbor_events {
                if own_items.contains(item_id) || !items.contains_key(item_id) {
                    continue;
                }
                *scores.entry(*item_id).or_default() +=
                    similarity * collaborative_weight(*action);
                supporters.entry(*item_id).or_default().insert(*neighbor_id);
            }
        }

        // Raw scores stay unnormalized here; merging clamps them to [0, 1].
        scores
            .into_iter()
            .map(|(item_id, raw)| Candidate {
                item_id,
                raw_score: raw,
                reason_type: ReasonType::SimilarUsers,
                reason_details: json!({
                    "neighbor_count": neighbors.len(),
                    "supporting_neighbors": supporters
                        .get(&item_id)
                        .map(HashSet::len)
                        .unwrap_or(0),
                }),
            })
            .collect()
    }

    /// Cold-start fallback ordered by popularity and rating. Only used to
    /// top the list up to the requested size.
    fn score_popularity(
        &self,
        items: &HashMap<Uuid, ItemAttributes>,
        vectors: &HashMap<Uuid, ItemFeatureVector>,
    ) -> Vec<Candidate> {
        let mut scored: Vec<Candidate> = items
            .values()
            .map(|item| {
                let (popularity, rating) = vectors
                    .get(&item.id)
                    .map(|v| (v.popularity_score, v.rating_score))
                    .unwrap_or((0.0, 0.0));
                let raw = 0.7 * (popularity / SCORE_SCALE) + 0.3 * (rating / SCORE_SCALE);
                Candidate {
                    item_id: item.id,
                    raw_score: raw,
                    reason_type: ReasonType::Popularity,
                    reason_details: json!({
                        "popularity_score": popularity,
                        "rating_score": rating,
                    }),
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }

    fn passes_context_filters(item: &ItemAttributes, context: &RecommendationContext) -> bool {
        if let Some(location) = &context.location_filter {
            let needle = clean_region_token(location);
            let haystack = format!(
                "{}{}",
                clean_region_token(&item.province),
                clean_region_token(&item.district)
            );
            if !needle.is_empty() && !haystack.contains(&needle) {
                return false;
            }
        }

        if let Some(category) = context.subject_filter {
            let matched = item.subjects.values().any(|text| category.matches(text));
            if !matched {
                return false;
            }
        }

        true
    }

    async fn cache_lookup(&self, key: &str) -> Option<Vec<RecommendedItem>> {
        match self.cache.get(key).await {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(results) => Some(results),
                Err(e) => {
                    warn!(key, error = %e, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "recommendation cache unavailable");
                None
            }
        }
    }

    async fn cache_store(&self, key: &str, results: &[RecommendedItem]) {
        let payload = match serde_json::to_string(results) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize recommendations for cache");
                return;
            }
        };
        let ttl = std::time::Duration::from_secs(self.config.recommendation.cache_ttl_seconds);
        if let Err(e) = self.cache.set(key, &payload, ttl).await {
            warn!(key, error = %e, "recommendation cache write failed");
        }
    }
}

/// A profile with only the neutral price split carries no real evidence, so
/// content scoring is skipped and the list comes from the other generators.
fn profile_has_signal(profile: &UserPreferenceProfile) -> bool {
    !profile.subject.is_empty()
        || !profile.location.is_empty()
        || !profile.teaching_method.is_empty()
}

/// Sum of profile weights whose category matches any of the item's subject
/// listings, capped at 1.0.
fn subject_match(profile: &UserPreferenceProfile, item: &ItemAttributes) -> f64 {
    let mut score = 0.0;
    for (category, weight) in &profile.subject {
        if item.subjects.values().any(|text| category.matches(text)) {
            score += weight;
        }
    }
    score.min(1.0)
}

fn location_match(profile: &UserPreferenceProfile, item: &ItemAttributes) -> f64 {
    let haystack = format!(
        "{}{}{}",
        clean_region_token(&item.province),
        clean_region_token(&item.district),
        clean_region_token(&item.road_address)
    );

    let mut score = 0.0;
    for (token, weight) in &profile.location {
        if !token.is_empty() && haystack.contains(token.as_str()) {
            score += weight;
        }
    }
    score.min(1.0)
}

fn price_match(profile: &UserPreferenceProfile, vector: &ItemFeatureVector) -> f64 {
    match vector.price.band {
        Some(band) => profile.price.get(&band).copied().unwrap_or(0.0),
        None => UNKNOWN_PRICE_MATCH,
    }
}

fn quality_score(vector: &ItemFeatureVector) -> f64 {
    let blended = 0.5 * vector.popularity_score
        + 0.3 * vector.rating_score
        + 0.2 * vector.engagement_score;
    (blended / SCORE_SCALE).min(1.0)
}

fn collaborative_weight(action: ActionType) -> f64 {
    match action {
        ActionType::Contact => 3.0,
        ActionType::Bookmark => 2.0,
        _ => 1.0,
    }
}

/// Linear recency decay on the item's last catalog update, floored so stale
/// listings are discounted but never buried.
fn freshness_score(item: &ItemAttributes) -> f64 {
    let days = (Utc::now() - item.updated_at).num_days() as f64;
    if days <= 0.0 {
        return 1.0;
    }
    let fresh = 1.0 - (days / FRESHNESS_WINDOW_DAYS) * FRESHNESS_DECAY;
    fresh.max(FRESHNESS_FLOOR)
}

fn explanation_for(reason: ReasonType, item_name: &str) -> String {
    match reason {
        ReasonType::ContentMatch => {
            format!("{item_name} matches your subject and location preferences")
        }
        ReasonType::SimilarUsers => {
            format!("Users with similar interests also engaged with {item_name}")
        }
        ReasonType::Popularity => format!("{item_name} is popular right now"),
    }
}
