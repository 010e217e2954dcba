//! Extraction of per-user preference profiles from behavioral history.

use crate::config::Config;
use crate::models::*;
use crate::stores::{BehaviorQuery, BehaviorStore, Catalog, ProfileStore};
use crate::taxonomy::{self, SubjectCategory};
use crate::utils;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Query-keyword matches are weaker evidence than a confirmed item
/// attribute.
const QUERY_MATCH_FACTOR: f64 = 0.8;

/// Blend factors for merging a fresh extraction into the stored profile.
const MERGE_OLD_WEIGHT: f64 = 0.7;
const MERGE_NEW_WEIGHT: f64 = 0.3;

pub struct PreferenceAnalyzer {
    behavior: Arc<dyn BehaviorStore>,
    catalog: Arc<dyn Catalog>,
    profiles: Arc<dyn ProfileStore>,
    config: Arc<Config>,
}

impl PreferenceAnalyzer {
    pub fn new(
        behavior: Arc<dyn BehaviorStore>,
        catalog: Arc<dyn Catalog>,
        profiles: Arc<dyn ProfileStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            behavior,
            catalog,
            profiles,
            config,
        }
    }

    /// Analyzes the user's recent behavior window, merges the result into
    /// any stored profile with exponential smoothing, and returns the
    /// merged profile. A store-level failure logs and yields an empty
    /// profile so downstream scoring can fall back to popularity.
    pub async fn extract(&self, user_id: Uuid) -> UserPreferenceProfile {
        let since = Utc::now() - Duration::days(self.config.analysis.window_days);
        let query = BehaviorQuery::for_user(user_id).since(since);

        let events = match self.behavior.query(&query).await {
            Ok(events) => events,
            Err(e) => {
                warn!(%user_id, error = %e, "behavior store unavailable, returning empty profile");
                return UserPreferenceProfile::new(user_id);
            }
        };

        // Per-event item lookups; a missing item skips that event only.
        let mut resolved: Vec<(BehaviorEvent, Option<ItemAttributes>)> = Vec::new();
        let mut skipped = 0usize;
        for event in events {
            let item = match event.item_id {
                Some(item_id) => match self.catalog.get(item_id).await {
                    Ok(item) => {
                        if item.is_none() {
                            skipped += 1;
                        }
                        item
                    }
                    Err(_) => {
                        skipped += 1;
                        None
                    }
                },
                None => None,
            };
            resolved.push((event, item));
        }
        if skipped > 0 {
            debug!(%user_id, skipped, "events skipped during preference extraction");
        }

        let mut fresh = UserPreferenceProfile::new(user_id);
        fresh.subject = self.analyze_subjects(&resolved);
        fresh.location = self.analyze_locations(&resolved);
        fresh.price = self.analyze_price(&resolved);
        fresh.teaching_method = self.analyze_teaching_methods(&resolved);

        let merged = self.merge_with_stored(fresh).await;
        if let Err(e) = self.profiles.upsert(&merged).await {
            warn!(%user_id, error = %e, "failed to persist preference profile");
        }
        merged
    }

    fn analyze_subjects(
        &self,
        resolved: &[(BehaviorEvent, Option<ItemAttributes>)],
    ) -> HashMap<SubjectCategory, f64> {
        let mut scores: HashMap<SubjectCategory, f64> = HashMap::new();

        for (event, item) in resolved {
            let weight = event.action.weight();

            for category in SubjectCategory::ALL {
                let mut score = 0.0;

                if let Some(item) = item {
                    for age in AgeGroup::ALL {
                        if let Some(listing) = item.subjects.get(&age) {
                            if category.matches(listing) {
                                score += weight;
                            }
                        }
                    }
                }

                if !event.search_query.is_empty() && category.matches(&event.search_query) {
                    score += weight * QUERY_MATCH_FACTOR;
                }

                if score > 0.0 {
                    *scores.entry(category).or_insert(0.0) += score;
                }
            }
        }

        utils::max_normalize(&mut scores);
        scores
    }

    fn analyze_locations(
        &self,
        resolved: &[(BehaviorEvent, Option<ItemAttributes>)],
    ) -> HashMap<String, f64> {
        let mut scores: HashMap<String, f64> = HashMap::new();

        for (event, item) in resolved {
            let Some(item) = item else { continue };
            let weight = event.action.weight();

            for region in [&item.province, &item.district, &item.road_address] {
                let token = clean_region_token(region);
                if !token.is_empty() {
                    *scores.entry(token).or_insert(0.0) += weight;
                }
            }
        }

        utils::max_normalize(&mut scores);
        scores
    }

    fn analyze_price(
        &self,
        resolved: &[(BehaviorEvent, Option<ItemAttributes>)],
    ) -> HashMap<PriceBand, f64> {
        let mut observed: Vec<(f64, f64)> = Vec::new();

        for (event, item) in resolved {
            let Some(item) = item else { continue };
            let Some(tuition) = &item.tuition else { continue };
            if let Some(fee) = utils::parse_fee(tuition) {
                if fee > 0.0 {
                    observed.push((fee, event.action.weight()));
                }
            }
        }

        if observed.is_empty() {
            return neutral_price_split();
        }

        let fees: Vec<f64> = observed.iter().map(|(fee, _)| *fee).collect();
        let p25 = utils::percentile(&fees, 0.25).unwrap_or(0.0);
        let p75 = utils::percentile(&fees, 0.75).unwrap_or(0.0);

        let mut low = 0.0;
        let mut medium = 0.0;
        let mut high = 0.0;
        for (fee, weight) in &observed {
            if *fee <= p25 {
                low += weight;
            } else if *fee <= p75 {
                medium += weight;
            } else {
                high += weight;
            }
        }

        let total = low + medium + high;
        if total <= 0.0 {
            return neutral_price_split();
        }

        let mut split = HashMap::new();
        split.insert(PriceBand::Low, low / total);
        split.insert(PriceBand::Medium, medium / total);
        split.insert(PriceBand::High, high / total);
        split
    }

    fn analyze_teaching_methods(
        &self,
        resolved: &[(BehaviorEvent, Option<ItemAttributes>)],
    ) -> HashMap<TeachingMethod, f64> {
        let mut scores: HashMap<TeachingMethod, f64> = HashMap::new();

        for (event, _) in resolved {
            if event.search_query.is_empty() {
                continue;
            }
            let query = event.search_query.to_lowercase();
            let weight = event.action.weight();

            for method in taxonomy::TEACHING_METHODS {
                if taxonomy::teaching_method_keywords(method)
                    .iter()
                    .any(|kw| query.contains(kw))
                {
                    *scores.entry(method).or_insert(0.0) += weight;
                }
            }
        }

        utils::max_normalize(&mut scores);
        scores
    }

    /// Blends each freshly extracted dimension into the stored profile:
    /// `old * 0.7 + new * 0.3` over the union of keys. Dimensions with no
    /// new data keep their stored values untouched.
    async fn merge_with_stored(&self, fresh: UserPreferenceProfile) -> UserPreferenceProfile {
        let stored = match self.profiles.get(fresh.user_id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(user_id = %fresh.user_id, error = %e, "profile store read failed");
                None
            }
        };

        let Some(mut merged) = stored else {
            return fresh;
        };

        if !fresh.subject.is_empty() {
            merged.subject = blend_maps(&merged.subject, &fresh.subject);
        }
        if !fresh.location.is_empty() {
            merged.location = blend_maps(&merged.location, &fresh.location);
        }
        if !fresh.price.is_empty() {
            merged.price = blend_maps(&merged.price, &fresh.price);
        }
        if !fresh.teaching_method.is_empty() {
            merged.teaching_method = blend_maps(&merged.teaching_method, &fresh.teaching_method);
        }
        merged.last_updated = Utc::now();
        merged
    }
}

fn neutral_price_split() -> HashMap<PriceBand, f64> {
    let mut split = HashMap::new();
    split.insert(PriceBand::Low, 0.3);
    split.insert(PriceBand::Medium, 0.4);
    split.insert(PriceBand::High, 0.3);
    split
}

/// Strips everything but alphanumerics and lowercases, so "Gangnam-gu" and
/// "gangnam gu" accumulate into one token.
pub(crate) fn clean_region_token(region: &str) -> String {
    region
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

fn blend_maps<K: std::hash::Hash + Eq + Clone>(
    old: &HashMap<K, f64>,
    new: &HashMap<K, f64>,
) -> HashMap<K, f64> {
    let mut merged = HashMap::new();
    for key in old.keys().chain(new.keys()) {
        if merged.contains_key(key) {
            continue;
        }
        let old_val = old.get(key).copied().unwrap_or(0.0);
        let new_val = new.get(key).copied().unwrap_or(0.0);
        merged.insert(
            key.clone(),
            old_val * MERGE_OLD_WEIGHT + new_val * MERGE_NEW_WEIGHT,
        );
    }
    merged
}
