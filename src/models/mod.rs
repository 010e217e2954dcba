use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Behavioral signal recorded by the surrounding platform. Events are
/// immutable and owned by the external behavior store; the engine only
/// reads windows of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorEvent {
    /// None for anonymous sessions.
    pub user_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub action: ActionType,
    pub search_query: String,
    pub filter_criteria: serde_json::Value,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    /// Dwell time in seconds.
    pub duration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    View,
    Search,
    Filter,
    Contact,
    Bookmark,
    Click,
    Share,
    Review,
}

impl ActionType {
    /// Evidentiary weight of the action. Contact, review and bookmark carry
    /// far more weight than passive browsing.
    pub fn weight(&self) -> f64 {
        match self {
            ActionType::View => 1.0,
            ActionType::Search => 0.8,
            ActionType::Filter => 0.9,
            ActionType::Contact => 3.0,
            ActionType::Bookmark => 2.0,
            ActionType::Click => 1.2,
            ActionType::Share => 1.5,
            ActionType::Review => 2.5,
        }
    }

    /// Actions that signal genuine interest versus passive browsing. These
    /// define the user sets for behavioral similarity and neighbor lookup.
    pub fn is_strong_intent(&self) -> bool {
        matches!(
            self,
            ActionType::View | ActionType::Contact | ActionType::Bookmark
        )
    }
}

/// Age bands an academy's subject listings are grouped under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeGroup {
    Preschool,
    Elementary,
    Middle,
    High,
    Adult,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 5] = [
        AgeGroup::Preschool,
        AgeGroup::Elementary,
        AgeGroup::Middle,
        AgeGroup::High,
        AgeGroup::Adult,
    ];
}

/// Catalog item as owned by the external catalog store. Read-only here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAttributes {
    pub id: Uuid,
    pub name: String,
    /// Comma-separated subject listing per age band.
    pub subjects: HashMap<AgeGroup, String>,
    pub province: String,
    pub district: String,
    pub road_address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Free-text tuition description, absent when the academy publishes none.
    pub tuition: Option<String>,
    /// Free-text shuttle service description.
    pub shuttle: Option<String>,
    pub extra_info: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceBand {
    Low,
    Medium,
    High,
}

impl PriceBand {
    pub const ORDERED: [PriceBand; 3] = [PriceBand::Low, PriceBand::Medium, PriceBand::High];

    pub fn index(&self) -> usize {
        match self {
            PriceBand::Low => 0,
            PriceBand::Medium => 1,
            PriceBand::High => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeachingMethod {
    Group,
    Individual,
    Online,
    Offline,
}

/// Weighted preference profile extracted from a user's behavior window.
/// Mutated only by the analyzer's smoothing merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreferenceProfile {
    pub user_id: Uuid,
    pub subject: HashMap<crate::taxonomy::SubjectCategory, f64>,
    pub location: HashMap<String, f64>,
    pub price: HashMap<PriceBand, f64>,
    pub teaching_method: HashMap<TeachingMethod, f64>,
    pub last_updated: DateTime<Utc>,
}

impl UserPreferenceProfile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            subject: HashMap::new(),
            location: HashMap::new(),
            price: HashMap::new(),
            teaching_method: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subject.is_empty()
            && self.location.is_empty()
            && self.price.is_empty()
            && self.teaching_method.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionCluster {
    Metro,
    SouthBelt,
    NorthBelt,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationDescriptor {
    pub province: String,
    pub district: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub region_cluster: Option<RegionCluster>,
}

impl LocationDescriptor {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceDescriptor {
    pub has_fee_info: bool,
    /// None means unknown. Absence of fee info is itself informative and is
    /// never collapsed to a zero fee.
    pub band: Option<PriceBand>,
    pub fee_value: f64,
}

impl PriceDescriptor {
    pub fn unknown() -> Self {
        Self {
            has_fee_info: false,
            band: None,
            fee_value: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilityDescriptor {
    pub has_shuttle: bool,
    pub facility_score: f64,
}

impl FacilityDescriptor {
    /// Closed-key numeric view used for cosine comparison between items.
    pub fn as_map(&self) -> HashMap<&'static str, f64> {
        let mut map = HashMap::new();
        map.insert("shuttle", if self.has_shuttle { 1.0 } else { 0.0 });
        map.insert("facility_score", self.facility_score);
        map
    }
}

pub const VECTOR_SCHEMA_VERSION: &str = "1.0";

/// Normalized per-item feature summary, rebuilt wholesale on each batch
/// sweep. One row per item, upserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemFeatureVector {
    pub item_id: Uuid,
    /// Strength per age band: count of comma-separated subject sub-values.
    pub subject: HashMap<AgeGroup, f64>,
    pub location: LocationDescriptor,
    pub price: PriceDescriptor,
    pub facility: FacilityDescriptor,
    /// 0-5 scale, comparable to the platform's 5-point rating.
    pub popularity_score: f64,
    pub rating_score: f64,
    pub engagement_score: f64,
    pub schema_version: String,
    pub last_updated: DateTime<Utc>,
}

/// Pairwise similarity record. Canonical order: `item_a < item_b` always;
/// callers must normalize pair order before lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSimilarity {
    pub item_a: Uuid,
    pub item_b: Uuid,
    pub content_similarity: f64,
    pub location_similarity: f64,
    pub behavioral_similarity: f64,
    pub overall_similarity: f64,
    pub method: String,
    pub computed_at: DateTime<Utc>,
}

impl ItemSimilarity {
    /// Lower id first, making lookups order-independent.
    pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonType {
    ContentMatch,
    SimilarUsers,
    Popularity,
}

impl ReasonType {
    pub fn diversity_bonus(&self) -> f64 {
        match self {
            ReasonType::SimilarUsers => 0.9,
            ReasonType::ContentMatch => 0.8,
            ReasonType::Popularity => 0.5,
        }
    }
}

/// Persisted unit of a served recommendation. Upserted keyed by
/// (user, item, model, session); the unit a client can later attach
/// feedback and click events to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedRecommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub model: String,
    pub session_id: String,
    pub confidence: f64,
    pub relevance: f64,
    pub final_score: f64,
    pub reason_type: ReasonType,
    pub reason_details: serde_json::Value,
    pub explanation: String,
    pub rank: usize,
    pub served_at: DateTime<Utc>,
    pub is_clicked: bool,
    pub clicked_at: Option<DateTime<Utc>>,
    pub feedback_score: Option<u8>,
    pub feedback_comment: Option<String>,
}

impl RankedRecommendation {
    pub fn mark_clicked(&mut self) {
        self.is_clicked = true;
        self.clicked_at = Some(Utc::now());
    }

    pub fn add_feedback(&mut self, score: u8, comment: Option<String>) {
        self.feedback_score = Some(score);
        self.feedback_comment = comment;
    }
}

/// Caller-supplied request context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationContext {
    pub session_id: String,
    pub exclude_item_ids: Vec<Uuid>,
    pub location_filter: Option<String>,
    pub subject_filter: Option<crate::taxonomy::SubjectCategory>,
}

/// Slim result shape returned to callers, sorted by final score descending
/// with no duplicate item ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedItem {
    pub item_id: Uuid,
    pub final_score: f64,
    pub confidence: f64,
    pub reason_type: ReasonType,
    pub explanation: String,
    pub reason_details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarItem {
    pub item_id: Uuid,
    pub overall_similarity: f64,
    pub content_similarity: f64,
    pub location_similarity: f64,
    pub behavioral_similarity: f64,
}

impl BehaviorEvent {
    pub fn new(user_id: Option<Uuid>, item_id: Option<Uuid>, action: ActionType) -> Self {
        Self {
            user_id,
            item_id,
            action,
            search_query: String::new(),
            filter_criteria: serde_json::Value::Null,
            session_id: String::new(),
            timestamp: Utc::now(),
            duration: 0,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = query.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration = seconds;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl ItemAttributes {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            subjects: HashMap::new(),
            province: String::new(),
            district: String::new(),
            road_address: String::new(),
            latitude: None,
            longitude: None,
            tuition: None,
            shuttle: None,
            extra_info: String::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_subject(mut self, age: AgeGroup, listing: impl Into<String>) -> Self {
        self.subjects.insert(age, listing.into());
        self
    }

    pub fn with_region(mut self, province: impl Into<String>, district: impl Into<String>) -> Self {
        self.province = province.into();
        self.district = district.into();
        self
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn with_tuition(mut self, tuition: impl Into<String>) -> Self {
        self.tuition = Some(tuition.into());
        self
    }
}
