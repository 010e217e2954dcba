//! Declarative keyword tables driving subject, teaching-method and facility
//! extraction. New categories or keywords are data edits here, not logic
//! changes in the services.

use crate::models::{RegionCluster, TeachingMethod};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectCategory {
    Math,
    English,
    Language,
    Science,
    Arts,
    Sports,
    Coding,
}

impl SubjectCategory {
    pub const ALL: [SubjectCategory; 7] = [
        SubjectCategory::Math,
        SubjectCategory::English,
        SubjectCategory::Language,
        SubjectCategory::Science,
        SubjectCategory::Arts,
        SubjectCategory::Sports,
        SubjectCategory::Coding,
    ];

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            SubjectCategory::Math => &["math", "mathematics", "arithmetic", "algebra", "calculus"],
            SubjectCategory::English => &["english", "conversation", "esl", "toefl"],
            SubjectCategory::Language => &["language", "essay", "writing", "literature", "reading"],
            SubjectCategory::Science => &["science", "physics", "chemistry", "biology"],
            SubjectCategory::Arts => &["art", "music", "piano", "violin", "drawing"],
            SubjectCategory::Sports => &["sports", "taekwondo", "swimming", "soccer", "gym"],
            SubjectCategory::Coding => &["computer", "it", "coding", "programming", "robotics"],
        }
    }

    /// Whether any of this category's keywords occur in the given text.
    /// Matching is case-insensitive substring lookup over the keyword table.
    pub fn matches(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.keywords().iter().any(|kw| lower.contains(kw))
    }
}

pub fn teaching_method_keywords(method: TeachingMethod) -> &'static [&'static str] {
    match method {
        TeachingMethod::Group => &["group", "class", "collective"],
        TeachingMethod::Individual => &["individual", "1:1", "private", "tailored"],
        TeachingMethod::Online => &["online", "remote", "video", "virtual"],
        TeachingMethod::Offline => &["offline", "in-person", "on-site", "visit"],
    }
}

pub const TEACHING_METHODS: [TeachingMethod; 4] = [
    TeachingMethod::Group,
    TeachingMethod::Individual,
    TeachingMethod::Online,
    TeachingMethod::Offline,
];

/// Affirmative markers in a free-text shuttle service field.
pub const SHUTTLE_POSITIVE_KEYWORDS: &[&str] = &["yes", "y", "o", "available", "operating", "runs"];

/// Amenity keywords scanned in the item's free text; each hit adds 0.5 to
/// the facility score.
pub const FACILITY_KEYWORDS: &[&str] = &[
    "parking",
    "cafe",
    "lounge",
    "library",
    "study room",
    "self-study",
];

/// Coarse region buckets over fixed bounding boxes so most pairwise location
/// comparisons avoid a full geodesic computation.
pub fn region_cluster(lat: f64, lng: f64) -> RegionCluster {
    if (37.4..=37.7).contains(&lat) && (126.8..=127.2).contains(&lng) {
        RegionCluster::Metro
    } else if (37.2..=37.5).contains(&lat) && (126.8..=127.0).contains(&lng) {
        RegionCluster::SouthBelt
    } else if (37.5..=37.8).contains(&lat) && (126.7..=127.2).contains(&lng) {
        RegionCluster::NorthBelt
    } else {
        RegionCluster::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_matching() {
        assert!(SubjectCategory::Math.matches("Algebra and Calculus prep"));
        assert!(SubjectCategory::Coding.matches("after-school coding club"));
        assert!(!SubjectCategory::Math.matches("english conversation"));
    }

    #[test]
    fn test_region_cluster_boxes() {
        assert_eq!(region_cluster(37.55, 127.0), RegionCluster::Metro);
        assert_eq!(region_cluster(37.3, 126.9), RegionCluster::SouthBelt);
        assert_eq!(region_cluster(35.0, 129.0), RegionCluster::Other);
    }
}
