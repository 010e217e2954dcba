use thiserror::Error;
use uuid::Uuid;

/// Caller-visible failures. Everything else is absorbed locally with a log
/// entry: a well-formed recommendation request must always return something.
#[derive(Debug, Error)]
pub enum RecommendError {
    /// Malformed caller input, rejected before any computation runs.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced user or item absent from its store.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: Uuid },

    /// A collaborator store or cache is unreachable. Cache failures degrade
    /// to direct computation; store failures degrade to popularity-only.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl RecommendError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RecommendError::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        RecommendError::NotFound { kind, id }
    }
}

pub type Result<T> = std::result::Result<T, RecommendError>;

/// Why a single unit of a sweep (one event, item or pair) was dropped.
/// Skips never abort the surrounding sweep; they are counted and logged in
/// aggregate instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    ItemMissing,
    VectorMissing,
    AnonymousEvent,
    Unparsable,
    StoreError,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SkipReason::ItemMissing => "item_missing",
            SkipReason::VectorMissing => "vector_missing",
            SkipReason::AnonymousEvent => "anonymous_event",
            SkipReason::Unparsable => "unparsable",
            SkipReason::StoreError => "store_error",
        };
        f.write_str(name)
    }
}
