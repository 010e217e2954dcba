use crate::error::{RecommendError, Result};
use crate::models::RecommendationContext;
use uuid::Uuid;

pub const MAX_RECOMMENDATION_LIMIT: usize = 50;
pub const MAX_SIMILAR_ITEMS_LIMIT: usize = 20;
pub const MAX_EXCLUDE_ITEMS: usize = 1000;

pub fn validate_recommendation_request(
    user_id: Uuid,
    limit: usize,
    context: &RecommendationContext,
) -> Result<()> {
    if user_id.is_nil() {
        return Err(RecommendError::validation("user id cannot be nil"));
    }

    if limit == 0 || limit > MAX_RECOMMENDATION_LIMIT {
        return Err(RecommendError::validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_RECOMMENDATION_LIMIT, limit
        )));
    }

    if context.exclude_item_ids.len() > MAX_EXCLUDE_ITEMS {
        return Err(RecommendError::validation(format!(
            "too many excluded items (max {})",
            MAX_EXCLUDE_ITEMS
        )));
    }

    for item_id in &context.exclude_item_ids {
        if item_id.is_nil() {
            return Err(RecommendError::validation("excluded item id cannot be nil"));
        }
    }

    if context.session_id.len() > 100 {
        return Err(RecommendError::validation(
            "session id too long (max 100 characters)",
        ));
    }

    Ok(())
}

pub fn validate_similar_items_request(item_id: Uuid, limit: usize) -> Result<()> {
    if item_id.is_nil() {
        return Err(RecommendError::validation("item id cannot be nil"));
    }

    if limit == 0 || limit > MAX_SIMILAR_ITEMS_LIMIT {
        return Err(RecommendError::validation(format!(
            "limit must be between 1 and {}, got {}",
            MAX_SIMILAR_ITEMS_LIMIT, limit
        )));
    }

    Ok(())
}

pub fn validate_feedback_score(score: u8) -> Result<()> {
    if !(1..=5).contains(&score) {
        return Err(RecommendError::validation(format!(
            "feedback score must be between 1 and 5, got {}",
            score
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_recommendation_request() {
        let ctx = RecommendationContext::default();
        assert!(validate_recommendation_request(Uuid::new_v4(), 10, &ctx).is_ok());
        assert!(validate_recommendation_request(Uuid::nil(), 10, &ctx).is_err());
        assert!(validate_recommendation_request(Uuid::new_v4(), 0, &ctx).is_err());
        assert!(validate_recommendation_request(Uuid::new_v4(), 51, &ctx).is_err());

        let bad_ctx = RecommendationContext {
            exclude_item_ids: vec![Uuid::nil()],
            ..Default::default()
        };
        assert!(validate_recommendation_request(Uuid::new_v4(), 10, &bad_ctx).is_err());
    }

    #[test]
    fn test_validate_similar_items_request() {
        assert!(validate_similar_items_request(Uuid::new_v4(), 20).is_ok());
        assert!(validate_similar_items_request(Uuid::new_v4(), 21).is_err());
        assert!(validate_similar_items_request(Uuid::nil(), 5).is_err());
    }

    #[test]
    fn test_validate_feedback_score() {
        assert!(validate_feedback_score(1).is_ok());
        assert!(validate_feedback_score(5).is_ok());
        assert!(validate_feedback_score(0).is_err());
        assert!(validate_feedback_score(6).is_err());
    }
}
