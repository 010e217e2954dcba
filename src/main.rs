use acadrec::services::SweepReport;
use acadrec::taxonomy::SubjectCategory;
use acadrec::{init_tracing, AppState, Config, RecommendError, RecommendationContext};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
    session_id: Option<String>,
    exclude_items: Option<String>,
    location: Option<String>,
    subject: Option<SubjectCategory>,
}

#[derive(Debug, Deserialize)]
struct SimilarItemsQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct FeedbackBody {
    score: u8,
    comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }
}

impl ApiResponse<()> {
    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

fn reject(e: RecommendError) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = match &e {
        RecommendError::Validation(_) => StatusCode::BAD_REQUEST,
        RecommendError::NotFound { .. } => StatusCode::NOT_FOUND,
        RecommendError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RecommendError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("request failed: {}", e);
    }
    (status, Json(ApiResponse::error(e.to_string())))
}

fn sweep_summary(report: &SweepReport) -> serde_json::Value {
    let skipped: HashMap<String, usize> = report
        .skipped
        .iter()
        .map(|(reason, count)| (reason.to_string(), *count))
        .collect();
    json!({
        "processed": report.processed,
        "skipped": skipped,
    })
}

async fn health_check() -> Json<ApiResponse<HashMap<String, String>>> {
    let mut status = HashMap::new();
    status.insert("status".to_string(), "healthy".to_string());
    status.insert("service".to_string(), "acadrec".to_string());
    status.insert("version".to_string(), env!("CARGO_PKG_VERSION").to_string());

    Json(ApiResponse::success(status))
}

async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<RecommendationQuery>,
) -> ApiResult<Vec<acadrec::RecommendedItem>> {
    let exclude_item_ids = params
        .exclude_items
        .map(|s| {
            s.split(',')
                .filter_map(|s| Uuid::parse_str(s.trim()).ok())
                .collect()
        })
        .unwrap_or_default();

    let context = RecommendationContext {
        session_id: params.session_id.unwrap_or_default(),
        exclude_item_ids,
        location_filter: params.location,
        subject_filter: params.subject,
    };
    let limit = params
        .limit
        .unwrap_or(state.config.recommendation.default_limit);

    state
        .recommendation_engine
        .get_recommendations(user_id, limit, &context)
        .await
        .map(|items| Json(ApiResponse::success(items)))
        .map_err(reject)
}

async fn get_similar_items(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Query(params): Query<SimilarItemsQuery>,
) -> ApiResult<Vec<acadrec::SimilarItem>> {
    let limit = params.limit.unwrap_or(10);

    state
        .recommendation_engine
        .get_similar_items(item_id, limit)
        .await
        .map(|items| Json(ApiResponse::success(items)))
        .map_err(reject)
}

async fn record_feedback(
    State(state): State<AppState>,
    Path(recommendation_id): Path<Uuid>,
    Json(body): Json<FeedbackBody>,
) -> ApiResult<String> {
    state
        .recommendation_engine
        .record_feedback(recommendation_id, body.score, body.comment)
        .await
        .map(|_| Json(ApiResponse::success("Feedback recorded".to_string())))
        .map_err(reject)
}

async fn record_click(
    State(state): State<AppState>,
    Path(recommendation_id): Path<Uuid>,
) -> ApiResult<String> {
    state
        .recommendation_engine
        .record_click(recommendation_id)
        .await
        .map(|_| Json(ApiResponse::success("Click recorded".to_string())))
        .map_err(reject)
}

async fn rebuild_vectors(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    state
        .recommendation_engine
        .rebuild_feature_vectors()
        .await
        .map(|report| Json(ApiResponse::success(sweep_summary(&report))))
        .map_err(reject)
}

async fn recalculate_similarities(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    state
        .recommendation_engine
        .recalculate_similarities()
        .await
        .map(|report| Json(ApiResponse::success(sweep_summary(&report))))
        .map_err(reject)
}

async fn clear_cache(State(state): State<AppState>) -> ApiResult<String> {
    state
        .recommendation_engine
        .clear_recommendation_cache()
        .await
        .map(|_| Json(ApiResponse::success("Cache cleared".to_string())))
        .map_err(reject)
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommendations/:id", get(get_recommendations))
        .route("/recommendations/:id/feedback", post(record_feedback))
        .route("/recommendations/:id/click", post(record_click))
        .route("/items/:item_id/similar", get(get_similar_items))
        .route("/maintenance/vectors", post(rebuild_vectors))
        .route("/maintenance/similarities", post(recalculate_similarities))
        .route("/maintenance/cache", delete(clear_cache))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::default();
    info!("Starting acadrec server with config: {:?}", config.server);

    let state = AppState::new(config.clone()).await?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.socket_addr()).await?;
    info!("Server listening on {}", config.server.socket_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
