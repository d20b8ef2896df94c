use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use claimlens_analytics::{AnalyticsService, ChangeFeed, DataChanged};
use claimlens_core::domain::claim::ClaimId;
use claimlens_core::domain::employee::EmployeeId;
use claimlens_core::envelope::ResultEnvelope;
use claimlens_core::errors::{ApplicationError, InterfaceError};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct ApiState {
    pub service: AnalyticsService,
    pub change_feed: ChangeFeed,
}

type ApiResponse<T> = (StatusCode, [(&'static str, String); 1], Json<ResultEnvelope<T>>);

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub months: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompareQuery {
    pub names: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ViewRequest {
    pub viewer_id: String,
}

#[derive(Debug, Serialize)]
pub struct InvalidationReceipt {
    pub receivers: usize,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/claims/{id}/similar", get(similar_claims))
        .route("/claims/{id}/insights", get(claim_insights))
        .route("/claims/{id}/history", get(claim_history))
        .route("/claims/{id}/views", post(mark_viewed))
        .route("/departments/compare", get(compare_departments))
        .route("/departments/{name}", get(department))
        .route("/departments/{name}/trends", get(department_trends))
        .route("/employees/{id}/rollup", get(employee_rollup))
        .route("/cache/invalidate", post(invalidate_cache))
        .with_state(state)
}

/// Reuses the caller's correlation id when one is supplied.
fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client errors carry the application message; server-side failures only
/// carry the user-safe message and the correlation id.
fn respond<T: Serialize>(
    operation: &'static str,
    correlation_id: String,
    result: Result<T, ApplicationError>,
) -> ApiResponse<T> {
    match result {
        Ok(data) => {
            debug!(
                event_name = "http.request.completed",
                operation,
                correlation_id = %correlation_id,
                "request completed"
            );
            (StatusCode::OK, [(CORRELATION_HEADER, correlation_id)], Json(ResultEnvelope::ok(data)))
        }
        Err(error) => {
            let detail = error.to_string();
            let interface = error.into_interface(correlation_id.clone());
            let status = status_for(&interface);
            let message = match interface {
                InterfaceError::BadRequest { .. } | InterfaceError::NotFound { .. } => {
                    detail.clone()
                }
                InterfaceError::ServiceUnavailable { .. } | InterfaceError::Internal { .. } => {
                    format!("{} (correlation id {})", interface.user_message(), correlation_id)
                }
            };
            warn!(
                event_name = "http.request.failed",
                operation,
                correlation_id = %correlation_id,
                status = status.as_u16(),
                error = %detail,
                "request failed"
            );
            (status, [(CORRELATION_HEADER, correlation_id)], Json(ResultEnvelope::failure(message)))
        }
    }
}

async fn similar_claims(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResponse<claimlens_analytics::SimilarClaimsAnalysis> {
    let result = state.service.similar_claims(&ClaimId(id)).await;
    respond("claims.similar", correlation_id(&headers), result)
}

async fn claim_insights(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResponse<Vec<String>> {
    let result = state.service.claim_insights(&ClaimId(id)).await;
    respond("claims.insights", correlation_id(&headers), result)
}

async fn claim_history(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResponse<claimlens_core::domain::approval::ClaimHistory> {
    let result = state.service.claim_history(&ClaimId(id)).await;
    respond("claims.history", correlation_id(&headers), result)
}

async fn mark_viewed(
    Path(id): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(body): Json<ViewRequest>,
) -> ApiResponse<claimlens_analytics::ClaimViewReceipt> {
    let result = state.service.record_view(&ClaimId(id), &EmployeeId(body.viewer_id)).await;
    respond("claims.views", correlation_id(&headers), result)
}

async fn department(
    Path(name): Path<String>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResponse<claimlens_core::analytics::rollup::DepartmentRollup> {
    let result = state.service.department_rollup(&name, None).await;
    respond("departments.rollup", correlation_id(&headers), result)
}

async fn department_trends(
    Path(name): Path<String>,
    Query(window): Query<WindowQuery>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResponse<Vec<claimlens_core::analytics::rollup::MonthlyTrend>> {
    let result = state.service.department_trends(&name, window.months).await;
    respond("departments.trends", correlation_id(&headers), result)
}

async fn compare_departments(
    Query(compare): Query<CompareQuery>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResponse<Vec<claimlens_analytics::DepartmentComparison>> {
    let names: Vec<String> = compare
        .names
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(|name| name.trim().to_owned())
        .filter(|name| !name.is_empty())
        .collect();
    let result = state.service.department_comparison(&names).await;
    respond("departments.compare", correlation_id(&headers), result)
}

async fn employee_rollup(
    Path(id): Path<String>,
    Query(window): Query<WindowQuery>,
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResponse<claimlens_core::analytics::rollup::EmployeeRollup> {
    let result = state.service.employee_rollup(&EmployeeId(id), window.months).await;
    respond("employees.rollup", correlation_id(&headers), result)
}

/// Signals that claim data changed outside this process.
async fn invalidate_cache(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResponse<InvalidationReceipt> {
    let receivers = state.change_feed.publish(DataChanged::All);
    respond("cache.invalidate", correlation_id(&headers), Ok(InvalidationReceipt { receivers }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use chrono::NaiveDate;
    use claimlens_analytics::{AnalyticsRepositories, AnalyticsService, ChangeFeed, InsightCache};
    use claimlens_core::analytics::AnalyticsThresholds;
    use claimlens_db::{connect_with_settings, migrations, DbPool, DemoDataset};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    async fn setup() -> (DbPool, ApiState, Arc<InsightCache>) {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let as_of = NaiveDate::from_ymd_opt(2024, 6, 15).expect("date");
        DemoDataset::build(as_of).expect("dataset").load(&pool).await.expect("seed");

        let change_feed = ChangeFeed::default();
        let cache = Arc::new(InsightCache::new());
        let service = AnalyticsService::new(
            AnalyticsRepositories::sql(pool.clone()),
            AnalyticsThresholds::default(),
        )
        .with_insight_cache(cache.clone())
        .with_as_of(as_of);

        (pool, ApiState { service, change_feed }, cache)
    }

    async fn call(state: ApiState, request: Request<Body>) -> (StatusCode, String, Value) {
        let response = router(state).oneshot(request).await.expect("router response");
        let status = response.status();
        let correlation = response
            .headers()
            .get(CORRELATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("body bytes");
        let payload = serde_json::from_slice(&bytes).expect("json body");
        (status, correlation, payload)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    #[tokio::test]
    async fn insights_route_returns_success_envelope() {
        let (pool, state, _) = setup().await;

        let (status, correlation, payload) = call(state, get("/claims/CLM-1000/insights")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!correlation.is_empty());
        assert_eq!(payload["success"], true);
        assert_eq!(
            payload["data"][0],
            "This claim is 101% higher than average for Travel claims"
        );
        assert!(payload.get("error").is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn unknown_claim_maps_to_not_found_and_echoes_correlation_id() {
        let (pool, state, _) = setup().await;
        let request = Request::builder()
            .uri("/claims/CLM-404/similar")
            .header(CORRELATION_HEADER, "req-77")
            .body(Body::empty())
            .expect("request");

        let (status, correlation, payload) = call(state, request).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(correlation, "req-77");
        assert_eq!(payload["success"], false);
        assert_eq!(payload["error"], "claim `CLM-404` was not found");
        assert!(payload.get("data").is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn department_routes_roll_up_and_compare() {
        let (pool, state, _) = setup().await;

        let (status, _, rollup) = call(state.clone(), get("/departments/Engineering")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rollup["data"]["claim_count"], 9);

        let (status, _, trends) =
            call(state.clone(), get("/departments/Sales/trends?months=3")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trends["data"].as_array().map(Vec::len), Some(3));

        let (status, _, compare) =
            call(state.clone(), get("/departments/compare?names=Operations,Legal")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(compare["data"][0]["department"], "Operations");
        assert_eq!(compare["data"][0]["success"], true);
        assert_eq!(compare["data"][1]["success"], false);

        let (status, _, empty) = call(state, get("/departments/compare")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(empty["success"], false);
        pool.close().await;
    }

    #[tokio::test]
    async fn employee_rollup_route_honours_month_window() {
        let (pool, state, _) = setup().await;

        let (status, _, payload) =
            call(state, get("/employees/EMP-ENG-1/rollup?months=2")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["data"]["employee_id"], "EMP-ENG-1");
        assert_eq!(payload["data"]["trends"].as_array().map(Vec::len), Some(2));
        pool.close().await;
    }

    #[tokio::test]
    async fn oversized_month_windows_are_bad_requests() {
        let (pool, state, _) = setup().await;

        let (status, _, trends) =
            call(state.clone(), get("/departments/Sales/trends?months=100000")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(trends["success"], false);
        assert!(trends["error"].as_str().unwrap_or_default().contains("at most 120"));

        let (status, _, rollup) =
            call(state, get("/employees/EMP-ENG-1/rollup?months=4294967295")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(rollup.get("data").is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn view_route_records_viewer_and_rejects_blank_ids() {
        let (pool, state, _) = setup().await;
        let post = |viewer: &str| {
            Request::builder()
                .method("POST")
                .uri("/claims/CLM-1000/views")
                .header("content-type", "application/json")
                .body(Body::from(format!("{{\"viewer_id\":\"{viewer}\"}}")))
                .expect("request")
        };

        let (status, _, payload) = call(state.clone(), post("MGR-ENG")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["data"]["viewer_id"], "MGR-ENG");

        let (status, _, payload) = call(state, post("  ")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(payload["success"], false);

        let viewers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claim_view")
            .fetch_one(&pool)
            .await
            .expect("count views");
        assert_eq!(viewers, 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn persistence_failures_hide_detail_behind_service_unavailable() {
        let (pool, state, _) = setup().await;
        pool.close().await;

        let (status, correlation, payload) = call(state, get("/claims/CLM-1000/history")).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload["success"], false);
        let message = payload["error"].as_str().unwrap_or_default();
        assert!(message.starts_with("The service is temporarily unavailable."));
        assert!(message.contains(&correlation));
    }

    #[tokio::test]
    async fn invalidate_route_publishes_to_listening_cache() {
        let (pool, state, cache) = setup().await;
        let listener = cache.listen(&state.change_feed);
        let before = cache.version();

        let request = Request::builder()
            .method("POST")
            .uri("/cache/invalidate")
            .body(Body::empty())
            .expect("request");
        let (status, _, payload) = call(state, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["data"]["receivers"], 1);
        for _ in 0..50 {
            if cache.version() > before {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(cache.version() > before);

        listener.abort();
        pool.close().await;
    }
}
