// src/server/commander/mod.rs

//! The command API: authenticated HTTP handlers for inspecting and
//! mutating workloads.

use super::initialization::AgentState;
use crate::core::errors::AgentError;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

pub mod pods;
pub mod workloads;

/// All command routes, behind the bearer-token middleware.
pub fn routes(state: Arc<AgentState>) -> Router<Arc<AgentState>> {
    Router::new()
        .route("/api/pods", get(pods::list_pods))
        .route(
            "/api/pods/{podName}",
            get(pods::get_pod).delete(pods::delete_pod),
        )
        .route("/api/pods/{podName}/logs", get(pods::get_pod_logs))
        .route("/api/workloads/{podName}", patch(workloads::patch_workload))
        .route(
            "/api/workloads/{podName}/rollback",
            post(workloads::rollback_workload),
        )
        .route(
            "/api/scale/{deploymentName}",
            patch(workloads::scale_deployment),
        )
        .route_layer(middleware::from_fn_with_state(state, authorize))
}

/// Rejects requests without the configured bearer token. An unset token
/// disables the whole command surface.
async fn authorize(
    State(state): State<Arc<AgentState>>,
    request: Request,
    next: Next,
) -> Response {
    let expected = &state.config.settings.http_authorization_key;
    if expected.is_empty() {
        warn!("HTTP_AUTHORIZATION_KEY is not set");
        return (
            StatusCode::FORBIDDEN,
            axum::Json(json!({ "message": "HTTP_AUTHORIZATION_KEY is not set" })),
        )
            .into_response();
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if header_value != format!("Bearer {expected}") {
        warn!("Authorization failed");
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    next.run(request).await
}

/// Handler-level error carrying the HTTP status to answer with.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(message = %self.message, "Command API internal error");
        }
        (self.status, axum::Json(json!({ "message": self.message }))).into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::NotFound(message) => ApiError::not_found(message),
            AgentError::InvalidRequest(message) => ApiError::bad_request(message),
            AgentError::KubeClient(kube::Error::Api(ref response)) if response.code == 404 => {
                ApiError::not_found(e.to_string())
            }
            other => ApiError::internal(other.to_string()),
        }
    }
}

/// Clamps the `tail-lines` query: values inside [10, 500] pass through,
/// values outside fall back to the default of 100, malformed input is a
/// client error.
pub fn clamp_tail_lines(raw: Option<&str>) -> Result<i64, ApiError> {
    match raw {
        None | Some("") => Ok(100),
        Some(s) => match s.parse::<i64>() {
            Ok(n) if (10..=500).contains(&n) => Ok(n),
            Ok(_) => Ok(100),
            Err(_) => Err(ApiError::bad_request("Malformed tail-lines")),
        },
    }
}

/// Parses the `waitTimeout` query (seconds, 0..=10, default 4).
pub fn parse_wait_timeout(raw: Option<&str>) -> Result<std::time::Duration, ApiError> {
    match raw {
        None | Some("") => Ok(std::time::Duration::from_secs(4)),
        Some(s) => match s.parse::<u64>() {
            Ok(n) if n <= 10 => Ok(std::time::Duration::from_secs(n)),
            _ => Err(ApiError::bad_request("Invalid waitTimeout")),
        },
    }
}

/// Parses the `since-seconds`/`since-time` log queries. Supplying both is a
/// client error, as is a non-integer `since-seconds` or a non-RFC3339
/// `since-time`.
pub fn parse_since_params(
    since_seconds: Option<&str>,
    since_time: Option<&str>,
) -> Result<(Option<i64>, Option<chrono::DateTime<chrono::Utc>>), ApiError> {
    let since_seconds_query = since_seconds.unwrap_or_default();
    let since_time_query = since_time.unwrap_or_default();
    if !since_seconds_query.is_empty() && !since_time_query.is_empty() {
        return Err(ApiError::bad_request(
            "Both since-seconds and since-time are specified",
        ));
    }

    let since_seconds = if since_seconds_query.is_empty() {
        None
    } else {
        Some(
            since_seconds_query
                .parse::<i64>()
                .map_err(|_| ApiError::bad_request("Malformed since-seconds"))?,
        )
    };
    let since_time = if since_time_query.is_empty() {
        None
    } else {
        Some(
            chrono::DateTime::parse_from_rfc3339(since_time_query)
                .map_err(|_| ApiError::bad_request("Malformed since-time"))?
                .with_timezone(&chrono::Utc),
        )
    };
    Ok((since_seconds, since_time))
}
