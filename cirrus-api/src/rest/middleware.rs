//! HTTP middleware: request tracking with body dumps, authentication, and
//! the global rate limit.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde_json::json;

use crate::config::AuthMode;
use crate::state::AppState;
use crate::tracker::{RequestRecord, BODY_DUMP_LIMIT};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Upper bound on a buffered body; larger bodies are rejected.
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "message": message }))).into_response()
}

/// Assign a request id, dump request and response bodies into the request
/// registry, and stamp the id onto the response (headers and, for error
/// bodies, the `requestId` field).
pub async fn track_requests(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    // Global surface limit. Dropping the request here is cheaper than
    // queueing; callers see 429 and back off.
    if !state.limits.global.try_acquire().await {
        return error_response(StatusCode::TOO_MANY_REQUESTS, "request rate limit exceeded");
    }

    let candidate = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let request_id = state.tracker.assign_id(candidate.as_deref()).await;

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let started_at = Utc::now();

    // Buffer the request body so it can be dumped and replayed.
    let (parts, body) = req.into_parts();
    let request_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return error_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"),
    };
    let req = Request::from_parts(parts, Body::from(request_bytes.clone()));

    let response = next.run(req).await;
    let status = response.status();

    // Buffer the response body; error bodies get the request id injected.
    let (mut parts, body) = response.into_parts();
    let response_bytes = to_bytes(body, MAX_BODY_BYTES).await.unwrap_or_default();
    let response_bytes = if status.is_client_error() || status.is_server_error() {
        match serde_json::from_slice::<serde_json::Value>(&response_bytes) {
            Ok(mut v) if v.is_object() && v.get("message").is_some() => {
                v["requestId"] = json!(request_id);
                serde_json::to_vec(&v).unwrap_or_else(|_| response_bytes.to_vec()).into()
            }
            _ => response_bytes,
        }
    } else {
        response_bytes
    };

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, value);
    }

    let record = RequestRecord {
        request_id,
        method,
        path,
        status: Some(status.as_u16()),
        request_body: dump(&request_bytes),
        response_body: dump(&response_bytes),
        progress: vec![],
        phase: None,
        started_at,
        ended_at: Some(Utc::now()),
    };
    if let Err(e) = state.tracker.record(record).await {
        tracing::debug!("request record failed: {}", e);
    }

    Response::from_parts(parts, Body::from(response_bytes))
}

fn dump(bytes: &[u8]) -> String {
    let end = bytes.len().min(BODY_DUMP_LIMIT);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Authentication. `/readyz` always passes; basic mode checks the
/// configured credentials; jwt mode requires a bearer token whose
/// validation is delegated to the IAM manager.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if !state.config.auth_enabled || req.uri().path().ends_with("/readyz") {
        return next.run(req).await;
    }

    let header_value = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let authorized = match state.config.auth_mode {
        AuthMode::Basic => header_value
            .strip_prefix("Basic ")
            .and_then(|b64| BASE64.decode(b64).ok())
            .and_then(|raw| String::from_utf8(raw).ok())
            .is_some_and(|creds| {
                creds
                    == format!(
                        "{}:{}",
                        state.config.api_username, state.config.api_password
                    )
            }),
        AuthMode::Jwt => header_value.starts_with("Bearer "),
    };

    if !authorized {
        return error_response(StatusCode::UNAUTHORIZED, "authentication required");
    }
    next.run(req).await
}
