//! REST handlers. Thin adapters from HTTP to the core subsystems.

mod conn;
mod credential;
mod data_disk;
mod label;
mod mci;
mod ns;
mod request;
mod security_group;
mod spec_image;
mod ssh_key;
mod vnet;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

pub use conn::*;
pub use credential::*;
pub use data_disk::*;
pub use label::*;
pub use mci::*;
pub use ns::*;
pub use request::*;
pub use security_group::*;
pub use spec_image::*;
pub use ssh_key::*;
pub use vnet::*;

use crate::state::AppState;

/// Single-message response body.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    #[serde(rename = "Message")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Liveness. Reports 503 until every route is installed.
pub async fn readyz(State(state): State<Arc<AppState>>) -> (StatusCode, Json<MessageResponse>) {
    if state.system_ready.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(MessageResponse::new("ready")))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(MessageResponse::new("not ready")),
        )
    }
}
