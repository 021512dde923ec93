//! Credential registration handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::error::Result;
use crate::registry::envelope::CredentialEnvelope;
use crate::registry::{self, ConnConfigList, PublicKeyResponse};
use crate::state::AppState;

/// Issue an RSA public key and its one-shot token.
pub async fn issue_public_key(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PublicKeyResponse>> {
    Ok(Json(registry::issue_public_key(&state)?))
}

/// Register an encrypted credential envelope; responds with the full
/// connection list after fan-out verification.
pub async fn register_credential(
    State(state): State<Arc<AppState>>,
    Json(envelope): Json<CredentialEnvelope>,
) -> Result<Json<ConnConfigList>> {
    Ok(Json(registry::register_credential(&state, envelope).await?))
}
