//! Label CRUD and selector query handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::resource;
use crate::state::AppState;

use super::MessageResponse;

/// Replace an entity's label map. The resource key the uuid maps to must
/// already be known to the index (set at entity creation); a brand-new
/// uuid needs `resourceKey` supplied.
#[derive(Debug, Deserialize)]
pub struct PutLabelsRequest {
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(rename = "resourceKey", default)]
    pub resource_key: Option<String>,
}

pub async fn put_labels(
    State(state): State<Arc<AppState>>,
    Path((kind, uuid)): Path<(String, String)>,
    Json(req): Json<PutLabelsRequest>,
) -> Result<Json<HashMap<String, String>>> {
    let resource_key = match req.resource_key {
        Some(k) if !k.is_empty() => k,
        _ => existing_key(&state, &kind, &uuid).await?,
    };

    state
        .labels
        .put_labels(&kind, &uuid, &resource_key, req.labels.clone())
        .await?;
    Ok(Json(req.labels))
}

async fn existing_key(state: &AppState, kind: &str, uuid: &str) -> Result<String> {
    // The index stores the resource key alongside the labels; selecting on
    // a synthetic uuid label would be circular, so read the record back.
    match state.store.get(&format!("/label/{}/{}", kind, uuid)).await? {
        Some(raw) => {
            let record: serde_json::Value = serde_json::from_str(&raw)?;
            Ok(record["resource_key"].as_str().unwrap_or_default().to_string())
        }
        None => Err(CoreError::NotFound(format!(
            "no labeled entity ({}, {})",
            kind, uuid
        ))),
    }
}

pub async fn get_labels(
    State(state): State<Arc<AppState>>,
    Path((kind, uuid)): Path<(String, String)>,
) -> Result<Json<HashMap<String, String>>> {
    match state.labels.get_labels(&kind, &uuid).await {
        Some(labels) => Ok(Json(labels)),
        None => Err(CoreError::NotFound(format!(
            "no labels for ({}, {})",
            kind, uuid
        ))),
    }
}

pub async fn remove_label(
    State(state): State<Arc<AppState>>,
    Path((kind, uuid, key)): Path<(String, String, String)>,
) -> Result<Json<MessageResponse>> {
    if !state.labels.remove_label(&kind, &uuid, &key).await? {
        return Err(CoreError::NotFound(format!(
            "label '{}' not found on ({}, {})",
            key, kind, uuid
        )));
    }
    Ok(Json(MessageResponse::new(format!(
        "the label ({}) has been removed",
        key
    ))))
}

#[derive(Debug, Deserialize)]
pub struct SelectQuery {
    #[serde(rename = "labelSelector", default)]
    pub label_selector: String,
}

/// Evaluate a label selector over one kind and materialize the matches.
pub async fn select_resources(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<SelectQuery>,
) -> Result<Json<Vec<serde_json::Value>>> {
    Ok(Json(
        resource::select_resources(&state, &kind, &query.label_selector).await?,
    ))
}
