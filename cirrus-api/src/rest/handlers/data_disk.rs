//! Data disk handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::error::Result;
use crate::model::DataDisk;
use crate::resource::data_disk::{self, CreateDataDiskRequest};
use crate::state::AppState;

use super::MessageResponse;

pub async fn create_data_disk(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Json(req): Json<CreateDataDiskRequest>,
) -> Result<Json<DataDisk>> {
    Ok(Json(data_disk::create_data_disk(&state, &ns, req).await?))
}

pub async fn get_data_disk(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<DataDisk>> {
    Ok(Json(data_disk::get_data_disk(&state, &ns, &id).await?))
}

pub async fn delete_data_disk(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    data_disk::delete_data_disk(&state, &ns, &id).await?;
    Ok(Json(MessageResponse::new(format!(
        "the dataDisk ({}) has been deleted",
        id
    ))))
}

pub async fn attach_data_disk(
    State(state): State<Arc<AppState>>,
    Path((ns, id, mci, vm)): Path<(String, String, String, String)>,
) -> Result<Json<DataDisk>> {
    Ok(Json(
        data_disk::attach_data_disk(&state, &ns, &id, &mci, &vm).await?,
    ))
}

pub async fn detach_data_disk(
    State(state): State<Arc<AppState>>,
    Path((ns, id, mci, vm)): Path<(String, String, String, String)>,
) -> Result<Json<DataDisk>> {
    Ok(Json(
        data_disk::detach_data_disk(&state, &ns, &id, &mci, &vm).await?,
    ))
}
