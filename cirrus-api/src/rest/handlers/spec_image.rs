//! Spec and image catalog handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::model::{CustomImage, ImageInfo, SpecInfo};
use crate::resource::spec::SpecRangeFilter;
use crate::resource::{image, spec};
use crate::state::AppState;

use super::MessageResponse;

#[derive(Debug, Deserialize)]
pub struct FetchQuery {
    #[serde(rename = "connectionName")]
    pub connection_name: String,
}

/// Bulk-import the broker's spec catalog for one connection.
pub async fn fetch_specs(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<Vec<SpecInfo>>> {
    Ok(Json(
        spec::fetch_specs(&state, &ns, &query.connection_name).await?,
    ))
}

pub async fn get_spec(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<SpecInfo>> {
    Ok(Json(spec::get_spec(&state, &ns, &id).await?))
}

pub async fn list_specs(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
) -> Result<Json<Vec<SpecInfo>>> {
    Ok(Json(spec::list_specs(&state, &ns).await?))
}

pub async fn filter_specs_by_range(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Query(filter): Query<SpecRangeFilter>,
) -> Result<Json<Vec<SpecInfo>>> {
    Ok(Json(spec::filter_specs_by_range(&state, &ns, filter).await?))
}

pub async fn delete_spec(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    spec::delete_spec(&state, &ns, &id).await?;
    Ok(Json(MessageResponse::new(format!(
        "the spec ({}) has been deleted",
        id
    ))))
}

/// Bulk-import the broker's image catalog for one connection.
pub async fn fetch_images(
    State(state): State<Arc<AppState>>,
    Path(ns): Path<String>,
    Query(query): Query<FetchQuery>,
) -> Result<Json<Vec<ImageInfo>>> {
    Ok(Json(
        image::fetch_images(&state, &ns, &query.connection_name).await?,
    ))
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<ImageInfo>> {
    Ok(Json(image::get_image(&state, &ns, &id).await?))
}

pub async fn delete_image(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    image::delete_image(&state, &ns, &id).await?;
    Ok(Json(MessageResponse::new(format!(
        "the image ({}) has been deleted",
        id
    ))))
}

pub async fn get_custom_image(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<CustomImage>> {
    Ok(Json(image::get_custom_image(&state, &ns, &id).await?))
}

pub async fn delete_custom_image(
    State(state): State<Arc<AppState>>,
    Path((ns, id)): Path<(String, String)>,
) -> Result<Json<MessageResponse>> {
    image::delete_custom_image(&state, &ns, &id).await?;
    Ok(Json(MessageResponse::new(format!(
        "the customImage ({}) has been deleted",
        id
    ))))
}
