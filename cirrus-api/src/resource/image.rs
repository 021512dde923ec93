//! Image catalog and custom images.
//!
//! Plain images are catalog data cached from the broker; custom images are
//! created from VM snapshots (see the orchestrator's snapshot flow) and own
//! a real lifecycle.

use crate::error::{CoreError, Result};
use crate::model::{CustomImage, ImageInfo, ResourceKind, ResourceStatus};
use crate::registry;
use crate::state::AppState;
use crate::util::{new_uuid, sanitize_id};

use super::{ensure_ns, load_entity, save_entity};

fn image_key(ns: &str, id: &str) -> String {
    ResourceKind::Image.key(ns, id)
}

fn custom_image_key(ns: &str, id: &str) -> String {
    ResourceKind::CustomImage.key(ns, id)
}

/// Local id for a fetched image: `<connection>-<csp name>`, sanitized.
pub fn image_id(connection_name: &str, csp_image_name: &str) -> String {
    sanitize_id(&format!("{}-{}", connection_name, csp_image_name))
}

/// Import the broker's image list for one connection into the cache.
pub async fn fetch_images(
    state: &AppState,
    ns: &str,
    connection_name: &str,
) -> Result<Vec<ImageInfo>> {
    ensure_ns(state, ns).await?;
    registry::get_connection(state, connection_name).await?;

    let wire = state.broker.list_vmimages(connection_name).await?;
    let mut out = Vec::with_capacity(wire.len());
    for w in wire {
        let id = image_id(connection_name, &w.iid.name_id);
        let uuid = match state.store.get(&image_key(ns, &id)).await? {
            Some(raw) => serde_json::from_str::<ImageInfo>(&raw)?.uuid,
            None => new_uuid(),
        };
        let image = ImageInfo {
            id: id.clone(),
            uuid,
            name: id.clone(),
            connection_name: connection_name.to_string(),
            csp_image_id: w.iid.system_id,
            csp_image_name: w.iid.name_id,
            os_type: w.guest_os,
            description: String::new(),
            status: ResourceStatus::Available,
        };
        save_entity(state, &image_key(ns, &id), &image).await?;
        out.push(image);
    }
    Ok(out)
}

pub async fn get_image(state: &AppState, ns: &str, id: &str) -> Result<ImageInfo> {
    ensure_ns(state, ns).await?;
    load_entity(state, &image_key(ns, id), &format!("image '{}'", id)).await
}

pub async fn delete_image(state: &AppState, ns: &str, id: &str) -> Result<()> {
    ensure_ns(state, ns).await?;
    if !state.store.delete(&image_key(ns, id)).await? {
        return Err(CoreError::NotFound(format!("image '{}' not found", id)));
    }
    Ok(())
}

pub async fn get_custom_image(state: &AppState, ns: &str, id: &str) -> Result<CustomImage> {
    ensure_ns(state, ns).await?;
    load_entity(
        state,
        &custom_image_key(ns, id),
        &format!("customImage '{}'", id),
    )
    .await
}

pub async fn delete_custom_image(state: &AppState, ns: &str, id: &str) -> Result<()> {
    let mut image = get_custom_image(state, ns, id).await?;

    image.status = ResourceStatus::Deleting;
    save_entity(state, &custom_image_key(ns, id), &image).await?;

    // Custom images exist broker-side as snapshots; deletion mirrors that.
    if let Err(e) = state
        .broker
        .delete_snapshot(&image.connection_name, &image.uuid)
        .await
    {
        image.status = ResourceStatus::ErrorOnDeleting;
        save_entity(state, &custom_image_key(ns, id), &image).await?;
        return Err(e);
    }

    state.store.delete(&custom_image_key(ns, id)).await?;
    state
        .labels
        .remove_entity(ResourceKind::CustomImage.as_str(), &image.uuid)
        .await?;
    Ok(())
}
