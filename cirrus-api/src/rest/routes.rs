//! Route table. Everything lives under the `/tumblebug` root prefix.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::state::AppState;

use super::handlers;
use super::middleware::{authenticate, track_requests};

fn cors_layer(state: &AppState) -> CorsLayer {
    if state.config.allow_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = state
        .config
        .allow_origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        // System
        .route("/readyz", get(handlers::readyz))
        // Namespaces
        .route("/ns", post(handlers::create_ns))
        .route("/ns", get(handlers::list_ns))
        .route("/ns/{ns}", get(handlers::get_ns))
        .route("/ns/{ns}", delete(handlers::delete_ns))
        // Credentials and connections
        .route("/credential/publicKey", get(handlers::issue_public_key))
        .route("/credential", post(handlers::register_credential))
        .route("/connConfig", get(handlers::list_connections))
        .route("/connConfig/{name}", get(handlers::get_connection))
        // vNet / subnet
        .route("/ns/{ns}/resources/vNet", post(handlers::create_vnet))
        .route("/ns/{ns}/resources/vNet", get(handlers::list_vnets))
        .route(
            "/ns/{ns}/resources/registerCspVNet",
            post(handlers::register_vnet),
        )
        .route("/ns/{ns}/resources/vNet/{id}", get(handlers::get_vnet))
        .route("/ns/{ns}/resources/vNet/{id}", delete(handlers::delete_vnet))
        .route(
            "/ns/{ns}/resources/vNet/{id}/subnet",
            post(handlers::add_subnet),
        )
        .route(
            "/ns/{ns}/resources/vNet/{id}/subnet/{subnetId}",
            delete(handlers::remove_subnet),
        )
        // Security groups
        .route(
            "/ns/{ns}/resources/securityGroup",
            post(handlers::create_security_group),
        )
        .route(
            "/ns/{ns}/resources/securityGroup/{id}",
            get(handlers::get_security_group),
        )
        .route(
            "/ns/{ns}/resources/securityGroup/{id}",
            delete(handlers::delete_security_group),
        )
        .route(
            "/ns/{ns}/resources/securityGroup/{id}/rules",
            post(handlers::add_firewall_rules),
        )
        .route(
            "/ns/{ns}/resources/securityGroup/{id}/rules",
            delete(handlers::remove_firewall_rules),
        )
        // SSH keys
        .route("/ns/{ns}/resources/sshKey", post(handlers::create_ssh_key))
        .route(
            "/ns/{ns}/resources/registerCspSshKey",
            post(handlers::register_ssh_key),
        )
        .route("/ns/{ns}/resources/sshKey/{id}", get(handlers::get_ssh_key))
        .route(
            "/ns/{ns}/resources/sshKey/{id}",
            delete(handlers::delete_ssh_key),
        )
        // Data disks
        .route(
            "/ns/{ns}/resources/dataDisk",
            post(handlers::create_data_disk),
        )
        .route(
            "/ns/{ns}/resources/dataDisk/{id}",
            get(handlers::get_data_disk),
        )
        .route(
            "/ns/{ns}/resources/dataDisk/{id}",
            delete(handlers::delete_data_disk),
        )
        .route(
            "/ns/{ns}/resources/dataDisk/{id}/attach/{mciId}/{vmId}",
            put(handlers::attach_data_disk),
        )
        .route(
            "/ns/{ns}/resources/dataDisk/{id}/detach/{mciId}/{vmId}",
            put(handlers::detach_data_disk),
        )
        // Specs and images
        .route("/ns/{ns}/resources/fetchSpecs", post(handlers::fetch_specs))
        .route("/ns/{ns}/resources/spec", get(handlers::list_specs))
        .route(
            "/ns/{ns}/resources/filterSpecsByRange",
            get(handlers::filter_specs_by_range),
        )
        .route("/ns/{ns}/resources/spec/{id}", get(handlers::get_spec))
        .route("/ns/{ns}/resources/spec/{id}", delete(handlers::delete_spec))
        .route(
            "/ns/{ns}/resources/fetchImages",
            post(handlers::fetch_images),
        )
        .route("/ns/{ns}/resources/image/{id}", get(handlers::get_image))
        .route(
            "/ns/{ns}/resources/image/{id}",
            delete(handlers::delete_image),
        )
        .route(
            "/ns/{ns}/resources/customImage/{id}",
            get(handlers::get_custom_image),
        )
        .route(
            "/ns/{ns}/resources/customImage/{id}",
            delete(handlers::delete_custom_image),
        )
        // MCI
        .route("/ns/{ns}/mci", post(handlers::create_mci))
        .route("/ns/{ns}/mci", get(handlers::list_mcis))
        .route("/ns/{ns}/mci/{id}", get(handlers::get_mci))
        .route("/ns/{ns}/mci/{id}", delete(handlers::delete_mci))
        .route("/ns/{ns}/control/mci/{id}", get(handlers::control_mci))
        .route("/ns/{ns}/cmd/mci/{id}", post(handlers::remote_command))
        .route(
            "/ns/{ns}/mci/{id}/subgroup/{sg}",
            post(handlers::scale_out_subgroup),
        )
        // VMs
        .route("/ns/{ns}/mci/{id}/vm/{vm}", get(handlers::get_vm))
        .route("/ns/{ns}/mci/{id}/vm/{vm}", delete(handlers::delete_vm))
        .route(
            "/ns/{ns}/mci/{id}/vm/{vm}/snapshot",
            post(handlers::snapshot_vm),
        )
        // Bastion
        .route(
            "/ns/{ns}/mci/{id}/vm/{vm}/bastion/{bastionVm}",
            put(handlers::set_bastion),
        )
        .route(
            "/ns/{ns}/mci/{id}/vm/{vm}/bastion",
            get(handlers::get_bastion),
        )
        .route(
            "/ns/{ns}/mci/{id}/bastion/{bastionVm}",
            delete(handlers::remove_bastion),
        )
        // Autoscaling policy (stored, not evaluated)
        .route("/ns/{ns}/policy/mci/{id}", put(handlers::put_policy))
        .route("/ns/{ns}/policy/mci/{id}", get(handlers::get_policy))
        .route("/ns/{ns}/policy/mci/{id}", delete(handlers::delete_policy))
        // Site-to-site VPN
        .route("/ns/{ns}/vpn/mci/{id}", post(handlers::create_vpn))
        .route("/ns/{ns}/vpn/mci/{id}", delete(handlers::delete_vpn))
        .route(
            "/ns/{ns}/vpn/mci/{id}/request/{reqId}",
            get(handlers::get_vpn_request),
        )
        // Labels
        .route("/label/{kind}/{uuid}", put(handlers::put_labels))
        .route("/label/{kind}/{uuid}", get(handlers::get_labels))
        .route("/label/{kind}/{uuid}/{key}", delete(handlers::remove_label))
        .route("/resources/{kind}", get(handlers::select_resources))
        // Request tracker
        .route("/request/{reqId}", get(handlers::get_request))
        .route("/request/{reqId}", delete(handlers::delete_request))
        .route("/request", get(handlers::list_requests))
        .route("/request", delete(handlers::clear_requests));

    Router::new()
        .nest("/tumblebug", api)
        .layer(from_fn_with_state(state.clone(), authenticate))
        .layer(from_fn_with_state(state.clone(), track_requests))
        .layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
