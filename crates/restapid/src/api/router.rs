//! Route table of the v1 API.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use super::handlers;
use crate::gate::{Gate, PeerIdentity};

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gate>,
}

impl AppState {
    pub fn new(gate: Arc<Gate>) -> Self {
        Self { gate }
    }
}

/// Checks the peer identity and logs every request with its outcome.
async fn gate_layer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = match state
        .gate
        .authorize(request.extensions().get::<PeerIdentity>())
    {
        Ok(()) => next.run(request).await,
        Err(err) => err.into_response(),
    };

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Handled request"
    );
    response
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/", get(handlers::index))
        .route("/v1/state/heartbeat", get(handlers::heartbeat))
        .route(
            "/v1/config/resetstatus",
            get(handlers::get_reset_status).post(handlers::set_reset_status),
        )
        .route(
            "/v1/config/bgp/profile/{profile_name}",
            get(handlers::get_bgp_profile)
                .post(handlers::set_bgp_profile)
                .delete(handlers::delete_bgp_profile),
        )
        // VLANs
        .route(
            "/v1/config/interface/vlan/{vlan_id}",
            get(handlers::get_vlan)
                .post(handlers::create_vlan)
                .delete(handlers::delete_vlan),
        )
        .route("/v1/config/interface/vlans", get(handlers::list_vlans_in_vnet))
        .route("/v1/config/interface/vlans/all", get(handlers::list_vlans))
        .route(
            "/v1/config/interface/vlans/members/all",
            get(handlers::list_all_vlan_members),
        )
        .route(
            "/v1/config/interface/vlan/{vlan_id}/member/{if_name}",
            get(handlers::get_vlan_member)
                .post(handlers::add_vlan_member)
                .delete(handlers::delete_vlan_member),
        )
        .route(
            "/v1/config/interface/vlan/{vlan_id}/members",
            get(handlers::list_vlan_members),
        )
        .route(
            "/v1/config/interface/vlan/{vlan_id}/neighbor/{ip_addr}",
            get(handlers::get_vlan_neighbor)
                .post(handlers::add_vlan_neighbor)
                .delete(handlers::delete_vlan_neighbor),
        )
        .route(
            "/v1/config/interface/vlan/{vlan_id}/neighbors",
            get(handlers::list_vlan_neighbors),
        )
        // Tunnels and VNETs
        .route(
            "/v1/config/tunnel/decap/{tunnel_type}",
            get(handlers::get_tunnel_decap)
                .post(handlers::create_tunnel_decap)
                .delete(handlers::delete_tunnel_decap),
        )
        .route(
            "/v1/config/vrouter/{vnet_name}",
            get(handlers::get_vnet)
                .post(handlers::create_vnet)
                .delete(handlers::delete_vnet),
        )
        // Routes
        .route(
            "/v1/config/vrouter/{vnet_name}/routes",
            get(handlers::get_vnet_routes)
                .patch(handlers::patch_vnet_routes)
                .delete(handlers::delete_vnet_routes),
        )
        .route(
            "/v1/config/vrf/{vrf_id}/routes",
            get(handlers::get_vrf_routes).patch(handlers::patch_vrf_routes),
        )
        .route(
            "/v1/config/vrf/routes/expiry",
            get(handlers::get_route_expiry).post(handlers::set_route_expiry),
        )
        // Operations
        .route("/v1/state/interface", get(handlers::list_interfaces))
        .route("/v1/state/interface/{port}", get(handlers::get_interface))
        .route("/v1/config/restartdb", post(handlers::restart_cache))
        .route("/v1/operations/ping", post(handlers::ping))
        .layer(middleware::from_fn_with_state(state.clone(), gate_layer))
        .with_state(state)
}
