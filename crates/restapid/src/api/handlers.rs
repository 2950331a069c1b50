//! v1 endpoint handlers.
//!
//! Handlers decode and validate the request, then run the matching
//! [`OverlayMgr`](crate::OverlayMgr) operation through the gate.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::extract::{decode_body, parse_ip, parse_vlan, query_prefix, query_vnid, single, QueryPairs};
use super::router::AppState;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    BgpProfileModel, HeartbeatModel, InterfaceReturnModel, PingRequest, PingReturnModel,
    ResetStatusModel, RouteExpiryModel, RouteModel, RouteReturnModel, TunnelDecapRequest,
    TunnelDecapReturnModel, VlanMemberRequest, VlanMemberReturnModel, VlanMembersReturnModel,
    VlanNeighborReturnModel, VlanNeighborsReturnModel, VlanRequest, VlanReturnModel,
    VlansMembersReturnModel, VlansPerVnetReturnModel, VlansReturnModel, VnetRequest,
    VnetReturnModel,
};
use crate::system::INDEX_BANNER;
use crate::types::{RouteFailure, RouteOp};

fn validate_routes(models: &[RouteModel]) -> ApiResult<Vec<RouteOp>> {
    models.iter().map(RouteModel::validate).collect()
}

/// 204 for a clean batch, otherwise 207 echoing the failed items.
fn batch_response(models: &[RouteModel], failures: Vec<RouteFailure>) -> Response {
    if failures.is_empty() {
        return StatusCode::NO_CONTENT.into_response();
    }
    let failed = failures
        .into_iter()
        .filter_map(|f| {
            models
                .get(f.index)
                .map(|model| model.failed(f.error_code, &f.error_msg))
        })
        .collect();
    (StatusCode::MULTI_STATUS, Json(RouteReturnModel { failed })).into_response()
}

// ---------------------------------------------------------------------------
// Service state
// ---------------------------------------------------------------------------

pub(crate) async fn index() -> &'static str {
    INDEX_BANNER
}

pub(crate) async fn heartbeat(State(state): State<AppState>) -> ApiResult<Json<HeartbeatModel>> {
    let model = state
        .gate
        .run(|mgr| async move { mgr.heartbeat().await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn get_reset_status(
    State(state): State<AppState>,
) -> ApiResult<Json<ResetStatusModel>> {
    let model = state
        .gate
        .run(|mgr| async move { Ok(mgr.get_reset_status()) })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn set_reset_status(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<ResetStatusModel>> {
    let request: ResetStatusModel = decode_body(&body)?;
    let model = state
        .gate
        .run(move |mut mgr| async move { mgr.set_reset_status(&request.reset_status).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn set_bgp_profile(
    State(state): State<AppState>,
    Path(profile_name): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let request: BgpProfileModel = decode_body(&body)?;
    state
        .gate
        .run(move |mut mgr| async move {
            mgr.set_bgp_profile(&profile_name, &request.community_id).await
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn get_bgp_profile(
    State(state): State<AppState>,
    Path(profile_name): Path<String>,
) -> ApiResult<Json<BgpProfileModel>> {
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_bgp_profile(&profile_name).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn delete_bgp_profile(
    State(state): State<AppState>,
    Path(profile_name): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .gate
        .run(move |mut mgr| async move { mgr.delete_bgp_profile(&profile_name).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_interfaces(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<InterfaceReturnModel>>> {
    let model = state
        .gate
        .run(|mgr| async move { mgr.list_interfaces().await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn get_interface(
    State(state): State<AppState>,
    Path(port): Path<String>,
) -> ApiResult<Json<InterfaceReturnModel>> {
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_interface(&port).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn ping(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<PingReturnModel>> {
    let params = decode_body::<PingRequest>(&body)?.validate()?;
    let model = state
        .gate
        .run(move |mgr| async move { mgr.ping(&params).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn restart_cache(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state
        .gate
        .run(|mut mgr| async move { mgr.restart_cache().await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tunnels and VNETs
// ---------------------------------------------------------------------------

pub(crate) async fn create_tunnel_decap(
    State(state): State<AppState>,
    Path(tunnel_type): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let ip = decode_body::<TunnelDecapRequest>(&body)?.validate()?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.create_tunnel_decap(&tunnel_type, ip).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn get_tunnel_decap(
    State(state): State<AppState>,
    Path(tunnel_type): Path<String>,
) -> ApiResult<Json<TunnelDecapReturnModel>> {
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_tunnel_decap(&tunnel_type).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn delete_tunnel_decap(
    State(state): State<AppState>,
    Path(tunnel_type): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .gate
        .run(move |mgr| async move { mgr.delete_tunnel_decap(&tunnel_type).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn create_vnet(
    State(state): State<AppState>,
    Path(vnet_name): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let params = decode_body::<VnetRequest>(&body)?.validate()?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.create_vnet(&vnet_name, params).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn get_vnet(
    State(state): State<AppState>,
    Path(vnet_name): Path<String>,
) -> ApiResult<Json<VnetReturnModel>> {
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_vnet(&vnet_name).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn delete_vnet(
    State(state): State<AppState>,
    Path(vnet_name): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .gate
        .run(move |mut mgr| async move { mgr.delete_vnet(&vnet_name).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// VLANs
// ---------------------------------------------------------------------------

pub(crate) async fn create_vlan(
    State(state): State<AppState>,
    Path(vlan_id): Path<String>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let vlan = parse_vlan(&vlan_id)?;
    let (vnet_name, prefix) = decode_body::<VlanRequest>(&body)?.validate()?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.create_vlan(vlan, vnet_name, prefix).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn get_vlan(
    State(state): State<AppState>,
    Path(vlan_id): Path<String>,
) -> ApiResult<Json<VlanReturnModel>> {
    let vlan = parse_vlan(&vlan_id)?;
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_vlan(vlan).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn delete_vlan(
    State(state): State<AppState>,
    Path(vlan_id): Path<String>,
) -> ApiResult<StatusCode> {
    let vlan = parse_vlan(&vlan_id)?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.delete_vlan(vlan).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_vlans(State(state): State<AppState>) -> ApiResult<Json<VlansReturnModel>> {
    let model = state
        .gate
        .run(|mgr| async move { mgr.list_vlans().await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn list_vlans_in_vnet(
    State(state): State<AppState>,
    Query(query): Query<QueryPairs>,
) -> ApiResult<Json<VlansPerVnetReturnModel>> {
    let vnet_name = single(&query, "vnet_id")?
        .ok_or_else(|| ApiError::malformed(&["vnet_id"], "No vnet_id specified"))?
        .to_string();
    let model = state
        .gate
        .run(move |mgr| async move { mgr.list_vlans_in_vnet(&vnet_name).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn add_vlan_member(
    State(state): State<AppState>,
    Path((vlan_id, if_name)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let mode = decode_body::<VlanMemberRequest>(&body)?.validate()?;
    let vlan = parse_vlan(&vlan_id)?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.add_vlan_member(vlan, &if_name, mode).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn get_vlan_member(
    State(state): State<AppState>,
    Path((vlan_id, if_name)): Path<(String, String)>,
) -> ApiResult<Json<VlanMemberReturnModel>> {
    let vlan = parse_vlan(&vlan_id)?;
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_vlan_member(vlan, &if_name).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn delete_vlan_member(
    State(state): State<AppState>,
    Path((vlan_id, if_name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let vlan = parse_vlan(&vlan_id)?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.delete_vlan_member(vlan, &if_name).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_vlan_members(
    State(state): State<AppState>,
    Path(vlan_id): Path<String>,
) -> ApiResult<Json<VlanMembersReturnModel>> {
    let vlan = parse_vlan(&vlan_id)?;
    let model = state
        .gate
        .run(move |mgr| async move { mgr.list_vlan_members(vlan).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn list_all_vlan_members(
    State(state): State<AppState>,
) -> ApiResult<Json<VlansMembersReturnModel>> {
    let model = state
        .gate
        .run(|mgr| async move { mgr.list_all_vlan_members().await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn add_vlan_neighbor(
    State(state): State<AppState>,
    Path((vlan_id, ip_addr)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let vlan = parse_vlan(&vlan_id)?;
    let ip = parse_ip(&ip_addr)?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.add_vlan_neighbor(vlan, ip).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn get_vlan_neighbor(
    State(state): State<AppState>,
    Path((vlan_id, ip_addr)): Path<(String, String)>,
) -> ApiResult<Json<VlanNeighborReturnModel>> {
    let vlan = parse_vlan(&vlan_id)?;
    let ip = parse_ip(&ip_addr)?;
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_vlan_neighbor(vlan, ip).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn delete_vlan_neighbor(
    State(state): State<AppState>,
    Path((vlan_id, ip_addr)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let vlan = parse_vlan(&vlan_id)?;
    let ip = parse_ip(&ip_addr)?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.delete_vlan_neighbor(vlan, ip).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_vlan_neighbors(
    State(state): State<AppState>,
    Path(vlan_id): Path<String>,
) -> ApiResult<Json<VlanNeighborsReturnModel>> {
    let vlan = parse_vlan(&vlan_id)?;
    let model = state
        .gate
        .run(move |mgr| async move { mgr.list_vlan_neighbors(vlan).await })
        .await?;
    Ok(Json(model))
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub(crate) async fn patch_vnet_routes(
    State(state): State<AppState>,
    Path(vnet_name): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let models: Vec<RouteModel> = decode_body(&body)?;
    let ops = validate_routes(&models)?;
    let failures = state
        .gate
        .run(move |mut mgr| async move { mgr.patch_vnet_routes(&vnet_name, &ops).await })
        .await?;
    Ok(batch_response(&models, failures))
}

pub(crate) async fn get_vnet_routes(
    State(state): State<AppState>,
    Path(vnet_name): Path<String>,
    Query(query): Query<QueryPairs>,
) -> ApiResult<Json<Vec<RouteModel>>> {
    let prefix = query_prefix(&query)?;
    let vnid = query_vnid(&query)?;
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_vnet_routes(&vnet_name, prefix, vnid).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn delete_vnet_routes(
    State(state): State<AppState>,
    Path(vnet_name): Path<String>,
    Query(query): Query<QueryPairs>,
) -> ApiResult<StatusCode> {
    let vnid = query_vnid(&query)?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.delete_vnet_routes(&vnet_name, vnid).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn patch_vrf_routes(
    State(state): State<AppState>,
    Path(vrf_id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let models: Vec<RouteModel> = decode_body(&body)?;
    let ops = validate_routes(&models)?;
    let failures = state
        .gate
        .run(move |mut mgr| async move { mgr.patch_vrf_routes(&vrf_id, &ops).await })
        .await?;
    Ok(batch_response(&models, failures))
}

pub(crate) async fn get_vrf_routes(
    State(state): State<AppState>,
    Path(vrf_id): Path<String>,
    Query(query): Query<QueryPairs>,
) -> ApiResult<Json<Vec<RouteModel>>> {
    let prefix = query_prefix(&query)?;
    let model = state
        .gate
        .run(move |mgr| async move { mgr.get_vrf_routes(&vrf_id, prefix).await })
        .await?;
    Ok(Json(model))
}

pub(crate) async fn set_route_expiry(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let request: RouteExpiryModel = decode_body(&body)?;
    state
        .gate
        .run(move |mut mgr| async move { mgr.set_route_expiry(request.time).await })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn get_route_expiry(
    State(state): State<AppState>,
) -> ApiResult<Json<RouteExpiryModel>> {
    let model = state
        .gate
        .run(|mgr| async move { mgr.get_route_expiry().await })
        .await?;
    Ok(Json(model))
}
