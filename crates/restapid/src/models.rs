//! JSON request and response payloads of the v1 API.
//!
//! Request models deserialize leniently (every field optional) and are
//! turned into validated values by their `validate` methods, so that a
//! missing or malformed field produces the field-specific 400 response.

use serde::{Deserialize, Serialize};
use sonic_types::{IpAddress, IpPrefix, MacAddress};

use crate::error::{ApiError, ApiResult};
use crate::types::{parse_ip_list, RouteCommand, RouteOp, TaggingMode};

/// Details text of a missing required field.
pub const DETAIL_MISSING_FIELD: &str = "Missing JSON field";

/// Largest VNI + 1.
pub const VNI_LIMIT: u32 = 1 << 24;

pub(crate) fn missing(field: &str) -> ApiError {
    ApiError::malformed(&[field], DETAIL_MISSING_FIELD)
}

pub(crate) fn invalid(field: &str, message: &str) -> ApiError {
    ApiError::malformed(&[field], message)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn validate_vni(field: &str, vni: u32) -> ApiResult<u32> {
    if vni >= VNI_LIMIT {
        return Err(invalid(field, "vnid must be < 2^24"));
    }
    Ok(vni)
}

/// Parses a `vnid` query value.
pub fn parse_vnid(value: &str) -> ApiResult<u32> {
    let vni: u32 = value
        .parse()
        .map_err(|_| invalid("vnid", "vnid must be an integer"))?;
    validate_vni("vnid", vni)
}

fn parse_ips(field: &str, value: &Option<String>) -> ApiResult<Vec<IpAddress>> {
    match non_empty(value) {
        Some(v) => parse_ip_list(v).map_err(|_| invalid(field, "Invalid IP address")),
        None => Ok(Vec::new()),
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInner {
    pub code: u16,
    #[serde(rename = "sub-code", skip_serializing_if = "Option::is_none", default)]
    pub sub_code: Option<u8>,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub details: String,
}

/// `{"error": {...}}` body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorModel {
    pub error: ErrorInner,
}

impl From<&ApiError> for ErrorModel {
    fn from(err: &ApiError) -> Self {
        Self {
            error: ErrorInner {
                code: err.status_code(),
                sub_code: err.sub_code(),
                message: err.message(),
                fields: err.fields().to_vec(),
                details: err.details().to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Service state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatModel {
    pub server_version: String,
    #[serde(rename = "reset_GUID")]
    pub reset_guid: String,
    pub reset_time: String,
    pub routes_available: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetStatusModel {
    #[serde(default)]
    pub reset_status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceModel {
    #[serde(rename = "admin-state")]
    pub admin_state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceReturnModel {
    pub port: String,
    pub attr: InterfaceModel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpProfileModel {
    #[serde(default)]
    pub community_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteExpiryModel {
    #[serde(default)]
    pub time: i64,
}

// ---------------------------------------------------------------------------
// Tunnels and VNETs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelDecapRequest {
    pub ip_addr: Option<String>,
}

impl TunnelDecapRequest {
    pub fn validate(&self) -> ApiResult<IpAddress> {
        let ip = self.ip_addr.as_deref().ok_or_else(|| missing("ip_addr"))?;
        ip.parse()
            .map_err(|_| invalid("ip_addr", "Invalid IPv4 address"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelDecapModel {
    pub ip_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelDecapReturnModel {
    pub tunnel_type: String,
    pub attr: TunnelDecapModel,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VnetRequest {
    pub vnid: Option<u32>,
    pub advertise_prefix: Option<String>,
    pub overlay_dmac: Option<String>,
}

/// Validated VNET creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnetSpec {
    pub vni: u32,
    pub advertise_prefix: Option<String>,
    pub overlay_dmac: Option<MacAddress>,
}

impl VnetSpec {
    pub fn new(vni: u32) -> Self {
        Self {
            vni,
            advertise_prefix: None,
            overlay_dmac: None,
        }
    }
}

impl VnetRequest {
    pub fn validate(&self) -> ApiResult<VnetSpec> {
        let vni = validate_vni("vnid", self.vnid.ok_or_else(|| missing("vnid"))?)?;
        let overlay_dmac: Option<MacAddress> = match non_empty(&self.overlay_dmac) {
            Some(mac) => Some(
                mac.parse()
                    .map_err(|_| invalid("overlay_dmac", "Invalid MAC address"))?,
            ),
            None => None,
        };
        Ok(VnetSpec {
            vni,
            advertise_prefix: non_empty(&self.advertise_prefix).map(str::to_string),
            overlay_dmac,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnetModel {
    pub vnid: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub advertise_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnetReturnModel {
    pub vnet_id: String,
    pub attr: VnetModel,
}

// ---------------------------------------------------------------------------
// VLANs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VlanRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_prefix: Option<String>,
}

impl VlanRequest {
    /// Returns the VNET name and interface prefix, both optional.
    pub fn validate(&self) -> ApiResult<(Option<String>, Option<IpPrefix>)> {
        let prefix: Option<IpPrefix> = match non_empty(&self.ip_prefix) {
            Some(p) => Some(
                p.parse()
                    .map_err(|_| invalid("ip_prefix", "Invalid IP prefix"))?,
            ),
            None => None,
        };
        Ok((non_empty(&self.vnet_id).map(str::to_string), prefix))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanModel {
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub vnet_id: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub ip_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanReturnModel {
    pub vlan_id: u16,
    pub attr: VlanModel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlansModel {
    pub vlan_id: u16,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub ip_prefix: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub vnet_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlansReturnModel {
    pub attr: Vec<VlansModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlansPerVnetModel {
    pub vlan_id: u16,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub ip_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlansPerVnetReturnModel {
    pub vnet_id: String,
    pub attr: Vec<VlansPerVnetModel>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VlanMemberRequest {
    pub tagging_mode: Option<String>,
}

impl VlanMemberRequest {
    pub fn validate(&self) -> ApiResult<TaggingMode> {
        match non_empty(&self.tagging_mode) {
            None => Ok(TaggingMode::Untagged),
            Some(mode) => mode.parse().map_err(|_| {
                invalid("tagging_mode", "Invalid tagging_mode, must be tagged/untagged")
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanMemberModel {
    pub tagging_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanMemberReturnModel {
    pub vlan_id: u16,
    pub if_name: String,
    pub attr: VlanMemberModel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanMembersModel {
    pub if_name: String,
    pub tagging_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanMembersReturnModel {
    pub vlan_id: u16,
    pub attr: Vec<VlanMembersModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlansMembersReturnModel {
    pub attr: Vec<VlanMembersReturnModel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanNeighborReturnModel {
    pub vlan_id: u16,
    pub ip_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanNeighborsModel {
    pub ip_addr: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanNeighborsReturnModel {
    pub vlan_id: u16,
    pub attr: Vec<VlanNeighborsModel>,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// One route of a batch request, of a listing, or of the `failed` list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ifname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nexthop_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nexthop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nexthop_monitor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vnid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adv_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitoring: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
}

impl RouteModel {
    /// Validates the entry into a [`RouteOp`]. Any failure rejects the
    /// whole batch with 400.
    pub fn validate(&self) -> ApiResult<RouteOp> {
        let cmd = self.cmd.as_deref().ok_or_else(|| missing("cmd"))?;
        let prefix = self.ip_prefix.as_deref().ok_or_else(|| missing("ip_prefix"))?;
        if self.ifname.is_none() && self.nexthop.is_none() {
            return Err(missing("nexthop"));
        }

        let cmd: RouteCommand = cmd
            .parse()
            .map_err(|_| invalid("cmd", "Must be add/delete/append/remove"))?;
        let prefix: IpPrefix = prefix
            .parse()
            .map_err(|_| invalid("ip_prefix", "Invalid IP prefix"))?;

        let mut op = RouteOp::new(cmd, prefix);
        op.ifname = self.ifname.clone();
        op.nexthops = parse_ips("nexthop", &self.nexthop)?;
        op.nexthop_monitors = parse_ips("nexthop_monitor", &self.nexthop_monitor)?;
        op.primary = parse_ips("primary", &self.primary)?;

        if op.ifname.is_none() {
            if let Some(mac) = non_empty(&self.mac_address) {
                op.mac_address = Some(
                    mac.parse()
                        .map_err(|_| invalid("mac_address", "Invalid MAC address"))?,
                );
            }
        }
        op.vnid = match self.vnid {
            Some(0) | None => None,
            Some(vni) => Some(validate_vni("vnid", vni)?),
        };

        op.adv_prefix = non_empty(&self.adv_prefix).map(str::to_string);
        op.weight = non_empty(&self.weight).map(str::to_string);
        op.profile = non_empty(&self.profile).map(str::to_string);
        op.monitoring = non_empty(&self.monitoring).map(str::to_string);
        op.persistent = self.persistent.as_deref() == Some("true");
        Ok(op)
    }

    /// Copy of this entry carrying a failure.
    pub fn failed(&self, error_code: Option<u16>, error_msg: &str) -> Self {
        let mut failed = self.clone();
        failed.error_code = error_code;
        failed.error_msg = Some(error_msg.to_string());
        failed
    }
}

/// Body of a 207 route batch response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteReturnModel {
    #[serde(default)]
    pub failed: Vec<RouteModel>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PingRequest {
    pub ip_addr: Option<String>,
    pub vnet_id: Option<String>,
    pub count: Option<String>,
}

/// Validated ping parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingParams {
    pub ip: IpAddress,
    pub vnet_name: Option<String>,
    pub count: u32,
}

/// Echo requests sent when the caller gives no count.
pub const DEFAULT_PING_COUNT: u32 = 4;

impl PingRequest {
    pub fn validate(&self) -> ApiResult<PingParams> {
        let ip = self.ip_addr.as_deref().ok_or_else(|| missing("ip_addr"))?;
        let ip: IpAddress = ip
            .parse()
            .map_err(|_| invalid("ip_addr", "Invalid IPv4 address"))?;
        let count: u32 = match non_empty(&self.count) {
            Some(c) => c
                .parse()
                .map_err(|_| invalid("count", "count should be an integer"))?,
            None => DEFAULT_PING_COUNT,
        };
        Ok(PingParams {
            ip,
            vnet_name: non_empty(&self.vnet_id).map(str::to_string),
            count,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReturnModel {
    pub packets_transmitted: String,
    pub packets_received: String,
    pub min_rtt: String,
    pub max_rtt: String,
    pub avg_rtt: String,
}
