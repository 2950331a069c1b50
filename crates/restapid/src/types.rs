//! Typed store records and route operations.
//!
//! Records are decoded once at the store boundary; a field that fails to
//! parse is reported as [`StoreError::Decode`] and surfaces as an internal
//! error.

use std::fmt;
use std::str::FromStr;

use sonic_restapi_common::{field_values, FieldValues, FieldValuesExt, StoreError, StoreResult};
use sonic_types::{AddressFamily, IpAddress, IpPrefix, MacAddress, VlanId};

use crate::tables::{self, fields};

/// A typed view of one store hash.
pub trait Record: Sized {
    /// Table the record lives in.
    const TABLE: &'static str;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self>;

    fn to_fields(&self) -> FieldValues;
}

fn required<'a>(table: &str, key: &str, fvs: &'a FieldValues, field: &str) -> StoreResult<&'a str> {
    fvs.get_field(field)
        .ok_or_else(|| StoreError::decode(table, key, format!("missing field {}", field)))
}

fn parse_field<T: FromStr>(table: &str, key: &str, field: &str, value: &str) -> StoreResult<T> {
    value.parse().map_err(|_| {
        StoreError::decode(table, key, format!("invalid {} value '{}'", field, value))
    })
}

fn optional(fvs: &FieldValues, field: &str) -> Option<String> {
    fvs.get_field(field)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Parses a comma separated address list. Empty input yields an empty list.
pub fn parse_ip_list(s: &str) -> Result<Vec<IpAddress>, String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().map_err(|_| part.to_string()))
        .collect()
}

pub fn join_ip_list(ips: &[IpAddress]) -> String {
    ips.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_list_field(table: &str, key: &str, fvs: &FieldValues, field: &str) -> StoreResult<Vec<IpAddress>> {
    match fvs.get_field(field) {
        Some(value) => parse_ip_list(value).map_err(|bad| {
            StoreError::decode(table, key, format!("invalid address '{}' in {}", bad, field))
        }),
        None => Ok(Vec::new()),
    }
}

/// VXLAN tunnel endpoint (`VXLAN_TUNNEL|default_vxlan_tunnel[_v4]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRecord {
    pub src_ip: IpAddress,
}

impl TunnelRecord {
    /// Well-known tunnel name for the address family.
    pub fn name_for(family: AddressFamily) -> &'static str {
        match family {
            AddressFamily::V4 => tables::DEFAULT_VXLAN_TUNNEL_V4,
            AddressFamily::V6 => tables::DEFAULT_VXLAN_TUNNEL,
        }
    }
}

impl Record for TunnelRecord {
    const TABLE: &'static str = tables::CFG_VXLAN_TUNNEL_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        let src_ip = required(Self::TABLE, key, fvs, fields::SRC_IP)?;
        Ok(Self {
            src_ip: parse_field(Self::TABLE, key, fields::SRC_IP, src_ip)?,
        })
    }

    fn to_fields(&self) -> FieldValues {
        field_values! { fields::SRC_IP => self.src_ip }
    }
}

/// VNET definition (`VNET|Vnet<id>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnetRecord {
    pub vxlan_tunnel: String,
    pub vni: u32,
    /// Operator-chosen name; absent only on records not written by this service.
    pub guid: Option<String>,
    pub scope: Option<String>,
    pub advertise_prefix: Option<String>,
    pub overlay_dmac: Option<String>,
}

impl VnetRecord {
    pub fn new(vxlan_tunnel: impl Into<String>, vni: u32, guid: impl Into<String>) -> Self {
        Self {
            vxlan_tunnel: vxlan_tunnel.into(),
            vni,
            guid: Some(guid.into()),
            scope: None,
            advertise_prefix: None,
            overlay_dmac: None,
        }
    }

    /// True when routes of this VNET are advertised, which enforces
    /// minimum route prefix lengths.
    pub fn advertises_prefix(&self) -> bool {
        self.advertise_prefix.as_deref() == Some("true")
    }
}

impl Record for VnetRecord {
    const TABLE: &'static str = tables::CFG_VNET_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        let vni = required(Self::TABLE, key, fvs, fields::VNI)?;
        Ok(Self {
            vxlan_tunnel: fvs.get_field_or(fields::VXLAN_TUNNEL, "").to_string(),
            vni: parse_field(Self::TABLE, key, fields::VNI, vni)?,
            guid: optional(fvs, fields::GUID),
            scope: optional(fvs, fields::SCOPE),
            advertise_prefix: optional(fvs, fields::ADVERTISE_PREFIX),
            overlay_dmac: optional(fvs, fields::OVERLAY_DMAC),
        })
    }

    fn to_fields(&self) -> FieldValues {
        let mut fvs = field_values! {
            fields::VXLAN_TUNNEL => self.vxlan_tunnel,
            fields::VNI => self.vni,
        };
        if let Some(guid) = &self.guid {
            fvs.set_field(fields::GUID, guid.clone());
        }
        if let Some(scope) = &self.scope {
            fvs.set_field(fields::SCOPE, scope.clone());
        }
        if let Some(adv) = &self.advertise_prefix {
            fvs.set_field(fields::ADVERTISE_PREFIX, adv.clone());
        }
        if let Some(dmac) = &self.overlay_dmac {
            fvs.set_field(fields::OVERLAY_DMAC, dmac.clone());
        }
        fvs
    }
}

/// VLAN definition (`VLAN|Vlan<tag>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanRecord {
    pub vlan: VlanId,
    pub host_ifname: String,
}

impl VlanRecord {
    pub fn new(vlan: VlanId) -> Self {
        Self {
            vlan,
            host_ifname: format!("{}{}", tables::HOST_IFNAME_PREFIX, vlan.name()),
        }
    }
}

impl Record for VlanRecord {
    const TABLE: &'static str = tables::CFG_VLAN_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        let vlan = match fvs.get_field(fields::VLANID) {
            Some(id) => parse_field(Self::TABLE, key, fields::VLANID, id)?,
            None => VlanId::from_name(key)
                .map_err(|e| StoreError::decode(Self::TABLE, key, e.to_string()))?,
        };
        Ok(Self {
            vlan,
            host_ifname: fvs.get_field_or(fields::HOST_IFNAME, "").to_string(),
        })
    }

    fn to_fields(&self) -> FieldValues {
        field_values! {
            fields::VLANID => self.vlan,
            fields::HOST_IFNAME => self.host_ifname,
        }
    }
}

/// VLAN interface bound to a VNET (`VLAN_INTERFACE|Vlan<tag>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanBinding {
    /// Store key of the VNET (`Vnet<id>`).
    pub vnet_name: String,
}

impl Record for VlanBinding {
    const TABLE: &'static str = tables::CFG_VLAN_INTF_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        Ok(Self {
            vnet_name: required(Self::TABLE, key, fvs, fields::VNET_NAME)?.to_string(),
        })
    }

    fn to_fields(&self) -> FieldValues {
        field_values! {
            fields::VNET_NAME => self.vnet_name,
            fields::PROXY_ARP => "enabled",
        }
    }
}

/// Port tagging mode of a VLAN member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaggingMode {
    Tagged,
    #[default]
    Untagged,
}

impl TaggingMode {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TaggingMode::Tagged => "tagged",
            TaggingMode::Untagged => "untagged",
        }
    }
}

impl fmt::Display for TaggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaggingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tagged" => Ok(TaggingMode::Tagged),
            "untagged" => Ok(TaggingMode::Untagged),
            _ => Err(format!("unknown tagging mode: {}", s)),
        }
    }
}

/// VLAN member port (`VLAN_MEMBER|Vlan<tag>|<ifname>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanMemberRecord {
    pub tagging_mode: TaggingMode,
}

impl Record for VlanMemberRecord {
    const TABLE: &'static str = tables::CFG_VLAN_MEMBER_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        let mode = fvs.get_field_or(fields::TAGGING_MODE, "untagged");
        Ok(Self {
            tagging_mode: parse_field(Self::TABLE, key, fields::TAGGING_MODE, mode)?,
        })
    }

    fn to_fields(&self) -> FieldValues {
        field_values! { fields::TAGGING_MODE => self.tagging_mode }
    }
}

/// Static neighbor (`NEIGH|Vlan<tag>|<ip>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighRecord {
    pub family: AddressFamily,
}

impl Record for NeighRecord {
    const TABLE: &'static str = tables::CFG_NEIGH_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        let family = match required(Self::TABLE, key, fvs, fields::FAMILY)? {
            "IPv4" => AddressFamily::V4,
            "IPv6" => AddressFamily::V6,
            other => {
                return Err(StoreError::decode(
                    Self::TABLE,
                    key,
                    format!("unknown family {}", other),
                ))
            }
        };
        Ok(Self { family })
    }

    fn to_fields(&self) -> FieldValues {
        field_values! { fields::FAMILY => self.family.as_str() }
    }
}

/// VXLAN tunnel route (`VNET_ROUTE_TUNNEL_TABLE:Vnet<id>:<prefix>`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TunnelRoute {
    pub endpoints: Vec<IpAddress>,
    pub endpoint_monitors: Vec<IpAddress>,
    pub mac_address: Option<MacAddress>,
    pub vni: Option<u32>,
    pub primary: Vec<IpAddress>,
    pub adv_prefix: Option<IpPrefix>,
    pub weight: Option<String>,
    pub profile: Option<String>,
    pub monitoring: Option<String>,
}

impl TunnelRoute {
    /// Compares everything that identifies the programmed route. The
    /// monitoring mode is not part of it.
    pub fn same_route(&self, other: &TunnelRoute) -> bool {
        self.endpoints == other.endpoints
            && self.endpoint_monitors == other.endpoint_monitors
            && self.mac_address == other.mac_address
            && self.vni == other.vni
            && self.primary == other.primary
            && self.adv_prefix == other.adv_prefix
            && self.weight == other.weight
            && self.profile == other.profile
    }
}

impl Record for TunnelRoute {
    const TABLE: &'static str = tables::APP_VNET_RT_TUNNEL_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        let mac_address = match optional(fvs, fields::MAC_ADDRESS) {
            Some(mac) => Some(parse_field(Self::TABLE, key, fields::MAC_ADDRESS, &mac)?),
            None => None,
        };
        let vni = match optional(fvs, fields::VNI) {
            Some(vni) => Some(parse_field(Self::TABLE, key, fields::VNI, &vni)?),
            None => None,
        };
        let adv_prefix = match optional(fvs, fields::ADV_PREFIX) {
            Some(p) => Some(parse_field(Self::TABLE, key, fields::ADV_PREFIX, &p)?),
            None => None,
        };

        Ok(Self {
            endpoints: parse_list_field(Self::TABLE, key, fvs, fields::ENDPOINT)?,
            endpoint_monitors: parse_list_field(Self::TABLE, key, fvs, fields::ENDPOINT_MONITOR)?,
            mac_address,
            vni: vni.filter(|v| *v != 0),
            primary: parse_list_field(Self::TABLE, key, fvs, fields::PRIMARY)?,
            adv_prefix,
            weight: optional(fvs, fields::WEIGHT),
            profile: optional(fvs, fields::PROFILE),
            monitoring: optional(fvs, fields::MONITORING),
        })
    }

    fn to_fields(&self) -> FieldValues {
        let mut fvs = field_values! { fields::ENDPOINT => join_ip_list(&self.endpoints) };
        if let Some(mac) = &self.mac_address {
            fvs.set_field(fields::MAC_ADDRESS, mac.to_string());
        }
        if let Some(vni) = self.vni {
            fvs.set_field(fields::VNI, vni.to_string());
        }
        if !self.endpoint_monitors.is_empty() {
            fvs.set_field(fields::ENDPOINT_MONITOR, join_ip_list(&self.endpoint_monitors));
        }
        if !self.primary.is_empty() {
            fvs.set_field(fields::PRIMARY, join_ip_list(&self.primary));
        }
        if let Some(weight) = &self.weight {
            fvs.set_field(fields::WEIGHT, weight.clone());
        }
        if let Some(profile) = &self.profile {
            fvs.set_field(fields::PROFILE, profile.clone());
        }
        if let Some(adv) = &self.adv_prefix {
            fvs.set_field(fields::ADV_PREFIX, adv.to_string());
        }
        if let Some(monitoring) = &self.monitoring {
            fvs.set_field(fields::MONITORING, monitoring.clone());
        }
        fvs
    }
}

/// Route through a local interface (`VNET_ROUTE_TABLE:Vnet<id>:<prefix>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRoute {
    pub ifname: String,
    pub nexthops: Vec<IpAddress>,
}

impl LocalRoute {
    pub fn new(ifname: impl Into<String>) -> Self {
        Self {
            ifname: ifname.into(),
            nexthops: Vec::new(),
        }
    }
}

impl Record for LocalRoute {
    const TABLE: &'static str = tables::APP_VNET_RT_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        Ok(Self {
            ifname: fvs.get_field_or(fields::IFNAME, "").to_string(),
            nexthops: parse_list_field(Self::TABLE, key, fvs, fields::NEXTHOP)?,
        })
    }

    fn to_fields(&self) -> FieldValues {
        let mut fvs = field_values! { fields::IFNAME => self.ifname };
        if !self.nexthops.is_empty() {
            fvs.set_field(fields::NEXTHOP, join_ip_list(&self.nexthops));
        }
        fvs
    }
}

/// Static route of the default VRF (`STATIC_ROUTE|default|<prefix>`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StaticRoute {
    pub nexthops: Vec<IpAddress>,
    /// Comma separated interface names; `null` for blackhole routes.
    pub ifname: Option<String>,
    pub blackhole: bool,
    pub endpoint_monitors: Vec<IpAddress>,
    pub weight: Option<String>,
    pub profile: Option<String>,
    pub refresh: bool,
}

impl Record for StaticRoute {
    const TABLE: &'static str = tables::CFG_STATIC_ROUTE_TABLE_NAME;

    fn from_fields(key: &str, fvs: &FieldValues) -> StoreResult<Self> {
        Ok(Self {
            nexthops: parse_list_field(Self::TABLE, key, fvs, fields::NEXTHOP)?,
            ifname: optional(fvs, fields::IFNAME),
            blackhole: fvs.get_field(fields::BLACKHOLE) == Some("true"),
            endpoint_monitors: parse_list_field(Self::TABLE, key, fvs, fields::ENDPOINT_MONITOR)?,
            weight: optional(fvs, fields::WEIGHT),
            profile: optional(fvs, fields::PROFILE),
            refresh: fvs.get_field(fields::REFRESH) == Some("true"),
        })
    }

    fn to_fields(&self) -> FieldValues {
        let mut fvs = FieldValues::new();
        if !self.nexthops.is_empty() {
            fvs.set_field(fields::NEXTHOP, join_ip_list(&self.nexthops));
        }
        if let Some(ifname) = &self.ifname {
            fvs.set_field(fields::IFNAME, ifname.clone());
        }
        if self.blackhole {
            fvs.set_field(fields::BLACKHOLE, "true");
        }
        if !self.endpoint_monitors.is_empty() {
            fvs.set_field(fields::ENDPOINT_MONITOR, join_ip_list(&self.endpoint_monitors));
        }
        if let Some(weight) = &self.weight {
            fvs.set_field(fields::WEIGHT, weight.clone());
        }
        if let Some(profile) = &self.profile {
            fvs.set_field(fields::PROFILE, profile.clone());
        }
        if self.refresh {
            fvs.set_field(fields::REFRESH, "true");
        }
        fvs
    }
}

/// Route batch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCommand {
    Add,
    Delete,
    /// Adds endpoints to an existing multi-path route.
    Append,
    /// Removes endpoints from an existing multi-path route.
    Remove,
}

impl RouteCommand {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RouteCommand::Add => "add",
            RouteCommand::Delete => "delete",
            RouteCommand::Append => "append",
            RouteCommand::Remove => "remove",
        }
    }
}

impl FromStr for RouteCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(RouteCommand::Add),
            "delete" => Ok(RouteCommand::Delete),
            "append" => Ok(RouteCommand::Append),
            "remove" => Ok(RouteCommand::Remove),
            _ => Err(format!("unknown route command: {}", s)),
        }
    }
}

/// One validated entry of a route batch.
///
/// The prefix is kept as written; the reconciliation engine rejects
/// prefixes with host bits set per item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteOp {
    pub cmd: RouteCommand,
    pub prefix: IpPrefix,
    pub ifname: Option<String>,
    pub nexthops: Vec<IpAddress>,
    pub nexthop_monitors: Vec<IpAddress>,
    pub mac_address: Option<MacAddress>,
    pub vnid: Option<u32>,
    pub primary: Vec<IpAddress>,
    /// Raw advertisement prefix, validated per item.
    pub adv_prefix: Option<String>,
    pub weight: Option<String>,
    pub profile: Option<String>,
    pub monitoring: Option<String>,
    pub persistent: bool,
}

impl RouteOp {
    pub fn new(cmd: RouteCommand, prefix: IpPrefix) -> Self {
        Self {
            cmd,
            prefix,
            ifname: None,
            nexthops: Vec::new(),
            nexthop_monitors: Vec::new(),
            mac_address: None,
            vnid: None,
            primary: Vec::new(),
            adv_prefix: None,
            weight: None,
            profile: None,
            monitoring: None,
            persistent: false,
        }
    }

    pub fn with_nexthops(mut self, nexthops: Vec<IpAddress>) -> Self {
        self.nexthops = nexthops;
        self
    }

    pub fn with_ifname(mut self, ifname: impl Into<String>) -> Self {
        self.ifname = Some(ifname.into());
        self
    }

    pub fn with_monitors(mut self, monitors: Vec<IpAddress>) -> Self {
        self.nexthop_monitors = monitors;
        self
    }

    pub fn is_local(&self) -> bool {
        self.ifname.is_some()
    }
}

/// Per-item failure of a route batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteFailure {
    /// Position of the item in the request.
    pub index: usize,
    pub error_code: Option<u16>,
    pub error_msg: String,
}

impl RouteFailure {
    pub fn new(index: usize, error_msg: impl Into<String>) -> Self {
        Self {
            index,
            error_code: None,
            error_msg: error_msg.into(),
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.error_code = Some(code);
        self
    }
}
