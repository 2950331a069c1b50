//! Database table names, well-known keys and field names for restapid

// CONFIG_DB tables
/// VXLAN tunnel endpoint table in CONFIG_DB
pub const CFG_VXLAN_TUNNEL_TABLE_NAME: &str = "VXLAN_TUNNEL";

/// VNET table in CONFIG_DB
pub const CFG_VNET_TABLE_NAME: &str = "VNET";

/// VLAN table in CONFIG_DB
pub const CFG_VLAN_TABLE_NAME: &str = "VLAN";

/// VLAN interface table in CONFIG_DB (VNET binding and interface prefixes)
pub const CFG_VLAN_INTF_TABLE_NAME: &str = "VLAN_INTERFACE";

/// VLAN member table in CONFIG_DB
pub const CFG_VLAN_MEMBER_TABLE_NAME: &str = "VLAN_MEMBER";

/// Static neighbor table in CONFIG_DB
pub const CFG_NEIGH_TABLE_NAME: &str = "NEIGH";

/// Persistent static route table in CONFIG_DB
pub const CFG_STATIC_ROUTE_TABLE_NAME: &str = "STATIC_ROUTE";

// APPL_DB tables
/// VNET tunnel route table in APPL_DB
pub const APP_VNET_RT_TUNNEL_TABLE_NAME: &str = "VNET_ROUTE_TUNNEL_TABLE";

/// VNET local route table in APPL_DB
pub const APP_VNET_RT_TABLE_NAME: &str = "VNET_ROUTE_TABLE";

/// Non-persistent static route table in APPL_DB
pub const APP_STATIC_ROUTE_TABLE_NAME: &str = "STATIC_ROUTE";

/// Static route expiry table in APPL_DB
pub const APP_STATIC_ROUTE_EXPIRY_TABLE_NAME: &str = "STATIC_ROUTE_EXPIRY";

/// BGP profile table in APPL_DB
pub const APP_BGP_PROFILE_TABLE_NAME: &str = "BGP_PROFILE_TABLE";

// COUNTERS_DB tables
/// CRM table in COUNTERS_DB
pub const COUNTERS_CRM_TABLE_NAME: &str = "CRM";

/// Key of the CRM resource statistics
pub const COUNTERS_CRM_STATS_KEY: &str = "STATS";

// Restapi cache DB
/// Bare hash holding reset GUID, reset time and reset status
pub const CACHE_RESET_INFO_KEY: &str = "RESET_INFO";

/// Tables written through the producer protocol in APPL_DB
pub const APPL_PRODUCER_TABLES: &[&str] = &[
    APP_VNET_RT_TUNNEL_TABLE_NAME,
    APP_VNET_RT_TABLE_NAME,
];

// Well-known names
/// IPv6 VXLAN tunnel endpoint
pub const DEFAULT_VXLAN_TUNNEL: &str = "default_vxlan_tunnel";

/// IPv4 VXLAN tunnel endpoint
pub const DEFAULT_VXLAN_TUNNEL_V4: &str = "default_vxlan_tunnel_v4";

/// Prefix of VNET keys (`Vnet<id>`)
pub const VNET_NAME_PREFIX: &str = "Vnet";

/// Reserved VNET bound to the IPv6 tunnel
pub const RESERVED_VNET_DEFAULT: &str = "Vnet-default";

/// Reserved VNET bound to the IPv4 tunnel
pub const RESERVED_VNET_DEFAULT_V4: &str = "Vnet-default-v4";

/// Scope given to reserved VNETs
pub const SCOPE_DEFAULT: &str = "default";

/// The only VRF accepted by the static route API
pub const DEFAULT_VRF: &str = "default";

/// Prefix of the monitor host interface of a VLAN
pub const HOST_IFNAME_PREFIX: &str = "Mon";

/// Only supported tunnel type
pub const TUNNEL_TYPE_VXLAN: &str = "vxlan";

/// VXLAN UDP destination port
pub const VXLAN_UDP_PORT: u16 = 4789;

/// Field names used in CONFIG_DB and APPL_DB
pub mod fields {
    /// Tunnel source address
    pub const SRC_IP: &str = "src_ip";

    /// Tunnel a VNET is attached to
    pub const VXLAN_TUNNEL: &str = "vxlan_tunnel";

    /// VXLAN Network Identifier
    pub const VNI: &str = "vni";

    /// Operator-chosen VNET name
    pub const GUID: &str = "guid";

    pub const SCOPE: &str = "scope";

    pub const ADVERTISE_PREFIX: &str = "advertise_prefix";

    pub const OVERLAY_DMAC: &str = "overlay_dmac";

    pub const VLANID: &str = "vlanid";

    pub const HOST_IFNAME: &str = "host_ifname";

    /// VNET a VLAN interface is bound to
    pub const VNET_NAME: &str = "vnet_name";

    pub const PROXY_ARP: &str = "proxy_arp";

    /// `tagged` or `untagged`
    pub const TAGGING_MODE: &str = "tagging_mode";

    /// `IPv4` or `IPv6`
    pub const FAMILY: &str = "family";

    /// Comma separated tunnel endpoints
    pub const ENDPOINT: &str = "endpoint";

    /// Comma separated monitor addresses, one per endpoint
    pub const ENDPOINT_MONITOR: &str = "endpoint_monitor";

    pub const MAC_ADDRESS: &str = "mac_address";

    /// Subset of the endpoints marked primary
    pub const PRIMARY: &str = "primary";

    pub const ADV_PREFIX: &str = "adv_prefix";

    pub const WEIGHT: &str = "weight";

    pub const PROFILE: &str = "profile";

    pub const MONITORING: &str = "monitoring";

    pub const IFNAME: &str = "ifname";

    pub const NEXTHOP: &str = "nexthop";

    pub const BLACKHOLE: &str = "blackhole";

    /// Set on non-persistent static routes so the expiry timer is refreshed
    pub const REFRESH: &str = "refresh";

    /// Static route expiry time
    pub const TIME: &str = "time";

    pub const COMMUNITY_ID: &str = "community_id";

    /// Remaining IPv4 route capacity
    pub const CRM_IPV4_ROUTE_AVAILABLE: &str = "crm_stats_ipv4_route_available";

    /// Reset GUID
    pub const RESET_GUID: &str = "GUID";

    /// Reset time
    pub const RESET_TIME: &str = "time";

    pub const RESET_STATUS: &str = "reset_status";
}
