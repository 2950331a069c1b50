//! Network primitives shared by the SONiC REST provisioning service.
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`IpPrefix`]: CIDR prefixes with canonical-network checks
//! - [`VlanId`]: provisionable VLAN tags

mod ip;
mod mac;
mod vlan;

pub use ip::{AddressFamily, IpAddress, IpPrefix, Ipv4Address, Ipv6Address};
pub use mac::MacAddress;
pub use vlan::{VlanId, VLAN_NAME_PREFIX};

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 2-4094)")]
    InvalidVlanId(String),
}
