//! Dataplane and ARP agent client interfaces.
//!
//! Both agents are optional collaborators. The service only depends on the
//! traits below; transports are plugged in through
//! [`OverlayMgr::with_dataplane`](crate::OverlayMgr::with_dataplane) and
//! [`OverlayMgr::with_arp`](crate::OverlayMgr::with_arp).

use async_trait::async_trait;
use sonic_types::{IpAddress, IpPrefix, MacAddress};
use thiserror::Error;
use tracing::warn;

use crate::error::{ApiError, ApiResult, MSG_INTERNAL, MSG_MALFORMED};

/// Result code returned by the dataplane agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataplaneResult {
    Ok,
    Added,
    Removed,
    InvalidParameters,
    NoMemory,
    AlreadyExists,
    NotFound,
}

impl DataplaneResult {
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Added | Self::Removed)
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    /// The call did not complete.
    #[error("RPC transport error calling {call}: {message}")]
    Transport { call: String, message: String },
}

impl RpcError {
    pub fn transport(call: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            call: call.into(),
            message: message.into(),
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Programs forwarding state on the dataplane agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataplaneClient: Send + Sync {
    async fn map_vni_to_vrf(&self, vni: u32, vrf_id: u32) -> RpcResult<DataplaneResult>;

    async fn unmap_vni_to_vrf(&self, vni: u32) -> RpcResult<DataplaneResult>;

    async fn add_encap_route(
        &self,
        vrf_id: u32,
        prefix: IpPrefix,
        endpoint: IpAddress,
        mac: MacAddress,
        vni: u32,
        udp_port: u16,
    ) -> RpcResult<DataplaneResult>;

    async fn delete_encap_route(&self, vrf_id: u32, prefix: IpPrefix) -> RpcResult<DataplaneResult>;

    async fn add_decap_route(
        &self,
        vrf_id: u32,
        prefix: IpPrefix,
        mac: MacAddress,
        port: String,
        outer_vlan: u16,
        inner_vlan: u16,
    ) -> RpcResult<DataplaneResult>;

    async fn delete_decap_route(&self, vrf_id: u32, prefix: IpPrefix) -> RpcResult<DataplaneResult>;
}

/// Interface and VLAN tags an address may be reached on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpTuple {
    pub iface: String,
    pub stag: u16,
    pub ctag: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpRequest {
    /// Correlates the reply with the request item.
    pub index: u32,
    pub ip: IpAddress,
    pub tuples: Vec<ArpTuple>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpReply {
    pub index: u32,
    pub is_found: bool,
    pub mac: MacAddress,
}

/// Resolves nexthop MAC addresses through the ARP agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArpClient: Send + Sync {
    async fn request_mac(&self, requests: Vec<ArpRequest>) -> RpcResult<Vec<ArpReply>>;
}

/// Maps a dataplane outcome to an API error. `call` names the operation
/// and ends up in the error details.
pub fn check_result(call: &str, res: RpcResult<DataplaneResult>) -> ApiResult<()> {
    let result = match res {
        Ok(result) => result,
        Err(e) => {
            warn!(call, error = %e, "Dataplane call failed");
            return Err(ApiError::internal_with(MSG_INTERNAL, e.to_string()));
        }
    };

    if result.is_success() {
        return Ok(());
    }

    let details = format!("{} returned {:?}", call, result);
    warn!(call, ?result, "Dataplane rejected request");
    match result {
        DataplaneResult::Ok | DataplaneResult::Added | DataplaneResult::Removed => Ok(()),
        DataplaneResult::InvalidParameters => Err(ApiError::BadRequest {
            message: MSG_MALFORMED.to_string(),
            fields: Vec::new(),
            details,
        }),
        DataplaneResult::NoMemory => Err(ApiError::Forbidden {
            message: "Capacity insufficient".to_string(),
            details,
        }),
        DataplaneResult::AlreadyExists => Err(ApiError::MethodNotAllowed {
            message: "Object already exists".to_string(),
            details,
        }),
        DataplaneResult::NotFound => Err(ApiError::not_found_with(&[], details)),
    }
}
