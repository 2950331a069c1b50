//! Request decoding helpers shared by the handlers.

use serde::de::DeserializeOwned;
use serde_json::error::Category;
use sonic_types::{IpAddress, IpPrefix, VlanId};
use tracing::debug;

use crate::error::{ApiError, ApiResult};
use crate::models::parse_vnid;

/// Query string as ordered pairs, so repeated parameters can be detected.
pub(crate) type QueryPairs = Vec<(String, String)>;

/// Decodes a JSON request body.
pub(crate) fn decode_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    debug!(body = %String::from_utf8_lossy(body), "Request body");
    serde_json::from_slice(body).map_err(|e| {
        let details = match e.classify() {
            Category::Syntax | Category::Eof => "Invalid character in JSON",
            Category::Data => "JSON field does not match required type",
            Category::Io => "Failed to decode JSON",
        };
        ApiError::malformed(&[], details)
    })
}

/// Value of a query parameter that may be given at most once.
pub(crate) fn single<'a>(query: &'a QueryPairs, name: &str) -> ApiResult<Option<&'a str>> {
    let mut values = query
        .iter()
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.as_str());
    let first = values.next();
    if values.next().is_some() {
        return Err(ApiError::malformed(&[name], format!("May only specify one {}", name)));
    }
    Ok(first)
}

pub(crate) fn query_prefix(query: &QueryPairs) -> ApiResult<Option<IpPrefix>> {
    single(query, "ip_prefix")?
        .map(|p| {
            p.parse()
                .map_err(|_| ApiError::malformed(&["ip_prefix"], "Invalid ip_prefix"))
        })
        .transpose()
}

pub(crate) fn query_vnid(query: &QueryPairs) -> ApiResult<Option<u32>> {
    single(query, "vnid")?.map(parse_vnid).transpose()
}

/// Parses the `{vlan_id}` path segment (2..=4094).
pub(crate) fn parse_vlan(vlan_id: &str) -> ApiResult<VlanId> {
    vlan_id
        .parse::<u16>()
        .ok()
        .and_then(|id| VlanId::new(id).ok())
        .ok_or_else(|| ApiError::malformed(&["vlan_id"], ""))
}

pub(crate) fn parse_ip(ip_addr: &str) -> ApiResult<IpAddress> {
    ip_addr
        .parse()
        .map_err(|_| ApiError::malformed(&["ip_addr"], "Invalid IP address"))
}
