//! VNET route reconciliation.
//!
//! A batch is applied item by item against the stored route tables. Items
//! fail independently; the batch result lists the failures and never rolls
//! back items that were applied.

use std::collections::HashMap;

use sonic_restapi_common::StoreError;
use sonic_types::{AddressFamily, IpAddress, IpPrefix, MacAddress, VlanId};
use tracing::{debug, info, instrument, warn};

use crate::error::{ApiError, ApiResult, MSG_INTERNAL};
use crate::models::RouteModel;
use crate::overlay_mgr::{join_key, read_record, scan_records, write_record, OverlayMgr, VnetHandle};
use crate::rpc::{check_result, ArpRequest, ArpTuple};
use crate::tables::VXLAN_UDP_PORT;
use crate::types::{join_ip_list, LocalRoute, Record, RouteCommand, RouteFailure, RouteOp, TunnelRoute};

const MSG_NOT_FOUND_ROUTE: &str = "Not found";
const MSG_REMOVE_MISSING: &str = "Cannot remove from non-existing route. Please add the route first!";
const MSG_MONITOR_CARDINALITY: &str = "there must be equal number of nexthop(s) and nexthop_monitor(s)";

/// Why a single batch item was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ItemError {
    pub code: Option<u16>,
    pub msg: String,
}

impl ItemError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self {
            code: None,
            msg: msg.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            code: Some(404),
            msg: MSG_NOT_FOUND_ROUTE.to_string(),
        }
    }

    pub fn into_failure(self, index: usize) -> RouteFailure {
        let failure = RouteFailure::new(index, self.msg);
        match self.code {
            Some(code) => failure.with_code(code),
            None => failure,
        }
    }
}

impl From<StoreError> for ItemError {
    fn from(err: StoreError) -> Self {
        warn!(error = %err, "Store failure while applying route");
        Self {
            code: Some(500),
            msg: MSG_INTERNAL.to_string(),
        }
    }
}

impl From<ApiError> for ItemError {
    fn from(err: ApiError) -> Self {
        Self {
            code: Some(err.status_code()),
            msg: err.message(),
        }
    }
}

type ItemResult = Result<(), ItemError>;

/// Rejects prefixes with host bits set, e.g. `10.20.30.4/24`.
pub(crate) fn check_canonical(prefix: &IpPrefix) -> ItemResult {
    if !prefix.is_canonical() {
        return Err(ItemError::rejected("Incorrect IP Prefix"));
    }
    Ok(())
}

fn check_route_floor(prefix: &IpPrefix) -> ItemResult {
    match prefix.family() {
        AddressFamily::V4 if prefix.prefix_len() < 18 => Err(ItemError::rejected(
            "Prefix length lesser than 18 is not supported",
        )),
        AddressFamily::V6 if prefix.prefix_len() < 64 => Err(ItemError::rejected(
            "Prefix length lesser than 64 is not supported",
        )),
        _ => Ok(()),
    }
}

fn parse_adv_prefix(raw: &str) -> Result<IpPrefix, ItemError> {
    let prefix: IpPrefix = raw
        .parse()
        .map_err(|_| ItemError::rejected("Incorrect Advertisement Prefix"))?;
    if !prefix.is_canonical() {
        return Err(ItemError::rejected("Incorrect Advertisement Prefix"));
    }
    match prefix.family() {
        AddressFamily::V4 if prefix.prefix_len() < 18 => Err(ItemError::rejected(
            "Adv Prefix length lesser than 18 is not supported",
        )),
        AddressFamily::V6 if prefix.prefix_len() < 60 => Err(ItemError::rejected(
            "Adv Prefix length lesser than 60 is not supported",
        )),
        _ => Ok(prefix),
    }
}

/// Builds the tunnel route an `add` asks for.
fn desired_tunnel_route(op: &RouteOp) -> Result<TunnelRoute, ItemError> {
    if let Some(missing) = op.primary.iter().find(|p| !op.nexthops.contains(p)) {
        return Err(ItemError::rejected(format!(
            "{} not present in nexthop list",
            missing
        )));
    }
    let adv_prefix = match op.adv_prefix.as_deref() {
        Some(raw) => Some(parse_adv_prefix(raw)?),
        None => None,
    };

    Ok(TunnelRoute {
        endpoints: op.nexthops.clone(),
        endpoint_monitors: op.nexthop_monitors.clone(),
        mac_address: op.mac_address,
        vni: op.vnid,
        primary: op.primary.clone(),
        adv_prefix,
        weight: op.weight.clone(),
        profile: op.profile.clone(),
        monitoring: op.monitoring.clone(),
    })
}

/// Adds the addresses of `add` missing from `list`. Returns whether
/// anything changed.
fn append_missing(list: &mut Vec<IpAddress>, add: &[IpAddress]) -> bool {
    let before = list.len();
    for ip in add {
        if !list.contains(ip) {
            list.push(*ip);
        }
    }
    list.len() != before
}

/// Removes every address of `remove` from `list`; all must be present.
fn remove_all(list: &mut Vec<IpAddress>, remove: &[IpAddress]) -> Result<(), ItemError> {
    for ip in remove {
        match list.iter().position(|x| x == ip) {
            Some(pos) => {
                list.remove(pos);
            }
            None => return Err(ItemError::rejected(format!("{} not present to remove", ip))),
        }
    }
    Ok(())
}

/// Result of the ARP lookup for one local route item.
type ResolvedMacs = HashMap<usize, Option<MacAddress>>;

impl OverlayMgr {
    /// Applies a route batch to VNET `vnet_name` and returns the failed
    /// items.
    #[instrument(skip(self, ops), fields(items = ops.len()))]
    pub async fn patch_vnet_routes(&mut self, vnet_name: &str, ops: &[RouteOp]) -> ApiResult<Vec<RouteFailure>> {
        let vnet = self.resolve_vnet(vnet_name).await?;
        let macs = self.resolve_nexthop_macs(ops).await?;

        let mut failures = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            if let Err(err) = self.apply_vnet_route(&vnet, index, op, &macs).await {
                debug!(index, prefix = %op.prefix, error = %err.msg, "Route item failed");
                failures.push(err.into_failure(index));
            }
        }

        info!(
            vnet = %vnet.name,
            applied = ops.len() - failures.len(),
            failed = failures.len(),
            "Applied route batch"
        );
        Ok(failures)
    }

    /// Resolves the nexthop MAC of every local route being written, in one
    /// ARP request correlated by item index.
    async fn resolve_nexthop_macs(&self, ops: &[RouteOp]) -> ApiResult<ResolvedMacs> {
        let Some(arp) = &self.arp else {
            return Ok(ResolvedMacs::new());
        };

        let requests: Vec<ArpRequest> = ops
            .iter()
            .enumerate()
            .filter(|(_, op)| op.cmd != RouteCommand::Delete)
            .filter_map(|(index, op)| {
                let ifname = op.ifname.as_ref()?;
                let ip = *op.nexthops.first()?;
                let stag = VlanId::from_name(ifname).map(|v| v.as_u16()).unwrap_or(0);
                Some(ArpRequest {
                    index: index as u32,
                    ip,
                    tuples: vec![ArpTuple {
                        iface: ifname.clone(),
                        stag,
                        ctag: 0,
                    }],
                })
            })
            .collect();
        if requests.is_empty() {
            return Ok(ResolvedMacs::new());
        }

        let mut macs: ResolvedMacs = requests.iter().map(|r| (r.index as usize, None)).collect();
        let replies = arp.request_mac(requests).await.map_err(|e| {
            warn!(error = %e, "ARP resolution failed");
            ApiError::internal_with(MSG_INTERNAL, e.to_string())
        })?;
        for reply in replies {
            if reply.is_found {
                macs.insert(reply.index as usize, Some(reply.mac));
            }
        }
        Ok(macs)
    }

    async fn apply_vnet_route(
        &self,
        vnet: &VnetHandle,
        index: usize,
        op: &RouteOp,
        macs: &ResolvedMacs,
    ) -> ItemResult {
        check_canonical(&op.prefix)?;
        if vnet.record.advertises_prefix() {
            check_route_floor(&op.prefix)?;
        }

        if let [nexthop] = op.nexthops.as_slice() {
            if self.tunnel_endpoints.contains(nexthop) {
                debug!(prefix = %op.prefix, %nexthop, "Skipping route through local tunnel endpoint");
                return Ok(());
            }
        }

        let key = join_key(self.appl(), &[&vnet.key, &op.prefix.to_string()]);
        if op.is_local() {
            let mac = macs.get(&index).copied();
            self.apply_local_route(vnet, &key, op, mac).await
        } else {
            self.apply_tunnel_route(vnet, &key, op).await
        }
    }

    async fn apply_tunnel_route(&self, vnet: &VnetHandle, key: &str, op: &RouteOp) -> ItemResult {
        let current = read_record::<TunnelRoute>(self.appl(), key).await?;

        match (op.cmd, current) {
            (RouteCommand::Delete, None) => Err(ItemError::not_found()),
            (RouteCommand::Delete, Some(_)) => self.remove_tunnel_route(vnet, key, op.prefix).await,
            (RouteCommand::Remove, None) => Err(ItemError::rejected(MSG_REMOVE_MISSING)),
            (RouteCommand::Add | RouteCommand::Append, None) => {
                let route = desired_tunnel_route(op)?;
                self.program_tunnel_route(vnet, key, op.prefix, &route).await
            }
            (RouteCommand::Add, Some(current)) => {
                let route = desired_tunnel_route(op)?;
                if route.same_route(&current) {
                    debug!(key, "Identical route, skipping");
                    return Ok(());
                }
                self.appl().delete(TunnelRoute::TABLE, key).await?;
                self.program_tunnel_route(vnet, key, op.prefix, &route).await
            }
            (RouteCommand::Append | RouteCommand::Remove, Some(current)) => {
                if desired_tunnel_route(op)?.same_route(&current) {
                    debug!(key, cmd = op.cmd.as_str(), "Identical route, skipping");
                    return Ok(());
                }
                self.edit_tunnel_route(vnet, key, op, current).await
            }
        }
    }

    /// Multi-path editing of an existing tunnel route.
    async fn edit_tunnel_route(&self, vnet: &VnetHandle, key: &str, op: &RouteOp, current: TunnelRoute) -> ItemResult {
        let mut edited = current.clone();
        if op.cmd == RouteCommand::Append {
            let added = append_missing(&mut edited.endpoints, &op.nexthops);
            let added_monitors = append_missing(&mut edited.endpoint_monitors, &op.nexthop_monitors);
            if !added && !added_monitors {
                debug!(key, "Nothing to append");
                return Ok(());
            }
        } else {
            remove_all(&mut edited.endpoints, &op.nexthops)?;
            remove_all(&mut edited.endpoint_monitors, &op.nexthop_monitors)?;
            edited.primary.retain(|p| edited.endpoints.contains(p));
        }

        if !edited.endpoint_monitors.is_empty()
            && edited.endpoint_monitors.len() != edited.endpoints.len()
        {
            return Err(ItemError::rejected(MSG_MONITOR_CARDINALITY));
        }

        if edited.endpoints.is_empty() {
            return self.remove_tunnel_route(vnet, key, op.prefix).await;
        }

        // upsert merges fields, a dropped list needs a fresh record
        let dropped = |edited: &[IpAddress], current: &[IpAddress]| edited.is_empty() && !current.is_empty();
        if dropped(&edited.endpoint_monitors, &current.endpoint_monitors)
            || dropped(&edited.primary, &current.primary)
        {
            self.appl().delete(TunnelRoute::TABLE, key).await?;
        }
        write_record(self.appl(), key, &edited).await?;
        info!(
            key,
            endpoints = %join_ip_list(&edited.endpoints),
            cmd = op.cmd.as_str(),
            "Edited tunnel route endpoints"
        );

        if edited.endpoints.first() != current.endpoints.first() {
            self.program_encap(vnet, op.prefix, &edited).await?;
        }
        Ok(())
    }

    async fn program_tunnel_route(&self, vnet: &VnetHandle, key: &str, prefix: IpPrefix, route: &TunnelRoute) -> ItemResult {
        write_record(self.appl(), key, route).await?;
        info!(key, endpoints = %join_ip_list(&route.endpoints), "Wrote tunnel route");
        self.program_encap(vnet, prefix, route).await
    }

    async fn program_encap(&self, vnet: &VnetHandle, prefix: IpPrefix, route: &TunnelRoute) -> ItemResult {
        let (Some(dataplane), Some(endpoint)) = (&self.dataplane, route.endpoints.first()) else {
            return Ok(());
        };
        let res = dataplane
            .add_encap_route(
                vnet.id,
                prefix,
                *endpoint,
                route.mac_address.unwrap_or(MacAddress::ZERO),
                route.vni.unwrap_or(vnet.record.vni),
                VXLAN_UDP_PORT,
            )
            .await;
        check_result("add_encap_route", res)?;
        Ok(())
    }

    async fn remove_tunnel_route(&self, vnet: &VnetHandle, key: &str, prefix: IpPrefix) -> ItemResult {
        self.appl().delete(TunnelRoute::TABLE, key).await?;
        info!(key, "Deleted tunnel route");
        if let Some(dataplane) = &self.dataplane {
            check_result("delete_encap_route", dataplane.delete_encap_route(vnet.id, prefix).await)?;
        }
        Ok(())
    }

    async fn apply_local_route(
        &self,
        vnet: &VnetHandle,
        key: &str,
        op: &RouteOp,
        mac: Option<Option<MacAddress>>,
    ) -> ItemResult {
        let current = read_record::<LocalRoute>(self.appl(), key).await?;
        let ifname = op.ifname.as_deref().unwrap_or_default();

        match (op.cmd, current) {
            (RouteCommand::Delete, None) => Err(ItemError::not_found()),
            (RouteCommand::Delete, Some(_)) => self.remove_local_route(vnet, key, op.prefix).await,
            (RouteCommand::Remove, None) => Err(ItemError::rejected(MSG_REMOVE_MISSING)),
            // a local route has a single nexthop, so every other command replaces it
            (RouteCommand::Add | RouteCommand::Append | RouteCommand::Remove, current) => {
                if let Some(current) = current {
                    if current.ifname == ifname {
                        debug!(key, "Identical route, skipping");
                        return Ok(());
                    }
                    self.appl().delete(LocalRoute::TABLE, key).await?;
                }

                if mac == Some(None) {
                    return Err(ItemError {
                        code: Some(404),
                        msg: "Nexthop not found".to_string(),
                    });
                }

                let route = LocalRoute {
                    ifname: ifname.to_string(),
                    nexthops: op.nexthops.clone(),
                };
                write_record(self.appl(), key, &route).await?;
                info!(key, ifname, "Wrote local route");

                if let (Some(dataplane), Some(Some(mac))) = (&self.dataplane, mac) {
                    let outer_vlan = VlanId::from_name(ifname).map(|v| v.as_u16()).unwrap_or(0);
                    let res = dataplane
                        .add_decap_route(vnet.id, op.prefix, mac, ifname.to_string(), outer_vlan, 0)
                        .await;
                    check_result("add_decap_route", res)?;
                }
                Ok(())
            }
        }
    }

    async fn remove_local_route(&self, vnet: &VnetHandle, key: &str, prefix: IpPrefix) -> ItemResult {
        self.appl().delete(LocalRoute::TABLE, key).await?;
        info!(key, "Deleted local route");
        if let Some(dataplane) = &self.dataplane {
            check_result("delete_decap_route", dataplane.delete_decap_route(vnet.id, prefix).await)?;
        }
        Ok(())
    }

    /// Tunnel routes of `vnet`, optionally filtered by prefix and by VNI.
    /// Routes without a VNI match `vnid == 0`.
    async fn tunnel_routes(
        &self,
        vnet: &VnetHandle,
        prefix: Option<&IpPrefix>,
        vnid: Option<u32>,
    ) -> ApiResult<Vec<(String, TunnelRoute)>> {
        let filter = prefix.map_or_else(|| "*".to_string(), |p| p.to_string());
        let pattern = join_key(self.appl(), &[&vnet.key, &filter]);
        let sep = self.appl().separator();

        Ok(scan_records::<TunnelRoute>(self.appl(), &pattern)
            .await?
            .into_iter()
            .filter(|(_, route)| vnid.map_or(true, |v| route.vni.unwrap_or(0) == v))
            .filter_map(|(key, route)| {
                let (_, prefix) = key.split_once(sep)?;
                Some((prefix.to_string(), route))
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn get_vnet_routes(
        &self,
        vnet_name: &str,
        prefix: Option<IpPrefix>,
        vnid: Option<u32>,
    ) -> ApiResult<Vec<RouteModel>> {
        let vnet = self.resolve_vnet(vnet_name).await?;
        let mut routes: Vec<RouteModel> = self
            .tunnel_routes(&vnet, prefix.as_ref(), vnid)
            .await?
            .into_iter()
            .map(|(prefix, route)| RouteModel {
                ip_prefix: Some(prefix),
                nexthop: Some(join_ip_list(&route.endpoints)),
                nexthop_monitor: (!route.endpoint_monitors.is_empty())
                    .then(|| join_ip_list(&route.endpoint_monitors)),
                mac_address: route.mac_address.map(|m| m.to_string()),
                vnid: route.vni,
                primary: (!route.primary.is_empty()).then(|| join_ip_list(&route.primary)),
                adv_prefix: route.adv_prefix.map(|p| p.to_string()),
                weight: route.weight,
                profile: route.profile,
                monitoring: route.monitoring,
                ..Default::default()
            })
            .collect();
        routes.sort_by(|a, b| a.ip_prefix.cmp(&b.ip_prefix));
        Ok(routes)
    }

    /// Deletes the routes of `vnet_name`. With `vnid`, only tunnel routes
    /// carrying that VNI and local routes on the same prefixes are removed.
    #[instrument(skip(self))]
    pub async fn delete_vnet_routes(&mut self, vnet_name: &str, vnid: Option<u32>) -> ApiResult<()> {
        let vnet = self.resolve_vnet(vnet_name).await?;
        let mut prefixes: Vec<String> = self
            .tunnel_routes(&vnet, None, vnid)
            .await?
            .into_iter()
            .map(|(prefix, _)| prefix)
            .collect();

        if vnid.is_none() {
            let pattern = join_key(self.appl(), &[&vnet.key, "*"]);
            let sep = self.appl().separator();
            for (key, _) in self.appl().scan(LocalRoute::TABLE, &pattern).await? {
                if let Some((_, prefix)) = key.split_once(sep) {
                    if !prefixes.iter().any(|p| p == prefix) {
                        prefixes.push(prefix.to_string());
                    }
                }
            }
        }

        for prefix in &prefixes {
            let key = join_key(self.appl(), &[&vnet.key, prefix]);
            self.appl().delete(TunnelRoute::TABLE, &key).await?;
            self.appl().delete(LocalRoute::TABLE, &key).await?;
        }
        info!(vnet = %vnet.name, routes = prefixes.len(), "Deleted VNET routes");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VnetSpec;
    use crate::overlay_mgr::Stores;
    use crate::rpc::{ArpReply, DataplaneResult, MockArpClient, MockDataplaneClient};
    use crate::tables;
    use pretty_assertions::assert_eq;
    use sonic_restapi_common::FieldValuesExt;
    use std::sync::Arc;

    fn ips(s: &str) -> Vec<IpAddress> {
        crate::types::parse_ip_list(s).unwrap()
    }

    fn tunnel_op(cmd: RouteCommand, prefix: &str, nexthops: &str) -> RouteOp {
        RouteOp::new(cmd, prefix.parse().unwrap()).with_nexthops(ips(nexthops))
    }

    async fn mgr() -> OverlayMgr {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        mgr.create_tunnel_decap("vxlan", "10.0.0.1".parse().unwrap())
            .await
            .unwrap();
        mgr.create_vnet("Vnet-A", VnetSpec::new(5000)).await.unwrap();
        mgr
    }

    async fn endpoint(mgr: &OverlayMgr, prefix: &str) -> Option<String> {
        mgr.appl()
            .get(tables::APP_VNET_RT_TUNNEL_TABLE_NAME, &format!("Vnet1:{}", prefix))
            .await
            .unwrap()
            .and_then(|fvs| fvs.get_field("endpoint").map(str::to_string))
    }

    async fn local_ifname(mgr: &OverlayMgr, prefix: &str) -> Option<String> {
        mgr.appl()
            .get(tables::APP_VNET_RT_TABLE_NAME, &format!("Vnet1:{}", prefix))
            .await
            .unwrap()
            .and_then(|fvs| fvs.get_field("ifname").map(str::to_string))
    }

    #[tokio::test]
    async fn test_add_then_remove_endpoint() {
        let mut mgr = mgr().await;
        let failed = mgr
            .patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Add, "10.2.0.0/24", "1.1.1.1,2.2.2.2")])
            .await
            .unwrap();
        assert!(failed.is_empty());

        let failed = mgr
            .patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Remove, "10.2.0.0/24", "1.1.1.1")])
            .await
            .unwrap();
        assert!(failed.is_empty());
        assert_eq!(endpoint(&mgr, "10.2.0.0/24").await.as_deref(), Some("2.2.2.2"));
    }

    #[tokio::test]
    async fn test_append_remove_inverse() {
        let mut mgr = mgr().await;
        let prefix = "10.3.0.0/24";
        mgr.patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Add, prefix, "1.1.1.1")])
            .await
            .unwrap();

        mgr.patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Append, prefix, "3.3.3.3,4.4.4.4")])
            .await
            .unwrap();
        assert_eq!(
            endpoint(&mgr, prefix).await.as_deref(),
            Some("1.1.1.1,3.3.3.3,4.4.4.4")
        );

        mgr.patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Remove, prefix, "3.3.3.3,4.4.4.4")])
            .await
            .unwrap();
        assert_eq!(endpoint(&mgr, prefix).await.as_deref(), Some("1.1.1.1"));

        // a remove naming exactly the current route changes nothing
        let failed = mgr
            .patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Remove, prefix, "1.1.1.1")])
            .await
            .unwrap();
        assert!(failed.is_empty());
        assert_eq!(endpoint(&mgr, prefix).await.as_deref(), Some("1.1.1.1"));
    }

    #[tokio::test]
    async fn test_identical_append_and_remove_skip_dataplane() {
        let mut dataplane = MockDataplaneClient::new();
        dataplane
            .expect_map_vni_to_vrf()
            .returning(|_, _| Ok(DataplaneResult::Ok));
        dataplane
            .expect_add_encap_route()
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(DataplaneResult::Added));
        dataplane.expect_delete_encap_route().times(0);

        let mut mgr = OverlayMgr::new(Stores::in_memory()).with_dataplane(Arc::new(dataplane));
        mgr.create_tunnel_decap("vxlan", "10.0.0.1".parse().unwrap())
            .await
            .unwrap();
        mgr.create_vnet("Vnet-A", VnetSpec::new(5000)).await.unwrap();

        let prefix = "10.2.0.0/24";
        for cmd in [RouteCommand::Add, RouteCommand::Append, RouteCommand::Remove] {
            let failed = mgr
                .patch_vnet_routes("Vnet-A", &[tunnel_op(cmd, prefix, "1.1.1.1")])
                .await
                .unwrap();
            assert!(failed.is_empty(), "{:?}", cmd);
        }
        assert_eq!(endpoint(&mgr, prefix).await.as_deref(), Some("1.1.1.1"));
    }

    #[tokio::test]
    async fn test_remove_drops_primary_of_removed_endpoint() {
        let mut mgr = mgr().await;
        let prefix = "10.2.0.0/24";
        let mut op = tunnel_op(RouteCommand::Add, prefix, "1.1.1.1,2.2.2.2");
        op.primary = ips("1.1.1.1");
        assert!(mgr.patch_vnet_routes("Vnet-A", &[op]).await.unwrap().is_empty());

        let failed = mgr
            .patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Remove, prefix, "1.1.1.1")])
            .await
            .unwrap();
        assert!(failed.is_empty());

        let stored = mgr
            .appl()
            .get(tables::APP_VNET_RT_TUNNEL_TABLE_NAME, "Vnet1:10.2.0.0/24")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_field("endpoint"), Some("2.2.2.2"));
        assert_eq!(stored.get_field("primary"), None);

        let routes = mgr
            .get_vnet_routes("Vnet-A", Some(prefix.parse().unwrap()), None)
            .await
            .unwrap();
        assert_eq!(routes[0].primary, None);
    }

    #[tokio::test]
    async fn test_append_creates_route() {
        let mut mgr = mgr().await;
        let failed = mgr
            .patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Append, "10.4.0.0/24", "1.1.1.1")])
            .await
            .unwrap();
        assert!(failed.is_empty());
        assert_eq!(endpoint(&mgr, "10.4.0.0/24").await.as_deref(), Some("1.1.1.1"));
    }

    #[tokio::test]
    async fn test_identical_add_is_not_rewritten() {
        let mut dataplane = MockDataplaneClient::new();
        dataplane
            .expect_map_vni_to_vrf()
            .returning(|_, _| Ok(DataplaneResult::Ok));
        dataplane
            .expect_add_encap_route()
            .withf(|id, _, endpoint, _, vni, port| {
                *id == 1 && endpoint.to_string() == "1.1.1.1" && *vni == 5000 && *port == 4789
            })
            .times(1)
            .returning(|_, _, _, _, _, _| Ok(DataplaneResult::Added));

        let mut mgr = OverlayMgr::new(Stores::in_memory()).with_dataplane(Arc::new(dataplane));
        mgr.create_tunnel_decap("vxlan", "10.0.0.1".parse().unwrap())
            .await
            .unwrap();
        mgr.create_vnet("Vnet-A", VnetSpec::new(5000)).await.unwrap();

        let op = tunnel_op(RouteCommand::Add, "10.2.0.0/24", "1.1.1.1");
        assert!(mgr.patch_vnet_routes("Vnet-A", &[op.clone()]).await.unwrap().is_empty());
        assert!(mgr.patch_vnet_routes("Vnet-A", &[op]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_per_item_failures() {
        let mut mgr = mgr().await;
        let mut bad_primary = tunnel_op(RouteCommand::Add, "10.6.0.0/24", "1.1.1.1");
        bad_primary.primary = ips("9.9.9.9");
        let mut bad_adv = tunnel_op(RouteCommand::Add, "10.7.0.0/24", "1.1.1.1");
        bad_adv.adv_prefix = Some("10.0.0.0/8".to_string());

        let ops = vec![
            tunnel_op(RouteCommand::Add, "10.5.0.4/24", "1.1.1.1"),
            tunnel_op(RouteCommand::Delete, "10.8.0.0/24", "1.1.1.1"),
            tunnel_op(RouteCommand::Remove, "10.9.0.0/24", "1.1.1.1"),
            bad_primary,
            bad_adv,
            tunnel_op(RouteCommand::Add, "10.10.0.0/24", "1.1.1.1"),
        ];
        let failed = mgr.patch_vnet_routes("Vnet-A", &ops).await.unwrap();

        let summary: Vec<(usize, Option<u16>, &str)> = failed
            .iter()
            .map(|f| (f.index, f.error_code, f.error_msg.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (0, None, "Incorrect IP Prefix"),
                (1, Some(404), "Not found"),
                (2, None, MSG_REMOVE_MISSING),
                (3, None, "9.9.9.9 not present in nexthop list"),
                (4, None, "Adv Prefix length lesser than 18 is not supported"),
            ]
        );
        assert_eq!(endpoint(&mgr, "10.10.0.0/24").await.as_deref(), Some("1.1.1.1"));
    }

    #[tokio::test]
    async fn test_remove_missing_endpoint_leaves_route() {
        let mut mgr = mgr().await;
        mgr.patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Add, "10.2.0.0/24", "1.1.1.1,2.2.2.2")])
            .await
            .unwrap();
        let failed = mgr
            .patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Remove, "10.2.0.0/24", "2.2.2.2,5.5.5.5")])
            .await
            .unwrap();
        assert_eq!(failed[0].error_msg, "5.5.5.5 not present to remove");
        assert_eq!(endpoint(&mgr, "10.2.0.0/24").await.as_deref(), Some("1.1.1.1,2.2.2.2"));
    }

    #[tokio::test]
    async fn test_monitor_cardinality() {
        let mut mgr = mgr().await;
        let op = tunnel_op(RouteCommand::Add, "10.2.0.0/24", "1.1.1.1,2.2.2.2")
            .with_monitors(ips("9.1.1.1,9.2.2.2"));
        mgr.patch_vnet_routes("Vnet-A", &[op]).await.unwrap();

        let failed = mgr
            .patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Append, "10.2.0.0/24", "3.3.3.3")])
            .await
            .unwrap();
        assert_eq!(failed[0].error_msg, MSG_MONITOR_CARDINALITY);
        assert_eq!(endpoint(&mgr, "10.2.0.0/24").await.as_deref(), Some("1.1.1.1,2.2.2.2"));

        let op = tunnel_op(RouteCommand::Append, "10.2.0.0/24", "3.3.3.3").with_monitors(ips("9.3.3.3"));
        assert!(mgr.patch_vnet_routes("Vnet-A", &[op]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_tunnel_nexthop_skipped() {
        let mut mgr = mgr().await;
        let failed = mgr
            .patch_vnet_routes("Vnet-A", &[tunnel_op(RouteCommand::Add, "10.2.0.0/24", "10.0.0.1")])
            .await
            .unwrap();
        assert!(failed.is_empty());
        assert_eq!(endpoint(&mgr, "10.2.0.0/24").await, None);
    }

    #[tokio::test]
    async fn test_prefix_floor_with_advertise() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        mgr.create_tunnel_decap("vxlan", "10.0.0.1".parse().unwrap())
            .await
            .unwrap();
        let mut spec = VnetSpec::new(7000);
        spec.advertise_prefix = Some("true".to_string());
        mgr.create_vnet("Vnet-Adv", spec).await.unwrap();

        let failed = mgr
            .patch_vnet_routes("Vnet-Adv", &[tunnel_op(RouteCommand::Add, "10.0.0.0/16", "1.1.1.1")])
            .await
            .unwrap();
        assert_eq!(failed[0].error_msg, "Prefix length lesser than 18 is not supported");
    }

    #[tokio::test]
    async fn test_local_route_with_arp() {
        let mut arp = MockArpClient::new();
        arp.expect_request_mac()
            .withf(|reqs| {
                reqs.len() == 1 && reqs[0].index == 1 && reqs[0].tuples[0].iface == "Vlan100" && reqs[0].tuples[0].stag == 100
            })
            .times(1)
            .returning(|reqs| {
                Ok(reqs
                    .into_iter()
                    .map(|r| ArpReply {
                        index: r.index,
                        is_found: false,
                        mac: MacAddress::new([0; 6]),
                    })
                    .collect())
            });

        let mut mgr = mgr().await.with_arp(Arc::new(arp));
        let ops = vec![
            RouteOp::new(RouteCommand::Add, "10.1.1.0/24".parse().unwrap()).with_ifname("Vlan100"),
            RouteOp::new(RouteCommand::Add, "10.1.2.0/24".parse().unwrap())
                .with_ifname("Vlan100")
                .with_nexthops(ips("10.1.1.5")),
        ];
        let failed = mgr.patch_vnet_routes("Vnet-A", &ops).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].index, 1);
        assert_eq!(failed[0].error_msg, "Nexthop not found");

        let route = mgr
            .appl()
            .get(tables::APP_VNET_RT_TABLE_NAME, "Vnet1:10.1.1.0/24")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(route.get_field("ifname"), Some("Vlan100"));
    }

    #[tokio::test]
    async fn test_local_route_remove_replaces() {
        let mut mgr = mgr().await;
        let prefix: IpPrefix = "10.1.1.0/24".parse().unwrap();

        let add = RouteOp::new(RouteCommand::Add, prefix).with_ifname("Vlan100");
        assert!(mgr.patch_vnet_routes("Vnet-A", &[add]).await.unwrap().is_empty());

        let same = RouteOp::new(RouteCommand::Remove, prefix).with_ifname("Vlan100");
        assert!(mgr.patch_vnet_routes("Vnet-A", &[same]).await.unwrap().is_empty());
        assert_eq!(local_ifname(&mgr, "10.1.1.0/24").await.as_deref(), Some("Vlan100"));

        let other = RouteOp::new(RouteCommand::Remove, prefix).with_ifname("Vlan200");
        assert!(mgr.patch_vnet_routes("Vnet-A", &[other]).await.unwrap().is_empty());
        assert_eq!(local_ifname(&mgr, "10.1.1.0/24").await.as_deref(), Some("Vlan200"));

        let delete = RouteOp::new(RouteCommand::Delete, prefix).with_ifname("Vlan200");
        assert!(mgr.patch_vnet_routes("Vnet-A", &[delete]).await.unwrap().is_empty());
        assert_eq!(local_ifname(&mgr, "10.1.1.0/24").await, None);
    }

    #[tokio::test]
    async fn test_get_and_delete_routes() {
        let mut mgr = mgr().await;
        let mut with_vni = tunnel_op(RouteCommand::Add, "10.2.0.0/24", "1.1.1.1");
        with_vni.vnid = Some(6000);
        with_vni.mac_address = Some("00:11:22:33:44:55".parse().unwrap());
        let ops = vec![
            with_vni,
            tunnel_op(RouteCommand::Add, "10.3.0.0/24", "2.2.2.2"),
            RouteOp::new(RouteCommand::Add, "10.4.0.0/24".parse().unwrap()).with_ifname("Vlan100"),
        ];
        assert!(mgr.patch_vnet_routes("Vnet-A", &ops).await.unwrap().is_empty());

        let all = mgr.get_vnet_routes("Vnet-A", None, None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].ip_prefix.as_deref(), Some("10.2.0.0/24"));
        assert_eq!(all[0].mac_address.as_deref(), Some("00:11:22:33:44:55"));
        assert_eq!(all[0].vnid, Some(6000));

        let by_vni = mgr.get_vnet_routes("Vnet-A", None, Some(6000)).await.unwrap();
        assert_eq!(by_vni.len(), 1);
        let by_prefix = mgr
            .get_vnet_routes("Vnet-A", Some("10.3.0.0/24".parse().unwrap()), None)
            .await
            .unwrap();
        assert_eq!(by_prefix[0].nexthop.as_deref(), Some("2.2.2.2"));

        mgr.delete_vnet_routes("Vnet-A", Some(6000)).await.unwrap();
        assert_eq!(mgr.get_vnet_routes("Vnet-A", None, None).await.unwrap().len(), 1);

        mgr.delete_vnet_routes("Vnet-A", None).await.unwrap();
        assert!(mgr.get_vnet_routes("Vnet-A", None, None).await.unwrap().is_empty());
        assert!(!mgr
            .appl()
            .exists(tables::APP_VNET_RT_TABLE_NAME, "Vnet1:10.4.0.0/24")
            .await
            .unwrap());
        mgr.delete_vnet("Vnet-A").await.unwrap();
    }
}
