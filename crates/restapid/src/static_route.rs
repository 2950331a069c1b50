//! Static routes of the default VRF and their expiry time.
//!
//! Persistent routes live in CONFIG_DB; the others go to APPL_DB with
//! `refresh=true` so that they age out unless re-sent.

use sonic_restapi_common::{field_values, FieldValuesExt, KvStore};
use sonic_types::IpPrefix;
use tracing::{debug, info, instrument, warn};

use crate::error::{ApiError, ApiResult, MSG_INTERNAL};
use crate::models::{RouteExpiryModel, RouteModel};
use crate::overlay_mgr::{join_key, read_record, scan_records, write_record, OverlayMgr};
use crate::route_mgr::{check_canonical, ItemError};
use crate::tables::{fields, APP_STATIC_ROUTE_EXPIRY_TABLE_NAME, DEFAULT_VRF};
use crate::types::{join_ip_list, Record, RouteCommand, RouteFailure, RouteOp, StaticRoute};

/// Interface name of blackhole routes.
const BLACKHOLE_IFNAME: &str = "null";

fn check_vrf(vrf: &str) -> ApiResult<()> {
    if vrf != DEFAULT_VRF {
        warn!(vrf, "Only the default VRF is supported");
        return Err(ApiError::internal(MSG_INTERNAL));
    }
    Ok(())
}

fn route_model(prefix: &str, route: StaticRoute, persistent: bool) -> RouteModel {
    RouteModel {
        ip_prefix: Some(prefix.to_string()),
        nexthop: Some(join_ip_list(&route.nexthops)),
        ifname: route.ifname,
        nexthop_monitor: (!route.endpoint_monitors.is_empty())
            .then(|| join_ip_list(&route.endpoint_monitors)),
        weight: route.weight,
        profile: route.profile,
        persistent: persistent.then(|| "true".to_string()),
        ..Default::default()
    }
}

impl OverlayMgr {
    fn static_store(&self, persistent: bool) -> &dyn KvStore {
        if persistent {
            self.config()
        } else {
            self.appl()
        }
    }

    /// Applies a static route batch to `vrf` and returns the failed items.
    #[instrument(skip(self, ops), fields(items = ops.len()))]
    pub async fn patch_vrf_routes(&mut self, vrf: &str, ops: &[RouteOp]) -> ApiResult<Vec<RouteFailure>> {
        check_vrf(vrf)?;

        let mut failures = Vec::new();
        for (index, op) in ops.iter().enumerate() {
            if let Err(err) = self.apply_static_route(vrf, op).await {
                debug!(index, prefix = %op.prefix, error = %err.msg, "Static route item failed");
                failures.push(err.into_failure(index));
            }
        }
        info!(vrf, failed = failures.len(), "Applied static route batch");
        Ok(failures)
    }

    async fn apply_static_route(&self, vrf: &str, op: &RouteOp) -> Result<(), ItemError> {
        check_canonical(&op.prefix)?;

        let store = self.static_store(op.persistent);
        let key = join_key(store, &[vrf, &op.prefix.to_string()]);
        let current = read_record::<StaticRoute>(store, &key).await?;

        if op.cmd == RouteCommand::Delete {
            if current.is_none() {
                return Err(ItemError::not_found());
            }
            store.delete(StaticRoute::TABLE, &key).await?;
            info!(key, "Deleted static route");
            return Ok(());
        }

        if let Some(current) = current {
            if current.nexthops != op.nexthops || current.ifname != op.ifname {
                store.delete(StaticRoute::TABLE, &key).await?;
            } else if op.persistent {
                debug!(key, "Identical persistent route, skipping");
                return Ok(());
            }
        }

        let route = StaticRoute {
            nexthops: op.nexthops.clone(),
            ifname: op.ifname.clone(),
            blackhole: op.ifname.as_deref() == Some(BLACKHOLE_IFNAME),
            endpoint_monitors: op.nexthop_monitors.clone(),
            weight: op.weight.clone(),
            profile: op.profile.clone(),
            refresh: !op.persistent,
        };
        write_record(store, &key, &route).await?;
        info!(key, persistent = op.persistent, "Wrote static route");
        Ok(())
    }

    /// Static routes of `vrf` from both databases; CONFIG_DB entries are
    /// marked persistent.
    #[instrument(skip(self))]
    pub async fn get_vrf_routes(&self, vrf: &str, prefix: Option<IpPrefix>) -> ApiResult<Vec<RouteModel>> {
        let filter = prefix.map_or_else(|| "*".to_string(), |p| p.to_string());

        let mut routes = Vec::new();
        for persistent in [false, true] {
            let store = self.static_store(persistent);
            let pattern = join_key(store, &[vrf, &filter]);
            let sep = store.separator();
            for (key, route) in scan_records::<StaticRoute>(store, &pattern).await? {
                if let Some((_, prefix)) = key.split_once(sep) {
                    routes.push(route_model(prefix, route, persistent));
                }
            }
        }
        Ok(routes)
    }

    #[instrument(skip(self))]
    pub async fn set_route_expiry(&mut self, time: i64) -> ApiResult<()> {
        self.appl()
            .upsert(
                APP_STATIC_ROUTE_EXPIRY_TABLE_NAME,
                "",
                &field_values! { fields::TIME => time },
            )
            .await?;
        info!(time, "Set static route expiry");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_route_expiry(&self) -> ApiResult<RouteExpiryModel> {
        let fvs = self
            .appl()
            .get(APP_STATIC_ROUTE_EXPIRY_TABLE_NAME, "")
            .await?
            .filter(|fvs| !fvs.is_empty())
            .ok_or_else(|| ApiError::bad_request("Object does not exist!", &[], ""))?;
        Ok(RouteExpiryModel {
            time: fvs.get_field(fields::TIME).and_then(|t| t.parse().ok()).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay_mgr::Stores;
    use crate::tables::{APP_STATIC_ROUTE_TABLE_NAME, CFG_STATIC_ROUTE_TABLE_NAME};
    use pretty_assertions::assert_eq;

    fn op(cmd: RouteCommand, prefix: &str) -> RouteOp {
        RouteOp::new(cmd, prefix.parse().unwrap())
    }

    #[tokio::test]
    async fn test_non_default_vrf_rejected() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        let err = mgr.patch_vrf_routes("Vrf-red", &[]).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_persistent_and_refresh_routes() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        let mut persistent = op(RouteCommand::Add, "10.10.0.0/16")
            .with_nexthops(vec!["1.1.1.1".parse().unwrap()]);
        persistent.persistent = true;
        let blackhole = op(RouteCommand::Add, "0.0.0.0/0").with_ifname("null");

        let failed = mgr
            .patch_vrf_routes("default", &[persistent, blackhole])
            .await
            .unwrap();
        assert!(failed.is_empty());

        let cfg = mgr
            .config()
            .get(CFG_STATIC_ROUTE_TABLE_NAME, "default|10.10.0.0/16")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cfg.get_field("nexthop"), Some("1.1.1.1"));
        assert!(!cfg.has_field("refresh"));

        let appl = mgr
            .appl()
            .get(APP_STATIC_ROUTE_TABLE_NAME, "default:0.0.0.0/0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(appl.get_field("blackhole"), Some("true"));
        assert_eq!(appl.get_field("refresh"), Some("true"));

        let routes = mgr.get_vrf_routes("default", None).await.unwrap();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].persistent.as_deref(), Some("true"));
        assert_eq!(routes[0].persistent, None);
    }

    #[tokio::test]
    async fn test_static_route_failures() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        let ops = vec![
            op(RouteCommand::Add, "10.10.1.0/16").with_nexthops(vec!["1.1.1.1".parse().unwrap()]),
            op(RouteCommand::Delete, "10.20.0.0/16"),
        ];
        let failed = mgr.patch_vrf_routes("default", &ops).await.unwrap();
        assert_eq!(failed[0].error_msg, "Incorrect IP Prefix");
        assert_eq!(failed[1].error_code, Some(404));
    }

    #[tokio::test]
    async fn test_changed_route_replaced() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        let first = op(RouteCommand::Add, "10.10.0.0/16")
            .with_nexthops(vec!["1.1.1.1".parse().unwrap()])
            .with_monitors(vec!["9.9.9.9".parse().unwrap()]);
        mgr.patch_vrf_routes("default", &[first]).await.unwrap();

        let second = op(RouteCommand::Add, "10.10.0.0/16").with_nexthops(vec!["2.2.2.2".parse().unwrap()]);
        mgr.patch_vrf_routes("default", &[second]).await.unwrap();

        let stored = mgr
            .appl()
            .get(APP_STATIC_ROUTE_TABLE_NAME, "default:10.10.0.0/16")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_field("nexthop"), Some("2.2.2.2"));
        assert!(!stored.has_field("endpoint_monitor"));
    }

    #[tokio::test]
    async fn test_route_expiry() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        let err = mgr.get_route_expiry().await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.message(), "Object does not exist!");

        mgr.set_route_expiry(300).await.unwrap();
        assert_eq!(mgr.get_route_expiry().await.unwrap().time, 300);
    }
}
