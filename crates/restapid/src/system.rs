//! Service-level operations: heartbeat, reset status, BGP profiles,
//! interface state, ping and the cache restart hook.

use once_cell::sync::Lazy;
use regex::Regex;
use sonic_restapi_common::shell::{self, shellquote, PING_CMD};
use sonic_restapi_common::{field_values, FieldValuesExt, KvStore};
use tracing::{debug, info, instrument, warn};

use crate::error::{ApiError, ApiResult, MSG_INTERNAL};
use crate::models::{
    BgpProfileModel, HeartbeatModel, InterfaceModel, InterfaceReturnModel, PingParams,
    PingReturnModel, ResetStatusModel,
};
use crate::overlay_mgr::{OverlayMgr, ResetInfo};
use crate::tables::{
    fields, APP_BGP_PROFILE_TABLE_NAME, CACHE_RESET_INFO_KEY, COUNTERS_CRM_STATS_KEY,
    COUNTERS_CRM_TABLE_NAME,
};

/// Version reported by the heartbeat.
pub const SERVER_API_VERSION: &str = "1.0.0";

/// Body of `GET /v1/`.
pub const INDEX_BANNER: &str = "Sonic MSEE Restful API v1!";

static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("Invalid regex pattern"));

/// Extracts packet counts and round trip times from `ping` output.
/// Fields that cannot be found stay empty.
pub fn parse_ping_output(output: &str) -> PingReturnModel {
    let tokens: Vec<&str> = output.split_whitespace().collect();
    let mut parsed = PingReturnModel::default();

    for (i, token) in tokens.iter().enumerate() {
        match *token {
            "transmitted," if i >= 2 => {
                if let Some(m) = DIGITS_RE.find(tokens[i - 2]) {
                    parsed.packets_transmitted = m.as_str().to_string();
                }
            }
            "received," if i >= 1 => {
                parsed.packets_received = tokens[i - 1].to_string();
            }
            "min/avg/max/mdev" => {
                if let Some(rtt) = tokens.get(i + 2) {
                    let parts: Vec<&str> = rtt.split('/').collect();
                    if let [min, avg, max, ..] = parts.as_slice() {
                        parsed.min_rtt = min.to_string();
                        parsed.avg_rtt = avg.to_string();
                        parsed.max_rtt = max.to_string();
                    }
                }
            }
            _ => {}
        }
    }
    parsed
}

fn admin_state(operstate: &str) -> &'static str {
    if operstate.trim() == "up" {
        "up"
    } else {
        "down"
    }
}

fn reset_status_str(status: bool) -> &'static str {
    if status {
        "true"
    } else {
        "false"
    }
}

impl OverlayMgr {
    fn cache(&self) -> &dyn KvStore {
        self.stores.cache_db.as_ref()
    }

    /// Loads reset GUID, time and status from the cache DB. A missing GUID
    /// or time is generated and stored.
    pub(crate) async fn load_reset_info(&mut self) -> ApiResult<()> {
        let stored = self
            .cache()
            .get("", CACHE_RESET_INFO_KEY)
            .await?
            .unwrap_or_default();

        let guid = stored.get_field(fields::RESET_GUID).filter(|v| !v.is_empty());
        let time = stored.get_field(fields::RESET_TIME).filter(|v| !v.is_empty());
        self.reset_info = match (guid, time) {
            (Some(guid), Some(time)) => ResetInfo {
                guid: guid.to_string(),
                time: time.to_string(),
            },
            _ => {
                let info = ResetInfo {
                    guid: uuid::Uuid::new_v4().to_string(),
                    time: chrono::Utc::now()
                        .format("%Y-%m-%d %H:%M:%S%.f +0000 UTC")
                        .to_string(),
                };
                self.cache()
                    .upsert(
                        "",
                        CACHE_RESET_INFO_KEY,
                        &field_values! {
                            fields::RESET_GUID => info.guid,
                            fields::RESET_TIME => info.time,
                        },
                    )
                    .await?;
                info!(guid = %info.guid, "Generated new reset GUID");
                info
            }
        };
        self.reset_status = stored.get_field(fields::RESET_STATUS) == Some("true");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn heartbeat(&self) -> ApiResult<HeartbeatModel> {
        let routes_available = match self
            .stores
            .counters_db
            .get(COUNTERS_CRM_TABLE_NAME, COUNTERS_CRM_STATS_KEY)
            .await
        {
            Ok(stats) => stats
                .as_ref()
                .and_then(|fvs| fvs.get_field(fields::CRM_IPV4_ROUTE_AVAILABLE))
                .and_then(|v| v.parse().ok())
                .unwrap_or(-1),
            Err(e) => {
                warn!(error = %e, "Fetching CRM:STATS from COUNTERS_DB failed");
                -1
            }
        };

        Ok(HeartbeatModel {
            server_version: SERVER_API_VERSION.to_string(),
            reset_guid: self.reset_info.guid.clone(),
            reset_time: self.reset_info.time.clone(),
            routes_available,
        })
    }

    pub fn get_reset_status(&self) -> ResetStatusModel {
        ResetStatusModel {
            reset_status: reset_status_str(self.reset_status).to_string(),
        }
    }

    #[instrument(skip(self))]
    pub async fn set_reset_status(&mut self, value: &str) -> ApiResult<ResetStatusModel> {
        let status = match value {
            "true" => true,
            "false" => false,
            _ => {
                return Err(ApiError::malformed(
                    &["reset_status"],
                    "only true/false values accepted",
                ))
            }
        };

        self.cache()
            .upsert(
                "",
                CACHE_RESET_INFO_KEY,
                &field_values! { fields::RESET_STATUS => reset_status_str(status) },
            )
            .await?;
        self.reset_status = status;
        info!(status, "Reset status updated");
        Ok(self.get_reset_status())
    }

    #[instrument(skip(self))]
    pub async fn set_bgp_profile(&mut self, name: &str, community_id: &str) -> ApiResult<()> {
        self.appl()
            .upsert(
                APP_BGP_PROFILE_TABLE_NAME,
                name,
                &field_values! { fields::COMMUNITY_ID => community_id },
            )
            .await?;
        info!(profile = name, community_id, "Set BGP profile");
        Ok(())
    }

    async fn read_bgp_profile(&self, name: &str) -> ApiResult<String> {
        self.appl()
            .get(APP_BGP_PROFILE_TABLE_NAME, name)
            .await?
            .and_then(|fvs| fvs.get_field(fields::COMMUNITY_ID).map(str::to_string))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::malformed(&["profile_name"], "Invalid profile_name"))
    }

    #[instrument(skip(self))]
    pub async fn get_bgp_profile(&self, name: &str) -> ApiResult<BgpProfileModel> {
        Ok(BgpProfileModel {
            community_id: self.read_bgp_profile(name).await?,
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_bgp_profile(&mut self, name: &str) -> ApiResult<()> {
        self.read_bgp_profile(name).await?;
        self.appl().delete(APP_BGP_PROFILE_TABLE_NAME, name).await?;
        info!(profile = name, "Deleted BGP profile");
        Ok(())
    }

    /// Operational state of one port from sysfs.
    #[instrument(skip(self))]
    pub async fn get_interface(&self, port: &str) -> ApiResult<InterfaceReturnModel> {
        if port.contains('/') || port.starts_with('.') {
            return Err(ApiError::not_found(&["port"]));
        }
        let path = self.sysfs_root.join("class/net").join(port).join("operstate");
        let state = tokio::fs::read_to_string(&path).await.map_err(|e| {
            debug!(path = %path.display(), error = %e, "Reading operstate failed");
            ApiError::not_found(&["port"])
        })?;

        Ok(InterfaceReturnModel {
            port: port.to_string(),
            attr: InterfaceModel {
                admin_state: admin_state(&state).to_string(),
            },
        })
    }

    /// Operational state of every port, sorted by name.
    #[instrument(skip(self))]
    pub async fn list_interfaces(&self) -> ApiResult<Vec<InterfaceReturnModel>> {
        let dir = self.sysfs_root.join("class/net");
        let sysfs_error = |e: std::io::Error| {
            warn!(path = %dir.display(), error = %e, "Reading sysfs failed");
            ApiError::internal(MSG_INTERNAL)
        };

        let mut entries = tokio::fs::read_dir(&dir).await.map_err(sysfs_error)?;
        let mut ports = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(sysfs_error)? {
            ports.push(entry.file_name().to_string_lossy().into_owned());
        }
        ports.sort();

        let mut interfaces = Vec::with_capacity(ports.len());
        for port in ports {
            let path = dir.join(&port).join("operstate");
            let state = tokio::fs::read_to_string(&path).await.map_err(sysfs_error)?;
            interfaces.push(InterfaceReturnModel {
                attr: InterfaceModel {
                    admin_state: admin_state(&state).to_string(),
                },
                port,
            });
        }
        Ok(interfaces)
    }

    /// Runs `ping`, optionally bound to a VNET's interface. A ping that
    /// gets no reply still returns the parsed counters.
    #[instrument(skip(self))]
    pub async fn ping(&self, params: &PingParams) -> ApiResult<PingReturnModel> {
        let mut cmd = format!(
            "{} {} -c {}",
            PING_CMD,
            shellquote(&params.ip.to_string()),
            params.count
        );
        if let Some(vnet_name) = &params.vnet_name {
            let vnet = self.resolve_vnet(vnet_name).await?;
            cmd.push_str(&format!(" -I {}", shellquote(&vnet.key)));
        }

        let result = shell::exec(&cmd).await?;
        if !result.success() {
            debug!(exit_code = result.exit_code, "ping exited with failure");
        }
        Ok(parse_ping_output(&result.stdout))
    }

    /// Rebuilds the id allocator from the store. Only effective in local
    /// test mode, where tests rewrite the store underneath the service.
    #[instrument(skip(self))]
    pub async fn restart_cache(&mut self) -> ApiResult<()> {
        if self.local_test {
            self.rebuild_allocator().await?;
            self.load_tunnel_endpoints().await?;
            info!(vnets = self.allocator.len(), "Rebuilt in-memory caches");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay_mgr::Stores;
    use crate::types::{Record, VnetRecord};
    use pretty_assertions::assert_eq;
    use sonic_restapi_common::{DbId, MemoryStore};
    use std::sync::Arc;

    const PING_OUTPUT: &str = "PING 10.0.0.1 (10.0.0.1) 56(84) bytes of data.
64 bytes from 10.0.0.1: icmp_seq=1 ttl=64 time=0.045 ms
64 bytes from 10.0.0.1: icmp_seq=2 ttl=64 time=0.061 ms

--- 10.0.0.1 ping statistics ---
12 packets transmitted, 11 received, 8% packet loss, time 1015ms
rtt min/avg/max/mdev = 0.045/0.053/0.061/0.008 ms
";

    #[test]
    fn test_parse_ping_output() {
        let parsed = parse_ping_output(PING_OUTPUT);
        assert_eq!(
            parsed,
            PingReturnModel {
                packets_transmitted: "12".into(),
                packets_received: "11".into(),
                min_rtt: "0.045".into(),
                max_rtt: "0.061".into(),
                avg_rtt: "0.053".into(),
            }
        );
        assert_eq!(parse_ping_output("ping: unknown host"), PingReturnModel::default());
    }

    #[tokio::test]
    async fn test_reset_info_generated_and_kept() {
        let stores = Stores::in_memory();
        let mut mgr = OverlayMgr::new(stores.clone());
        mgr.init().await.unwrap();
        let first = mgr.reset_info().clone();
        assert_eq!(first.guid.len(), 36);
        assert!(first.time.ends_with("+0000 UTC"));

        let mut restarted = OverlayMgr::new(stores);
        restarted.init().await.unwrap();
        assert_eq!(restarted.reset_info(), &first);
    }

    #[tokio::test]
    async fn test_reset_status_persisted() {
        let stores = Stores::in_memory();
        let mut mgr = OverlayMgr::new(stores.clone());
        mgr.init().await.unwrap();
        assert_eq!(mgr.get_reset_status().reset_status, "false");

        let err = mgr.set_reset_status("maybe").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.fields(), ["reset_status".to_string()]);

        assert_eq!(mgr.set_reset_status("true").await.unwrap().reset_status, "true");
        let mut restarted = OverlayMgr::new(stores);
        restarted.init().await.unwrap();
        assert_eq!(restarted.get_reset_status().reset_status, "true");
    }

    #[tokio::test]
    async fn test_heartbeat_routes_available() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        mgr.init().await.unwrap();
        assert_eq!(mgr.heartbeat().await.unwrap().routes_available, -1);

        mgr.stores()
            .counters_db
            .upsert("CRM", "STATS", &field_values! { "crm_stats_ipv4_route_available" => "1000" })
            .await
            .unwrap();
        let hb = mgr.heartbeat().await.unwrap();
        assert_eq!(hb.routes_available, 1000);
        assert_eq!(hb.server_version, "1.0.0");
        assert_eq!(hb.reset_guid, mgr.reset_info().guid);
    }

    #[tokio::test]
    async fn test_heartbeat_counters_unavailable() {
        let counters = Arc::new(MemoryStore::new(DbId::CountersDb));
        counters.set_unavailable(true);
        let mut stores = Stores::in_memory();
        stores.counters_db = counters;

        let mgr = OverlayMgr::new(stores);
        assert_eq!(mgr.heartbeat().await.unwrap().routes_available, -1);
    }

    #[tokio::test]
    async fn test_bgp_profile() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        let err = mgr.get_bgp_profile("p1").await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.fields(), ["profile_name".to_string()]);
        assert!(mgr.delete_bgp_profile("p1").await.is_err());

        mgr.set_bgp_profile("p1", "1234:5678").await.unwrap();
        assert_eq!(mgr.get_bgp_profile("p1").await.unwrap().community_id, "1234:5678");
        mgr.delete_bgp_profile("p1").await.unwrap();
        assert!(mgr.get_bgp_profile("p1").await.is_err());
    }

    #[tokio::test]
    async fn test_interface_state() {
        let root = tempfile::tempdir().unwrap();
        for (port, state) in [("Ethernet4", "down\n"), ("Ethernet0", "up\n")] {
            let dir = root.path().join("class/net").join(port);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join("operstate"), state).unwrap();
        }
        let mgr = OverlayMgr::new(Stores::in_memory()).with_sysfs_root(root.path());

        let all = mgr.list_interfaces().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].port, "Ethernet0");
        assert_eq!(all[0].attr.admin_state, "up");
        assert_eq!(all[1].attr.admin_state, "down");

        assert_eq!(mgr.get_interface("Ethernet4").await.unwrap().attr.admin_state, "down");
        let err = mgr.get_interface("Ethernet8").await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.fields(), ["port".to_string()]);
        assert_eq!(mgr.get_interface("../x").await.unwrap_err().status_code(), 404);
    }

    #[tokio::test]
    async fn test_restart_cache_local_test_only() {
        let stores = Stores::in_memory();
        let mut mgr = OverlayMgr::new(stores.clone());
        stores
            .config_db
            .upsert(
                VnetRecord::TABLE,
                "Vnet3",
                &VnetRecord::new("default_vxlan_tunnel_v4", 5000, "Vnet-A").to_fields(),
            )
            .await
            .unwrap();

        mgr.restart_cache().await.unwrap();
        assert_eq!(mgr.allocator().lookup("Vnet-A"), None);

        let mut mgr = mgr.with_local_test(true);
        mgr.restart_cache().await.unwrap();
        assert_eq!(mgr.allocator().lookup("Vnet-A"), Some(3));
    }
}
