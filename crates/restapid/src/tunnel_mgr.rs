//! VXLAN tunnel endpoint (decap) operations

use sonic_types::IpAddress;
use tracing::{info, instrument};

use crate::error::{ApiError, ApiResult};
use crate::models::{TunnelDecapModel, TunnelDecapReturnModel};
use crate::overlay_mgr::{read_record, write_record, OverlayMgr};
use crate::tables::{DEFAULT_VXLAN_TUNNEL, DEFAULT_VXLAN_TUNNEL_V4, TUNNEL_TYPE_VXLAN};
use crate::types::{Record, TunnelRecord};

fn check_tunnel_type(tunnel_type: &str) -> ApiResult<()> {
    if tunnel_type != TUNNEL_TYPE_VXLAN {
        return Err(ApiError::malformed(
            &["tunnel_type"],
            "Only tunnel_type==vxlan supported",
        ));
    }
    Ok(())
}

impl OverlayMgr {
    /// Creates the tunnel endpoint of `ip`'s address family.
    #[instrument(skip(self))]
    pub async fn create_tunnel_decap(&mut self, tunnel_type: &str, ip: IpAddress) -> ApiResult<()> {
        check_tunnel_type(tunnel_type)?;

        let name = TunnelRecord::name_for(ip.family());
        if self.config().exists(TunnelRecord::TABLE, name).await? {
            return Err(ApiError::exists("Object already exists: Default Vxlan VTEP"));
        }

        write_record(self.config(), name, &TunnelRecord { src_ip: ip }).await?;
        if !self.tunnel_endpoints.contains(&ip) {
            self.tunnel_endpoints.push(ip);
        }

        info!(tunnel = name, src_ip = %ip, "Created VXLAN tunnel endpoint");
        Ok(())
    }

    /// Returns the IPv6 tunnel endpoint, or the IPv4 one when there is none.
    #[instrument(skip(self))]
    pub async fn get_tunnel_decap(&self, tunnel_type: &str) -> ApiResult<TunnelDecapReturnModel> {
        check_tunnel_type(tunnel_type)?;

        let mut tunnel = read_record::<TunnelRecord>(self.config(), DEFAULT_VXLAN_TUNNEL).await?;
        if tunnel.is_none() {
            tunnel = read_record::<TunnelRecord>(self.config(), DEFAULT_VXLAN_TUNNEL_V4).await?;
        }
        let tunnel = tunnel.ok_or_else(|| ApiError::not_found(&["tunnel_type"]))?;

        Ok(TunnelDecapReturnModel {
            tunnel_type: tunnel_type.to_string(),
            attr: TunnelDecapModel {
                ip_addr: tunnel.src_ip.to_string(),
            },
        })
    }

    /// Tunnel endpoints are never removed through the API.
    #[instrument(skip(self))]
    pub async fn delete_tunnel_decap(&self, tunnel_type: &str) -> ApiResult<()> {
        check_tunnel_type(tunnel_type)?;
        info!("Tunnel endpoint delete requested, ignoring");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay_mgr::Stores;
    use crate::tables;
    use pretty_assertions::assert_eq;

    fn ip(s: &str) -> IpAddress {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_create_tunnel_per_family() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        mgr.create_tunnel_decap("vxlan", ip("10.0.0.1")).await.unwrap();
        mgr.create_tunnel_decap("vxlan", ip("fc00::1")).await.unwrap();

        let v4 = read_record::<TunnelRecord>(mgr.config(), tables::DEFAULT_VXLAN_TUNNEL_V4)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(v4.src_ip, ip("10.0.0.1"));
        assert_eq!(mgr.tunnel_endpoints(), [ip("10.0.0.1"), ip("fc00::1")]);

        let got = mgr.get_tunnel_decap("vxlan").await.unwrap();
        assert_eq!(got.attr.ip_addr, "fc00::1");
    }

    #[tokio::test]
    async fn test_create_tunnel_twice_conflicts() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        mgr.create_tunnel_decap("vxlan", ip("10.0.0.1")).await.unwrap();

        let err = mgr.create_tunnel_decap("vxlan", ip("10.0.0.2")).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.sub_code(), Some(0));
        assert_eq!(err.message(), "Object already exists: Default Vxlan VTEP");
    }

    #[tokio::test]
    async fn test_tunnel_type_validation() {
        let mut mgr = OverlayMgr::new(Stores::in_memory());
        let err = mgr.create_tunnel_decap("nvgre", ip("10.0.0.1")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(err.fields(), ["tunnel_type".to_string()]);
        assert!(mgr.delete_tunnel_decap("gre").await.is_err());
        assert!(mgr.delete_tunnel_decap("vxlan").await.is_ok());
    }

    #[tokio::test]
    async fn test_get_tunnel_missing() {
        let mgr = OverlayMgr::new(Stores::in_memory());
        let err = mgr.get_tunnel_decap("vxlan").await.unwrap_err();
        assert_eq!(err.status_code(), 404);

        mgr.stores()
            .config_db
            .upsert(
                tables::CFG_VXLAN_TUNNEL_TABLE_NAME,
                tables::DEFAULT_VXLAN_TUNNEL_V4,
                &sonic_restapi_common::field_values! { "src_ip" => "10.0.0.1" },
            )
            .await
            .unwrap();
        assert_eq!(mgr.get_tunnel_decap("vxlan").await.unwrap().attr.ip_addr, "10.0.0.1");
    }
}
