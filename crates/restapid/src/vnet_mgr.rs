//! VNET lifecycle: creation, lookup and dependency-checked deletion

use sonic_restapi_common::FieldValuesExt;
use tracing::{error, info, instrument, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::{VnetModel, VnetReturnModel, VnetSpec};
use crate::overlay_mgr::{join_key, read_record, vnet_key, write_record, OverlayMgr, MSG_GUID_OUT_OF_SYNC};
use crate::rpc::check_result;
use crate::tables::{
    fields, DEFAULT_VXLAN_TUNNEL, DEFAULT_VXLAN_TUNNEL_V4, RESERVED_VNET_DEFAULT,
    RESERVED_VNET_DEFAULT_V4, SCOPE_DEFAULT,
};
use crate::types::{LocalRoute, Record, TunnelRecord, TunnelRoute, VlanBinding, VnetRecord};

impl OverlayMgr {
    /// Creates a VNET bound to `spec.vni`.
    ///
    /// Requires at least one tunnel endpoint; the IPv6 tunnel is preferred.
    /// `Vnet-default` and `Vnet-default-v4` are pinned to their tunnel
    /// family and get the default scope.
    #[instrument(skip(self, spec), fields(vni = spec.vni))]
    pub async fn create_vnet(&mut self, name: &str, spec: VnetSpec) -> ApiResult<()> {
        let v6 = read_record::<TunnelRecord>(self.config(), DEFAULT_VXLAN_TUNNEL).await?;
        let v4 = read_record::<TunnelRecord>(self.config(), DEFAULT_VXLAN_TUNNEL_V4).await?;
        if v4.is_none() && v6.is_none() {
            return Err(ApiError::dependency_missing(
                "Default VxLAN VTEP must be created prior to creating VRF",
                &["tunnel"],
            ));
        }

        if self.allocator.lookup(name).is_some() {
            return Err(ApiError::exists(format!("Object already exists: {}", name)));
        }
        if let Some(owner) = self.allocator.reverse_lookup(spec.vni) {
            return Err(ApiError::exists(format!(
                "Object already exists: {{\"vni\":\"{}\", \"vnet_name\":\"{}\"}}",
                spec.vni, owner
            )));
        }

        let tunnel = match name {
            RESERVED_VNET_DEFAULT if v6.is_none() => {
                return Err(ApiError::internal(
                    "Vnet-default is for V6 Tunnels, please create Vnet-default-v4",
                ))
            }
            RESERVED_VNET_DEFAULT_V4 if v4.is_none() => {
                return Err(ApiError::internal(
                    "V4 tunnel not created, please create V4 Vxlan Tunnel",
                ))
            }
            RESERVED_VNET_DEFAULT => DEFAULT_VXLAN_TUNNEL,
            RESERVED_VNET_DEFAULT_V4 => DEFAULT_VXLAN_TUNNEL_V4,
            _ if v6.is_some() => DEFAULT_VXLAN_TUNNEL,
            _ => DEFAULT_VXLAN_TUNNEL_V4,
        };

        let id = self.allocator.allocate(name, spec.vni);
        let key = vnet_key(id);

        match self.config().exists(VnetRecord::TABLE, &key).await {
            Ok(false) => {}
            Ok(true) => {
                self.allocator.release(name);
                error!(name, key = %key, "Allocated VNET key already present in CONFIG_DB");
                return Err(ApiError::internal(MSG_GUID_OUT_OF_SYNC));
            }
            Err(e) => {
                self.allocator.release(name);
                return Err(e.into());
            }
        }

        let mut record = VnetRecord::new(tunnel, spec.vni, name);
        if name == RESERVED_VNET_DEFAULT || name == RESERVED_VNET_DEFAULT_V4 {
            record.scope = Some(SCOPE_DEFAULT.to_string());
        }
        record.advertise_prefix = spec.advertise_prefix;
        record.overlay_dmac = spec.overlay_dmac.map(|mac| mac.to_string());

        if let Err(e) = write_record(self.config(), &key, &record).await {
            self.allocator.release(name);
            return Err(e.into());
        }
        info!(name, key = %key, tunnel, "Created VNET");

        if let Some(dataplane) = &self.dataplane {
            check_result("map_vni_to_vrf", dataplane.map_vni_to_vrf(spec.vni, id).await)?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_vnet(&self, name: &str) -> ApiResult<VnetReturnModel> {
        let vnet = self.resolve_vnet(name).await?;
        Ok(VnetReturnModel {
            vnet_id: vnet.name,
            attr: VnetModel {
                vnid: vnet.record.vni,
                advertise_prefix: vnet.record.advertise_prefix,
            },
        })
    }

    /// Deletes a VNET that has no routes and no VLAN bound to it, and
    /// releases its id.
    #[instrument(skip(self))]
    pub async fn delete_vnet(&mut self, name: &str) -> ApiResult<()> {
        let vnet = self.resolve_vnet(name).await?;

        if self.vnet_has_dependents(&vnet.key).await? {
            warn!(name, key = %vnet.key, "VNET still has routes or VLAN bindings");
            return Err(ApiError::delete_dependency());
        }

        self.config().delete(VnetRecord::TABLE, &vnet.key).await?;
        self.allocator.release(name);
        info!(name, key = %vnet.key, "Deleted VNET");

        if let Some(dataplane) = &self.dataplane {
            check_result("unmap_vni_to_vrf", dataplane.unmap_vni_to_vrf(vnet.record.vni).await)?;
        }
        Ok(())
    }

    async fn vnet_has_dependents(&self, key: &str) -> ApiResult<bool> {
        let pattern = join_key(self.appl(), &[key, "*"]);
        for table in [TunnelRoute::TABLE, LocalRoute::TABLE] {
            if !self.appl().scan(table, &pattern).await?.is_empty() {
                return Ok(true);
            }
        }

        let interfaces = self.config().scan(VlanBinding::TABLE, "*").await?;
        Ok(interfaces
            .iter()
            .any(|(_, fvs)| fvs.get_field(fields::VNET_NAME) == Some(key)))
    }
}
