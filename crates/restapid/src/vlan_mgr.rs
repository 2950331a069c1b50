//! VLAN lifecycle, members and static neighbors.
//!
//! Creation and deletion of a VLAN touch up to four records in two
//! databases. Downstream watchers consume them asynchronously, so
//! dependent writes are separated by the propagation wait.

use sonic_restapi_common::{FieldValues, FieldValuesExt, KvStore};
use sonic_types::{IpAddress, IpPrefix, VlanId};
use tracing::{error, info, instrument, warn};

use crate::error::{ApiError, ApiResult, MSG_INTERNAL};
use crate::models::{
    VlanMemberModel, VlanMemberReturnModel, VlanMembersModel, VlanMembersReturnModel, VlanModel,
    VlanNeighborReturnModel, VlanNeighborsModel, VlanNeighborsReturnModel, VlanReturnModel,
    VlansMembersReturnModel, VlansModel, VlansPerVnetModel, VlansPerVnetReturnModel,
    VlansReturnModel,
};
use crate::overlay_mgr::{join_key, read_record, scan_records, write_record, OverlayMgr};
use crate::tables::fields;
use crate::types::{LocalRoute, NeighRecord, Record, TaggingMode, VlanBinding, VlanMemberRecord, VlanRecord};

/// Interface state of one VLAN as stored in VLAN_INTERFACE.
struct VlanInterface {
    binding: Option<VlanBinding>,
    /// Keys of the `Vlan<tag>|<prefix>` records.
    prefix_keys: Vec<String>,
}

impl VlanInterface {
    /// The single interface prefix; more than one is a store integrity error.
    fn prefix(&self, vlan_name: &str) -> ApiResult<Option<IpPrefix>> {
        match self.prefix_keys.as_slice() {
            [] => Ok(None),
            [key] => {
                let raw = key.rsplit('|').next().unwrap_or_default();
                raw.parse().map(Some).map_err(|_| {
                    error!(vlan = vlan_name, key = %key, "Malformed VLAN interface prefix");
                    ApiError::internal(MSG_INTERNAL)
                })
            }
            _ => {
                error!(vlan = vlan_name, count = self.prefix_keys.len(), "Multiple interface prefixes");
                Err(ApiError::internal_with(
                    MSG_INTERNAL,
                    format!("More than one IP prefix configured on {}", vlan_name),
                ))
            }
        }
    }
}

fn conflict_message(vlan_name: &str, guid: Option<&str>) -> String {
    match guid {
        Some(guid) => format!(
            "Object already exists: {{\"vlan_name\":\"{}\", \"vnet_id\":\"{}\"}}",
            vlan_name, guid
        ),
        None => format!("Object already exists: {}", vlan_name),
    }
}

impl OverlayMgr {
    async fn vlan_interface(&self, vlan_name: &str) -> ApiResult<VlanInterface> {
        let binding = read_record::<VlanBinding>(self.config(), vlan_name).await?;
        let pattern = join_key(self.config(), &[vlan_name, "*"]);
        let prefix_keys = self
            .config()
            .scan(VlanBinding::TABLE, &pattern)
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        Ok(VlanInterface {
            binding,
            prefix_keys,
        })
    }

    /// Fails with 404 on `vlan_id` unless the VLAN exists.
    async fn require_vlan(&self, vlan: VlanId) -> ApiResult<String> {
        let name = vlan.name();
        if !self.config().exists(VlanRecord::TABLE, &name).await? {
            return Err(ApiError::not_found(&["vlan_id"]));
        }
        Ok(name)
    }

    /// Creates VLAN `vlan`, optionally bound to VNET `vnet_name` and
    /// carrying interface prefix `prefix`.
    ///
    /// Write order: VLAN record, VNET binding, (wait) interface prefix,
    /// local subnet route.
    #[instrument(skip(self))]
    pub async fn create_vlan(
        &mut self,
        vlan: VlanId,
        vnet_name: Option<String>,
        prefix: Option<IpPrefix>,
    ) -> ApiResult<()> {
        let vlan_name = vlan.name();

        if self.config().exists(VlanRecord::TABLE, &vlan_name).await? {
            let guid = match read_record::<VlanBinding>(self.config(), &vlan_name).await? {
                Some(binding) => self.vnet_guid(&binding.vnet_name).await?,
                None => None,
            };
            return Err(ApiError::exists(conflict_message(&vlan_name, guid.as_deref())));
        }

        let vnet = match vnet_name.as_deref() {
            Some(name) if self.allocator.lookup(name).is_none() => {
                return Err(ApiError::dependency_missing(
                    "VRF/VNET must be created prior to adding it to the VLAN interface",
                    &["vnet_id"],
                ))
            }
            Some(name) => Some(self.resolve_vnet(name).await?),
            None => None,
        };

        write_record(self.config(), &vlan_name, &VlanRecord::new(vlan)).await?;
        info!(vlan = %vlan_name, "Created VLAN");

        if let Some(vnet) = &vnet {
            let binding = VlanBinding {
                vnet_name: vnet.key.clone(),
            };
            write_record(self.config(), &vlan_name, &binding).await?;
            info!(vlan = %vlan_name, vnet = %vnet.name, "Bound VLAN interface to VNET");
        }

        if let Some(prefix) = prefix {
            if vnet.is_some() {
                self.propagation.wait("vlan interface binding").await;
            }
            let key = join_key(self.config(), &[&vlan_name, &prefix.to_string()]);
            self.config()
                .upsert(VlanBinding::TABLE, &key, &FieldValues::new())
                .await?;
            info!(vlan = %vlan_name, %prefix, "Added VLAN interface prefix");

            if let Some(vnet) = &vnet {
                let route_key = join_key(self.appl(), &[&vnet.key, &prefix.network().to_string()]);
                write_record(self.appl(), &route_key, &LocalRoute::new(&vlan_name)).await?;
                info!(vlan = %vlan_name, route = %route_key, "Added local subnet route");
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_vlan(&self, vlan: VlanId) -> ApiResult<VlanReturnModel> {
        let vlan_name = self.require_vlan(vlan).await?;
        let intf = self.vlan_interface(&vlan_name).await?;

        let mut attr = VlanModel::default();
        if let Some(binding) = &intf.binding {
            match self.vnet_guid(&binding.vnet_name).await? {
                Some(guid) => attr.vnet_id = guid,
                None => {
                    error!(vlan = %vlan_name, vnet = %binding.vnet_name, "VLAN bound to missing VNET");
                    return Err(ApiError::internal(MSG_INTERNAL));
                }
            }
        }
        if let Some(prefix) = intf.prefix(&vlan_name)? {
            attr.ip_prefix = prefix.to_string();
        }

        Ok(VlanReturnModel {
            vlan_id: vlan.as_u16(),
            attr,
        })
    }

    /// Deletes a VLAN without members or neighbors, reversing the creation
    /// order.
    #[instrument(skip(self))]
    pub async fn delete_vlan(&mut self, vlan: VlanId) -> ApiResult<()> {
        let vlan_name = self.require_vlan(vlan).await?;
        let pattern = join_key(self.config(), &[&vlan_name, "*"]);

        for table in [VlanMemberRecord::TABLE, NeighRecord::TABLE] {
            if !self.config().scan(table, &pattern).await?.is_empty() {
                warn!(vlan = %vlan_name, table, "VLAN still has dependents");
                return Err(ApiError::delete_dependency());
            }
        }

        let intf = self.vlan_interface(&vlan_name).await?;
        let prefix = intf.prefix(&vlan_name)?;

        if let (Some(prefix), Some(binding)) = (prefix, &intf.binding) {
            let route_key = join_key(self.appl(), &[&binding.vnet_name, &prefix.network().to_string()]);
            self.appl().delete(LocalRoute::TABLE, &route_key).await?;
            info!(vlan = %vlan_name, route = %route_key, "Removed local subnet route");
        }

        for key in &intf.prefix_keys {
            self.propagation.wait("local subnet route removal").await;
            self.config().delete(VlanBinding::TABLE, key).await?;
            info!(vlan = %vlan_name, key = %key, "Removed VLAN interface prefix");
        }

        if intf.binding.is_some() {
            if prefix.is_some() {
                self.propagation.wait("vlan interface prefix removal").await;
            }
            self.config().delete(VlanBinding::TABLE, &vlan_name).await?;
            info!(vlan = %vlan_name, "Removed VLAN interface binding");
        }

        self.config().delete(VlanRecord::TABLE, &vlan_name).await?;
        info!(vlan = %vlan_name, "Deleted VLAN");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_vlans(&self) -> ApiResult<VlansReturnModel> {
        let vlans = scan_records::<VlanRecord>(self.config(), "*").await?;
        if vlans.is_empty() {
            return Err(ApiError::not_found(&["Vlans"]));
        }

        let mut attr = Vec::with_capacity(vlans.len());
        for (key, record) in vlans {
            let intf = self.vlan_interface(&key).await?;
            let vnet_id = match &intf.binding {
                Some(binding) => self.vnet_guid(&binding.vnet_name).await?.unwrap_or_default(),
                None => String::new(),
            };
            let ip_prefix = intf
                .prefix(&key)?
                .map(|p| p.to_string())
                .unwrap_or_default();
            attr.push(VlansModel {
                vlan_id: record.vlan.as_u16(),
                ip_prefix,
                vnet_id,
            });
        }
        attr.sort_by_key(|v| v.vlan_id);
        Ok(VlansReturnModel { attr })
    }

    #[instrument(skip(self))]
    pub async fn list_vlans_in_vnet(&self, vnet_name: &str) -> ApiResult<VlansPerVnetReturnModel> {
        let vnet = self.resolve_vnet(vnet_name).await?;

        let sep = self.config().separator();
        let mut attr = Vec::new();
        for (key, fvs) in self.config().scan(VlanBinding::TABLE, "*").await? {
            // prefix records share the table
            if key.contains(sep) || fvs.get_field(fields::VNET_NAME) != Some(vnet.key.as_str()) {
                continue;
            }
            let Ok(vlan) = VlanId::from_name(&key) else {
                warn!(key = %key, "Skipping VLAN interface with malformed name");
                continue;
            };
            let intf = self.vlan_interface(&key).await?;
            attr.push(VlansPerVnetModel {
                vlan_id: vlan.as_u16(),
                ip_prefix: intf
                    .prefix(&key)?
                    .map(|p| p.to_string())
                    .unwrap_or_default(),
            });
        }
        attr.sort_by_key(|v| v.vlan_id);

        Ok(VlansPerVnetReturnModel {
            vnet_id: vnet.name,
            attr,
        })
    }

    /// Adds port `ifname` to the VLAN. A port is an untagged member of at
    /// most one VLAN.
    #[instrument(skip(self))]
    pub async fn add_vlan_member(&mut self, vlan: VlanId, ifname: &str, mode: TaggingMode) -> ApiResult<()> {
        let vlan_name = self.require_vlan(vlan).await?;

        if mode == TaggingMode::Untagged {
            let pattern = join_key(self.config(), &["*", ifname]);
            let memberships = scan_records::<VlanMemberRecord>(self.config(), &pattern).await?;
            if memberships
                .iter()
                .any(|(_, m)| m.tagging_mode == TaggingMode::Untagged)
            {
                return Err(ApiError::exists(format!(
                    "Object already an untagged member of some vlan: {}",
                    ifname
                )));
            }
        }

        let key = join_key(self.config(), &[&vlan_name, ifname]);
        if self.config().exists(VlanMemberRecord::TABLE, &key).await? {
            return Err(ApiError::exists(format!(
                "Object already a member of this vlan: {}",
                ifname
            )));
        }

        write_record(self.config(), &key, &VlanMemberRecord { tagging_mode: mode }).await?;
        info!(vlan = %vlan_name, ifname, %mode, "Added VLAN member");
        Ok(())
    }

    async fn read_member(&self, vlan_name: &str, ifname: &str) -> ApiResult<(String, VlanMemberRecord)> {
        let key = join_key(self.config(), &[vlan_name, ifname]);
        match read_record::<VlanMemberRecord>(self.config(), &key).await? {
            Some(member) => Ok((key, member)),
            None => Err(ApiError::not_found(&["if_name"])),
        }
    }

    #[instrument(skip(self))]
    pub async fn get_vlan_member(&self, vlan: VlanId, ifname: &str) -> ApiResult<VlanMemberReturnModel> {
        let vlan_name = self.require_vlan(vlan).await?;
        let (_, member) = self.read_member(&vlan_name, ifname).await?;
        Ok(VlanMemberReturnModel {
            vlan_id: vlan.as_u16(),
            if_name: ifname.to_string(),
            attr: VlanMemberModel {
                tagging_mode: member.tagging_mode.to_string(),
            },
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_vlan_member(&mut self, vlan: VlanId, ifname: &str) -> ApiResult<()> {
        let vlan_name = self.require_vlan(vlan).await?;
        let (key, _) = self.read_member(&vlan_name, ifname).await?;
        self.config().delete(VlanMemberRecord::TABLE, &key).await?;
        info!(vlan = %vlan_name, ifname, "Removed VLAN member");
        Ok(())
    }

    async fn members_of(&self, vlan_name: &str) -> ApiResult<Vec<VlanMembersModel>> {
        let pattern = join_key(self.config(), &[vlan_name, "*"]);
        let sep = self.config().separator();
        Ok(scan_records::<VlanMemberRecord>(self.config(), &pattern)
            .await?
            .into_iter()
            .filter_map(|(key, member)| {
                let (_, ifname) = key.split_once(sep)?;
                Some(VlanMembersModel {
                    if_name: ifname.to_string(),
                    tagging_mode: member.tagging_mode.to_string(),
                })
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn list_vlan_members(&self, vlan: VlanId) -> ApiResult<VlanMembersReturnModel> {
        let vlan_name = self.require_vlan(vlan).await?;
        Ok(VlanMembersReturnModel {
            vlan_id: vlan.as_u16(),
            attr: self.members_of(&vlan_name).await?,
        })
    }

    /// Members of every VLAN; VLANs without members are left out.
    #[instrument(skip(self))]
    pub async fn list_all_vlan_members(&self) -> ApiResult<VlansMembersReturnModel> {
        let vlans = scan_records::<VlanRecord>(self.config(), "*").await?;
        if vlans.is_empty() {
            return Err(ApiError::not_found(&["Vlans"]));
        }

        let mut attr = Vec::new();
        for (key, record) in vlans {
            let members = self.members_of(&key).await?;
            if members.is_empty() {
                continue;
            }
            attr.push(VlanMembersReturnModel {
                vlan_id: record.vlan.as_u16(),
                attr: members,
            });
        }
        attr.sort_by_key(|v| v.vlan_id);
        Ok(VlansMembersReturnModel { attr })
    }

    #[instrument(skip(self))]
    pub async fn add_vlan_neighbor(&mut self, vlan: VlanId, ip: IpAddress) -> ApiResult<()> {
        let vlan_name = self.require_vlan(vlan).await?;
        let key = join_key(self.config(), &[&vlan_name, &ip.to_string()]);
        if self.config().exists(NeighRecord::TABLE, &key).await? {
            return Err(ApiError::exists(format!("Object already exists {}", ip)));
        }

        write_record(self.config(), &key, &NeighRecord { family: ip.family() }).await?;
        info!(vlan = %vlan_name, %ip, "Added static neighbor");
        Ok(())
    }

    async fn require_neighbor(&self, vlan_name: &str, ip: IpAddress) -> ApiResult<String> {
        let key = join_key(self.config(), &[vlan_name, &ip.to_string()]);
        if !self.config().exists(NeighRecord::TABLE, &key).await? {
            return Err(ApiError::not_found(&["ip_addr"]));
        }
        Ok(key)
    }

    #[instrument(skip(self))]
    pub async fn get_vlan_neighbor(&self, vlan: VlanId, ip: IpAddress) -> ApiResult<VlanNeighborReturnModel> {
        let vlan_name = self.require_vlan(vlan).await?;
        self.require_neighbor(&vlan_name, ip).await?;
        Ok(VlanNeighborReturnModel {
            vlan_id: vlan.as_u16(),
            ip_addr: ip.to_string(),
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_vlan_neighbor(&mut self, vlan: VlanId, ip: IpAddress) -> ApiResult<()> {
        let vlan_name = self.require_vlan(vlan).await?;
        let key = self.require_neighbor(&vlan_name, ip).await?;
        self.config().delete(NeighRecord::TABLE, &key).await?;
        info!(vlan = %vlan_name, %ip, "Removed static neighbor");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_vlan_neighbors(&self, vlan: VlanId) -> ApiResult<VlanNeighborsReturnModel> {
        let vlan_name = self.require_vlan(vlan).await?;
        let pattern = join_key(self.config(), &[&vlan_name, "*"]);
        let sep = self.config().separator();

        let attr = self
            .config()
            .scan(NeighRecord::TABLE, &pattern)
            .await?
            .into_iter()
            .filter_map(|(key, _)| {
                let (_, ip) = key.split_once(sep)?;
                Some(VlanNeighborsModel {
                    ip_addr: ip.to_string(),
                })
            })
            .collect();

        Ok(VlanNeighborsReturnModel {
            vlan_id: vlan.as_u16(),
            attr,
        })
    }
}
