//! Overlay Manager - state and shared helpers of the provisioning service
//!
//! The manager owns everything the API mutates: the VNET id allocator, the
//! cache of local tunnel endpoint addresses and the reset status. Resource
//! operations are implemented in `vnet_mgr`, `tunnel_mgr`, `vlan_mgr`,
//! `route_mgr`, `static_route` and `system`, all as `impl OverlayMgr`
//! blocks. The manager itself is not synchronized; the [`Gate`](crate::Gate)
//! serializes access to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sonic_restapi_common::{
    DbId, KvStore, MemoryStore, RedisEndpoint, RedisStore, StoreResult,
};
use tracing::{debug, error, info, instrument};

use crate::allocator::IdAllocator;
use crate::error::{ApiError, ApiResult};
use crate::propagation::{FixedInterval, PropagationWait};
use crate::rpc::{ArpClient, DataplaneClient};
use crate::tables::{self, VNET_NAME_PREFIX};
use crate::types::{Record, TunnelRecord, VnetRecord};

/// Message for an allocator entry without a backing VNET record.
pub const MSG_GUID_OUT_OF_SYNC: &str = "Internal service error: GUID Cache and DB out of sync";

/// Default root of the sysfs tree read for interface state.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// The four databases the service talks to.
#[derive(Clone)]
pub struct Stores {
    pub config_db: Arc<dyn KvStore>,
    pub appl_db: Arc<dyn KvStore>,
    pub counters_db: Arc<dyn KvStore>,
    pub cache_db: Arc<dyn KvStore>,
}

impl Stores {
    /// In-memory stores, used by tests and local fixtures.
    pub fn in_memory() -> Self {
        Self {
            config_db: Arc::new(MemoryStore::new(DbId::ConfigDb)),
            appl_db: Arc::new(MemoryStore::new(DbId::ApplDb)),
            counters_db: Arc::new(MemoryStore::new(DbId::CountersDb)),
            cache_db: Arc::new(MemoryStore::new(DbId::RestapiDb)),
        }
    }

    /// Connects one redis store per database. Route tables of APPL_DB are
    /// written through the producer protocol; in local test mode they are
    /// read back from the pending tables since no consumer runs.
    #[instrument(skip(endpoint))]
    pub async fn connect(endpoint: &RedisEndpoint, local_test: bool) -> StoreResult<Self> {
        let config_db = RedisStore::connect(endpoint, DbId::ConfigDb).await?;
        let appl_db = RedisStore::connect(endpoint, DbId::ApplDb)
            .await?
            .with_producer_tables(tables::APPL_PRODUCER_TABLES.iter().copied())
            .with_pending_reads(local_test);
        let counters_db = RedisStore::connect(endpoint, DbId::CountersDb).await?;
        let cache_db = RedisStore::connect(endpoint, DbId::RestapiDb).await?;

        info!("Connected to redis databases");
        Ok(Self {
            config_db: Arc::new(config_db),
            appl_db: Arc::new(appl_db),
            counters_db: Arc::new(counters_db),
            cache_db: Arc::new(cache_db),
        })
    }
}

/// Reads and decodes one record.
pub(crate) async fn read_record<R: Record>(store: &dyn KvStore, key: &str) -> StoreResult<Option<R>> {
    match store.get(R::TABLE, key).await? {
        Some(fvs) => Ok(Some(R::from_fields(key, &fvs)?)),
        None => Ok(None),
    }
}

pub(crate) async fn write_record<R: Record>(store: &dyn KvStore, key: &str, record: &R) -> StoreResult<()> {
    store.upsert(R::TABLE, key, &record.to_fields()).await
}

/// Reads and decodes every record of `R::TABLE` matching `pattern`.
pub(crate) async fn scan_records<R: Record>(
    store: &dyn KvStore,
    pattern: &str,
) -> StoreResult<Vec<(String, R)>> {
    store
        .scan(R::TABLE, pattern)
        .await?
        .into_iter()
        .map(|(key, fvs)| R::from_fields(&key, &fvs).map(|r| (key, r)))
        .collect()
}

/// Joins key parts with the store's separator.
pub(crate) fn join_key(store: &dyn KvStore, parts: &[&str]) -> String {
    parts.join(store.separator())
}

/// Store key of the VNET with numeric id `id` (`Vnet<id>`).
pub fn vnet_key(id: u32) -> String {
    format!("{}{}", VNET_NAME_PREFIX, id)
}

/// Parses the numeric id out of a `Vnet<id>` key.
pub fn parse_vnet_key(key: &str) -> Option<u32> {
    key.strip_prefix(VNET_NAME_PREFIX)?
        .parse()
        .ok()
        .filter(|id| *id != 0)
}

/// A VNET resolved from its operator-chosen name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VnetHandle {
    /// Operator-chosen name.
    pub name: String,
    pub id: u32,
    /// Store key (`Vnet<id>`).
    pub key: String,
    pub record: VnetRecord,
}

/// Reset GUID and time of this service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetInfo {
    pub guid: String,
    pub time: String,
}

/// Overlay Manager
///
/// Owns the mutable service state and the handles to the stores and the
/// optional RPC agents.
pub struct OverlayMgr {
    pub(crate) stores: Stores,

    /// VNET name -> numeric id, VNI -> VNET name
    pub(crate) allocator: IdAllocator,

    /// Source addresses of the local VXLAN tunnels
    pub(crate) tunnel_endpoints: Vec<sonic_types::IpAddress>,

    pub(crate) reset_info: ResetInfo,
    pub(crate) reset_status: bool,

    pub(crate) propagation: Arc<dyn PropagationWait>,
    pub(crate) dataplane: Option<Arc<dyn DataplaneClient>>,
    pub(crate) arp: Option<Arc<dyn ArpClient>>,

    pub(crate) sysfs_root: PathBuf,

    /// No downstream consumers are running (test docker setups)
    pub(crate) local_test: bool,
}

impl OverlayMgr {
    pub fn new(stores: Stores) -> Self {
        Self {
            stores,
            allocator: IdAllocator::new(),
            tunnel_endpoints: Vec::new(),
            reset_info: ResetInfo::default(),
            reset_status: false,
            propagation: Arc::new(FixedInterval::default()),
            dataplane: None,
            arp: None,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
            local_test: false,
        }
    }

    pub fn with_propagation(mut self, propagation: Arc<dyn PropagationWait>) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_dataplane(mut self, dataplane: Arc<dyn DataplaneClient>) -> Self {
        self.dataplane = Some(dataplane);
        self
    }

    pub fn with_arp(mut self, arp: Arc<dyn ArpClient>) -> Self {
        self.arp = Some(arp);
        self
    }

    pub fn with_sysfs_root(mut self, root: impl AsRef<Path>) -> Self {
        self.sysfs_root = root.as_ref().to_path_buf();
        self
    }

    pub fn with_local_test(mut self, local_test: bool) -> Self {
        self.local_test = local_test;
        self
    }

    /// Loads persisted state: reset info and status, the VNET id map and
    /// the local tunnel endpoints.
    #[instrument(skip(self))]
    pub async fn init(&mut self) -> ApiResult<()> {
        self.load_reset_info().await?;
        self.rebuild_allocator().await?;
        self.load_tunnel_endpoints().await?;
        info!(
            vnets = self.allocator.len(),
            tunnel_endpoints = self.tunnel_endpoints.len(),
            "OverlayMgr initialized"
        );
        Ok(())
    }

    /// Rebuilds the id allocator from the VNET records in CONFIG_DB.
    ///
    /// Records without a `guid` are skipped; they were not created through
    /// this service.
    pub async fn rebuild_allocator(&mut self) -> ApiResult<()> {
        let records = self.stores.config_db.scan(VnetRecord::TABLE, "*").await?;
        let mut entries = Vec::with_capacity(records.len());

        for (key, fvs) in records {
            let Some(id) = parse_vnet_key(&key) else {
                error!(key = %key, "Found VNET record with non integer id");
                continue;
            };
            let record = match VnetRecord::from_fields(&key, &fvs) {
                Ok(record) => record,
                Err(e) => {
                    error!(key = %key, error = %e, "Skipping malformed VNET record");
                    continue;
                }
            };
            let Some(guid) = record.guid else {
                error!(key = %key, "Found VNET record with nil guid");
                continue;
            };
            debug!(guid = %guid, id, "Storing VNET guid");
            entries.push((id, guid, record.vni));
        }

        self.allocator.rebuild(entries);
        Ok(())
    }

    /// Caches the source addresses of the existing tunnels.
    pub(crate) async fn load_tunnel_endpoints(&mut self) -> ApiResult<()> {
        self.tunnel_endpoints.clear();
        for name in [tables::DEFAULT_VXLAN_TUNNEL, tables::DEFAULT_VXLAN_TUNNEL_V4] {
            if let Some(tunnel) = read_record::<TunnelRecord>(self.config(), name).await? {
                self.tunnel_endpoints.push(tunnel.src_ip);
            }
        }
        Ok(())
    }

    pub(crate) fn config(&self) -> &dyn KvStore {
        self.stores.config_db.as_ref()
    }

    pub(crate) fn appl(&self) -> &dyn KvStore {
        self.stores.appl_db.as_ref()
    }

    /// Resolves an operator VNET name.
    ///
    /// Unknown names are 404 with the name as the offending field. A name
    /// known to the allocator but missing in CONFIG_DB is an integrity error.
    pub(crate) async fn resolve_vnet(&self, name: &str) -> ApiResult<VnetHandle> {
        let Some(id) = self.allocator.lookup(name) else {
            return Err(ApiError::not_found(&[name]));
        };
        let key = vnet_key(id);
        match read_record::<VnetRecord>(self.config(), &key).await? {
            Some(record) => Ok(VnetHandle {
                name: name.to_string(),
                id,
                key,
                record,
            }),
            None => {
                error!(name, key = %key, "VNET id allocated but record missing");
                Err(ApiError::internal(MSG_GUID_OUT_OF_SYNC))
            }
        }
    }

    /// Operator name of the VNET stored under `key`, falling back to the key.
    pub(crate) async fn vnet_guid(&self, key: &str) -> ApiResult<Option<String>> {
        Ok(read_record::<VnetRecord>(self.config(), key)
            .await?
            .map(|r| r.guid.unwrap_or_else(|| key.to_string())))
    }

    pub fn allocator(&self) -> &IdAllocator {
        &self.allocator
    }

    pub fn tunnel_endpoints(&self) -> &[sonic_types::IpAddress] {
        &self.tunnel_endpoints
    }

    pub fn reset_info(&self) -> &ResetInfo {
        &self.reset_info
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }
}
