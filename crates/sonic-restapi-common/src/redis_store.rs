//! Redis implementation of the store gateway.
//!
//! Plain tables are written with HSET/DEL. Tables registered as producer
//! tables follow the swss-common producer protocol so that orchagent picks
//! the change up: the pending hash lives under `_<TABLE>:<key>`, the key is
//! added to `<TABLE>_KEY_SET` (and `<TABLE>_DEL_SET` on delete) and a
//! notification is published on `<TABLE>_CHANNEL@<db>`.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tracing::{debug, instrument};

use crate::db::{DbId, FieldValues, NULL_FIELD};
use crate::error::StoreResult;
use crate::store::KvStore;

/// Default unix socket of the SONiC redis instance.
pub const REDIS_UNIX_SOCKET: &str = "/var/run/redis/redis.sock";

/// Where to reach redis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisEndpoint {
    Tcp { host: String, port: u16 },
    Unix { path: String },
}

impl RedisEndpoint {
    /// Connection URL for database `db`.
    pub fn url(&self, db: DbId) -> String {
        match self {
            RedisEndpoint::Tcp { host, port } => format!("redis://{}:{}/{}", host, port, db.id()),
            RedisEndpoint::Unix { path } => format!("redis+unix://{}?db={}", path, db.id()),
        }
    }
}

impl Default for RedisEndpoint {
    fn default() -> Self {
        RedisEndpoint::Unix {
            path: REDIS_UNIX_SOCKET.to_string(),
        }
    }
}

/// Store bound to one redis database.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    db: DbId,
    producer_tables: HashSet<String>,
    pending_reads: bool,
}

impl RedisStore {
    #[instrument(skip_all, fields(db = db.name()))]
    pub async fn connect(endpoint: &RedisEndpoint, db: DbId) -> StoreResult<Self> {
        let url = endpoint.url(db);
        debug!(url, "Connecting to redis");
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            db,
            producer_tables: HashSet::new(),
            pending_reads: false,
        })
    }

    /// Registers tables that are written through the producer protocol.
    pub fn with_producer_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.producer_tables
            .extend(tables.into_iter().map(Into::into));
        self
    }

    /// Reads producer tables from their pending `_<TABLE>` hash. Used when
    /// no consumer is running (local test setups).
    pub fn with_pending_reads(mut self, pending_reads: bool) -> Self {
        self.pending_reads = pending_reads;
        self
    }

    fn is_producer(&self, table: &str) -> bool {
        self.producer_tables.contains(table)
    }

    fn read_table(&self, table: &str) -> String {
        if self.pending_reads && self.is_producer(table) {
            format!("_{}", table)
        } else {
            table.to_string()
        }
    }

    fn full_key(&self, table: &str, key: &str) -> String {
        self.db.key(table, key)
    }

    fn to_record(map: BTreeMap<String, String>) -> FieldValues {
        map.into_iter().filter(|(f, _)| f != NULL_FIELD).collect()
    }

    fn to_pairs(fields: &FieldValues) -> Vec<(String, String)> {
        if fields.is_empty() {
            vec![(NULL_FIELD.to_string(), NULL_FIELD.to_string())]
        } else {
            fields.clone()
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    fn db(&self) -> DbId {
        self.db
    }

    #[instrument(skip(self), fields(db = self.db.name()))]
    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<FieldValues>> {
        let full = self.full_key(&self.read_table(table), key);
        let mut conn = self.conn.clone();
        let map: BTreeMap<String, String> = conn.hgetall(&full).await?;
        if map.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self::to_record(map)))
    }

    #[instrument(skip(self), fields(db = self.db.name()))]
    async fn scan(&self, table: &str, pattern: &str) -> StoreResult<Vec<(String, FieldValues)>> {
        let prefix = self.full_key(&self.read_table(table), "");
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = conn.keys(format!("{}{}", prefix, pattern)).await?;
        keys.sort();

        let mut records = Vec::with_capacity(keys.len());
        for full in keys {
            let map: BTreeMap<String, String> = conn.hgetall(&full).await?;
            if map.is_empty() {
                continue;
            }
            let short = full.strip_prefix(&prefix).unwrap_or(&full).to_string();
            records.push((short, Self::to_record(map)));
        }

        debug!(count = records.len(), "Scanned {}{}", prefix, pattern);
        Ok(records)
    }

    #[instrument(skip(self, fields), fields(db = self.db.name()))]
    async fn upsert(&self, table: &str, key: &str, fields: &FieldValues) -> StoreResult<()> {
        let pairs = Self::to_pairs(fields);
        let mut conn = self.conn.clone();

        if !self.is_producer(table) {
            let full = self.full_key(table, key);
            let _: () = conn.hset_multiple(&full, &pairs).await?;
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(self.full_key(&format!("_{}", table), key), &pairs)
            .ignore()
            .sadd(format!("{}_KEY_SET", table), key)
            .ignore()
            .publish(format!("{}_CHANNEL@{}", table, self.db.id()), "G")
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(db = self.db.name()))]
    async fn delete(&self, table: &str, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();

        if !self.is_producer(table) {
            let _: () = conn.del(self.full_key(table, key)).await?;
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic()
            .sadd(format!("{}_KEY_SET", table), key)
            .ignore()
            .sadd(format!("{}_DEL_SET", table), key)
            .ignore()
            .del(self.full_key(&format!("_{}", table), key))
            .ignore()
            .publish(format!("{}_CHANNEL@{}", table, self.db.id()), "G")
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
