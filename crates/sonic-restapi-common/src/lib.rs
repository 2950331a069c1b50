//! Shared infrastructure for the SONiC REST provisioning service.
//!
//! - [`KvStore`]: the store gateway trait, with [`RedisStore`] and
//!   [`MemoryStore`] backends
//! - [`DbId`] and [`FieldValues`]: database selection and record helpers
//! - [`shell`]: command execution for operational requests
//! - [`error`]: error types for store operations

pub mod db;
pub mod error;
pub mod memory_store;
pub mod redis_store;
pub mod shell;
pub mod store;

pub use db::{DbId, FieldValue, FieldValues, FieldValuesExt, NULL_FIELD};
pub use error::{StoreError, StoreResult};
pub use memory_store::MemoryStore;
pub use redis_store::{RedisEndpoint, RedisStore, REDIS_UNIX_SOCKET};
pub use store::{glob_match, KvStore};
