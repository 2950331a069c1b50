//! Key-value store gateway.
//!
//! Records are addressed as `(table, key)` and stored under
//! `<table><separator><key>` in the database selected by [`DbId`].

use async_trait::async_trait;

use crate::db::{DbId, FieldValues};
use crate::error::StoreResult;

/// Hash-per-key store with pattern enumeration.
///
/// Implemented by [`RedisStore`](crate::RedisStore) for production and by
/// [`MemoryStore`](crate::MemoryStore) for tests.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Database this store is bound to.
    fn db(&self) -> DbId;

    /// Reads one record; `None` if the key does not exist.
    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<FieldValues>>;

    /// Enumerates records whose key matches the glob `pattern`.
    ///
    /// Returned keys have the table prefix stripped and are sorted.
    async fn scan(&self, table: &str, pattern: &str) -> StoreResult<Vec<(String, FieldValues)>>;

    /// Merges `fields` into the record, creating it if needed.
    async fn upsert(&self, table: &str, key: &str, fields: &FieldValues) -> StoreResult<()>;

    async fn delete(&self, table: &str, key: &str) -> StoreResult<()>;

    async fn exists(&self, table: &str, key: &str) -> StoreResult<bool> {
        Ok(self.get(table, key).await?.is_some())
    }

    fn separator(&self) -> &'static str {
        self.db().separator()
    }
}

/// Redis-style glob match supporting `*` and `?`.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "Vlan100"));
        assert!(glob_match("Vlan100|*", "Vlan100|Ethernet0"));
        assert!(!glob_match("Vlan100|*", "Vlan1000|Ethernet0"));
        assert!(glob_match("Vnet1:*", "Vnet1:fc00::/64"));
        assert!(glob_match("*|Ethernet0", "Vlan7|Ethernet0"));
        assert!(glob_match("Vlan?", "Vlan7"));
        assert!(!glob_match("Vlan?", "Vlan77"));
        assert!(glob_match("a*b*c", "axxbyyc"));
        assert!(!glob_match("a*b*c", "axxbyy"));
    }
}
