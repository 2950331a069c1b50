//! Request serialization and client certificate trust gate.
//!
//! Every operation runs on its own task holding the gate until it returns,
//! so multi-step sequences are never observed half applied and a client
//! that disconnects cannot cut one short. The allow-list check runs before
//! the lock is taken.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, warn};

use crate::error::{ApiError, ApiResult, MSG_INTERNAL};
use crate::overlay_mgr::OverlayMgr;

/// Subject common names of the certificates a TLS peer presented, leaf
/// first. Attached to each request accepted over HTTPS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerIdentity {
    pub common_names: Vec<String>,
}

impl PeerIdentity {
    pub fn new(common_names: Vec<String>) -> Self {
        Self { common_names }
    }
}

/// Matches a peer name against one allow-list entry.
///
/// `*.example.com` matches `a.example.com` but neither `example.com` nor
/// `a.b.example.com`.
pub fn cn_matches(pattern: &str, name: &str) -> bool {
    if pattern == name {
        return true;
    }
    match pattern.strip_prefix('*') {
        Some(suffix) if suffix.starts_with('.') => {
            name.ends_with(suffix)
                && name.len() > suffix.len()
                && name.split('.').count() == pattern.split('.').count()
        }
        _ => false,
    }
}

pub struct Gate {
    mgr: Arc<Mutex<OverlayMgr>>,
    trusted: Vec<String>,
}

impl Gate {
    pub fn new(mgr: OverlayMgr, trusted: Vec<String>) -> Self {
        Self {
            mgr: Arc::new(Mutex::new(mgr)),
            trusted,
        }
    }

    /// Runs `op` with exclusive access to the manager.
    ///
    /// The operation is spawned once the lock is held, so it runs to
    /// completion even if the caller is dropped while awaiting it. A caller
    /// dropped while still queued for the lock starts nothing.
    pub async fn run<F, Fut, T>(&self, op: F) -> ApiResult<T>
    where
        F: FnOnce(OwnedMutexGuard<OverlayMgr>) -> Fut,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.mgr.clone().lock_owned().await;
        tokio::spawn(op(guard)).await.map_err(|e| {
            error!(error = %e, "Gated operation aborted");
            ApiError::internal(MSG_INTERNAL)
        })?
    }

    /// Checks the peer against the allow-list. Requests without a peer
    /// identity (plain HTTP) pass.
    pub fn authorize(&self, peer: Option<&PeerIdentity>) -> ApiResult<()> {
        let Some(peer) = peer else {
            return Ok(());
        };

        let matched = peer.common_names.iter().find(|cn| {
            self.trusted
                .iter()
                .any(|pattern| cn_matches(pattern, cn))
        });
        match matched {
            Some(cn) => {
                debug!(cn = %cn, "Client certificate trusted");
                Ok(())
            }
            None => {
                warn!(common_names = ?peer.common_names, "Untrusted client certificate");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
