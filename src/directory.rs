//! Live session directory.
//!
//! Process-wide map from authenticated username to that connection's
//! outbound channel, the only mutable state shared between connection
//! tasks. Every operation takes the lock briefly and never touches the
//! network; fan-out callers work from snapshots.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Outbound handle for one live connection. Carries pre-encoded frames.
pub type Outbound = mpsc::Sender<Vec<u8>>;

#[derive(Default)]
pub struct SessionDirectory {
    inner: Mutex<HashMap<String, Outbound>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or silently overwrite. A second login under the same
    /// username evicts the previous entry; the orphaned connection is
    /// not torn down here and lingers until its own I/O fails.
    pub fn register(&self, username: &str, tx: Outbound) {
        self.inner.lock().insert(username.to_string(), tx);
    }

    /// Remove the entry if present; no-op otherwise. Called once per
    /// connection lifetime on every cleanup path.
    pub fn unregister(&self, username: &str) {
        self.inner.lock().remove(username);
    }

    pub fn lookup(&self, username: &str) -> Option<Outbound> {
        self.inner.lock().get(username).cloned()
    }

    /// Point-in-time snapshot of online usernames.
    pub fn all_usernames(&self) -> Vec<String> {
        self.inner.lock().keys().cloned().collect()
    }

    /// Snapshot of every live session, for room-wide fan-out.
    pub fn all_sessions(&self) -> Vec<(String, Outbound)> {
        self.inner
            .lock()
            .iter()
            .map(|(user, tx)| (user.clone(), tx.clone()))
            .collect()
    }
}
