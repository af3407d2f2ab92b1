//! Message fan-out.
//!
//! Stateless: given the sender and the raw addressing string, persist
//! the message, then compute the delivery set from group membership and
//! the session directory. Each push is independent: a failed push to
//! one recipient never aborts delivery to the rest, and delivery is
//! fire-and-forget with no acknowledgment to the sender.

use std::sync::Arc;

use crate::directory::Outbound;
use crate::frame;
use crate::proto::Push;
use crate::server::SharedState;

/// Route one `msg` request. The addressing prefix decides the delivery
/// set: `#group` → online members except the sender, `&room` → every
/// online session except the sender, anything else → the one live
/// session of that user.
pub async fn route_message(state: &Arc<SharedState>, sender: &str, target: &str, text: &str) {
    // History first, keyed by the raw unresolved receiver. Persisted
    // even when no live recipient exists.
    state.with_store(|s| s.store_message(sender, target, text));

    if target.starts_with('#') {
        let members = state
            .with_store(|s| s.group_members(target))
            .unwrap_or_default();
        let bytes = frame::encode(&Push::Msg {
            sender: sender.to_string(),
            to: target.to_string(),
            text: text.to_string(),
        });
        for member in &members {
            if member == sender {
                continue;
            }
            if let Some(tx) = state.directory.lookup(member) {
                deliver(&tx, member, bytes.clone()).await;
            }
        }
    } else if target.starts_with('&') {
        let bytes = frame::encode(&Push::Msg {
            sender: sender.to_string(),
            to: target.to_string(),
            text: text.to_string(),
        });
        for (user, tx) in state.directory.all_sessions() {
            if user == sender {
                continue;
            }
            deliver(&tx, &user, bytes.clone()).await;
        }
    } else if let Some(tx) = state.directory.lookup(target) {
        // Direct message: the envelope's `to` echoes the sender so the
        // recipient keys its conversation by the other party.
        let bytes = frame::encode(&Push::Msg {
            sender: sender.to_string(),
            to: sender.to_string(),
            text: text.to_string(),
        });
        deliver(&tx, target, bytes).await;
    }
}

async fn deliver(tx: &Outbound, recipient: &str, bytes: Vec<u8>) {
    if tx.send(bytes).await.is_err() {
        tracing::warn!(%recipient, "push failed: recipient channel closed");
    }
}
