// Relaymux Router — per-client subscription multiplexer. Rewrites a
// client's chosen subscription id to a process-unique id before handing it
// to the shared RelayManager, so two clients (or two subscriptions on the
// same client) can reuse the same id string without colliding upstream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use log::{debug, warn};
use parking_lot::Mutex;
use rand::RngCore;

use crate::intake::Intake;
use crate::manager::RelayManager;
use crate::wire::Frame;

/// How often the outbound pump checks the Intake for new events destined
/// for this client (`router.py::nostr_to_client`).
const OUTBOUND_TICK: Duration = Duration::from_millis(100);

fn generate_subscription_id() -> String {
    let mut bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Per-client state: the original<->rewritten subscription id mapping and
/// the client-facing sink used by the outbound pump.
pub struct Router {
    manager: Arc<RelayManager>,
    intake: Arc<Intake>,
    original_to_rewritten: Mutex<HashMap<String, String>>,
    rewritten_to_original: Mutex<HashMap<String, String>>,
    stopped: AtomicBool,
}

impl Router {
    pub fn new(manager: Arc<RelayManager>, intake: Arc<Intake>) -> Arc<Self> {
        Arc::new(Router {
            manager,
            intake,
            original_to_rewritten: Mutex::new(HashMap::new()),
            rewritten_to_original: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        })
    }

    /// Handle one frame received from the client. `REQ` opens (or
    /// replaces) a subscription under a freshly minted rewritten id;
    /// `CLOSE` tears one down; `EVENT` (client publish) forwards
    /// verbatim. Decode failures are logged and otherwise ignored — a
    /// malformed client frame must never tear down the connection.
    pub fn handle_client_frame(&self, raw: &str) {
        let frame = match Frame::decode(raw) {
            Ok(f) => f,
            Err(e) => {
                debug!("[router] dropping malformed client frame: {e}");
                return;
            }
        };

        match frame {
            Frame::Req { sub_id, filters } => {
                // Replacing an existing client subscription of the same id
                // drops the old upstream subscription first so it doesn't
                // leak.
                self.close_client_subscription(&sub_id);

                let rewritten = generate_subscription_id();
                self.original_to_rewritten.lock().insert(sub_id.clone(), rewritten.clone());
                self.rewritten_to_original.lock().insert(rewritten.clone(), sub_id);
                self.manager.add_subscription(rewritten, filters);
            }
            Frame::Close { sub_id } => {
                self.close_client_subscription(&sub_id);
            }
            Frame::PublishEvent { event } => {
                self.manager.publish_message(&Frame::PublishEvent { event }.encode());
            }
            other => {
                debug!("[router] ignoring unexpected client frame: {other:?}");
            }
        }
    }

    /// The rewritten id this Router installed upstream for a client-chosen
    /// subscription id, if that subscription is still open. Exposed for
    /// callers (admin diagnostics, tests) that need to correlate the two.
    pub fn rewritten_id(&self, original_sub_id: &str) -> Option<String> {
        self.original_to_rewritten.lock().get(original_sub_id).cloned()
    }

    fn close_client_subscription(&self, original_sub_id: &str) {
        if let Some(rewritten) = self.original_to_rewritten.lock().remove(original_sub_id) {
            self.rewritten_to_original.lock().remove(&rewritten);
            self.manager.close_subscription(&rewritten);
            self.intake.forget(&rewritten);
        }
    }

    /// Run the outbound pump: every tick, drain the Intake for each
    /// subscription this client owns, rewrite ids back to the client's
    /// own naming, and push encoded frames through `client_tx`. Exits
    /// once `stop()` is called or `client_tx` is closed.
    pub async fn run_outbound_pump(self: Arc<Self>, client_tx: tokio::sync::mpsc::Sender<String>) {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }

            let owned: Vec<(String, String)> = self
                .rewritten_to_original
                .lock()
                .iter()
                .map(|(rewritten, original)| (rewritten.clone(), original.clone()))
                .collect();

            for (rewritten, original) in &owned {
                for intake_event in self.intake.drain_events(rewritten) {
                    let frame = Frame::Event {
                        sub_id: original.clone(),
                        event: match serde_json::to_value(&intake_event.event) {
                            Ok(v) => v,
                            Err(e) => {
                                warn!("[router] failed to serialize event for {original}: {e}");
                                continue;
                            }
                        },
                    };
                    if client_tx.send(frame.encode()).await.is_err() {
                        return;
                    }
                }
                if self.intake.take_eose(rewritten) {
                    let frame = Frame::Eose { sub_id: original.clone() };
                    if client_tx.send(frame.encode()).await.is_err() {
                        return;
                    }
                }
            }

            // Notices are global, not client-attributable (spec §4.6): whichever
            // Router's pump ticks first drains and logs them here; they are
            // never forwarded to a specific client's socket.
            for notice in self.intake.drain_notices() {
                debug!("[router] notice from {}: {}", notice.url, notice.content);
            }

            tokio::time::sleep(OUTBOUND_TICK).await;
        }
    }

    /// Idempotent teardown: closes every subscription this client owns
    /// upstream and stops the outbound pump on its next tick.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let owned: Vec<String> = self.original_to_rewritten.lock().keys().cloned().collect();
        for original in owned {
            self.close_client_subscription(&original);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::MessagePool;

    fn test_router() -> Arc<Router> {
        let pool = Arc::new(MessagePool::default());
        let manager = RelayManager::new(pool, true);
        let intake = Arc::new(Intake::new());
        Router::new(manager, intake)
    }

    #[test]
    fn rewritten_ids_are_unique_across_two_routers_with_same_client_id() {
        let router_a = test_router();
        let router_b = test_router();
        router_a.handle_client_frame(r#"["REQ","sub-1",{}]"#);
        router_b.handle_client_frame(r#"["REQ","sub-1",{}]"#);

        let rewritten_a = router_a.original_to_rewritten.lock().get("sub-1").cloned().unwrap();
        let rewritten_b = router_b.original_to_rewritten.lock().get("sub-1").cloned().unwrap();
        assert_ne!(rewritten_a, rewritten_b);
    }

    #[test]
    fn close_removes_both_directions_of_the_mapping() {
        let router = test_router();
        router.handle_client_frame(r#"["REQ","sub-1",{}]"#);
        let rewritten = router.original_to_rewritten.lock().get("sub-1").cloned().unwrap();
        router.handle_client_frame(r#"["CLOSE","sub-1"]"#);
        assert!(router.original_to_rewritten.lock().get("sub-1").is_none());
        assert!(router.rewritten_to_original.lock().get(&rewritten).is_none());
    }

    #[test]
    fn malformed_client_frame_does_not_panic() {
        let router = test_router();
        router.handle_client_frame("not json");
    }

    #[test]
    fn stop_is_idempotent_and_clears_ownership() {
        let router = test_router();
        router.handle_client_frame(r#"["REQ","sub-1",{}]"#);
        router.stop();
        router.stop();
        assert!(router.original_to_rewritten.lock().is_empty());
    }
}
