// Relaymux Relay Manager — owns every upstream RelaySession, the
// subscription cache replayed on (re)connect, and the restart-backoff
// supervisor sweep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::event::Filter;
use crate::pool::MessagePool;
use crate::session::RelaySession;
use crate::wire::Frame;

/// `relay_manager.py::_restart_relay`: exponential-ish linear backoff,
/// capped at an hour.
fn restart_backoff(error_counter: u32) -> Duration {
    Duration::from_secs((60u64.saturating_mul(error_counter as u64)).min(3600))
}

/// Interval between restart sweeps (`tasks.py::check_relays`).
const SUPERVISOR_INTERVAL: Duration = Duration::from_secs(20);

struct ManagedRelay {
    session: Arc<RelaySession>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// A cached subscription, replayed against any relay added after the
/// subscription was opened and against any relay that reconnects.
#[derive(Clone)]
struct CachedSubscription {
    filters: Vec<Filter>,
}

pub struct RelayManager {
    pool: Arc<MessagePool>,
    verify_tls: bool,
    relays: Mutex<HashMap<String, ManagedRelay>>,
    subscriptions: Mutex<HashMap<String, CachedSubscription>>,
}

impl RelayManager {
    pub fn new(pool: Arc<MessagePool>, verify_tls: bool) -> Arc<Self> {
        Arc::new(RelayManager {
            pool,
            verify_tls,
            relays: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    /// Register a relay and start its connection task. Idempotent: adding
    /// an already-registered url is a no-op. Every currently-cached
    /// subscription is replayed against the new session once connected.
    pub fn add_relay(self: &Arc<Self>, url: impl Into<String>) {
        let url = url.into();
        {
            let relays = self.relays.lock();
            if relays.contains_key(&url) {
                return;
            }
        }

        let session = RelaySession::new(url.clone(), self.verify_tls);
        let task = self.spawn_connection(session.clone());

        self.relays.lock().insert(url.clone(), ManagedRelay { session: session.clone(), task: Mutex::new(Some(task)) });
        self.schedule_replay(session);
    }

    fn spawn_connection(self: &Arc<Self>, session: Arc<RelaySession>) -> JoinHandle<()> {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = session.clone().connect_and_serve(pool).await {
                warn!("[manager] session {} ended: {e}", session.url);
            }
        })
    }

    /// The websocket handshake hasn't necessarily finished by the time a
    /// session's task is spawned, so cached subscriptions can't be
    /// replayed immediately — `publish()` would just drop them. Poll for
    /// `Connected` briefly instead of wiring a connect-completion
    /// callback back into the manager.
    fn schedule_replay(self: &Arc<Self>, session: Arc<RelaySession>) {
        let manager = self.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                if session.is_connected() {
                    manager.replay_subscriptions(&session);
                    return;
                }
                if !session.should_reconnect() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });
    }

    fn replay_subscriptions(&self, session: &Arc<RelaySession>) {
        let subscriptions = self.subscriptions.lock();
        for (sub_id, cached) in subscriptions.iter() {
            let frame = Frame::Req { sub_id: sub_id.clone(), filters: cached.filters.clone() };
            session.publish(frame.encode());
        }
    }

    /// Unregister and disconnect a relay. Idempotent.
    pub fn remove_relay(&self, url: &str) {
        if let Some(relay) = self.relays.lock().remove(url) {
            relay.session.close();
            if let Some(task) = relay.task.lock().take() {
                task.abort();
            }
        }
    }

    pub fn remove_relays(&self, urls: &[String]) {
        for url in urls {
            self.remove_relay(url);
        }
    }

    /// Open (or replace) a subscription: cache the filters and broadcast
    /// the `REQ` to every live relay.
    pub fn add_subscription(&self, sub_id: impl Into<String>, filters: Vec<Filter>) {
        let sub_id = sub_id.into();
        self.subscriptions.lock().insert(sub_id.clone(), CachedSubscription { filters: filters.clone() });
        let frame = Frame::Req { sub_id, filters };
        self.broadcast(&frame.encode());
    }

    /// Close a subscription: drop the cache entry and broadcast `CLOSE`.
    pub fn close_subscription(&self, sub_id: &str) {
        self.subscriptions.lock().remove(sub_id);
        let frame = Frame::Close { sub_id: sub_id.to_string() };
        self.broadcast(&frame.encode());
    }

    pub fn close_all_subscriptions(&self, sub_ids: &[String]) {
        for sub_id in sub_ids {
            self.close_subscription(sub_id);
        }
    }

    /// Publish a client-authored `EVENT` to every live relay verbatim.
    pub fn publish_message(&self, raw_frame: &str) {
        self.broadcast(raw_frame);
    }

    fn broadcast(&self, raw_frame: &str) {
        for relay in self.relays.lock().values() {
            relay.session.publish(raw_frame.to_string());
        }
    }

    pub fn relay_urls(&self) -> Vec<String> {
        self.relays.lock().keys().cloned().collect()
    }

    pub fn session(&self, url: &str) -> Option<Arc<RelaySession>> {
        self.relays.lock().get(url).map(|r| r.session.clone())
    }

    /// One restart sweep: any relay not `Connected` whose backoff window
    /// has elapsed gets a fresh connection task. `error_counter`/
    /// `error_list` carry forward across restarts (they live on the
    /// `RelaySession`, which is not recreated).
    pub fn check_and_restart_relays(self: &Arc<Self>) {
        let due_for_restart: Vec<Arc<RelaySession>> = {
            let relays = self.relays.lock();
            relays
                .values()
                .filter_map(|relay| {
                    let session = &relay.session;
                    if !session.should_reconnect() {
                        return None;
                    }
                    // A session whose task is still running owns its own
                    // connect-or-serve lifecycle; only a finished task
                    // (clean close or error) is eligible for a restart,
                    // otherwise a slow sweep would spawn a second
                    // connection on top of one still in flight.
                    let task_finished = match relay.task.lock().as_ref() {
                        Some(handle) => handle.is_finished(),
                        None => true,
                    };
                    if !task_finished {
                        return None;
                    }
                    let backoff = restart_backoff(session.error_counter());
                    match session.last_error_at() {
                        Some(last) if last.elapsed() < backoff => None,
                        _ => Some(session.clone()),
                    }
                })
                .collect()
        };

        for session in due_for_restart {
            info!("[manager] restarting session {}", session.url);
            let task = self.spawn_connection(session.clone());
            if let Some(relay) = self.relays.lock().get(&session.url) {
                *relay.task.lock() = Some(task);
            }
            self.schedule_replay(session);
        }
    }

    /// Spawn the supervisor loop. Runs for the lifetime of the process;
    /// errors inside one sweep never abort the loop (ported from the
    /// teacher's supervised-spawn idiom).
    pub fn spawn_supervisor(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SUPERVISOR_INTERVAL).await;
                manager.check_and_restart_relays();
            }
        })
    }
}
