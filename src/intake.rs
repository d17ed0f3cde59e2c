// Relaymux Intake — process-wide structures keyed by *rewritten*
// subscription id, decoupling relay read loops from per-client websocket
// I/O so a slow client cannot stall a relay.
//
// Re-architected per the design notes: a single `Intake` value owned by
// the process (passed explicitly to the Manager and to every Router),
// not class-level globals. The Message Pool's output is drained into it
// by an explicit pump task rather than a callback registration step.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;

use crate::event::Event;
use crate::pool::MessagePool;

#[derive(Debug, Clone)]
pub struct IntakeEvent {
    pub event: Event,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct IntakeNotice {
    pub content: String,
    pub url: String,
}

#[derive(Default)]
pub struct Intake {
    received_subscription_events: Mutex<HashMap<String, VecDeque<IntakeEvent>>>,
    received_subscription_eosenotices: Mutex<HashMap<String, ()>>,
    received_subscription_notices: Mutex<VecDeque<IntakeNotice>>,
}

impl Intake {
    pub fn new() -> Self {
        Self::default()
    }

    fn append_event(&self, subscription_id: &str, event: Event, url: String) {
        self.received_subscription_events
            .lock()
            .entry(subscription_id.to_string())
            .or_default()
            .push_back(IntakeEvent { event, url });
    }

    fn mark_eose(&self, subscription_id: &str) {
        self.received_subscription_eosenotices.lock().insert(subscription_id.to_string(), ());
    }

    fn append_notice(&self, content: String, url: String) {
        self.received_subscription_notices.lock().push_back(IntakeNotice { content, url });
    }

    /// Drain every buffered event for a rewritten subscription id. Used
    /// by a Router's outbound pump; atomic with respect to concurrent
    /// appends.
    pub fn drain_events(&self, subscription_id: &str) -> Vec<IntakeEvent> {
        let mut map = self.received_subscription_events.lock();
        match map.get_mut(subscription_id) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }

    /// Take and clear the pending EOSE flag for a rewritten subscription
    /// id, if one is pending.
    pub fn take_eose(&self, subscription_id: &str) -> bool {
        self.received_subscription_eosenotices.lock().remove(subscription_id).is_some()
    }

    /// Drain all pending notices (not client-attributable).
    pub fn drain_notices(&self) -> Vec<IntakeNotice> {
        let mut notices = self.received_subscription_notices.lock();
        notices.drain(..).collect()
    }

    /// Drop any buffered state for a rewritten subscription id. Called
    /// when a Router closes a subscription it owns so buffers don't
    /// accumulate for ids nobody will ever drain again.
    pub fn forget(&self, subscription_id: &str) {
        self.received_subscription_events.lock().remove(subscription_id);
        self.received_subscription_eosenotices.lock().remove(subscription_id);
    }
}

/// Continuously drains the Message Pool into the Intake's per-subscription
/// buffers. One instance runs for the lifetime of the process.
pub async fn run_intake_pump(pool: Arc<MessagePool>, intake: Arc<Intake>) {
    loop {
        let mut drained_any = false;

        while let Some(msg) = pool.pop_event() {
            intake.append_event(&msg.subscription_id, msg.event, msg.url);
            drained_any = true;
        }
        while let Some(msg) = pool.pop_eose() {
            intake.mark_eose(&msg.subscription_id);
            drained_any = true;
        }
        while let Some(msg) = pool.pop_notice() {
            debug!("[intake] notice from {}: {}", msg.url, msg.content);
            intake.append_notice(msg.content, msg.url);
            drained_any = true;
        }

        if !drained_any {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(id: &str) -> Event {
        Event {
            id: id.into(),
            pubkey: "ab".repeat(32),
            created_at: 1,
            kind: 1,
            tags: vec![],
            content: String::new(),
            sig: "00".repeat(64),
        }
    }

    #[test]
    fn drain_events_is_empty_for_unknown_subscription() {
        let intake = Intake::new();
        assert!(intake.drain_events("unknown").is_empty());
    }

    #[test]
    fn append_then_drain_returns_fifo_order() {
        let intake = Intake::new();
        intake.append_event("sub-a", sample_event("e1"), "wss://r1".into());
        intake.append_event("sub-a", sample_event("e2"), "wss://r1".into());
        let drained = intake.drain_events("sub-a");
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].event.id, "e1");
        assert_eq!(drained[1].event.id, "e2");
        assert!(intake.drain_events("sub-a").is_empty());
    }

    #[test]
    fn eose_is_take_once() {
        let intake = Intake::new();
        intake.mark_eose("sub-a");
        assert!(intake.take_eose("sub-a"));
        assert!(!intake.take_eose("sub-a"));
    }

    #[test]
    fn forget_clears_event_and_eose_state() {
        let intake = Intake::new();
        intake.append_event("sub-a", sample_event("e1"), "wss://r1".into());
        intake.mark_eose("sub-a");
        intake.forget("sub-a");
        assert!(intake.drain_events("sub-a").is_empty());
        assert!(!intake.take_eose("sub-a"));
    }
}
