//! Precision event queue: time-ordered pending events with handle cancellation.
//!
//! Events are keyed by (time in nanoseconds, handle) so simultaneous events
//! keep submission order. Cancellation looks the key up through a handle index
//! and removes it in O(log n).

use std::collections::{BTreeMap, HashMap};

use log::warn;

use super::{EventHandle, ScheduledEvent};
use crate::target::TargetRegistry;

/// The sample-accurate scheduling primitive the engine submits to.
pub trait PrecisionEventQueue {
    /// Submit an event for firing at `event.time`.
    fn schedule(&mut self, event: ScheduledEvent) -> EventHandle;

    /// Withdraw a pending event. Returns `false` if it already fired or was cancelled.
    fn cancel(&mut self, handle: EventHandle) -> bool;

    /// Whether `handle` is still waiting to fire.
    fn is_pending(&self, handle: EventHandle) -> bool;

    /// Number of events still pending.
    fn pending_count(&self) -> usize;
}

type Key = (u64, u64);

fn time_key(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1e9).round() as u64
}

/// In-memory queue, fired by whoever owns the audio clock.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: BTreeMap<Key, ScheduledEvent>,
    index: HashMap<EventHandle, Key>,
    next_handle: u64,
    fired: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every event due at or before `until`, in time order.
    pub fn drain_due(&mut self, until: f64) -> Vec<ScheduledEvent> {
        let limit = time_key(until);
        let mut due = Vec::new();
        while let Some(entry) = self.events.first_entry() {
            if entry.key().0 > limit {
                break;
            }
            let ((_, handle), event) = entry.remove_entry();
            self.index.remove(&EventHandle(handle));
            due.push(event);
        }
        self.fired += due.len() as u64;
        due
    }

    /// Fire every event due at or before `until` into `registry`.
    ///
    /// An event whose target has disappeared is logged and dropped; the rest
    /// still fire. Returns the number of events delivered.
    pub fn fire_due(&mut self, until: f64, registry: &mut dyn TargetRegistry) -> usize {
        let mut delivered = 0;
        for event in self.drain_due(until) {
            match event.dispatch(registry) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("dropping event at {:.4}s: {e}", event.time),
            }
        }
        delivered
    }

    /// Pending events in firing order.
    pub fn pending(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.events.values()
    }

    /// Time of the earliest pending event.
    pub fn next_time(&self) -> Option<f64> {
        self.events.values().next().map(|e| e.time)
    }

    /// Total events drained since creation.
    pub fn fired_count(&self) -> u64 {
        self.fired
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.index.clear();
    }
}

impl PrecisionEventQueue for EventQueue {
    fn schedule(&mut self, event: ScheduledEvent) -> EventHandle {
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;
        let key = (time_key(event.time), handle.0);
        self.events.insert(key, event);
        self.index.insert(handle, key);
        handle
    }

    fn cancel(&mut self, handle: EventHandle) -> bool {
        match self.index.remove(&handle) {
            Some(key) => self.events.remove(&key).is_some(),
            None => false,
        }
    }

    fn is_pending(&self, handle: EventHandle) -> bool {
        self.index.contains_key(&handle)
    }

    fn pending_count(&self) -> usize {
        self.events.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::TrackId;
    use crate::event::Trigger;
    use crate::target::{Rack, RecordingInstrument};
    use std::sync::{Arc, Mutex};

    fn hit(time: f64, note: u8) -> ScheduledEvent {
        ScheduledEvent::trigger(
            time,
            0.0,
            TrackId(0),
            "kit",
            Trigger::Note {
                note,
                velocity: 1.0,
                duration: 0.1,
            },
        )
    }

    #[test]
    fn empty_queue() {
        let q = EventQueue::new();
        assert_eq!(q.pending_count(), 0);
        assert!(q.next_time().is_none());
    }

    #[test]
    fn pending_in_time_order() {
        let mut q = EventQueue::new();
        q.schedule(hit(0.5, 38));
        q.schedule(hit(0.0, 36));
        q.schedule(hit(0.25, 42));
        let notes: Vec<f64> = q.pending().map(|e| e.time).collect();
        assert_eq!(notes, vec![0.0, 0.25, 0.5]);
    }

    #[test]
    fn simultaneous_events_keep_submission_order() {
        let mut q = EventQueue::new();
        q.schedule(hit(1.0, 36));
        q.schedule(hit(1.0, 38));
        let due = q.drain_due(1.0);
        assert_eq!(due.len(), 2);
        assert!(matches!(due[0].action, crate::event::EventAction::Trigger { trigger: Trigger::Note { note: 36, .. }, .. }));
    }

    #[test]
    fn cancel_removes_once() {
        let mut q = EventQueue::new();
        let a = q.schedule(hit(0.0, 36));
        q.schedule(hit(0.1, 38));
        assert!(q.cancel(a));
        assert!(!q.cancel(a));
        assert_eq!(q.pending_count(), 1);
    }

    #[test]
    fn drain_due_is_inclusive_and_stops_at_limit() {
        let mut q = EventQueue::new();
        q.schedule(hit(0.0, 36));
        q.schedule(hit(0.5, 38));
        q.schedule(hit(0.75, 42));
        assert_eq!(q.drain_due(0.5).len(), 2);
        assert_eq!(q.pending_count(), 1);
        assert_eq!(q.fired_count(), 2);
    }

    #[test]
    fn cancelled_handle_after_fire_is_noop() {
        let mut q = EventQueue::new();
        let h = q.schedule(hit(0.0, 36));
        q.drain_due(1.0);
        assert!(!q.cancel(h));
    }

    #[test]
    fn fire_due_dispatches_and_drops_missing_targets() {
        let kit = Arc::new(Mutex::new(RecordingInstrument::new()));
        let mut rack = Rack::new();
        rack.add_instrument("kit", Box::new(kit.clone()));

        let mut q = EventQueue::new();
        q.schedule(hit(0.0, 36));
        q.schedule(ScheduledEvent::trigger(
            0.1,
            0.0,
            TrackId(1),
            "ghost",
            Trigger::Note {
                note: 60,
                velocity: 1.0,
                duration: 0.1,
            },
        ));
        assert_eq!(q.fire_due(1.0, &mut rack), 1);
        assert_eq!(kit.lock().unwrap().notes().len(), 1);
        assert_eq!(q.pending_count(), 0);
    }
}
