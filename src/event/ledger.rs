//! Retained handles of submitted events, for bulk and targeted cancellation.

use crate::content::{LaneId, TrackId};

use super::{EventHandle, PrecisionEventQueue, ScheduledEvent};

/// Who a scheduled event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventOwner {
    Track(TrackId),
    Lane(LaneId),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    handle: EventHandle,
    /// Slot time of the event, see [`ScheduledEvent::slot`].
    slot: f64,
    owner: EventOwner,
}

/// Handles of events submitted but not yet known to have fired.
#[derive(Debug, Default)]
pub struct HandleLedger {
    entries: Vec<Entry>,
}

impl HandleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, handle: EventHandle, slot: f64, owner: EventOwner) {
        self.entries.push(Entry {
            handle,
            slot,
            owner,
        });
    }

    /// Forget handles the queue no longer holds (fired or cancelled elsewhere).
    pub fn prune_fired(&mut self, queue: &dyn PrecisionEventQueue) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| queue.is_pending(e.handle));
        before - self.entries.len()
    }

    /// Cancel every retained handle and empty the ledger.
    pub fn cancel_all(&mut self, queue: &mut dyn PrecisionEventQueue) -> usize {
        let mut cancelled = 0;
        for entry in self.entries.drain(..) {
            if queue.cancel(entry.handle) {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Cancel handles whose slot is at or after `from`, whoever owns them.
    ///
    /// A swung event whose slot has passed stays queued even if it fires
    /// after `from`: content from `from` on no longer covers its slot.
    pub fn cancel_from(&mut self, from: f64, queue: &mut dyn PrecisionEventQueue) -> usize {
        self.cancel_where(queue, |e| e.slot >= from)
    }

    /// Cancel handles belonging to `owner` with a slot at or after `from`.
    pub fn cancel_owner_from(
        &mut self,
        owner: EventOwner,
        from: f64,
        queue: &mut dyn PrecisionEventQueue,
    ) -> usize {
        self.cancel_where(queue, |e| e.owner == owner && e.slot >= from)
    }

    fn cancel_where<F: Fn(&Entry) -> bool>(
        &mut self,
        queue: &mut dyn PrecisionEventQueue,
        matches: F,
    ) -> usize {
        let mut cancelled = 0;
        self.entries.retain(|e| {
            if matches(e) {
                if queue.cancel(e.handle) {
                    cancelled += 1;
                }
                false
            } else {
                true
            }
        });
        cancelled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Submits events to a queue and files their handles in a ledger.
pub struct EventSink<'a> {
    queue: &'a mut dyn PrecisionEventQueue,
    ledger: &'a mut HandleLedger,
    submitted: usize,
}

impl<'a> EventSink<'a> {
    pub fn new(queue: &'a mut dyn PrecisionEventQueue, ledger: &'a mut HandleLedger) -> Self {
        Self {
            queue,
            ledger,
            submitted: 0,
        }
    }

    pub fn submit(&mut self, event: ScheduledEvent) -> EventHandle {
        let slot = event.slot;
        let owner = event.owner();
        let handle = self.queue.schedule(event);
        self.ledger.record(handle, slot, owner);
        self.submitted += 1;
        handle
    }

    /// Cancel pending events of `owner` from `time` on.
    pub fn cancel_owner_from(&mut self, owner: EventOwner, time: f64) -> usize {
        self.ledger.cancel_owner_from(owner, time, self.queue)
    }

    /// Events submitted through this sink.
    pub fn submitted(&self) -> usize {
        self.submitted
    }
}
