//! Virtual time for simulations.
//!
//! One `VirtualClock` is shared by every room in a run. Cloning yields another handle to
//! the same clock and timer queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex, MutexGuard};

use fv_core::{Real, RoomId, Timestamp};
use fv_engine::{Clock, Scheduler, TimerToken};

/// A wake-up that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct DueTimer {
    pub due: Timestamp,
    pub room: RoomId,
    pub token: TimerToken,
}

#[derive(Debug)]
struct Pending {
    due: f64,
    seq: u64,
    room: RoomId,
    token: TimerToken,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Min-heap on (due, seq).
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Default)]
struct Inner {
    now: f64,
    seq: u64,
    timers: BinaryHeap<Pending>,
}

#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    inner: Arc<Mutex<Inner>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_time(&self, t: Timestamp) {
        self.lock().now = t.as_secs();
    }

    pub fn pending(&self) -> usize {
        self.lock().timers.len()
    }

    /// Earliest pending due time.
    pub fn next_due(&self) -> Option<Timestamp> {
        self.lock().timers.peek().map(|p| Timestamp::from_secs(p.due))
    }

    /// Remove and return the earliest timer due at or before `until`.
    ///
    /// Timers scheduled while handling a popped one are seen by the next call.
    pub fn pop_due(&self, until: Timestamp) -> Option<DueTimer> {
        let mut inner = self.lock();
        if inner.timers.peek()?.due > until.as_secs() {
            return None;
        }
        let p = inner.timers.pop()?;
        Some(DueTimer {
            due: Timestamp::from_secs(p.due),
            room: p.room,
            token: p.token,
        })
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(self.lock().now)
    }
}

impl Scheduler for VirtualClock {
    fn call_after(&mut self, room: &RoomId, delay_s: Real, token: TimerToken) {
        let mut inner = self.lock();
        let due = inner.now + delay_s.max(0.0);
        inner.seq += 1;
        let seq = inner.seq;
        inner.timers.push(Pending {
            due,
            seq,
            room: room.clone(),
            token,
        });
    }

    fn cancel(&mut self, room: &RoomId, token: TimerToken) {
        self.lock()
            .timers
            .retain(|p| !(&p.room == room && p.token == token));
    }
}
