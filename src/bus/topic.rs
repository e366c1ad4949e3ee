//! topic.rs
//! Latest-value topic: one slot holding the most recent complete message plus
//! a monotonically increasing sequence number.
//!
//! - `publish()` swaps the value under a short lock, bumps the sequence, then
//!   wakes waiters with non-blocking `try_send` (bounded time, RT-safe).
//! - `read()` clones the value out under the same lock, so readers never see a
//!   torn message; intermediate publishes between two reads are simply lost.

use crossbeam::channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use super::message::Message;
use crate::error::BusError;

struct Slot<T> {
    value: T,
    seq: u64,
}

pub struct Topic<T: Message> {
    name: &'static str,
    slot: Mutex<Slot<T>>,
    // Mirror of slot.seq so update_available() never takes the lock.
    seq: AtomicU64,
    waiters: Mutex<Vec<Sender<()>>>,
}

impl<T: Message> Topic<T> {
    pub fn new(name: &'static str) -> Self {
        Topic {
            name,
            slot: Mutex::new(Slot { value: T::default(), seq: 0 }),
            seq: AtomicU64::new(0),
            waiters: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Replace the stored value; returns the new sequence number.
    pub fn publish(&self, msg: T) -> Result<u64, BusError> {
        if !msg.all_finite() {
            return Err(BusError::NonFinite(self.name));
        }

        let (seq, old) = {
            let mut slot = self.slot.lock();
            let old = std::mem::replace(&mut slot.value, msg);
            slot.seq += 1;
            self.seq.store(slot.seq, Ordering::Release);
            (slot.seq, old)
        };
        // previous value is dropped outside the lock
        drop(old);

        self.notify();
        Ok(seq)
    }

    /// Copy of the latest value together with its sequence number.
    pub fn read(&self) -> (T, u64) {
        let slot = self.slot.lock();
        (slot.value.clone(), slot.seq)
    }

    #[inline]
    pub fn sequence(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }

    /// Register a wake-up channel signalled on every publish.
    /// Capacity 1: pending wake-ups coalesce, matching latest-value semantics.
    pub fn register_waiter(&self) -> Receiver<()> {
        let (tx, rx) = bounded(1);
        self.waiters.lock().push(tx);
        rx
    }

    pub fn waiter_count(&self) -> usize {
        self.waiters.lock().len()
    }

    fn notify(&self) {
        let mut waiters = self.waiters.lock();
        waiters.retain(|tx| !matches!(tx.try_send(()), Err(TrySendError::Disconnected(_))));
    }
}
