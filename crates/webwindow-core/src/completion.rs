use std::mem;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Drives the UI event queue one step while a completion is outstanding.
pub trait Pump {
    fn pump_once(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("completion was dropped before a value was produced")]
pub struct Abandoned;

enum Slot<T> {
    Pending,
    Ready(T),
    Taken,
    Abandoned,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    settled: Condvar,
}

/// Producing half of a one-shot completion. Dropping it unsettled abandons the completion.
pub struct Completer<T> {
    shared: Arc<Shared<T>>,
}

/// Consuming half of a one-shot completion.
#[must_use]
pub struct Completion<T> {
    shared: Arc<Shared<T>>,
}

pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        settled: Condvar::new(),
    });
    (
        Completer {
            shared: Arc::clone(&shared),
        },
        Completion { shared },
    )
}

impl<T> Completer<T> {
    pub fn complete(self, value: T) {
        self.settle(Slot::Ready(value));
    }

    fn settle(&self, next: Slot<T>) {
        let mut slot = self.shared.slot.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = next;
            drop(slot);
            self.shared.settled.notify_all();
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        self.settle(Slot::Abandoned);
    }
}

impl<T> Completion<T> {
    pub fn ready(value: T) -> Self {
        let (completer, completion) = completion();
        completer.complete(value);
        completion
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.shared.slot.lock(), Slot::Pending)
    }

    pub fn try_take(&self) -> Option<Result<T, Abandoned>> {
        let mut slot = self.shared.slot.lock();
        match mem::replace(&mut *slot, Slot::Taken) {
            Slot::Pending => {
                *slot = Slot::Pending;
                None
            }
            Slot::Ready(value) => Some(Ok(value)),
            Slot::Taken | Slot::Abandoned => Some(Err(Abandoned)),
        }
    }

    /// Parks the calling thread until the completion settles. Never call this on the UI thread:
    /// the value is usually produced by an event that thread has yet to dequeue.
    pub fn wait(self) -> Result<T, Abandoned> {
        let mut slot = self.shared.slot.lock();
        loop {
            match mem::replace(&mut *slot, Slot::Taken) {
                Slot::Pending => {
                    *slot = Slot::Pending;
                    self.shared.settled.wait(&mut slot);
                }
                Slot::Ready(value) => return Ok(value),
                Slot::Taken | Slot::Abandoned => return Err(Abandoned),
            }
        }
    }

    /// Keeps pumping UI events until the completion settles. There is no timeout.
    pub fn block_on(self, pump: &mut dyn Pump) -> Result<T, Abandoned> {
        loop {
            if let Some(outcome) = self.try_take() {
                return outcome;
            }
            pump.pump_once();
        }
    }
}
