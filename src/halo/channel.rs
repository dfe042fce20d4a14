use crate::prelude::*;
use ghostflow_core::util::{Future, Promise};
use std::collections::BTreeMap;
use std::fmt;

enum Slot<T> {
    /// Arrived before anyone asked for it.
    Stored(T),
    /// Asked for before it arrived.
    Waiting(Promise<T>),
    /// Handed to the consumer.
    Consumed,
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Stored(_) => write!(f, "Stored(_)"),
            Slot::Waiting(_) => write!(f, "Waiting(_)"),
            Slot::Consumed => write!(f, "Consumed"),
        }
    }
}

#[derive(Debug)]
struct State<T> {
    slots: BTreeMap<u64, Slot<T>>,
    /// Every step below this one is considered consumed and has been forgotten.
    horizon: u64,
    latest_consumed: Option<u64>,
}

/// Rendezvous between the transport delivering buffers and the consumer of one halo
/// direction, keyed by step.
///
/// Every step carries at most one buffer. The producer calls [`RecvChannel::deposit`], the
/// consumer calls [`RecvChannel::expect`]; the two may happen in either order and from
/// different threads. Consumed steps are remembered for `window` steps behind the most
/// recently consumed one, after which they are dropped. Steps only move forward, so anything
/// below that horizon is treated as consumed.
///
/// Violating the protocol (depositing twice, expecting twice, or touching a consumed step)
/// is a bug in the caller and panics.
pub struct RecvChannel<T> {
    window: u64,
    state: Mutex<State<T>>,
}

impl<T> fmt::Debug for RecvChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();

        f.debug_struct("RecvChannel")
            .field("window", &self.window)
            .field("horizon", &state.horizon)
            .field("slots", &state.slots)
            .finish()
    }
}

impl<T> RecvChannel<T> {
    pub fn new(window: u64) -> Self {
        Self {
            window,
            state: Mutex::new(State {
                slots: BTreeMap::new(),
                horizon: 0,
                latest_consumed: None,
            }),
        }
    }

    /// Registers interest in the buffer of `step`. The returned future is ready if the buffer
    /// has already arrived.
    ///
    /// # Panics
    /// Panics if `step` was already expected or consumed.
    pub fn expect(&self, step: u64) -> Future<T> {
        let mut state = self.state.lock();

        match state.slots.remove(&step) {
            None if step < state.horizon => panic!(
                "step {} was consumed and forgotten (horizon {})",
                step, state.horizon
            ),
            None => {
                let (promise, future) = Promise::new();
                state.slots.insert(step, Slot::Waiting(promise));
                future
            }
            Some(Slot::Stored(buffer)) => {
                state.slots.insert(step, Slot::Consumed);
                self.consumed(&mut state, step);
                Future::ready(buffer)
            }
            Some(other) => panic!("step {} expected twice (slot is {:?})", step, other),
        }
    }

    /// Delivers the buffer of `step`, waking the consumer if it is already waiting.
    ///
    /// # Panics
    /// Panics if a buffer for `step` was already delivered.
    pub fn deposit(&self, step: u64, buffer: T) {
        let mut state = self.state.lock();

        let promise = match state.slots.remove(&step) {
            None if step < state.horizon => panic!(
                "deposit for step {} which was consumed and forgotten (horizon {})",
                step, state.horizon
            ),
            None => {
                state.slots.insert(step, Slot::Stored(buffer));
                return;
            }
            Some(Slot::Waiting(promise)) => {
                state.slots.insert(step, Slot::Consumed);
                self.consumed(&mut state, step);
                promise
            }
            Some(other) => panic!("step {} deposited twice (slot is {:?})", step, other),
        };

        // Completing may run callbacks of the consumer, which must not see the lock held.
        drop(state);
        promise.complete(buffer);
    }

    /// Steps whose buffer arrived but which nobody has asked for yet.
    pub fn pending(&self) -> Vec<u64> {
        let state = self.state.lock();

        state
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Stored(_)))
            .map(|(&step, _)| step)
            .collect()
    }

    /// Number of steps currently tracked (in any state).
    pub fn num_slots(&self) -> usize {
        self.state.lock().slots.len()
    }

    fn consumed(&self, state: &mut State<T>, step: u64) {
        let latest = match state.latest_consumed {
            Some(s) if s >= step => s,
            _ => step,
        };

        state.latest_consumed = Some(latest);

        let horizon = latest.saturating_sub(self.window);
        if horizon <= state.horizon {
            return;
        }

        // Split off everything at or above the new horizon, keep only the non-consumed slots
        // below it (late producers or consumers of old steps).
        let newer = state.slots.split_off(&horizon);
        let older = replace(&mut state.slots, newer);

        for (step, slot) in older {
            match slot {
                Slot::Consumed => {}
                other => {
                    warn!("step {} is {:?} but fell behind the receive window", step, other);
                    state.slots.insert(step, other);
                }
            }
        }

        trace!("receive horizon moved from {} to {}", state.horizon, horizon);
        state.horizon = horizon;
    }
}
