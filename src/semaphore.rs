//! Binary and timeline semaphore state.
//!
//! All transitions here are synchronous bookkeeping: a "signal" is the
//! signal operation becoming known to the validator, never actual hardware
//! completion. Wait-before-signal is the normal case, a wait issued for a
//! value nobody signaled yet parks in `pending_waits` until the raising
//! signal arrives.

use std::collections::VecDeque;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
    arena::gen::{arena_key, GenArena},
    batch::BatchKey,
    flags::StageMask,
};

arena_key! { pub SemaphoreId }

/// The device's semaphore registry. Each semaphore carries its own mutex,
/// submission threads meet on individual semaphores while the registry
/// itself is only write-locked for create and teardown.
pub(crate) type SemaphoreRegistry = GenArena<SemaphoreId, Mutex<SemaphoreState>>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SemaphoreKind {
    Binary,
    Timeline,
}

/// Where a signal came from. Host signals execute with no preceding device
/// work, resolving against one creates the edge but imports nothing.
#[derive(Clone, Copy, Debug)]
pub(crate) enum SignalOrigin {
    Batch { batch: BatchKey, stages: StageMask },
    Host,
}

/// One effective (counter raising) signal. Kept for the lifetime of the
/// semaphore so any later wait can find the signal that first reached its
/// target value.
#[derive(Clone, Copy)]
struct SignalRecord {
    counter: u64,
    origin: SignalOrigin,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingWait {
    pub(crate) value: u64,
    pub(crate) batch: BatchKey,
    pub(crate) stages: StageMask,
}

pub(crate) enum WaitOutcome {
    /// The wait is resolved now. `None` means there is nothing to order
    /// against: the target was the creation value, or the signal came from
    /// the host.
    Resolved(Option<SignalOrigin>),
    /// Parked until a signal reaches the target value.
    Pending,
}

/// What one signal operation unblocked.
#[derive(Default)]
pub(crate) struct SignalEffects {
    pub(crate) resolved: SmallVec<[(PendingWait, SignalOrigin); 2]>,
    /// Host waits whose target the signal reached, each carries the origin
    /// the host is now known to have observed.
    pub(crate) host_unblocked: SmallVec<[SignalOrigin; 1]>,
}

pub(crate) struct SemaphoreState {
    kind: SemaphoreKind,
    initial: u64,
    counter: u64,
    signals: Vec<SignalRecord>,
    pending_waits: Vec<PendingWait>,
    pending_host_waits: Vec<u64>,
    binary_signals: VecDeque<SignalOrigin>,
    binary_waits: VecDeque<(BatchKey, StageMask)>,
}

impl SemaphoreState {
    pub(crate) fn binary() -> Self {
        Self::new(SemaphoreKind::Binary, 0)
    }
    pub(crate) fn timeline(initial: u64) -> Self {
        Self::new(SemaphoreKind::Timeline, initial)
    }
    fn new(kind: SemaphoreKind, initial: u64) -> Self {
        Self {
            kind,
            initial,
            counter: initial,
            signals: Vec::new(),
            pending_waits: Vec::new(),
            pending_host_waits: Vec::new(),
            binary_signals: VecDeque::new(),
            binary_waits: VecDeque::new(),
        }
    }
    pub(crate) fn kind(&self) -> SemaphoreKind {
        self.kind
    }
    pub(crate) fn counter(&self) -> u64 {
        self.counter
    }

    /// The signal that first set the counter to at least `value`. Only
    /// valid when `initial < value <= counter`.
    fn resolving_signal(&self, value: u64) -> SignalOrigin {
        let index = self.signals.partition_point(|s| s.counter < value);
        self.signals
            .get(index)
            .unwrap_or_else(|| panic!("counter {} >= {value} without a raising signal", self.counter))
            .origin
    }

    /// A device-side wait submitted in a batch. `value` is `None` for
    /// binary semaphores.
    pub(crate) fn device_wait(
        &mut self,
        value: Option<u64>,
        batch: BatchKey,
        stages: StageMask,
    ) -> WaitOutcome {
        match (self.kind, value) {
            (SemaphoreKind::Binary, None) => {
                if let Some(origin) = self.binary_signals.pop_front() {
                    WaitOutcome::Resolved(Some(origin))
                } else {
                    self.binary_waits.push_back((batch, stages));
                    WaitOutcome::Pending
                }
            }
            (SemaphoreKind::Timeline, Some(value)) => {
                if value <= self.initial {
                    // the creation value needs no signal, and a later signal
                    // merely repeating it synchronizes nothing
                    WaitOutcome::Resolved(None)
                } else if self.counter >= value {
                    WaitOutcome::Resolved(Some(self.resolving_signal(value)))
                } else {
                    self.pending_waits.push(PendingWait {
                        value,
                        batch,
                        stages,
                    });
                    WaitOutcome::Pending
                }
            }
            (SemaphoreKind::Binary, Some(_)) => {
                panic!("binary semaphore waited with a timeline value")
            }
            (SemaphoreKind::Timeline, None) => {
                panic!("timeline semaphore waited without a value")
            }
        }
    }

    /// A signal operation from a batch or the host. Returns everything it
    /// resolves; a timeline signal that does not raise the counter resolves
    /// nothing.
    pub(crate) fn signal(&mut self, value: Option<u64>, origin: SignalOrigin) -> SignalEffects {
        let mut effects = SignalEffects::default();
        match (self.kind, value) {
            (SemaphoreKind::Binary, None) => {
                if let Some((batch, stages)) = self.binary_waits.pop_front() {
                    effects.resolved.push((
                        PendingWait {
                            value: 0,
                            batch,
                            stages,
                        },
                        origin,
                    ));
                } else {
                    self.binary_signals.push_back(origin);
                }
            }
            (SemaphoreKind::Timeline, Some(value)) => {
                if value > self.counter {
                    self.counter = value;
                    self.signals.push(SignalRecord {
                        counter: value,
                        origin,
                    });
                    self.pending_waits.retain(|wait| {
                        if wait.value <= value {
                            effects.resolved.push((*wait, origin));
                            false
                        } else {
                            true
                        }
                    });
                    self.pending_host_waits.retain(|&target| {
                        if target <= value {
                            effects.host_unblocked.push(origin);
                            false
                        } else {
                            true
                        }
                    });
                }
            }
            (SemaphoreKind::Binary, Some(_)) => {
                panic!("binary semaphore signaled with a timeline value")
            }
            (SemaphoreKind::Timeline, None) => {
                panic!("timeline semaphore signaled without a value")
            }
        }
        effects
    }

    /// A host-side wait. `Some` when the counter already reached the value,
    /// carrying the origin the host has then observed as complete, `None`
    /// when the wait parks.
    pub(crate) fn host_wait(&mut self, value: u64) -> Option<Option<SignalOrigin>> {
        assert!(
            self.kind == SemaphoreKind::Timeline,
            "host waits operate on timeline semaphores"
        );
        if value <= self.initial {
            Some(None)
        } else if self.counter >= value {
            Some(Some(self.resolving_signal(value)))
        } else {
            self.pending_host_waits.push(value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::gen::Key;

    fn batch(i: u32) -> BatchKey {
        BatchKey::new(i, 1)
    }
    fn origin(i: u32) -> SignalOrigin {
        SignalOrigin::Batch {
            batch: batch(i),
            stages: StageMask::ALL_COMMANDS,
        }
    }

    #[test]
    fn test_initial_value_wait_is_free() {
        let mut sem = SemaphoreState::timeline(0);
        assert!(matches!(
            sem.device_wait(Some(0), batch(0), StageMask::ALL_COMMANDS),
            WaitOutcome::Resolved(None)
        ));
        // a later signal repeating the initial value resolves nothing
        let effects = sem.signal(Some(0), origin(1));
        assert!(effects.resolved.is_empty());
        assert_eq!(sem.counter(), 0);
    }

    #[test]
    fn test_wait_before_signal() {
        let mut sem = SemaphoreState::timeline(0);
        assert!(matches!(
            sem.device_wait(Some(1), batch(0), StageMask::ALL_COMMANDS),
            WaitOutcome::Pending
        ));
        let effects = sem.signal(Some(1), origin(1));
        assert_eq!(effects.resolved.len(), 1);
        assert_eq!(effects.resolved[0].0.batch, batch(0));
    }

    #[test]
    fn test_one_signal_resolves_multiple_waits() {
        let mut sem = SemaphoreState::timeline(0);
        sem.device_wait(Some(1), batch(0), StageMask::ALL_COMMANDS);
        sem.device_wait(Some(1), batch(1), StageMask::ALL_COMMANDS);
        let effects = sem.signal(Some(1), origin(2));
        assert_eq!(effects.resolved.len(), 2);
    }

    #[test]
    fn test_wait_resolves_against_first_reaching_signal() {
        let mut sem = SemaphoreState::timeline(0);
        sem.signal(Some(1), origin(1));
        sem.signal(Some(5), origin(2));
        // value 3 was first reached by the signal to 5
        let WaitOutcome::Resolved(Some(SignalOrigin::Batch { batch: b, .. })) =
            sem.device_wait(Some(3), batch(9), StageMask::ALL_COMMANDS)
        else {
            panic!("expected an immediately resolved wait");
        };
        assert_eq!(b, batch(2));
    }

    #[test]
    fn test_non_raising_signal_makes_no_edges() {
        let mut sem = SemaphoreState::timeline(0);
        sem.signal(Some(5), origin(1));
        let effects = sem.signal(Some(3), origin(2));
        assert!(effects.resolved.is_empty());
        assert_eq!(sem.counter(), 5);
        // and the old signal still resolves new waits below its value
        let WaitOutcome::Resolved(Some(SignalOrigin::Batch { batch: b, .. })) =
            sem.device_wait(Some(2), batch(9), StageMask::ALL_COMMANDS)
        else {
            panic!("expected an immediately resolved wait");
        };
        assert_eq!(b, batch(1));
    }

    #[test]
    fn test_binary_pairing() {
        let mut sem = SemaphoreState::binary();
        assert!(matches!(
            sem.device_wait(None, batch(0), StageMask::ALL_COMMANDS),
            WaitOutcome::Pending
        ));
        let effects = sem.signal(None, origin(1));
        assert_eq!(effects.resolved.len(), 1);

        // signal first, wait consumes it
        sem.signal(None, origin(2));
        assert!(matches!(
            sem.device_wait(None, batch(3), StageMask::ALL_COMMANDS),
            WaitOutcome::Resolved(Some(_))
        ));
    }

    #[test]
    fn test_host_wait_tracks_reaching_signal() {
        let mut sem = SemaphoreState::timeline(0);
        assert!(sem.host_wait(1).is_none());
        let effects = sem.signal(Some(1), origin(1));
        assert_eq!(effects.host_unblocked.len(), 1);
        assert!(matches!(sem.host_wait(1), Some(Some(_))));
    }
}
