//! The submission order model: per-queue batch order, happens-before edges
//! and the deferred resolution worklist.
//!
//! Within one queue batches are totally ordered by submission call order.
//! Across queues and the host, order exists only where a resolved semaphore
//! pairing or an observed fence created it. A batch "resolves" when its
//! last pending dependency is satisfied; a batch with no pending waits
//! resolves at submission time, a wait-before-signal batch when the raising
//! signal arrives. All cross-context hazard checking for a batch runs at
//! its resolution.

use crate::{
    arena::gen::{arena_key, GenArena},
    batch::{BatchKey, PendingImport, QueueBatchContext},
    context::{AccessContext, ImportEdge},
    flags::{OrderingPolicy, StageMask},
    hazard::{Hazard, HazardKind},
    record::CommandBufferSnapshot,
    semaphore::{SemaphoreId, SemaphoreRegistry, SignalOrigin, WaitOutcome},
    tracing::shim_macros::{trace, warn},
    util::constant_ahash_hashset,
};

arena_key! { pub QueueId, pub FenceId }

/// One semaphore wait attached to a submission. `value` is `None` for
/// binary semaphores; `stages` is the wait's second execution scope.
#[derive(Clone, Copy, Debug)]
pub struct SemaphoreWaitOp {
    pub semaphore: SemaphoreId,
    pub value: Option<u64>,
    pub stages: StageMask,
}

/// One semaphore signal attached to a submission. `stages` is the signal's
/// first execution scope, accesses outside it are not ordered by the
/// pairing.
#[derive(Clone, Copy, Debug)]
pub struct SemaphoreSignalOp {
    pub semaphore: SemaphoreId,
    pub value: Option<u64>,
    pub stages: StageMask,
}

pub(crate) struct QueueState {
    pub(crate) last_batch: Option<BatchKey>,
}

pub(crate) struct FenceState {
    pub(crate) batch: Option<BatchKey>,
}

pub(crate) struct SubmissionOrderModel {
    queues: GenArena<QueueId, QueueState>,
    batches: GenArena<BatchKey, QueueBatchContext>,
    fences: GenArena<FenceId, FenceState>,
    /// Bumped whenever the host observes completion; batches submitted
    /// afterwards are ordered after everything retired by that observation.
    epoch: u64,
}

impl SubmissionOrderModel {
    pub(crate) fn new() -> Self {
        Self {
            queues: GenArena::new(),
            batches: GenArena::new(),
            fences: GenArena::new(),
            epoch: 0,
        }
    }

    pub(crate) fn create_queue(&mut self) -> QueueId {
        self.queues.insert(QueueState { last_batch: None })
    }

    pub(crate) fn create_fence(&mut self) -> FenceId {
        self.fences.insert(FenceState { batch: None })
    }

    pub(crate) fn live_batches(&self) -> usize {
        self.batches.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn submit(
        &mut self,
        queue: QueueId,
        local: AccessContext,
        buffers: Vec<CommandBufferSnapshot>,
        waits: &[SemaphoreWaitOp],
        signals: &[SemaphoreSignalOp],
        fence: Option<FenceId>,
        semaphores: &SemaphoreRegistry,
        policy: &dyn OrderingPolicy,
        report: &mut dyn FnMut(Hazard),
    ) {
        assert!(self.queues.contains(queue), "submit to a destroyed queue");

        let mut batch = QueueBatchContext::new(queue, local, buffers, self.epoch);
        // merging detects conflicts across the batch's own command buffers
        batch.merge_command_buffers(policy, report);
        let key = self.batches.insert(batch);

        if let Some(fence) = fence {
            self.fences
                .get_mut(fence)
                .expect("submit with a destroyed fence")
                .batch = Some(key);
        }

        let mut pending = 0u32;
        for wait in waits {
            let sem = semaphores
                .get(wait.semaphore)
                .expect("submit waiting on a destroyed semaphore");
            match sem.lock().device_wait(wait.value, key, wait.stages) {
                WaitOutcome::Resolved(Some(SignalOrigin::Batch { batch, stages })) => {
                    self.batches.get_mut(key).unwrap().imports.push(PendingImport {
                        origin: Some(batch),
                        src_stages: stages,
                        dst_stages: wait.stages,
                    });
                }
                WaitOutcome::Resolved(_) => {}
                WaitOutcome::Pending => pending += 1,
            }
        }

        let prev = self.queues.get_mut(queue).unwrap().last_batch.replace(key);
        if let Some(prev_key) = prev {
            if self.batches.contains(prev_key) {
                self.batches.get_mut(key).unwrap().prev_same_queue = Some(prev_key);
                let prev_batch = self.batches.get_mut(prev_key).unwrap();
                // an in-order queue cannot start this batch while the
                // previous one still waits, resolution cascades
                if !prev_batch.is_resolved() {
                    prev_batch.waiters.push(key);
                    pending += 1;
                }
            }
        }
        self.batches.get_mut(key).unwrap().pending = pending;

        let mut worklist = Vec::new();
        if pending == 0 {
            worklist.push(key);
        }
        let mut retires = Vec::new();
        for signal in signals {
            self.process_signal(
                signal,
                SignalOrigin::Batch {
                    batch: key,
                    stages: signal.stages,
                },
                semaphores,
                &mut worklist,
                &mut retires,
            );
        }
        self.run_resolve(worklist, policy, report);
        for batch in retires {
            self.retire(batch);
        }
        self.collect();
    }

    /// Applies one signal operation: raises the semaphore and turns every
    /// wait it resolves into an import edge on the waiting batch. Batches
    /// whose last dependency this was go on the worklist; host waits it
    /// unblocks produce deferred retirements.
    pub(crate) fn process_signal(
        &mut self,
        op: &SemaphoreSignalOp,
        origin: SignalOrigin,
        semaphores: &SemaphoreRegistry,
        worklist: &mut Vec<BatchKey>,
        retires: &mut Vec<BatchKey>,
    ) {
        let sem = semaphores
            .get(op.semaphore)
            .expect("signal of a destroyed semaphore");
        let effects = sem.lock().signal(op.value, origin);

        for (wait, signal_origin) in effects.resolved {
            let Some(waiter) = self.batches.get_mut(wait.batch) else {
                continue;
            };
            if let SignalOrigin::Batch { batch, stages } = signal_origin {
                waiter.imports.push(PendingImport {
                    origin: Some(batch),
                    src_stages: stages,
                    dst_stages: wait.stages,
                });
            }
            waiter.pending = waiter
                .pending
                .checked_sub(1)
                .expect("resolved more waits than the batch submitted");
            if waiter.pending == 0 {
                worklist.push(wait.batch);
            }
        }
        for unblocked in effects.host_unblocked {
            if let SignalOrigin::Batch { batch, .. } = unblocked {
                retires.push(batch);
            }
        }
    }

    /// Drains the resolution worklist in order; resolving a batch can
    /// unblock its waiters, which append themselves.
    pub(crate) fn run_resolve(
        &mut self,
        mut worklist: Vec<BatchKey>,
        policy: &dyn OrderingPolicy,
        report: &mut dyn FnMut(Hazard),
    ) {
        let mut index = 0;
        while index < worklist.len() {
            let key = worklist[index];
            index += 1;
            self.resolve_batch(key, policy, report, &mut worklist);
        }
    }

    /// Places a batch into the partial order: imports every predecessor
    /// reachable right now, re-checks the batch's accesses against the
    /// imported state, and then race-checks it against every live batch the
    /// order says nothing about.
    fn resolve_batch(
        &mut self,
        key: BatchKey,
        policy: &dyn OrderingPolicy,
        report: &mut dyn FnMut(Hazard),
        worklist: &mut Vec<BatchKey>,
    ) {
        let (ctx_id, prev, imports) = {
            let Some(batch) = self.batches.get_mut(key) else {
                warn!("resolution of a collected batch");
                return;
            };
            if batch.is_resolved() {
                return;
            }
            (
                batch.local.id(),
                batch.prev_same_queue,
                std::mem::take(&mut batch.imports),
            )
        };

        let mut ctx = AccessContext::new(ctx_id);
        let mut ordered_after = constant_ahash_hashset();

        if let Some(prev_key) = prev {
            // a collected predecessor was host-synchronized, nothing to
            // import or check
            if let Some(prev_batch) = self.batches.get(prev_key) {
                let edge = if prev_batch.retired {
                    ImportEdge::Retired
                } else {
                    ImportEdge::QueueOrder
                };
                ctx.import(prev_batch.effective_state(), edge, policy);
                ordered_after.insert(prev_key);
                ordered_after.extend(prev_batch.ordered_after.iter().copied());
            }
        }
        for import in &imports {
            let Some(origin_key) = import.origin else {
                continue;
            };
            let Some(origin) = self.batches.get(origin_key) else {
                continue;
            };
            let edge = if origin.retired {
                ImportEdge::Retired
            } else {
                ImportEdge::Semaphore {
                    src_stages: import.src_stages,
                    dst_stages: import.dst_stages,
                }
            };
            ctx.import(origin.effective_state(), edge, policy);
            ordered_after.insert(origin_key);
            self.extend_known_closure(origin_key, &mut ordered_after);
        }

        {
            let batch = self.batches.get_mut(key).unwrap();
            batch.replay_over_imports(ctx, policy, report);
            batch.ordered_after = ordered_after;
        }

        // racing pass: this batch against every resolved batch the partial
        // order does not relate it to, in either direction
        let mut racing = Vec::new();
        {
            let batch = self.batches.get(key).unwrap();
            for (other_key, other) in self.batches.iter() {
                if other_key == key || !other.is_resolved() {
                    continue;
                }
                if Self::pair_ordered(key, batch, other_key, other) {
                    continue;
                }
                batch
                    .local
                    .each_racing_conflict(&other.local, |resource, span, current, prior| {
                        racing.push(Hazard {
                            kind: HazardKind::racing(prior.mode, current.mode),
                            resource,
                            span,
                            prior,
                            current,
                        });
                    });
            }
        }
        for hazard in racing {
            report(hazard);
        }

        let waiters = std::mem::take(&mut self.batches.get_mut(key).unwrap().waiters);
        for waiter in waiters {
            if let Some(batch) = self.batches.get_mut(waiter) {
                batch.pending = batch
                    .pending
                    .checked_sub(1)
                    .expect("waiter resolved more dependencies than it had");
                if batch.pending == 0 {
                    worklist.push(waiter);
                }
            }
        }
    }

    fn pair_ordered(
        key: BatchKey,
        batch: &QueueBatchContext,
        other_key: BatchKey,
        other: &QueueBatchContext,
    ) -> bool {
        batch.queue == other.queue
            || batch.ordered_after.contains(&other_key)
            || other.ordered_after.contains(&key)
            || (other.retired && batch.submit_epoch >= other.retire_epoch)
            || (batch.retired && other.submit_epoch >= batch.retire_epoch)
    }

    /// The set of batches known to precede `key` right now. For an
    /// unresolved batch only its same-queue history is known; whatever its
    /// waits later resolve against does not order retroactively.
    fn extend_known_closure(&self, key: BatchKey, out: &mut ahash::HashSet<BatchKey>) {
        let Some(batch) = self.batches.get(key) else {
            return;
        };
        if batch.is_resolved() {
            out.extend(batch.ordered_after.iter().copied());
            return;
        }
        let mut cursor = batch.prev_same_queue;
        while let Some(prev_key) = cursor {
            if !out.insert(prev_key) {
                break;
            }
            match self.batches.get(prev_key) {
                Some(prev) => {
                    if prev.is_resolved() {
                        out.extend(prev.ordered_after.iter().copied());
                        break;
                    }
                    cursor = prev.prev_same_queue;
                }
                None => break,
            }
        }
    }

    /// The host observed this batch complete. Everything ordered before it
    /// is complete too, and every batch submitted from now on is ordered
    /// after all of them.
    pub(crate) fn retire(&mut self, key: BatchKey) {
        let Some(batch) = self.batches.get_mut(key) else {
            return;
        };
        if !batch.is_resolved() {
            warn!("host observed completion of a batch that could not have started");
            return;
        }
        if batch.retired {
            return;
        }
        self.epoch += 1;
        let epoch = self.epoch;
        batch.retired = true;
        batch.retire_epoch = epoch;
        let closure: Vec<BatchKey> = batch.ordered_after.iter().copied().collect();
        for predecessor in closure {
            if let Some(batch) = self.batches.get_mut(predecessor) {
                if !batch.retired {
                    batch.retired = true;
                    batch.retire_epoch = epoch;
                }
            }
        }
    }

    pub(crate) fn wait_fence(&mut self, fence: FenceId) {
        let Some(state) = self.fences.get(fence) else {
            warn!("host wait on a destroyed fence");
            return;
        };
        let Some(batch) = state.batch else {
            return;
        };
        if self.batches.contains(batch) {
            self.retire(batch);
            self.collect();
        }
    }

    /// Frees batch contexts nothing can reach anymore: retired, off the
    /// queue tail, and with no unresolved batch old enough to still race
    /// with them. Unresolved wait-before-signal batches are retained
    /// indefinitely.
    pub(crate) fn collect(&mut self) {
        let min_unresolved = self
            .batches
            .iter()
            .filter(|(_, batch)| !batch.is_resolved())
            .map(|(_, batch)| batch.submit_epoch)
            .min();
        let mut tails = constant_ahash_hashset();
        for (_, queue) in self.queues.iter() {
            if let Some(tail) = queue.last_batch {
                tails.insert(tail);
            }
        }
        let collectible: Vec<BatchKey> = self
            .batches
            .iter()
            .filter(|(key, batch)| {
                batch.retired
                    && batch.is_resolved()
                    && !tails.contains(key)
                    && min_unresolved.map_or(true, |oldest| oldest >= batch.retire_epoch)
            })
            .map(|(key, _)| key)
            .collect();
        for key in collectible {
            trace!("collecting batch {key:?}");
            self.batches.remove(key);
        }
    }

    /// Device teardown, drops every retained context.
    pub(crate) fn clear(&mut self) {
        self.batches.clear();
        self.queues.clear();
        self.fences.clear();
    }
}
