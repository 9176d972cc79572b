//! One queue submission: its command buffers, ordering edges and access
//! state.

use smallvec::SmallVec;

use crate::{
    access::Origin,
    arena::gen::arena_key,
    context::AccessContext,
    flags::{OrderingPolicy, StageMask},
    hazard::Hazard,
    record::{self, CommandBufferSnapshot, ReplayFilter},
    submit::QueueId,
    util::constant_ahash_hashset,
};

arena_key! { pub(crate) BatchKey }

/// A happens-before edge into a batch, recorded when the matching wait
/// resolves and applied when the batch itself resolves. `origin` is `None`
/// for host signal operations, which carry no device work to import.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingImport {
    pub(crate) origin: Option<BatchKey>,
    pub(crate) src_stages: StageMask,
    pub(crate) dst_stages: StageMask,
}

/// Wraps one submitted group of command buffers with its synchronization
/// state.
///
/// `local` holds only the accesses of this batch's own command buffers and
/// is what racing checks intersect. `resolved` additionally carries the
/// predecessor state imported when the batch found its place in the
/// submission order, and is what successors import in turn.
pub(crate) struct QueueBatchContext {
    pub(crate) queue: QueueId,
    pub(crate) buffers: Vec<CommandBufferSnapshot>,
    pub(crate) local: AccessContext,
    pub(crate) resolved: Option<AccessContext>,
    pub(crate) prev_same_queue: Option<BatchKey>,
    /// Edges accumulated by resolved waits, consumed at resolution.
    pub(crate) imports: Vec<PendingImport>,
    /// Unresolved dependencies: pending semaphore waits plus an unresolved
    /// same-queue predecessor.
    pub(crate) pending: u32,
    /// Batches whose resolution is blocked on this one.
    pub(crate) waiters: SmallVec<[BatchKey; 2]>,
    /// Transitive predecessors as known when this batch resolved. Never
    /// extended retroactively.
    pub(crate) ordered_after: ahash::HashSet<BatchKey>,
    pub(crate) submit_epoch: u64,
    pub(crate) retired: bool,
    pub(crate) retire_epoch: u64,
}

impl QueueBatchContext {
    pub(crate) fn new(
        queue: QueueId,
        local: AccessContext,
        buffers: Vec<CommandBufferSnapshot>,
        submit_epoch: u64,
    ) -> Self {
        Self {
            queue,
            buffers,
            local,
            resolved: None,
            prev_same_queue: None,
            imports: Vec::new(),
            pending: 0,
            waiters: SmallVec::new(),
            ordered_after: constant_ahash_hashset(),
            submit_epoch,
            retired: false,
            retire_epoch: 0,
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// The state successors import: the cumulative context once resolved,
    /// otherwise only what the batch itself recorded.
    pub(crate) fn effective_state(&self) -> &AccessContext {
        self.resolved.as_ref().unwrap_or(&self.local)
    }

    /// Replays the command buffers into the batch's own context in issue
    /// order, so conflicts across buffer boundaries are detected exactly as
    /// if they were one buffer.
    pub(crate) fn merge_command_buffers(
        &mut self,
        policy: &dyn OrderingPolicy,
        report: &mut dyn FnMut(Hazard),
    ) {
        for (index, snapshot) in self.buffers.iter().enumerate() {
            record::replay(
                &snapshot.inner,
                Origin(index as u32 + 1),
                &mut self.local,
                policy,
                ReplayFilter::CrossOrigin,
                report,
            );
        }
    }

    /// Replays the command buffers over the imported predecessor state,
    /// reporting only conflicts against it, and installs the result as the
    /// batch's cumulative context.
    pub(crate) fn replay_over_imports(
        &mut self,
        mut ctx: AccessContext,
        policy: &dyn OrderingPolicy,
        report: &mut dyn FnMut(Hazard),
    ) {
        for (index, snapshot) in self.buffers.iter().enumerate() {
            record::replay(
                &snapshot.inner,
                Origin(index as u32 + 1),
                &mut ctx,
                policy,
                ReplayFilter::ImportedOnly,
                report,
            );
        }
        self.resolved = Some(ctx);
    }
}
