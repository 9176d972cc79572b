//! The device-scope validator object: owned registries, locking and the
//! entry points the surrounding tracker calls.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;

use crate::{
    access::ContextId,
    context::AccessContext,
    flags::{DefaultOrderingPolicy, OrderingPolicy, StageMask},
    hazard::{Hazard, HazardReporter},
    record::{CommandBufferRecording, CommandBufferSnapshot},
    resource::{
        BufferInfo, EventId, ImageInfo, ResourceId, ResourceRegistry, Span, SubresourceRange,
    },
    semaphore::{SemaphoreId, SemaphoreRegistry, SemaphoreState, SignalOrigin},
    submit::{FenceId, QueueId, SemaphoreSignalOp, SemaphoreWaitOp, SubmissionOrderModel},
    tracing::shim_macros::trace,
};

pub struct ValidatorCreateInfo {
    pub policy: Arc<dyn OrderingPolicy>,
    pub reporter: Arc<dyn HazardReporter>,
}

impl ValidatorCreateInfo {
    pub fn new(reporter: Arc<dyn HazardReporter>) -> Self {
        Self {
            policy: Arc::new(DefaultOrderingPolicy),
            reporter,
        }
    }
}

/// The synchronization validation core for one device session.
///
/// Recording sessions mutate only their own context and take no lock.
/// Submission and host synchronization calls serialize on the submission
/// order model; per-semaphore state has its own mutex because signal and
/// wait bookkeeping from concurrent submission threads meets there. Lock
/// order is always model before semaphore.
pub struct Validator {
    model: RwLock<SubmissionOrderModel>,
    semaphores: RwLock<SemaphoreRegistry>,
    resources: RwLock<ResourceRegistry>,
    next_context: AtomicU32,
    next_event: AtomicU32,
    policy: Arc<dyn OrderingPolicy>,
    reporter: Arc<dyn HazardReporter>,
}

impl Validator {
    pub fn new(info: ValidatorCreateInfo) -> Self {
        Self {
            model: RwLock::new(SubmissionOrderModel::new()),
            semaphores: RwLock::new(SemaphoreRegistry::new()),
            resources: RwLock::new(ResourceRegistry::new()),
            next_context: AtomicU32::new(0),
            next_event: AtomicU32::new(0),
            policy: info.policy,
            reporter: info.reporter,
        }
    }

    pub(crate) fn policy(&self) -> &dyn OrderingPolicy {
        &*self.policy
    }

    pub(crate) fn report(&self, hazard: Hazard) {
        trace!(
            "hazard {} on {:?} [{}..{})",
            hazard.kind,
            hazard.resource,
            hazard.span.start,
            hazard.span.end
        );
        self.reporter.report(hazard);
    }

    pub(crate) fn resource_spans(
        &self,
        resource: ResourceId,
        range: &SubresourceRange,
    ) -> SmallVec<[Span; 4]> {
        self.resources.read().spans(resource, range)
    }

    fn alloc_context(&self) -> ContextId {
        ContextId(self.next_context.fetch_add(1, Ordering::Relaxed))
    }

    pub fn create_queue(&self) -> QueueId {
        self.model.write().create_queue()
    }

    pub fn create_fence(&self) -> FenceId {
        self.model.write().create_fence()
    }

    pub fn create_binary_semaphore(&self) -> SemaphoreId {
        self.semaphores
            .write()
            .insert(Mutex::new(SemaphoreState::binary()))
    }

    pub fn create_timeline_semaphore(&self, initial_value: u64) -> SemaphoreId {
        self.semaphores
            .write()
            .insert(Mutex::new(SemaphoreState::timeline(initial_value)))
    }

    pub fn create_event(&self) -> EventId {
        EventId::new(self.next_event.fetch_add(1, Ordering::Relaxed) as usize)
    }

    pub fn register_buffer(&self, info: BufferInfo) -> ResourceId {
        self.resources.write().register_buffer(info)
    }

    pub fn register_image(&self, info: ImageInfo) -> ResourceId {
        self.resources.write().register_image(info)
    }

    /// Starts recording one command buffer. The session borrows the
    /// validator only for resource lookups and reporting, recording state
    /// is exclusively the session's.
    pub fn begin_recording(&self) -> CommandBufferRecording<'_> {
        CommandBufferRecording::new(self, self.alloc_context())
    }

    /// Submits a batch of recorded command buffers to `queue` together with
    /// its semaphore operations. Hazards within the batch and, if the batch
    /// resolves immediately, against everything the submission order
    /// reaches, are reported before this returns.
    pub fn submit(
        &self,
        queue: QueueId,
        buffers: &[&CommandBufferSnapshot],
        waits: &[SemaphoreWaitOp],
        signals: &[SemaphoreSignalOp],
        fence: Option<FenceId>,
    ) {
        let local = AccessContext::new(self.alloc_context());
        let buffers: Vec<CommandBufferSnapshot> =
            buffers.iter().map(|snapshot| (*snapshot).clone()).collect();
        let mut model = self.model.write();
        let semaphores = self.semaphores.read();
        model.submit(
            queue,
            local,
            buffers,
            waits,
            signals,
            fence,
            &semaphores,
            self.policy(),
            &mut |hazard| self.report(hazard),
        );
    }

    /// A host-side timeline signal. Executes with no preceding device work:
    /// it resolves waits and creates edges, but orders no device accesses
    /// behind it.
    pub fn host_signal(&self, semaphore: SemaphoreId, value: u64) {
        let mut model = self.model.write();
        let semaphores = self.semaphores.read();
        let op = SemaphoreSignalOp {
            semaphore,
            value: Some(value),
            stages: StageMask::empty(),
        };
        let mut worklist = Vec::new();
        let mut retires = Vec::new();
        model.process_signal(
            &op,
            SignalOrigin::Host,
            &semaphores,
            &mut worklist,
            &mut retires,
        );
        model.run_resolve(worklist, self.policy(), &mut |hazard| self.report(hazard));
        for batch in retires {
            model.retire(batch);
        }
        model.collect();
    }

    /// A host-side timeline wait. Returns whether the counter already
    /// reached `value`; either way, once it does, the signaling batch and
    /// its predecessors count as host-observed for later submissions.
    pub fn host_wait_semaphore(&self, semaphore: SemaphoreId, value: u64) -> bool {
        let mut model = self.model.write();
        let semaphores = self.semaphores.read();
        let outcome = semaphores
            .get(semaphore)
            .expect("host wait on a destroyed semaphore")
            .lock()
            .host_wait(value);
        match outcome {
            Some(Some(SignalOrigin::Batch { batch, .. })) => {
                model.retire(batch);
                model.collect();
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// A host-side fence wait: the fenced batch and everything ordered
    /// before it become host-observed, unblocking context collection.
    pub fn host_wait_fence(&self, fence: FenceId) {
        self.model.write().wait_fence(fence);
    }

    /// Number of batch contexts still retained, exposed for lifetime
    /// diagnostics.
    pub fn live_batches(&self) -> usize {
        self.model.read().live_batches()
    }

    /// Device teardown. Drops every retained batch context and semaphore,
    /// including unresolved wait-before-signal batches.
    pub fn teardown(&self) {
        self.model.write().clear();
        self.semaphores.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::{BarrierScope, OpTag},
        flags::{AccessMask, AccessMode},
        hazard::{CollectingReporter, HazardKind},
        resource::AspectMask,
    };

    fn setup() -> (Validator, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::new());
        let validator = Validator::new(ValidatorCreateInfo::new(reporter.clone()));
        (validator, reporter)
    }

    fn wait_all(semaphore: SemaphoreId, value: u64) -> SemaphoreWaitOp {
        SemaphoreWaitOp {
            semaphore,
            value: Some(value),
            stages: StageMask::ALL_COMMANDS,
        }
    }

    fn signal_all(semaphore: SemaphoreId, value: u64) -> SemaphoreSignalOp {
        SemaphoreSignalOp {
            semaphore,
            value: Some(value),
            stages: StageMask::ALL_COMMANDS,
        }
    }

    /// Submits a single-buffer batch doing one access of the whole buffer.
    fn submit_access(
        validator: &Validator,
        queue: QueueId,
        buffer: ResourceId,
        mode: AccessMode,
        tag: u64,
        waits: &[SemaphoreWaitOp],
        signals: &[SemaphoreSignalOp],
    ) {
        let mut recording = validator.begin_recording();
        recording.access(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COPY,
            mode,
            OpTag(tag),
        );
        let snapshot = recording.finish();
        validator.submit(queue, &[&snapshot], waits, signals, None);
    }

    fn kinds_and_tags(reporter: &CollectingReporter) -> Vec<(HazardKind, u64, u64)> {
        reporter
            .take()
            .into_iter()
            .map(|h| (h.kind, h.current.tag.0, h.prior.tag.0))
            .collect()
    }

    #[test]
    fn test_disjoint_image_layers_no_hazard() {
        for flip in [false, true] {
            let (validator, reporter) = setup();
            let queue = validator.create_queue();
            let image = validator.register_image(ImageInfo {
                aspects: AspectMask::COLOR,
                mip_levels: 1,
                array_layers: 2,
            });

            let mut recording = validator.begin_recording();
            let (first, second) = if flip { (1, 0) } else { (0, 1) };
            recording.write(
                image,
                &SubresourceRange::image_layers(first, 1),
                StageMask::COPY,
                OpTag(1),
            );
            recording.write(
                image,
                &SubresourceRange::image_layers(second, 1),
                StageMask::CLEAR,
                OpTag(2),
            );
            let snapshot = recording.finish();
            validator.submit(queue, &[&snapshot], &[], &[], None);
            assert!(reporter.is_empty());
        }
    }

    #[test]
    fn test_recording_detects_unsynchronized_raw() {
        let (validator, reporter) = setup();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });

        let mut recording = validator.begin_recording();
        recording.write(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COPY,
            OpTag(1),
        );
        recording.read(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COMPUTE_SHADER,
            OpTag(2),
        );
        drop(recording);

        let hazards = reporter.take();
        assert_eq!(hazards.len(), 1);
        assert_eq!(hazards[0].kind, HazardKind::ReadAfterWrite);
        assert_eq!(hazards[0].prior.tag, OpTag(1));
        assert_eq!(hazards[0].current.tag, OpTag(2));
    }

    #[test]
    fn test_barrier_suppresses_raw() {
        let (validator, reporter) = setup();
        let queue = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });

        let mut recording = validator.begin_recording();
        recording.write(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COPY,
            OpTag(1),
        );
        recording.barrier(BarrierScope {
            src_stages: StageMask::COPY,
            src_access: AccessMask::TRANSFER_WRITE,
            dst_stages: StageMask::COMPUTE_SHADER,
            dst_access: AccessMask::SHADER_READ,
        });
        recording.read(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COMPUTE_SHADER,
            OpTag(2),
        );
        let snapshot = recording.finish();
        validator.submit(queue, &[&snapshot], &[], &[], None);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_event_scopes_only_accesses_before_set() {
        let (validator, reporter) = setup();
        let queue = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let event = validator.create_event();

        let mut recording = validator.begin_recording();
        recording.write(
            buffer,
            &SubresourceRange::buffer(0, 32),
            StageMask::COPY,
            OpTag(1),
        );
        recording.set_event(
            event,
            BarrierScope {
                src_stages: StageMask::COPY,
                src_access: AccessMask::TRANSFER_WRITE,
                dst_stages: StageMask::COMPUTE_SHADER,
                dst_access: AccessMask::SHADER_READ,
            },
        );
        // recorded after the set, outside the event's first scope capture
        recording.write(
            buffer,
            &SubresourceRange::buffer(32, 32),
            StageMask::COPY,
            OpTag(2),
        );
        recording.wait_event(event);
        recording.read(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COMPUTE_SHADER,
            OpTag(3),
        );
        let snapshot = recording.finish();
        validator.submit(queue, &[&snapshot], &[], &[], None);

        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::ReadAfterWrite, 3, 2)]);
    }

    #[test]
    fn test_ranged_barrier_leaves_rest_unprotected() {
        let (validator, reporter) = setup();
        let queue = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });

        let mut recording = validator.begin_recording();
        recording.write(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COPY,
            OpTag(1),
        );
        recording.barrier_ranges(
            BarrierScope {
                src_stages: StageMask::COPY,
                src_access: AccessMask::TRANSFER_WRITE,
                dst_stages: StageMask::COMPUTE_SHADER,
                dst_access: AccessMask::SHADER_READ,
            },
            &[(buffer, SubresourceRange::buffer(0, 32))],
        );
        recording.read(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COMPUTE_SHADER,
            OpTag(2),
        );
        let snapshot = recording.finish();
        validator.submit(queue, &[&snapshot], &[], &[], None);

        let hazards = reporter.take();
        assert_eq!(hazards.len(), 1);
        assert_eq!(hazards[0].kind, HazardKind::ReadAfterWrite);
        // only the un-barriered tail of the write is still hazardous
        assert_eq!(hazards[0].span, 32..64);
        assert_eq!(hazards[0].prior.tag, OpTag(1));
    }

    #[test]
    fn test_cross_buffer_hazard_in_one_batch() {
        let (validator, reporter) = setup();
        let queue = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });

        let mut first = validator.begin_recording();
        first.write(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COPY,
            OpTag(1),
        );
        let first = first.finish();
        let mut second = validator.begin_recording();
        second.write(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COPY,
            OpTag(2),
        );
        let second = second.finish();

        validator.submit(queue, &[&first, &second], &[], &[], None);
        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::WriteAfterWrite, 2, 1)]);
    }

    #[test]
    fn test_cross_batch_same_queue_after_hazard() {
        let (validator, reporter) = setup();
        let queue = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });

        submit_access(&validator, queue, buffer, AccessMode::Write, 1, &[], &[]);
        submit_access(&validator, queue, buffer, AccessMode::Write, 2, &[], &[]);

        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::WriteAfterWrite, 2, 1)]);
    }

    #[test]
    fn test_initial_value_wait_is_not_synchronized() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let semaphore = validator.create_timeline_semaphore(0);

        // waiting on the creation value resolves against nothing
        submit_access(
            &validator,
            queue1,
            buffer,
            AccessMode::Write,
            1,
            &[wait_all(semaphore, 0)],
            &[],
        );
        submit_access(
            &validator,
            queue2,
            buffer,
            AccessMode::Write,
            2,
            &[],
            &[signal_all(semaphore, 1)],
        );

        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::WriteRacingWrite, 2, 1)]);
    }

    #[test]
    fn test_semaphore_scope_mismatch_keeps_after_hazard() {
        let (validator, reporter) = setup();
        let queue = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let semaphore = validator.create_timeline_semaphore(0);

        // the signal's first scope misses the COPY write
        submit_access(
            &validator,
            queue,
            buffer,
            AccessMode::Write,
            1,
            &[],
            &[SemaphoreSignalOp {
                semaphore,
                value: Some(1),
                stages: StageMask::CLEAR,
            }],
        );
        submit_access(
            &validator,
            queue,
            buffer,
            AccessMode::Read,
            2,
            &[SemaphoreWaitOp {
                semaphore,
                value: Some(1),
                stages: StageMask::COPY,
            }],
            &[],
        );

        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::ReadAfterWrite, 2, 1)]);
    }

    #[test]
    fn test_semaphore_scope_covers_cross_queue_access() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let semaphore = validator.create_timeline_semaphore(0);

        submit_access(
            &validator,
            queue1,
            buffer,
            AccessMode::Write,
            1,
            &[],
            &[signal_all(semaphore, 1)],
        );
        submit_access(
            &validator,
            queue2,
            buffer,
            AccessMode::Read,
            2,
            &[wait_all(semaphore, 1)],
            &[],
        );
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_wait_before_signal_resolves_retroactively() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let queue3 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let semaphore = validator.create_timeline_semaphore(0);

        // the wait is submitted before any signal to 1 exists
        submit_access(
            &validator,
            queue1,
            buffer,
            AccessMode::Write,
            10,
            &[wait_all(semaphore, 1)],
            &[],
        );
        // a third queue races with the waiting batch, deferred until the
        // wait resolves
        submit_access(&validator, queue3, buffer, AccessMode::Write, 30, &[], &[]);
        assert!(reporter.is_empty());

        // the resolving signal arrives
        submit_access(
            &validator,
            queue2,
            buffer,
            AccessMode::Write,
            20,
            &[],
            &[signal_all(semaphore, 1)],
        );

        let hazards = kinds_and_tags(&reporter);
        // the signaling batch races with the third queue immediately, the
        // waiter follows once resolved; the waiter is ordered after the
        // signal so no hazard between 10 and 20
        assert!(hazards.contains(&(HazardKind::WriteRacingWrite, 20, 30)));
        assert!(hazards.contains(&(HazardKind::WriteRacingWrite, 10, 30)));
        assert_eq!(hazards.len(), 2);
    }

    #[test]
    fn test_one_signal_resolves_multiple_waits() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let queue3 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let semaphore = validator.create_timeline_semaphore(0);

        submit_access(
            &validator,
            queue1,
            buffer,
            AccessMode::Write,
            1,
            &[wait_all(semaphore, 1)],
            &[],
        );
        submit_access(
            &validator,
            queue2,
            buffer,
            AccessMode::Write,
            2,
            &[wait_all(semaphore, 1)],
            &[],
        );
        assert!(reporter.is_empty());

        // an empty batch provides the common signal; both waiters become
        // ordered after it but not against each other
        validator.submit(queue3, &[], &[], &[signal_all(semaphore, 1)], None);

        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::WriteRacingWrite, 2, 1)]);
    }

    #[test]
    fn test_host_signal_breaks_serialization() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let semaphore = validator.create_timeline_semaphore(0);

        submit_access(
            &validator,
            queue1,
            buffer,
            AccessMode::Write,
            1,
            &[wait_all(semaphore, 1)],
            &[],
        );
        assert!(reporter.is_empty());

        // the host satisfies the wait with no device work behind it
        validator.host_signal(semaphore, 1);
        assert!(reporter.is_empty());

        // nothing links the new signaling batch to the first one
        submit_access(
            &validator,
            queue2,
            buffer,
            AccessMode::Write,
            2,
            &[],
            &[signal_all(semaphore, 2)],
        );

        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::WriteRacingWrite, 2, 1)]);
    }

    #[test]
    fn test_reads_never_race() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });

        submit_access(&validator, queue1, buffer, AccessMode::Read, 1, &[], &[]);
        submit_access(&validator, queue2, buffer, AccessMode::Read, 2, &[], &[]);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_write_racing_read_kind() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });

        submit_access(&validator, queue1, buffer, AccessMode::Read, 1, &[], &[]);
        submit_access(&validator, queue2, buffer, AccessMode::Write, 2, &[], &[]);

        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::WriteRacingRead, 2, 1)]);
    }

    #[test]
    fn test_fence_wait_orders_and_collects() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let fence = validator.create_fence();

        let mut recording = validator.begin_recording();
        recording.write(
            buffer,
            &SubresourceRange::buffer(0, 64),
            StageMask::COPY,
            OpTag(1),
        );
        let snapshot = recording.finish();
        validator.submit(queue1, &[&snapshot], &[], &[], Some(fence));
        assert_eq!(validator.live_batches(), 1);

        validator.host_wait_fence(fence);

        // host-sequenced after the fenced batch on any queue
        submit_access(&validator, queue2, buffer, AccessMode::Write, 2, &[], &[]);
        assert!(reporter.is_empty());

        // a successor on the same queue is ordered after the retired batch
        // and unpins it from the queue tail, but nothing orders it against
        // the other queue's write
        submit_access(&validator, queue1, buffer, AccessMode::Write, 3, &[], &[]);
        let hazards = kinds_and_tags(&reporter);
        assert_eq!(hazards, vec![(HazardKind::WriteRacingWrite, 3, 2)]);
        assert_eq!(validator.live_batches(), 2);
    }

    #[test]
    fn test_host_timeline_wait_retires_signaler() {
        let (validator, reporter) = setup();
        let queue1 = validator.create_queue();
        let queue2 = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let semaphore = validator.create_timeline_semaphore(0);

        submit_access(
            &validator,
            queue1,
            buffer,
            AccessMode::Write,
            1,
            &[],
            &[signal_all(semaphore, 1)],
        );
        assert!(validator.host_wait_semaphore(semaphore, 1));

        submit_access(&validator, queue2, buffer, AccessMode::Write, 2, &[], &[]);
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let run = || {
            let (validator, reporter) = setup();
            let queue1 = validator.create_queue();
            let queue2 = validator.create_queue();
            let buffer = validator.register_buffer(BufferInfo { size: 64 });
            let semaphore = validator.create_timeline_semaphore(0);

            submit_access(
                &validator,
                queue1,
                buffer,
                AccessMode::Write,
                1,
                &[wait_all(semaphore, 1)],
                &[],
            );
            submit_access(&validator, queue2, buffer, AccessMode::Read, 2, &[], &[]);
            submit_access(
                &validator,
                queue2,
                buffer,
                AccessMode::Write,
                3,
                &[],
                &[signal_all(semaphore, 1)],
            );
            kinds_and_tags(&reporter)
        };
        let first = run();
        let second = run();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_teardown_drops_pending_batches() {
        let (validator, _reporter) = setup();
        let queue = validator.create_queue();
        let buffer = validator.register_buffer(BufferInfo { size: 64 });
        let semaphore = validator.create_timeline_semaphore(0);

        // an unresolved wait-before-signal batch is retained indefinitely
        submit_access(
            &validator,
            queue,
            buffer,
            AccessMode::Write,
            1,
            &[wait_all(semaphore, 1)],
            &[],
        );
        assert_eq!(validator.live_batches(), 1);
        validator.teardown();
        assert_eq!(validator.live_batches(), 0);
    }
}
