//! Command buffer recording sessions, the frozen snapshots they produce and
//! snapshot replay.
//!
//! A recording owns its access context exclusively, hazard checks during
//! recording only see the command buffer's own in-flight state. Cross
//! buffer and cross batch checks happen when snapshots are replayed at
//! submission and resolution time.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::{
    access::{AccessInfo, BarrierScope, ContextId, OpTag, Origin},
    context::AccessContext,
    device::Validator,
    flags::{AccessMode, OrderingPolicy, StageMask},
    hazard::{Hazard, HazardKind},
    resource::{EventId, ResourceId, Span, SubresourceRange},
};

pub(crate) enum RecordedOp {
    Access {
        resource: ResourceId,
        spans: SmallVec<[Span; 4]>,
        stage: StageMask,
        mode: AccessMode,
        tag: OpTag,
    },
    Barrier {
        scope: BarrierScope,
        ranges: Option<Vec<(ResourceId, SmallVec<[Span; 2]>)>>,
    },
    SetEvent {
        event: EventId,
        scope: BarrierScope,
    },
    WaitEvent {
        event: EventId,
    },
}

pub(crate) struct RecordedCommands {
    pub(crate) context: ContextId,
    pub(crate) ops: Vec<RecordedOp>,
}

/// A finished recording. Cloning is cheap and a snapshot can be submitted
/// any number of times, later recordings never mutate it.
#[derive(Clone)]
pub struct CommandBufferSnapshot {
    pub(crate) inner: Arc<RecordedCommands>,
}

/// Recording session for one command buffer, exclusively owned by the
/// recording thread.
pub struct CommandBufferRecording<'a> {
    validator: &'a Validator,
    ctx: AccessContext,
    ops: Vec<RecordedOp>,
}

impl<'a> CommandBufferRecording<'a> {
    pub(crate) fn new(validator: &'a Validator, id: ContextId) -> Self {
        Self {
            validator,
            ctx: AccessContext::new(id),
            ops: Vec::new(),
        }
    }

    /// Records one read or write of `range`, checking it against this
    /// buffer's own prior state.
    pub fn access(
        &mut self,
        resource: ResourceId,
        range: &SubresourceRange,
        stage: StageMask,
        mode: AccessMode,
        tag: OpTag,
    ) {
        let spans = self.validator.resource_spans(resource, range);
        let access = AccessInfo {
            context: self.ctx.id(),
            seq: self.ops.len() as u32,
            stage,
            mode,
            tag,
        };
        let validator = self.validator;
        self.ctx.apply_access(
            resource,
            &spans,
            access,
            Origin::RECORDING,
            validator.policy(),
            |span, prior, _| {
                validator.report(Hazard {
                    kind: HazardKind::after(prior.mode, mode),
                    resource,
                    span,
                    prior,
                    current: access,
                });
            },
        );
        self.ops.push(RecordedOp::Access {
            resource,
            spans,
            stage,
            mode,
            tag,
        });
    }

    pub fn read(&mut self, resource: ResourceId, range: &SubresourceRange, stage: StageMask, tag: OpTag) {
        self.access(resource, range, stage, AccessMode::Read, tag);
    }

    pub fn write(&mut self, resource: ResourceId, range: &SubresourceRange, stage: StageMask, tag: OpTag) {
        self.access(resource, range, stage, AccessMode::Write, tag);
    }

    /// Records a pipeline barrier covering every resource.
    pub fn barrier(&mut self, scope: BarrierScope) {
        self.ctx.apply_barrier(&scope, None, self.validator.policy());
        self.ops.push(RecordedOp::Barrier {
            scope,
            ranges: None,
        });
    }

    /// Records a pipeline barrier limited to the given sub-ranges.
    pub fn barrier_ranges(
        &mut self,
        scope: BarrierScope,
        ranges: &[(ResourceId, SubresourceRange)],
    ) {
        let ranges: Vec<(ResourceId, SmallVec<[Span; 2]>)> = ranges
            .iter()
            .map(|(resource, range)| {
                let spans = self.validator.resource_spans(*resource, range);
                (*resource, spans.into_iter().collect())
            })
            .collect();
        self.ctx
            .apply_barrier(&scope, Some(&ranges), self.validator.policy());
        self.ops.push(RecordedOp::Barrier {
            scope,
            ranges: Some(ranges),
        });
    }

    /// Arms `event` with the dependency scope carried by the matching wait.
    pub fn set_event(&mut self, event: EventId, scope: BarrierScope) {
        self.ctx.set_event(event, scope);
        self.ops.push(RecordedOp::SetEvent { event, scope });
    }

    /// Releases `event`, ordering the accesses recorded before the set
    /// against the scope's destination stages.
    pub fn wait_event(&mut self, event: EventId) {
        self.ctx.wait_event(event, self.validator.policy());
        self.ops.push(RecordedOp::WaitEvent { event });
    }

    /// Freezes the recording.
    pub fn finish(self) -> CommandBufferSnapshot {
        CommandBufferSnapshot {
            inner: Arc::new(RecordedCommands {
                context: self.ctx.id(),
                ops: self.ops,
            }),
        }
    }
}

/// Which conflicts a replay pass may report. Each pass reports only pairs
/// its caller has not already seen so no hazard is reported twice.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplayFilter {
    /// Conflicts against state another replayed buffer produced, used when
    /// merging a batch. Conflicts inside one buffer were reported while it
    /// was recorded.
    CrossOrigin,
    /// Conflicts against imported predecessor state only, used when a batch
    /// resolves its place in the submission order.
    ImportedOnly,
}

pub(crate) fn replay(
    cmds: &RecordedCommands,
    origin: Origin,
    ctx: &mut AccessContext,
    policy: &dyn OrderingPolicy,
    filter: ReplayFilter,
    report: &mut dyn FnMut(Hazard),
) {
    for (index, op) in cmds.ops.iter().enumerate() {
        match op {
            RecordedOp::Access {
                resource,
                spans,
                stage,
                mode,
                tag,
            } => {
                let access = AccessInfo {
                    context: cmds.context,
                    seq: index as u32,
                    stage: *stage,
                    mode: *mode,
                    tag: *tag,
                };
                ctx.apply_access(
                    *resource,
                    spans,
                    access,
                    origin,
                    policy,
                    |span, prior, prior_origin| {
                        let wanted = match filter {
                            ReplayFilter::CrossOrigin => prior_origin != origin,
                            ReplayFilter::ImportedOnly => prior_origin == Origin::IMPORTED,
                        };
                        if wanted {
                            report(Hazard {
                                kind: HazardKind::after(prior.mode, *mode),
                                resource: *resource,
                                span,
                                prior,
                                current: access,
                            });
                        }
                    },
                );
            }
            RecordedOp::Barrier { scope, ranges } => {
                ctx.apply_barrier(scope, ranges.as_deref(), policy);
            }
            RecordedOp::SetEvent { event, scope } => ctx.set_event(*event, *scope),
            RecordedOp::WaitEvent { event } => ctx.wait_event(*event, policy),
        }
    }
}
