//! Per-range access state and ordering scope application.

use smallvec::SmallVec;

use crate::flags::{AccessMask, AccessMode, OrderingPolicy, StageMask};

/// Identity of the recording or batch context an access was recorded in.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct ContextId(pub(crate) u32);

/// Caller supplied identity of the command that performed an access, opaque
/// to the validator and carried into hazard reports.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[repr(transparent)]
pub struct OpTag(pub u64);

/// One recorded read or write, the unit both sides of a hazard report are
/// made of.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct AccessInfo {
    pub context: ContextId,
    /// Total order within the owning context.
    pub seq: u32,
    pub stage: StageMask,
    pub mode: AccessMode,
    pub tag: OpTag,
}

impl AccessInfo {
    fn same_op(&self, other: &AccessInfo) -> bool {
        self.context == other.context && self.seq == other.seq
    }
}

/// Distinguishes which replay pass put a component into a state so that a
/// later pass can check only against what it did not itself insert.
/// Replayed command buffers get their position in the batch, imported
/// predecessor state gets [`Origin::IMPORTED`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub(crate) struct Origin(pub(crate) u32);

impl Origin {
    pub(crate) const RECORDING: Origin = Origin(0);
    pub(crate) const IMPORTED: Origin = Origin(u32::MAX);
}

impl Default for Origin {
    fn default() -> Self {
        Origin::RECORDING
    }
}

/// Execution + memory dependency scopes of a pipeline barrier or event.
#[derive(Clone, Copy, Default, Debug)]
pub struct BarrierScope {
    pub src_stages: StageMask,
    pub src_access: AccessMask,
    pub dst_stages: StageMask,
    pub dst_access: AccessMask,
}

#[derive(Clone, Debug)]
pub(crate) struct ReadState {
    pub(crate) access: AccessInfo,
    /// Stages that have an execution dependency on this read.
    pub(crate) barriers: StageMask,
    pub(crate) origin: Origin,
    /// Insertion position in the owning context, event waits only reach
    /// components positioned before the matching set.
    pub(crate) pos: u32,
}

/// The most recent access history of one resource sub-range.
///
/// Reads accumulate until a write whose barriers subsume them replaces the
/// whole state; an unsynchronized write keeps them so later accesses keep
/// failing against the same unresolved history.
#[derive(Clone, Default, Debug)]
pub struct AccessState {
    pub last_write: Option<AccessInfo>,
    /// Stages ordered after `last_write` with its memory made visible.
    pub last_writer_barriers: StageMask,
    pub(crate) write_origin: Origin,
    pub(crate) write_pos: u32,
    pub(crate) reads_since_last_write: SmallVec<[ReadState; 2]>,
}

/// An execution dependency chains with an earlier one when its source scope
/// reaches any stage the earlier dependency already ordered.
fn chains(src_stages: StageMask, established: StageMask) -> bool {
    src_stages.contains(StageMask::ALL_COMMANDS) || src_stages.intersects(established)
}

impl AccessState {
    pub(crate) fn is_empty(&self) -> bool {
        self.last_write.is_none() && self.reads_since_last_write.is_empty()
    }

    /// Prior accesses the given new access conflicts with, skipping every
    /// pair the recorded barriers prove ordered.
    pub(crate) fn conflicts(
        &self,
        stage: StageMask,
        mode: AccessMode,
        policy: &dyn OrderingPolicy,
    ) -> SmallVec<[(AccessInfo, Origin); 2]> {
        let mut out = SmallVec::new();
        match mode {
            AccessMode::Read => {
                if let Some(w) = &self.last_write {
                    if !policy.stages_cover(self.last_writer_barriers, stage) {
                        out.push((*w, self.write_origin));
                    }
                }
            }
            AccessMode::Write => {
                if !self.reads_since_last_write.is_empty() {
                    // the reads are the most recent sync points, the write
                    // below them is already ordered through them or was
                    // reported when they were recorded
                    for r in &self.reads_since_last_write {
                        if !policy.stages_cover(r.barriers, stage) {
                            out.push((r.access, r.origin));
                        }
                    }
                } else if let Some(w) = &self.last_write {
                    if !policy.stages_cover(self.last_writer_barriers, stage) {
                        out.push((*w, self.write_origin));
                    }
                }
            }
        }
        out
    }

    pub(crate) fn record_read(&mut self, access: AccessInfo, origin: Origin, pos: u32) {
        debug_assert!(!access.mode.is_write());
        let read = ReadState {
            access,
            barriers: StageMask::empty(),
            origin,
            pos,
        };
        if let Some(r) = self
            .reads_since_last_write
            .iter_mut()
            .find(|r| r.access.stage == access.stage)
        {
            *r = read;
        } else {
            self.reads_since_last_write.push(read);
        }
    }

    pub(crate) fn record_write(
        &mut self,
        access: AccessInfo,
        origin: Origin,
        pos: u32,
        subsumed: bool,
    ) {
        debug_assert!(access.mode.is_write());
        if subsumed {
            self.reads_since_last_write.clear();
        }
        self.last_write = Some(access);
        self.last_writer_barriers = StageMask::empty();
        self.write_origin = origin;
        self.write_pos = pos;
    }

    /// Applies an in-stream barrier. Chained dependencies extend: a source
    /// scope that reaches stages already ordered after the access extends
    /// the protection to the new destination scope.
    pub(crate) fn apply_barrier(&mut self, scope: &BarrierScope, policy: &dyn OrderingPolicy) {
        self.apply_barrier_before(scope, policy, u32::MAX);
    }

    /// Barrier application limited to components recorded before `before`,
    /// the shape event waits need.
    pub(crate) fn apply_barrier_before(
        &mut self,
        scope: &BarrierScope,
        policy: &dyn OrderingPolicy,
        before: u32,
    ) {
        if let Some(w) = &self.last_write {
            if self.write_pos < before
                && (policy.write_covered(scope.src_stages, scope.src_access, w.stage)
                    || chains(scope.src_stages, self.last_writer_barriers))
            {
                self.last_writer_barriers |= scope.dst_stages;
            }
        }
        for r in &mut self.reads_since_last_write {
            if r.pos < before
                && (policy.stages_cover(scope.src_stages, r.access.stage)
                    || chains(scope.src_stages, r.barriers))
            {
                r.barriers |= scope.dst_stages;
            }
        }
    }

    /// Applies a resolved semaphore edge. Semaphores make all memory
    /// available, only the execution scopes matter.
    pub(crate) fn apply_semaphore_scope(
        &mut self,
        src_stages: StageMask,
        dst_stages: StageMask,
        policy: &dyn OrderingPolicy,
    ) {
        if let Some(w) = &self.last_write {
            if policy.stages_cover(src_stages, w.stage)
                || chains(src_stages, self.last_writer_barriers)
            {
                self.last_writer_barriers |= dst_stages;
            }
        }
        for r in &mut self.reads_since_last_write {
            if policy.stages_cover(src_stages, r.access.stage) || chains(src_stages, r.barriers)
            {
                r.barriers |= dst_stages;
            }
        }
    }

    /// Marks every component ordered before anything that can still be
    /// recorded, used when the host has observed completion.
    pub(crate) fn protect_all(&mut self) {
        if self.last_write.is_some() {
            self.last_writer_barriers |= StageMask::ALL_COMMANDS;
        }
        for r in &mut self.reads_since_last_write {
            r.barriers |= StageMask::ALL_COMMANDS;
        }
    }

    /// Re-tags every component as imported predecessor state, positioned
    /// before everything the importing context will record.
    pub(crate) fn into_imported(mut self) -> AccessState {
        self.write_origin = Origin::IMPORTED;
        self.write_pos = 0;
        for r in &mut self.reads_since_last_write {
            r.origin = Origin::IMPORTED;
            r.pos = 0;
        }
        self
    }

    /// Joins state imported from two mutually unordered predecessors. Any
    /// conflict between the sources themselves is the racing detector's
    /// business, here the later import wins the writer slot and reads are
    /// unioned.
    pub(crate) fn merge(&mut self, other: &AccessState) {
        if let Some(incoming) = &other.last_write {
            let same_write = self
                .last_write
                .as_ref()
                .is_some_and(|own| own.same_op(incoming));
            if same_write {
                self.last_writer_barriers |= other.last_writer_barriers;
            } else {
                self.last_write = other.last_write;
                self.last_writer_barriers = other.last_writer_barriers;
                self.write_origin = other.write_origin;
                self.write_pos = other.write_pos;
            }
        }
        for r in &other.reads_since_last_write {
            if let Some(own) = self
                .reads_since_last_write
                .iter_mut()
                .find(|own| own.access.same_op(&r.access))
            {
                own.barriers |= r.barriers;
            } else {
                self.reads_since_last_write.push(r.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::DefaultOrderingPolicy;

    fn write_at(stage: StageMask, seq: u32) -> AccessInfo {
        AccessInfo {
            context: ContextId(0),
            seq,
            stage,
            mode: AccessMode::Write,
            tag: OpTag(seq as u64),
        }
    }
    fn read_at(stage: StageMask, seq: u32) -> AccessInfo {
        AccessInfo {
            context: ContextId(0),
            seq,
            stage,
            mode: AccessMode::Read,
            tag: OpTag(seq as u64),
        }
    }

    #[test]
    fn test_raw_then_barrier() {
        let policy = DefaultOrderingPolicy;
        let mut state = AccessState::default();
        state.record_write(write_at(StageMask::COPY, 0), Origin::RECORDING, 1, true);

        let c = state.conflicts(StageMask::COMPUTE_SHADER, AccessMode::Read, &policy);
        assert_eq!(c.len(), 1);

        state.apply_barrier(
            &BarrierScope {
                src_stages: StageMask::COPY,
                src_access: AccessMask::TRANSFER_WRITE,
                dst_stages: StageMask::COMPUTE_SHADER,
                dst_access: AccessMask::SHADER_READ,
            },
            &policy,
        );
        let c = state.conflicts(StageMask::COMPUTE_SHADER, AccessMode::Read, &policy);
        assert!(c.is_empty());
        // the barrier only reaches the compute stage
        let c = state.conflicts(StageMask::FRAGMENT_SHADER, AccessMode::Read, &policy);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn test_barrier_chaining() {
        let policy = DefaultOrderingPolicy;
        let mut state = AccessState::default();
        state.record_write(write_at(StageMask::COPY, 0), Origin::RECORDING, 1, true);

        state.apply_barrier(
            &BarrierScope {
                src_stages: StageMask::COPY,
                src_access: AccessMask::TRANSFER_WRITE,
                dst_stages: StageMask::COMPUTE_SHADER,
                dst_access: AccessMask::SHADER_READ,
            },
            &policy,
        );
        // second barrier chains off the first one's destination scope
        state.apply_barrier(
            &BarrierScope {
                src_stages: StageMask::COMPUTE_SHADER,
                src_access: AccessMask::empty(),
                dst_stages: StageMask::FRAGMENT_SHADER,
                dst_access: AccessMask::SHADER_READ,
            },
            &policy,
        );
        let c = state.conflicts(StageMask::FRAGMENT_SHADER, AccessMode::Read, &policy);
        assert!(c.is_empty());
    }

    #[test]
    fn test_war_needs_execution_dependency_only() {
        let policy = DefaultOrderingPolicy;
        let mut state = AccessState::default();
        state.record_read(read_at(StageMask::FRAGMENT_SHADER, 0), Origin::RECORDING, 1);

        let c = state.conflicts(StageMask::COPY, AccessMode::Write, &policy);
        assert_eq!(c.len(), 1);

        state.apply_barrier(
            &BarrierScope {
                src_stages: StageMask::FRAGMENT_SHADER,
                src_access: AccessMask::empty(),
                dst_stages: StageMask::COPY,
                dst_access: AccessMask::empty(),
            },
            &policy,
        );
        let c = state.conflicts(StageMask::COPY, AccessMode::Write, &policy);
        assert!(c.is_empty());
    }

    #[test]
    fn test_reads_survive_unsynchronized_write() {
        let policy = DefaultOrderingPolicy;
        let mut state = AccessState::default();
        state.record_read(read_at(StageMask::VERTEX_SHADER, 0), Origin::RECORDING, 1);

        let conflicts = state.conflicts(StageMask::COPY, AccessMode::Write, &policy);
        assert_eq!(conflicts.len(), 1);
        state.record_write(write_at(StageMask::COPY, 1), Origin::RECORDING, 2, false);
        assert_eq!(state.reads_since_last_write.len(), 1);
    }
}
