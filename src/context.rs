//! The access context: one recording or batch worth of range state.

use smallvec::SmallVec;

use crate::{
    access::{AccessInfo, BarrierScope, ContextId, Origin},
    flags::{OrderingPolicy, StageMask},
    range_map::RangeMap,
    resource::{EventId, ResourceId, Span},
    tracing::shim_macros::warn,
    util::constant_ahash_hashmap,
};

#[derive(Clone, Copy)]
struct EventScope {
    scope: BarrierScope,
    pos: u32,
}

/// Accumulated access state of one command buffer recording or one queue
/// batch, plus the event scopes armed within it.
///
/// The context itself knows nothing about its predecessors, ordering is the
/// submission model's business and arrives here only as [`ImportEdge`]
/// applications.
pub(crate) struct AccessContext {
    id: ContextId,
    maps: ahash::HashMap<ResourceId, RangeMap>,
    events: ahash::HashMap<EventId, EventScope>,
    pos: u32,
}

/// How predecessor state enters a context.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ImportEdge {
    /// Same queue submission order, state arrives with only the barriers it
    /// already carries.
    QueueOrder,
    /// A resolved semaphore pairing, accesses in the signal's first scope
    /// become ordered before accesses in the wait's second scope.
    Semaphore {
        src_stages: StageMask,
        dst_stages: StageMask,
    },
    /// The host observed completion, everything is ordered.
    Retired,
}

impl AccessContext {
    pub(crate) fn new(id: ContextId) -> Self {
        Self {
            id,
            maps: constant_ahash_hashmap(),
            events: constant_ahash_hashmap(),
            pos: 0,
        }
    }

    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    fn next_pos(&mut self) -> u32 {
        self.pos += 1;
        self.pos
    }

    /// Checks the new access against recorded prior state and then records
    /// it. Every conflicting prior access that the recorded ordering does
    /// not cover is handed to `conflict` together with the sub-range it was
    /// found on.
    pub(crate) fn apply_access(
        &mut self,
        resource: ResourceId,
        spans: &[Span],
        access: AccessInfo,
        origin: Origin,
        policy: &dyn OrderingPolicy,
        mut conflict: impl FnMut(Span, AccessInfo, Origin),
    ) {
        let pos = self.next_pos();
        let map = self.maps.entry(resource).or_default();
        for span in spans {
            for (seg_span, state) in map.isolate(span) {
                let found = state.conflicts(access.stage, access.mode, policy);
                let subsumed = found.is_empty();
                for &(prior, prior_origin) in &found {
                    conflict(seg_span.clone(), prior, prior_origin);
                }
                if access.mode.is_write() {
                    state.record_write(access, origin, pos, subsumed);
                } else {
                    state.record_read(access, origin, pos);
                }
            }
        }
    }

    /// Applies a pipeline barrier, to the listed sub-ranges or to every
    /// recorded range when `ranges` is `None`.
    pub(crate) fn apply_barrier(
        &mut self,
        scope: &BarrierScope,
        ranges: Option<&[(ResourceId, SmallVec<[Span; 2]>)]>,
        policy: &dyn OrderingPolicy,
    ) {
        match ranges {
            None => {
                for map in self.maps.values_mut() {
                    map.for_each_state(|state| state.apply_barrier(scope, policy));
                }
            }
            Some(list) => {
                for (resource, spans) in list {
                    let Some(map) = self.maps.get_mut(resource) else {
                        continue;
                    };
                    for span in spans {
                        for (_, state) in map.isolate(span) {
                            state.apply_barrier(scope, policy);
                        }
                    }
                }
            }
        }
    }

    /// Arms an event: the scope captures exactly the accesses recorded so
    /// far.
    pub(crate) fn set_event(&mut self, event: EventId, scope: BarrierScope) {
        let pos = self.next_pos();
        self.events.insert(event, EventScope { scope, pos });
    }

    /// Releases an armed event. Waiting on an event this context never saw
    /// set is left unordered, which can only over-report.
    pub(crate) fn wait_event(&mut self, event: EventId, policy: &dyn OrderingPolicy) {
        let Some(&EventScope { scope, pos }) = self.events.get(&event) else {
            warn!("wait on unarmed event {event:?}, treated as unordered");
            return;
        };
        for map in self.maps.values_mut() {
            map.for_each_state(|state| state.apply_barrier_before(&scope, policy, pos));
        }
    }

    /// Merges a predecessor's state in through the given ordering edge.
    pub(crate) fn import(
        &mut self,
        other: &AccessContext,
        edge: ImportEdge,
        policy: &dyn OrderingPolicy,
    ) {
        for (resource, other_map) in &other.maps {
            if other_map.is_empty() {
                continue;
            }
            let map = self.maps.entry(*resource).or_default();
            map.merge_from(other_map, |state| {
                let mut state = state.clone();
                match edge {
                    ImportEdge::QueueOrder => {}
                    ImportEdge::Semaphore {
                        src_stages,
                        dst_stages,
                    } => state.apply_semaphore_scope(src_stages, dst_stages, policy),
                    ImportEdge::Retired => state.protect_all(),
                }
                state.into_imported()
            });
        }
    }

    /// Enumerates every conflicting access pair between this context and an
    /// unordered one. Barriers are irrelevant here, nothing recorded inside
    /// either context can order it against the other.
    pub(crate) fn each_racing_conflict(
        &self,
        prior: &AccessContext,
        mut f: impl FnMut(ResourceId, Span, AccessInfo, AccessInfo),
    ) {
        for (resource, map) in &self.maps {
            let Some(prior_map) = prior.maps.get(resource) else {
                continue;
            };
            for (span, state) in map.iter() {
                if state.is_empty() {
                    continue;
                }
                for (overlap, prior_state) in prior_map.overlaps(&span) {
                    if let Some(w) = &state.last_write {
                        if let Some(pw) = &prior_state.last_write {
                            f(*resource, overlap.clone(), *w, *pw);
                        }
                        for r in &prior_state.reads_since_last_write {
                            f(*resource, overlap.clone(), *w, r.access);
                        }
                    }
                    for r in &state.reads_since_last_write {
                        if let Some(pw) = &prior_state.last_write {
                            f(*resource, overlap.clone(), r.access, *pw);
                        }
                    }
                }
            }
        }
    }
}
