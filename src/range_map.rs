//! Interval map holding the most recent access state per resource sub-range.
//!
//! Segments never overlap and are split to exact agreement with every range
//! that touches them, so arbitrary fragmentation is possible and accepted.
//! Neighboring segments with identical state are not re-coalesced.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::{access::AccessState, resource::Span};

#[derive(Clone, Debug)]
struct Segment {
    end: u64,
    state: AccessState,
}

#[derive(Clone, Default, Debug)]
pub(crate) struct RangeMap {
    segments: BTreeMap<u64, Segment>,
}

impl RangeMap {
    pub(crate) fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Splits the segment straddling `pos`, afterwards `pos` is either a
    /// segment boundary or uncovered.
    fn split_at(&mut self, pos: u64) {
        if let Some((&start, seg)) = self.segments.range_mut(..pos).next_back() {
            if seg.end > pos {
                let tail = Segment {
                    end: seg.end,
                    state: seg.state.clone(),
                };
                seg.end = pos;
                let prev = self.segments.insert(pos, tail);
                debug_assert!(prev.is_none(), "segment after {start} already split");
            }
        }
    }

    /// Makes the segmentation agree exactly with `span`, filling holes with
    /// empty state, and yields every segment inside it for mutation.
    pub(crate) fn isolate(
        &mut self,
        span: &Span,
    ) -> impl Iterator<Item = (Span, &mut AccessState)> {
        assert!(span.start < span.end, "empty range isolated");
        self.split_at(span.start);
        self.split_at(span.end);

        let mut holes: SmallVec<[Span; 4]> = SmallVec::new();
        let mut cursor = span.start;
        for (&start, seg) in self.segments.range(span.start..span.end) {
            if start > cursor {
                holes.push(cursor..start);
            }
            cursor = seg.end;
        }
        if cursor < span.end {
            holes.push(cursor..span.end);
        }
        for hole in holes {
            self.segments.insert(
                hole.start,
                Segment {
                    end: hole.end,
                    state: AccessState::default(),
                },
            );
        }

        self.segments
            .range_mut(span.start..span.end)
            .map(|(&start, seg)| (start..seg.end, &mut seg.state))
    }

    /// Read-only walk of the recorded state overlapping `span`, clipped to
    /// it. Holes are skipped.
    pub(crate) fn overlaps<'a>(
        &'a self,
        span: &Span,
    ) -> impl Iterator<Item = (Span, &'a AccessState)> + 'a {
        let head = self
            .segments
            .range(..span.start)
            .next_back()
            .filter(|(_, seg)| seg.end > span.start)
            .map(|(&start, seg)| (start, seg));
        let span = span.clone();
        head.into_iter()
            .chain(
                self.segments
                    .range(span.start..span.end)
                    .map(|(&start, seg)| (start, seg)),
            )
            .map(move |(start, seg)| {
                (start.max(span.start)..seg.end.min(span.end), &seg.state)
            })
    }

    /// Every recorded segment, for barriers with no range list.
    pub(crate) fn for_each_state(&mut self, mut f: impl FnMut(&mut AccessState)) {
        for seg in self.segments.values_mut() {
            f(&mut seg.state);
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Span, &AccessState)> {
        self.segments
            .iter()
            .map(|(&start, seg)| (start..seg.end, &seg.state))
    }

    /// Overlays `other` onto this map, aligning segmentation and joining
    /// states where both sides have one. `transform` is applied to the
    /// incoming state first.
    pub(crate) fn merge_from(
        &mut self,
        other: &RangeMap,
        mut transform: impl FnMut(&AccessState) -> AccessState,
    ) {
        for (span, state) in other.iter() {
            if state.is_empty() {
                continue;
            }
            let incoming = transform(state);
            for (_, own) in self.isolate(&span) {
                own.merge(&incoming);
            }
        }
    }
}
