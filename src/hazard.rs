//! Hazard classification and the reporting seam.

use std::fmt::Display;

use parking_lot::Mutex;

use crate::{
    access::AccessInfo,
    flags::AccessMode,
    resource::{ResourceId, Span},
};

/// The closed set of detectable conflicts.
///
/// The `*After*` kinds order the two accesses on the same timeline and a
/// stronger barrier between them would fix the program. The `*Racing*` kinds
/// have no happens-before chain at all, only a cross-queue synchronization
/// primitive can fix those.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum HazardKind {
    ReadAfterWrite,
    WriteAfterRead,
    WriteAfterWrite,
    ReadRacingWrite,
    WriteRacingRead,
    WriteRacingWrite,
}

impl HazardKind {
    pub(crate) fn after(prior: AccessMode, current: AccessMode) -> Self {
        match (prior, current) {
            (AccessMode::Write, AccessMode::Read) => Self::ReadAfterWrite,
            (AccessMode::Read, AccessMode::Write) => Self::WriteAfterRead,
            (AccessMode::Write, AccessMode::Write) => Self::WriteAfterWrite,
            (AccessMode::Read, AccessMode::Read) => {
                unreachable!("two reads can never conflict")
            }
        }
    }
    pub(crate) fn racing(prior: AccessMode, current: AccessMode) -> Self {
        match (prior, current) {
            (AccessMode::Write, AccessMode::Read) => Self::ReadRacingWrite,
            (AccessMode::Read, AccessMode::Write) => Self::WriteRacingRead,
            (AccessMode::Write, AccessMode::Write) => Self::WriteRacingWrite,
            (AccessMode::Read, AccessMode::Read) => {
                unreachable!("two reads can never conflict")
            }
        }
    }
    pub fn is_racing(&self) -> bool {
        matches!(
            self,
            Self::ReadRacingWrite | Self::WriteRacingRead | Self::WriteRacingWrite
        )
    }
}

impl Display for HazardKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ReadAfterWrite => "read-after-write",
            Self::WriteAfterRead => "write-after-read",
            Self::WriteAfterWrite => "write-after-write",
            Self::ReadRacingWrite => "read-racing-write",
            Self::WriteRacingRead => "write-racing-read",
            Self::WriteRacingWrite => "write-racing-write",
        };
        f.write_str(name)
    }
}

/// A detected conflict. Pure value, formatting is the report consumer's
/// concern.
#[derive(Clone, Debug)]
pub struct Hazard {
    pub kind: HazardKind,
    pub resource: ResourceId,
    pub span: Span,
    pub prior: AccessInfo,
    pub current: AccessInfo,
}

/// Consumes the stream of hazard records. Detection continues after every
/// report, one submission can surface several independent hazards.
pub trait HazardReporter: Send + Sync {
    fn report(&self, hazard: Hazard);
}

/// Buffers reports for later inspection, the reporter used by the tests and
/// by embedders that poll.
#[derive(Default)]
pub struct CollectingReporter {
    hazards: Mutex<Vec<Hazard>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn take(&self) -> Vec<Hazard> {
        std::mem::take(&mut self.hazards.lock())
    }
    pub fn len(&self) -> usize {
        self.hazards.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.hazards.lock().is_empty()
    }
}

impl HazardReporter for CollectingReporter {
    fn report(&self, hazard: Hazard) {
        self.hazards.lock().push(hazard);
    }
}
