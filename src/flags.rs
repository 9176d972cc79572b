//! Pipeline stage and memory access masks.
//!
//! These mirror the synchronization2 flag split: execution scopes are stage
//! masks, memory scopes are access masks. `ALL_COMMANDS` is kept as a
//! distinct catch-all bit and is interpreted by the [`OrderingPolicy`], not
//! by mask arithmetic.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
    pub struct StageMask: u64 {
        const DRAW_INDIRECT = 1 << 0;
        const VERTEX_INPUT = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const FRAGMENT_SHADER = 1 << 3;
        const EARLY_FRAGMENT_TESTS = 1 << 4;
        const LATE_FRAGMENT_TESTS = 1 << 5;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 6;
        const COMPUTE_SHADER = 1 << 7;
        const COPY = 1 << 8;
        const BLIT = 1 << 9;
        const CLEAR = 1 << 10;
        const RESOLVE = 1 << 11;
        const HOST = 1 << 12;
        const ALL_COMMANDS = 1 << 63;
    }
}

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
    pub struct AccessMask: u64 {
        const INDIRECT_COMMAND_READ = 1 << 0;
        const VERTEX_ATTRIBUTE_READ = 1 << 1;
        const UNIFORM_READ = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const COLOR_ATTACHMENT_READ = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_READ = 1 << 7;
        const DEPTH_STENCIL_WRITE = 1 << 8;
        const TRANSFER_READ = 1 << 9;
        const TRANSFER_WRITE = 1 << 10;
        const HOST_READ = 1 << 11;
        const HOST_WRITE = 1 << 12;
        const MEMORY_READ = 1 << 13;
        const MEMORY_WRITE = 1 << 14;
    }
}

impl AccessMask {
    pub const fn writes() -> Self {
        Self::SHADER_WRITE
            .union(Self::COLOR_ATTACHMENT_WRITE)
            .union(Self::DEPTH_STENCIL_WRITE)
            .union(Self::TRANSFER_WRITE)
            .union(Self::HOST_WRITE)
            .union(Self::MEMORY_WRITE)
    }
    pub fn contains_write(&self) -> bool {
        self.intersects(Self::writes())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum AccessMode {
    Read,
    Write,
}

impl AccessMode {
    #[inline]
    pub fn is_write(&self) -> bool {
        matches!(self, AccessMode::Write)
    }
}

/// Decides when declared synchronization scopes are sufficient to order an
/// access. The exact sufficiency tables live outside this crate; embedders
/// with richer tables substitute their own implementation. The default
/// never suppresses beyond subset containment and the `ALL_COMMANDS`
/// catch-all, so gaps fail toward reporting a hazard.
pub trait OrderingPolicy: Send + Sync {
    /// Whether an execution scope of `scope` orders an access at `stage`.
    fn stages_cover(&self, scope: StageMask, stage: StageMask) -> bool;

    /// Whether a barrier with the given first scopes makes a prior write at
    /// `write_stage` available to later accesses.
    fn write_covered(
        &self,
        scope_stages: StageMask,
        scope_access: AccessMask,
        write_stage: StageMask,
    ) -> bool;
}

#[derive(Clone, Copy, Default, Debug)]
pub struct DefaultOrderingPolicy;

impl OrderingPolicy for DefaultOrderingPolicy {
    fn stages_cover(&self, scope: StageMask, stage: StageMask) -> bool {
        scope.contains(StageMask::ALL_COMMANDS) || scope.contains(stage)
    }
    fn write_covered(
        &self,
        scope_stages: StageMask,
        scope_access: AccessMask,
        write_stage: StageMask,
    ) -> bool {
        // the memory scope must flush at least one write access, otherwise
        // the barrier is an execution dependency only and the write stays
        // invisible
        self.stages_cover(scope_stages, write_stage) && scope_access.contains_write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_commands_covers_everything() {
        let p = DefaultOrderingPolicy;
        assert!(p.stages_cover(StageMask::ALL_COMMANDS, StageMask::COPY));
        assert!(p.stages_cover(StageMask::ALL_COMMANDS, StageMask::CLEAR));
        assert!(!p.stages_cover(StageMask::CLEAR, StageMask::COPY));
    }

    #[test]
    fn test_execution_only_barrier_does_not_flush() {
        let p = DefaultOrderingPolicy;
        assert!(!p.write_covered(StageMask::COPY, AccessMask::empty(), StageMask::COPY));
        assert!(p.write_covered(
            StageMask::COPY,
            AccessMask::TRANSFER_WRITE,
            StageMask::COPY
        ));
    }
}
