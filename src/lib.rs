//! Synchronization hazard validation for a GPU command submission checker.
//!
//! The crate reconstructs, from recorded commands and synchronization
//! operations, the partial order of GPU visible memory accesses and reports
//! a [`Hazard`] whenever two conflicting accesses to overlapping resource
//! ranges are not provably ordered. It never talks to a device and never
//! blocks: every "wait" and "signal" here is synchronous bookkeeping fed by
//! the surrounding state tracker.

pub mod access;
pub mod arena;
pub mod batch;
pub mod context;
pub mod device;
pub mod flags;
pub mod hazard;
pub mod range_map;
pub mod record;
pub mod resource;
pub mod semaphore;
pub mod submit;
pub mod tracing;
pub mod util;

pub use access::{AccessInfo, BarrierScope, ContextId, OpTag};
pub use device::{Validator, ValidatorCreateInfo};
pub use flags::{AccessMask, AccessMode, DefaultOrderingPolicy, OrderingPolicy, StageMask};
pub use hazard::{CollectingReporter, Hazard, HazardKind, HazardReporter};
pub use record::{CommandBufferRecording, CommandBufferSnapshot};
pub use resource::{
    AspectMask, BufferInfo, EventId, ImageInfo, ResourceId, Span, SubresourceRange,
};
pub use semaphore::{SemaphoreId, SemaphoreKind};
pub use submit::{FenceId, QueueId, SemaphoreSignalOp, SemaphoreWaitOp};
