//! Resource identity and subresource ranges.
//!
//! Buffers address bytes directly. Images register their aspect/mip/layer
//! shape once and subresource ranges are linearized into index spans, so a
//! single interval representation serves both kinds. Granularity for images
//! is one unit per (aspect, mip, layer); finer extents collapse to the whole
//! subresource, which can only over-report.

use bitflags::bitflags;
use smallvec::SmallVec;
use std::ops::Range;

macro_rules! simple_handle {
    ($($visibility:vis $name:ident),+ $(,)?) => {
        $(
            #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
            #[repr(transparent)]
            $visibility struct $name(u32);
            impl $name {
                pub(crate) fn new(index: usize) -> Self {
                    assert!(index <= u32::MAX as usize);
                    Self(index as u32)
                }
                #[inline]
                pub(crate) fn index(&self) -> usize {
                    self.0 as usize
                }
            }
        )+
    };
}

simple_handle! { pub ResourceId, pub EventId }

/// Linear index range into a resource, bytes for buffers and
/// (aspect, mip, layer) indices for images. Half open.
pub type Span = Range<u64>;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
    pub struct AspectMask: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BufferInfo {
    pub size: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct ImageInfo {
    pub aspects: AspectMask,
    pub mip_levels: u32,
    pub array_layers: u32,
}

/// Collaborator-facing description of the part of a resource an access or a
/// barrier touches.
#[derive(Clone, Copy, Debug)]
pub enum SubresourceRange {
    Buffer {
        offset: u64,
        size: u64,
    },
    Image {
        aspects: AspectMask,
        base_mip: u32,
        mip_count: u32,
        base_layer: u32,
        layer_count: u32,
    },
}

impl SubresourceRange {
    pub fn buffer(offset: u64, size: u64) -> Self {
        Self::Buffer { offset, size }
    }
    pub fn image_layers(base_layer: u32, layer_count: u32) -> Self {
        Self::Image {
            aspects: AspectMask::COLOR,
            base_mip: 0,
            mip_count: 1,
            base_layer,
            layer_count,
        }
    }
}

pub(crate) enum ResourceKind {
    Buffer(BufferInfo),
    Image(ImageInfo),
}

pub(crate) struct ResourceEntry {
    pub(crate) kind: ResourceKind,
}

/// Registry of every resource the validated device has shown us.
/// Resources are never unregistered before teardown, object lifetime
/// tracking is the caller's concern.
pub(crate) struct ResourceRegistry {
    entries: Vec<ResourceEntry>,
}

impl ResourceRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
    pub(crate) fn register_buffer(&mut self, info: BufferInfo) -> ResourceId {
        let id = ResourceId::new(self.entries.len());
        self.entries.push(ResourceEntry {
            kind: ResourceKind::Buffer(info),
        });
        id
    }
    pub(crate) fn register_image(&mut self, info: ImageInfo) -> ResourceId {
        assert!(info.mip_levels > 0 && info.array_layers > 0);
        assert!(!info.aspects.is_empty());
        let id = ResourceId::new(self.entries.len());
        self.entries.push(ResourceEntry {
            kind: ResourceKind::Image(info),
        });
        id
    }
    fn get(&self, id: ResourceId) -> &ResourceEntry {
        self.entries
            .get(id.index())
            .unwrap_or_else(|| panic!("unregistered resource {id:?}"))
    }

    /// Linearizes `range` into index spans, splitting only where the image
    /// shape forces discontiguity.
    pub(crate) fn spans(&self, id: ResourceId, range: &SubresourceRange) -> SmallVec<[Span; 4]> {
        let mut out = SmallVec::new();
        match (&self.get(id).kind, range) {
            (ResourceKind::Buffer(info), &SubresourceRange::Buffer { offset, size }) => {
                assert!(
                    offset.checked_add(size).is_some_and(|end| end <= info.size),
                    "buffer range {offset}+{size} out of bounds of {id:?} (size {})",
                    info.size
                );
                if size > 0 {
                    out.push(offset..offset + size);
                }
            }
            (
                ResourceKind::Image(info),
                &SubresourceRange::Image {
                    aspects,
                    base_mip,
                    mip_count,
                    base_layer,
                    layer_count,
                },
            ) => {
                let aspects = aspects & info.aspects;
                assert!(
                    base_mip + mip_count <= info.mip_levels
                        && base_layer + layer_count <= info.array_layers,
                    "image range out of bounds of {id:?}"
                );
                let mips = info.mip_levels as u64;
                let layers = info.array_layers as u64;
                for (aspect_index, aspect) in info.aspects.iter().enumerate() {
                    if !aspects.intersects(aspect) {
                        continue;
                    }
                    let aspect_base = aspect_index as u64 * mips * layers;
                    if base_layer == 0 && layer_count as u64 == layers {
                        // whole layer range, mips are contiguous
                        let start = aspect_base + base_mip as u64 * layers;
                        out.push(start..start + mip_count as u64 * layers);
                    } else {
                        for mip in base_mip..base_mip + mip_count {
                            let start =
                                aspect_base + mip as u64 * layers + base_layer as u64;
                            out.push(start..start + layer_count as u64);
                        }
                    }
                }
            }
            (ResourceKind::Buffer(..), SubresourceRange::Image { .. }) => {
                panic!("image range used with buffer {id:?}")
            }
            (ResourceKind::Image(..), SubresourceRange::Buffer { .. }) => {
                panic!("buffer range used with image {id:?}")
            }
        }
        out
    }

}
