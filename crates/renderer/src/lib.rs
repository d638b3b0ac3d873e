//! Frame scheduling and resource lifetime for the point viewer.
//!
//! This crate orchestrates the rendering process:
//! - Deferred destruction ([`DeletionQueue`])
//! - The double-buffered frame ring and its synchronization ([`FrameRing`])
//! - Blocking one-off submissions ([`ImmediateSubmitter`])
//! - Fixed-capacity descriptor pools ([`DescriptorAllocator`])
//! - Acquire / record / submit / present ([`PresentationDriver`])
//!
//! Everything except [`Renderer`] is generic over
//! [`GpuDevice`](renderer_rhi::gpu::GpuDevice), so the scheduling logic can
//! run against any backend.

pub mod deletion_queue;
pub mod descriptor_allocator;
pub mod driver;
pub mod frame;
pub mod frame_manager;
pub mod immediate;
pub mod renderer;
pub mod upload;

pub use deletion_queue::{DeferredAction, DeletionQueue};
pub use descriptor_allocator::{
    DescriptorAllocator, DescriptorKind, DescriptorLayout, DescriptorLayoutBuilder, PoolSizeRatio,
};
pub use driver::PresentationDriver;
pub use frame::{FrameContext, FrameSlot, PerQueue, SlotState, SyncSet};
pub use frame_manager::{FRAME_OVERLAP, FrameRing, SUBMIT_ORDER};
pub use immediate::ImmediateSubmitter;
pub use renderer::Renderer;
pub use upload::{StorageBinding, upload};
