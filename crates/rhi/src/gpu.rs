//! Backend seam for frame scheduling.
//!
//! The frame ring, immediate channel and descriptor allocator in
//! `renderer_renderer` only ever talk to the GPU through [`GpuDevice`] and
//! [`PresentTarget`]. The Vulkan backend implements both for
//! `Arc<Device>` and [`Swapchain`](crate::swapchain::Swapchain); tests
//! implement them with in-memory fakes.
//!
//! Plain-data Vulkan types (`vk::ImageLayout`, `vk::PipelineStageFlags2`,
//! `vk::Extent2D`, ...) are used directly in signatures since they carry
//! no device state.

use std::time::Duration;

use ash::vk;

use crate::buffer::BufferUsage;
use crate::error::RhiResult;

/// Hardware queue family a recording context submits to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Compute-capable queue.
    Compute,
    /// Graphics queue; also used for presentation and immediate work.
    Graphics,
    /// Transfer-capable queue.
    Transfer,
}

impl QueueKind {
    /// Number of queue kinds.
    pub const COUNT: usize = 3;

    /// All kinds, in index order.
    pub const ALL: [QueueKind; Self::COUNT] =
        [QueueKind::Compute, QueueKind::Graphics, QueueKind::Transfer];

    /// Position of this kind in per-queue arrays.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            QueueKind::Compute => 0,
            QueueKind::Graphics => 1,
            QueueKind::Transfer => 2,
        }
    }

    /// Lowercase name for logs.
    pub const fn name(self) -> &'static str {
        match self {
            QueueKind::Compute => "compute",
            QueueKind::Graphics => "graphics",
            QueueKind::Transfer => "transfer",
        }
    }
}

/// Synchronization attached to a single queue submission.
///
/// Built with the same chained style as ash's create-info structs.
pub struct Submission<'a, G: GpuDevice + ?Sized> {
    /// Semaphores waited on, with the stage that waits.
    pub waits: Vec<(&'a G::Semaphore, vk::PipelineStageFlags2)>,
    /// Semaphores signaled, with the stage that signals.
    pub signals: Vec<(&'a G::Semaphore, vk::PipelineStageFlags2)>,
    /// Fence signaled once the submission completes.
    pub fence: Option<&'a G::Fence>,
}

impl<'a, G: GpuDevice + ?Sized> Submission<'a, G> {
    /// An unsynchronized submission.
    pub fn new() -> Self {
        Self {
            waits: Vec::new(),
            signals: Vec::new(),
            fence: None,
        }
    }

    /// Adds a semaphore wait.
    pub fn wait(mut self, semaphore: &'a G::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.waits.push((semaphore, stage));
        self
    }

    /// Adds a semaphore signal.
    pub fn signal(mut self, semaphore: &'a G::Semaphore, stage: vk::PipelineStageFlags2) -> Self {
        self.signals.push((semaphore, stage));
        self
    }

    /// Attaches a completion fence.
    pub fn fence(mut self, fence: &'a G::Fence) -> Self {
        self.fence = Some(fence);
        self
    }
}

impl<G: GpuDevice + ?Sized> Default for Submission<'_, G> {
    fn default() -> Self {
        Self::new()
    }
}

/// Device operations needed by frame scheduling and resource lifetime code.
///
/// All methods take `&self`; the single driving thread serializes use.
pub trait GpuDevice {
    /// CPU-observable completion signal.
    type Fence;
    /// GPU-side ordering signal.
    type Semaphore;
    /// Recording context: a command buffer plus the pool it came from.
    type Commands;
    /// Descriptor pool.
    type DescriptorPool;
    /// Descriptor set layout.
    type DescriptorLayout;
    /// Descriptor set handle.
    type DescriptorSet: Copy;
    /// Device buffer with its memory.
    type Buffer;
    /// Image handle.
    type Image: Copy;

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Creates a fence, optionally already signaled.
    fn create_fence(&self, signaled: bool) -> RhiResult<Self::Fence>;

    /// Creates a binary semaphore.
    fn create_semaphore(&self) -> RhiResult<Self::Semaphore>;

    /// Blocks until `fence` is signaled.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`](crate::RhiError::Timeout) naming
    /// `operation` if `timeout` expires first.
    fn wait_for_fence(
        &self,
        fence: &Self::Fence,
        timeout: Duration,
        operation: &'static str,
    ) -> RhiResult<()>;

    /// Returns `fence` to the unsignaled state.
    fn reset_fence(&self, fence: &Self::Fence) -> RhiResult<()>;

    /// Blocks until every queue is idle.
    fn wait_idle(&self) -> RhiResult<()>;

    // =========================================================================
    // Recording and submission
    // =========================================================================

    /// Creates a resettable recording context for `queue`.
    fn create_commands(&self, queue: QueueKind) -> RhiResult<Self::Commands>;

    /// Resets `commands` and begins one-time-submit recording.
    fn begin_commands(&self, commands: &Self::Commands) -> RhiResult<()>;

    /// Finishes recording.
    fn end_commands(&self, commands: &Self::Commands) -> RhiResult<()>;

    /// Submits recorded `commands` to `queue`.
    fn submit(
        &self,
        queue: QueueKind,
        commands: &Self::Commands,
        submission: &Submission<'_, Self>,
    ) -> RhiResult<()>;

    /// Records a full-pipeline image layout transition.
    fn cmd_transition_image(
        &self,
        commands: &Self::Commands,
        image: Self::Image,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    );

    /// Records a whole-range buffer copy of `size` bytes.
    fn cmd_copy_buffer(
        &self,
        commands: &Self::Commands,
        src: &Self::Buffer,
        dst: &Self::Buffer,
        size: u64,
    );

    // =========================================================================
    // Descriptors
    // =========================================================================

    /// Creates a layout from `bindings`.
    fn create_descriptor_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<Self::DescriptorLayout>;

    /// Creates a pool holding `max_sets` sets and the given descriptor counts.
    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self::DescriptorPool>;

    /// Allocates one set conforming to `layout`.
    fn allocate_descriptor_set(
        &self,
        pool: &Self::DescriptorPool,
        layout: &Self::DescriptorLayout,
    ) -> RhiResult<Self::DescriptorSet>;

    /// Invalidates every set allocated from `pool`.
    fn reset_descriptor_pool(&self, pool: &Self::DescriptorPool) -> RhiResult<()>;

    /// Releases `pool`. Backends that destroy on drop keep the default.
    fn destroy_descriptor_pool(&self, pool: Self::DescriptorPool) {
        drop(pool);
    }

    /// Points a storage-buffer binding of `set` at the whole of `buffer`.
    fn write_storage_buffer(&self, set: Self::DescriptorSet, binding: u32, buffer: &Self::Buffer);

    // =========================================================================
    // Buffers
    // =========================================================================

    /// Creates a buffer of `size` bytes.
    fn create_buffer(&self, usage: BufferUsage, size: u64) -> RhiResult<Self::Buffer>;

    /// Copies `data` into the start of a host-visible buffer.
    fn write_buffer(&self, buffer: &Self::Buffer, data: &[u8]) -> RhiResult<()>;
}

/// An image acquired from a [`PresentTarget`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index of the image within the target.
    pub index: u32,
    /// The target still works but no longer matches the surface exactly.
    pub suboptimal: bool,
}

/// The rotating set of images the display consumes.
pub trait PresentTarget<G: GpuDevice> {
    /// Acquires the next image; `signal` is signaled once it may be written.
    ///
    /// # Errors
    ///
    /// [`RhiError::OutOfDate`](crate::RhiError::OutOfDate) when the target
    /// must be rebuilt; [`RhiError::Timeout`](crate::RhiError::Timeout)
    /// when no image became available in time.
    fn acquire_next_image(
        &mut self,
        signal: &G::Semaphore,
        timeout: Duration,
    ) -> RhiResult<AcquiredImage>;

    /// Queues `image_index` for display after `wait` is signaled.
    ///
    /// Returns true if the target is suboptimal and should be rebuilt.
    fn present(&mut self, image_index: u32, wait: &G::Semaphore) -> RhiResult<bool>;

    /// Recreates the target for the current surface. The device must be idle.
    fn rebuild(&mut self) -> RhiResult<()>;

    /// Image at `index`.
    fn image(&self, index: u32) -> G::Image;

    /// Current image size.
    fn extent(&self) -> vk::Extent2D;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_kind_indices_are_dense() {
        for (position, kind) in QueueKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
        assert_eq!(QueueKind::ALL.len(), QueueKind::COUNT);
    }

    #[test]
    fn test_queue_kind_names() {
        assert_eq!(QueueKind::Compute.name(), "compute");
        assert_eq!(QueueKind::Graphics.name(), "graphics");
        assert_eq!(QueueKind::Transfer.name(), "transfer");
    }
}
