//! Command pool and command buffer management.
//!
//! - [`CommandPool`] owns a VkCommandPool for one queue family
//! - [`CommandBuffer`] wraps a VkCommandBuffer with recording helpers
//! - [`CommandContext`] pairs the two; it is the unit a frame slot keeps
//!   per queue and the unit the immediate channel reuses
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::command::CommandContext;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::gpu::QueueKind;
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let context = CommandContext::new(device.clone(), QueueKind::Graphics)?;
//! context.begin()?;
//! // ... record commands ...
//! context.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;
use crate::gpu::QueueKind;

/// Vulkan command pool wrapper.
///
/// Created with `RESET_COMMAND_BUFFER` so individual buffers can be
/// re-recorded without resetting the whole pool.
pub struct CommandPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
    /// Queue family index this pool belongs to.
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a new command pool for the specified queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        debug!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates a primary command buffer from this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        Ok(buffers[0])
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Vulkan command buffer wrapper.
///
/// Does not own the VkCommandBuffer; it is freed with its pool.
pub struct CommandBuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command buffer handle.
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates a new command buffer from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_command_buffer()?;
        Ok(Self { device, buffer })
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins one-time-submit recording.
    ///
    /// # Errors
    ///
    /// Returns an error if beginning fails (e.g., if already recording).
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        Ok(())
    }

    /// Ends recording.
    ///
    /// # Errors
    ///
    /// Returns an error if ending fails (e.g., if not recording).
    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        Ok(())
    }

    /// Resets the command buffer to its initial state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }

        Ok(())
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Records a layout transition covering the whole image.
    ///
    /// Waits on and blocks every pipeline stage. Depth layouts use the depth
    /// aspect, everything else the color aspect.
    pub fn transition_image(&self, image: vk::Image, from: vk::ImageLayout, to: vk::ImageLayout) {
        let aspect_mask = if to == vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };

        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
            .old_layout(from)
            .new_layout(to)
            .image(image)
            .subresource_range(full_range(aspect_mask));

        let barriers = [barrier];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);

        unsafe {
            self.device
                .handle()
                .cmd_pipeline_barrier2(self.buffer, &dependency_info);
        }
    }

    // =========================================================================
    // Transfer Commands
    // =========================================================================

    /// Copies data between buffers.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, regions);
        }
    }

    /// Clears a color image in `TRANSFER_DST_OPTIMAL` layout.
    pub fn clear_color_image(&self, image: vk::Image, color: [f32; 4]) {
        let clear_value = vk::ClearColorValue { float32: color };
        let ranges = [full_range(vk::ImageAspectFlags::COLOR)];

        unsafe {
            self.device.handle().cmd_clear_color_image(
                self.buffer,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &clear_value,
                &ranges,
            );
        }
    }

    /// Blits the whole of `src` onto the whole of `dst`, scaling linearly.
    ///
    /// `src` must be in `TRANSFER_SRC_OPTIMAL`, `dst` in `TRANSFER_DST_OPTIMAL`.
    pub fn blit_image(
        &self,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
    ) {
        let region = vk::ImageBlit2::default()
            .src_offsets([vk::Offset3D::default(), corner(src_extent)])
            .dst_offsets([vk::Offset3D::default(), corner(dst_extent)])
            .src_subresource(color_layers())
            .dst_subresource(color_layers());

        let regions = [region];
        let blit_info = vk::BlitImageInfo2::default()
            .src_image(src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(&regions);

        unsafe {
            self.device.handle().cmd_blit_image2(self.buffer, &blit_info);
        }
    }
}

fn full_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect_mask)
        .base_mip_level(0)
        .level_count(vk::REMAINING_MIP_LEVELS)
        .base_array_layer(0)
        .layer_count(vk::REMAINING_ARRAY_LAYERS)
}

fn color_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

fn corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

/// A command buffer together with the pool it was allocated from.
pub struct CommandContext {
    buffer: CommandBuffer,
    pool: CommandPool,
    queue: QueueKind,
}

impl CommandContext {
    /// Creates a pool on the family serving `queue` and allocates one buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation or allocation fails.
    pub fn new(device: Arc<Device>, queue: QueueKind) -> RhiResult<Self> {
        let family = device.queue_family(queue);
        let pool = CommandPool::new(device.clone(), family)?;
        let buffer = CommandBuffer::new(device, &pool)?;

        Ok(Self {
            buffer,
            pool,
            queue,
        })
    }

    /// Resets the buffer and begins recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset or begin fails.
    pub fn begin(&self) -> RhiResult<()> {
        self.buffer.reset()?;
        self.buffer.begin()
    }

    /// Ends recording.
    ///
    /// # Errors
    ///
    /// Returns an error if ending fails.
    #[inline]
    pub fn end(&self) -> RhiResult<()> {
        self.buffer.end()
    }

    /// Returns the command buffer for recording.
    #[inline]
    pub fn cmd(&self) -> &CommandBuffer {
        &self.buffer
    }

    /// Returns the owning pool.
    #[inline]
    pub fn pool(&self) -> &CommandPool {
        &self.pool
    }

    /// Returns the queue this context submits to.
    #[inline]
    pub fn queue(&self) -> QueueKind {
        self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_context_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandContext>();
    }

    #[test]
    fn test_full_range_covers_all_levels() {
        let range = full_range(vk::ImageAspectFlags::COLOR);
        assert_eq!(range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(range.layer_count, vk::REMAINING_ARRAY_LAYERS);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_corner_is_exclusive_upper_bound() {
        let offset = corner(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!((offset.x, offset.y, offset.z), (1280, 720, 1));
    }
}
