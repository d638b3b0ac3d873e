//! Vulkan implementation of [`GpuDevice`].
//!
//! Every associated type is one of this crate's RAII wrappers, so dropping
//! a value returned from here releases the Vulkan object.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandContext;
use crate::descriptor::{self, DescriptorPool, DescriptorSetLayout};
use crate::device::Device;
use crate::error::RhiResult;
use crate::gpu::{GpuDevice, QueueKind, Submission};
use crate::sync::{Fence, Semaphore};

fn semaphore_infos(
    entries: &[(&Semaphore, vk::PipelineStageFlags2)],
) -> Vec<vk::SemaphoreSubmitInfo<'static>> {
    entries
        .iter()
        .map(|(semaphore, stage)| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore.handle())
                .stage_mask(*stage)
                .device_index(0)
                .value(1)
        })
        .collect()
}

impl GpuDevice for Arc<Device> {
    type Fence = Fence;
    type Semaphore = Semaphore;
    type Commands = CommandContext;
    type DescriptorPool = DescriptorPool;
    type DescriptorLayout = DescriptorSetLayout;
    type DescriptorSet = vk::DescriptorSet;
    type Buffer = Buffer;
    type Image = vk::Image;

    fn create_fence(&self, signaled: bool) -> RhiResult<Fence> {
        Fence::new(self.clone(), signaled)
    }

    fn create_semaphore(&self) -> RhiResult<Semaphore> {
        Semaphore::new(self.clone())
    }

    fn wait_for_fence(
        &self,
        fence: &Fence,
        timeout: Duration,
        operation: &'static str,
    ) -> RhiResult<()> {
        fence.wait(timeout, operation)
    }

    fn reset_fence(&self, fence: &Fence) -> RhiResult<()> {
        fence.reset()
    }

    fn wait_idle(&self) -> RhiResult<()> {
        Device::wait_idle(self)
    }

    fn create_commands(&self, queue: QueueKind) -> RhiResult<CommandContext> {
        CommandContext::new(self.clone(), queue)
    }

    fn begin_commands(&self, commands: &CommandContext) -> RhiResult<()> {
        commands.begin()
    }

    fn end_commands(&self, commands: &CommandContext) -> RhiResult<()> {
        commands.end()
    }

    fn submit(
        &self,
        queue: QueueKind,
        commands: &CommandContext,
        submission: &Submission<'_, Self>,
    ) -> RhiResult<()> {
        debug_assert_eq!(commands.queue(), queue, "commands recorded for another queue");

        let waits = semaphore_infos(&submission.waits);
        let signals = semaphore_infos(&submission.signals);
        let command_infos =
            [vk::CommandBufferSubmitInfo::default().command_buffer(commands.cmd().handle())];

        let submit = vk::SubmitInfo2::default()
            .wait_semaphore_infos(&waits)
            .signal_semaphore_infos(&signals)
            .command_buffer_infos(&command_infos);

        let fence = submission.fence.map_or(vk::Fence::null(), Fence::handle);

        unsafe {
            self.handle()
                .queue_submit2(self.queue(queue), &[submit], fence)?;
        }

        Ok(())
    }

    fn cmd_transition_image(
        &self,
        commands: &CommandContext,
        image: vk::Image,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) {
        commands.cmd().transition_image(image, from, to);
    }

    fn cmd_copy_buffer(&self, commands: &CommandContext, src: &Buffer, dst: &Buffer, size: u64) {
        let region = vk::BufferCopy::default()
            .src_offset(0)
            .dst_offset(0)
            .size(size);
        commands
            .cmd()
            .copy_buffer(src.handle(), dst.handle(), &[region]);
    }

    fn create_descriptor_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<DescriptorSetLayout> {
        DescriptorSetLayout::new(self.clone(), bindings)
    }

    fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<DescriptorPool> {
        DescriptorPool::new(self.clone(), max_sets, sizes)
    }

    fn allocate_descriptor_set(
        &self,
        pool: &DescriptorPool,
        layout: &DescriptorSetLayout,
    ) -> RhiResult<vk::DescriptorSet> {
        pool.allocate(layout)
    }

    fn reset_descriptor_pool(&self, pool: &DescriptorPool) -> RhiResult<()> {
        pool.reset()
    }

    fn write_storage_buffer(&self, set: vk::DescriptorSet, binding: u32, buffer: &Buffer) {
        descriptor::write_storage_buffer(self, set, binding, buffer);
    }

    fn create_buffer(&self, usage: BufferUsage, size: u64) -> RhiResult<Buffer> {
        Buffer::new(self.clone(), usage, size)
    }

    fn write_buffer(&self, buffer: &Buffer, data: &[u8]) -> RhiResult<()> {
        buffer.write_data(0, data)
    }
}
