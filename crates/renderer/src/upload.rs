//! Device buffer uploads through the immediate channel.

use tracing::{debug, info};

use renderer_rhi::buffer::BufferUsage;
use renderer_rhi::gpu::GpuDevice;
use renderer_rhi::{RhiError, RhiResult};

use crate::immediate::ImmediateSubmitter;

/// Copies `bytes` into a new device-local buffer of `usage`.
///
/// The bytes go through a host-visible staging buffer; the copy is
/// recorded and waited on through `immediate`, so the staging buffer is
/// released before this returns.
///
/// # Errors
///
/// Returns [`RhiError::InvalidHandle`] for empty input, or whatever buffer
/// creation or the immediate submission reports.
pub fn upload<G: GpuDevice>(
    gpu: &G,
    immediate: &mut ImmediateSubmitter<G>,
    usage: BufferUsage,
    bytes: &[u8],
) -> RhiResult<G::Buffer> {
    if bytes.is_empty() {
        return Err(RhiError::InvalidHandle(
            "cannot upload an empty buffer".to_string(),
        ));
    }

    let size = bytes.len() as u64;
    let staging = gpu.create_buffer(BufferUsage::Staging, size)?;
    gpu.write_buffer(&staging, bytes)?;

    let buffer = gpu.create_buffer(usage, size)?;
    immediate.submit(gpu, |commands| {
        gpu.cmd_copy_buffer(commands, &staging, &buffer, size);
        Ok(())
    })?;
    drop(staging);

    debug!("Uploaded {} bytes to {} buffer", size, usage.name());
    Ok(buffer)
}

/// A storage buffer bound into one descriptor set slot.
///
/// The buffer is replaced wholesale on [`swap`](Self::swap); frames recorded
/// afterwards see the new contents through the same set.
pub struct StorageBinding<G: GpuDevice> {
    buffer: Option<G::Buffer>,
    set: G::DescriptorSet,
    binding: u32,
    element_count: u32,
}

impl<G: GpuDevice> StorageBinding<G> {
    /// An empty binding targeting `binding` of `set`.
    pub fn new(set: G::DescriptorSet, binding: u32) -> Self {
        Self {
            buffer: None,
            set,
            binding,
            element_count: 0,
        }
    }

    /// Replaces the bound buffer with one holding `bytes`.
    ///
    /// Waits for the device to go idle first, since submitted frames may
    /// still read the old buffer. On failure the binding is left empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait, the upload or buffer creation fails.
    pub fn swap(
        &mut self,
        gpu: &G,
        immediate: &mut ImmediateSubmitter<G>,
        bytes: &[u8],
        element_count: u32,
    ) -> RhiResult<()> {
        gpu.wait_idle()?;
        self.buffer = None;
        self.element_count = 0;

        let buffer = upload(gpu, immediate, BufferUsage::Storage, bytes)?;
        gpu.write_storage_buffer(self.set, self.binding, &buffer);

        self.buffer = Some(buffer);
        self.element_count = element_count;
        info!(
            "Storage binding {} now holds {} element(s)",
            self.binding, element_count
        );
        Ok(())
    }

    /// The bound buffer, if any.
    #[inline]
    pub fn buffer(&self) -> Option<&G::Buffer> {
        self.buffer.as_ref()
    }

    /// The descriptor set the buffer is written into.
    #[inline]
    pub fn set(&self) -> G::DescriptorSet {
        self.set
    }

    /// Number of elements in the bound buffer.
    #[inline]
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// True when no buffer is bound.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_none()
    }
}
