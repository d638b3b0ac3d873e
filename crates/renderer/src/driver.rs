//! Per-frame orchestration.
//!
//! [`PresentationDriver`] owns the frame ring, the immediate channel, the
//! session-lifetime deletion queue and the presentation target, and runs
//! one frame per [`draw_frame`](PresentationDriver::draw_frame):
//!
//! ```text
//! begin slot -> acquire (rebuild + retry once if out of date)
//!   -> UNDEFINED => TRANSFER_DST -> record -> TRANSFER_DST => PRESENT_SRC
//!   -> submit -> present -> advance
//! ```
//!
//! Out-of-date and suboptimal targets are rebuilt; every other failure is
//! returned to the caller as fatal.

use std::time::Duration;

use ash::vk;
use tracing::{debug, error, info, warn};

use renderer_rhi::buffer::BufferUsage;
use renderer_rhi::gpu::{AcquiredImage, GpuDevice, PresentTarget};
use renderer_rhi::{RhiError, RhiResult};

use crate::deletion_queue::DeletionQueue;
use crate::frame::FrameContext;
use crate::frame_manager::FrameRing;
use crate::immediate::ImmediateSubmitter;
use crate::upload::{self, StorageBinding};

/// Drives acquire, record, submit and present for a presentation target.
pub struct PresentationDriver<G: GpuDevice, T: PresentTarget<G>> {
    ring: FrameRing<G>,
    immediate: ImmediateSubmitter<G>,
    global_deletion: DeletionQueue,
    target: T,
    gpu: G,
    frame_timeout: Duration,
    rebuild_requested: bool,
    rebuilds: u64,
    shut_down: bool,
}

impl<G: GpuDevice, T: PresentTarget<G>> PresentationDriver<G, T> {
    /// Creates the frame ring and immediate channel on `gpu`.
    ///
    /// # Errors
    ///
    /// Returns an error if any slot or immediate resource cannot be created.
    pub fn new(
        gpu: G,
        target: T,
        frame_timeout: Duration,
        immediate_timeout: Duration,
    ) -> RhiResult<Self> {
        let ring = FrameRing::new(&gpu)?;
        let immediate = ImmediateSubmitter::new(&gpu, immediate_timeout)?;

        info!(
            "Presentation driver ready (frame timeout {:?}, immediate timeout {:?})",
            frame_timeout, immediate_timeout
        );

        Ok(Self {
            ring,
            immediate,
            global_deletion: DeletionQueue::new(),
            target,
            gpu,
            frame_timeout,
            rebuild_requested: false,
            rebuilds: 0,
            shut_down: false,
        })
    }

    /// Renders and presents one frame.
    ///
    /// `record` runs with the target image in `TRANSFER_DST_OPTIMAL` and
    /// must leave it in that layout. It records commands and may defer
    /// deletions; it never submits or presents.
    ///
    /// If acquiring or recording fails the frame is abandoned and the slot
    /// stays usable. A failed submission or presentation leaves the slot
    /// in an unknown state and should be treated as terminal.
    ///
    /// # Errors
    ///
    /// Returns an error for timeouts, device failures, a target that is
    /// still out of date after one rebuild, or whatever `record` returns.
    pub fn draw_frame<F>(&mut self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&mut FrameContext<'_, G>) -> RhiResult<()>,
    {
        debug_assert!(!self.shut_down, "draw_frame after shutdown");

        if self.rebuild_requested {
            self.rebuild_target()?;
        }

        self.ring.begin_frame(&self.gpu, self.frame_timeout)?;

        let mut acquired = false;
        let index = match self.record_frame(record, &mut acquired) {
            Ok(index) => index,
            Err(e) => {
                warn!("Abandoning frame {}: {}", self.ring.frame_number(), e);
                if let Err(abandon) = self.ring.abandon_frame(&self.gpu, acquired) {
                    error!("Failed to abandon frame: {}", abandon);
                }
                return Err(e);
            }
        };

        self.ring.submit_frame(&self.gpu)?;

        let presented = {
            let release = &self.ring.current().sync().release;
            self.target.present(index, release)
        };

        match presented {
            Ok(false) => {}
            Ok(true) => {
                debug!("Presentation target is suboptimal; rebuilding next frame");
                self.rebuild_requested = true;
            }
            Err(RhiError::OutOfDate) => {
                warn!("Presentation target out of date at present; rebuilding next frame");
                self.rebuild_requested = true;
            }
            Err(e) => return Err(e),
        }

        self.ring.advance();
        Ok(())
    }

    /// Acquires an image and records the frame around `record`, returning
    /// the image index. `acquired` is set once the acquire semaphore has
    /// been handed to the target.
    fn record_frame<F>(&mut self, record: F, acquired: &mut bool) -> RhiResult<u32>
    where
        F: FnOnce(&mut FrameContext<'_, G>) -> RhiResult<()>,
    {
        let image = self.acquire()?;
        *acquired = true;
        if image.suboptimal {
            debug!("Acquired image {} is suboptimal", image.index);
            self.rebuild_requested = true;
        }

        let target_image = self.target.image(image.index);
        let extent = self.target.extent();
        let gpu = &self.gpu;

        let mut frame = self.ring.context(gpu, image.index, target_image, extent);
        gpu.cmd_transition_image(
            frame.graphics(),
            target_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );

        record(&mut frame)?;

        gpu.cmd_transition_image(
            frame.graphics(),
            target_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        Ok(image.index)
    }

    /// Acquires the next image, rebuilding the target once if it is out of
    /// date.
    fn acquire(&mut self) -> RhiResult<AcquiredImage> {
        match self.try_acquire() {
            Err(RhiError::OutOfDate) => {
                warn!("Presentation target out of date at acquire; rebuilding");
                self.rebuild_target()?;
                self.try_acquire().map_err(|e| match e {
                    RhiError::OutOfDate => RhiError::SwapchainError(
                        "presentation target still out of date after rebuild".to_string(),
                    ),
                    other => other,
                })
            }
            other => other,
        }
    }

    fn try_acquire(&mut self) -> RhiResult<AcquiredImage> {
        let signal = &self.ring.current().sync().acquire;
        self.target.acquire_next_image(signal, self.frame_timeout)
    }

    fn rebuild_target(&mut self) -> RhiResult<()> {
        self.gpu.wait_idle()?;
        self.target.rebuild()?;
        self.rebuild_requested = false;
        self.rebuilds += 1;

        let extent = self.target.extent();
        info!(
            "Presentation target rebuilt ({}x{}), rebuild #{}",
            extent.width, extent.height, self.rebuilds
        );
        Ok(())
    }

    /// Rebuilds the target before the next acquire, e.g. after a resize.
    #[inline]
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    /// Uploads `bytes` to a new device buffer through the immediate channel.
    ///
    /// # Errors
    ///
    /// See [`upload::upload`].
    pub fn upload(&mut self, usage: BufferUsage, bytes: &[u8]) -> RhiResult<G::Buffer> {
        upload::upload(&self.gpu, &mut self.immediate, usage, bytes)
    }

    /// Records with `record` and blocks until the GPU has executed it.
    ///
    /// # Errors
    ///
    /// See [`ImmediateSubmitter::submit`].
    pub fn immediate_submit<F>(&mut self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&G::Commands) -> RhiResult<()>,
    {
        self.immediate.submit(&self.gpu, record)
    }

    /// Replaces the buffer behind `binding` with `bytes`.
    ///
    /// # Errors
    ///
    /// See [`StorageBinding::swap`].
    pub fn swap_storage(
        &mut self,
        binding: &mut StorageBinding<G>,
        bytes: &[u8],
        element_count: u32,
    ) -> RhiResult<()> {
        binding.swap(&self.gpu, &mut self.immediate, bytes, element_count)
    }

    /// Deletion queue flushed once, at shutdown, after every slot queue.
    #[inline]
    pub fn global_deletion_queue(&mut self) -> &mut DeletionQueue {
        &mut self.global_deletion
    }

    /// Waits for the GPU to drain, then flushes every slot's deletion queue
    /// followed by the global one. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot be waited on. Nothing is
    /// destroyed in that case.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        if self.shut_down {
            return Ok(());
        }

        self.gpu.wait_idle()?;
        let slot_actions = self.ring.flush_all();
        let global_actions = self.global_deletion.flush();
        self.shut_down = true;

        info!(
            "Presentation driver shut down after {} frame(s): {} slot and {} global deletion(s)",
            self.ring.frame_number(),
            slot_actions,
            global_actions
        );
        Ok(())
    }

    /// The device.
    #[inline]
    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    /// The presentation target.
    #[inline]
    pub fn target(&self) -> &T {
        &self.target
    }

    /// The presentation target, mutably.
    #[inline]
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// The frame ring.
    #[inline]
    pub fn ring(&self) -> &FrameRing<G> {
        &self.ring
    }

    /// Frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    /// Number of target rebuilds performed.
    #[inline]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// True once [`shutdown`](Self::shutdown) has completed.
    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl<G: GpuDevice, T: PresentTarget<G>> Drop for PresentationDriver<G, T> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Presentation driver shutdown failed: {}", e);
        }
    }
}
