//! The frame slot ring.
//!
//! [`FrameRing`] keeps [`FRAME_OVERLAP`] slots and a monotonically
//! increasing frame counter; frame `n` uses slot `n % FRAME_OVERLAP`.
//! Before a slot is reused its completion fence is waited on, which bounds
//! GPU work in flight to [`FRAME_OVERLAP`] frames.

use std::time::Duration;

use ash::vk;
use tracing::{debug, info, trace};

use renderer_rhi::RhiResult;
use renderer_rhi::gpu::{GpuDevice, QueueKind, Submission};

use crate::frame::{FrameContext, FrameSlot, PerQueue, SlotState};

/// Number of frames that may be in flight at once.
pub const FRAME_OVERLAP: usize = 2;

/// Queue submission order within one frame. Graphics is last: it waits on
/// the acquired image and signals presentation and the completion fence.
pub const SUBMIT_ORDER: [QueueKind; QueueKind::COUNT] =
    [QueueKind::Transfer, QueueKind::Compute, QueueKind::Graphics];

/// Fixed rotation of frame slots.
pub struct FrameRing<G: GpuDevice> {
    slots: Vec<FrameSlot<G>>,
    frame_number: u64,
}

impl<G: GpuDevice> FrameRing<G> {
    /// Creates [`FRAME_OVERLAP`] slots.
    ///
    /// # Errors
    ///
    /// Returns an error if any slot resource cannot be created.
    pub fn new(gpu: &G) -> RhiResult<Self> {
        let slots = (0..FRAME_OVERLAP)
            .map(|i| {
                debug!("Creating frame slot {}", i);
                FrameSlot::new(gpu)
            })
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Frame ring created with {} slots", FRAME_OVERLAP);

        Ok(Self {
            slots,
            frame_number: 0,
        })
    }

    /// Number of frames begun and submitted so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Slot used by the current frame.
    #[inline]
    pub fn current_index(&self) -> usize {
        (self.frame_number % FRAME_OVERLAP as u64) as usize
    }

    /// Returns the current slot.
    #[inline]
    pub fn current(&self) -> &FrameSlot<G> {
        &self.slots[self.current_index()]
    }

    /// Returns the current slot mutably.
    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameSlot<G> {
        let index = self.current_index();
        &mut self.slots[index]
    }

    /// Returns slot `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= FRAME_OVERLAP`.
    #[inline]
    pub fn slot(&self, index: usize) -> &FrameSlot<G> {
        &self.slots[index]
    }

    /// Returns slot `index` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= FRAME_OVERLAP`.
    #[inline]
    pub fn slot_mut(&mut self, index: usize) -> &mut FrameSlot<G> {
        &mut self.slots[index]
    }

    /// Makes the current slot ready for recording.
    ///
    /// Waits for the slot's previous submission, resets its completion
    /// fence, flushes its deletion queue and opens the graphics context.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`](renderer_rhi::RhiError::Timeout) if the
    /// previous submission did not finish within `timeout`.
    pub fn begin_frame(&mut self, gpu: &G, timeout: Duration) -> RhiResult<()> {
        let index = self.current_index();
        let frame_number = self.frame_number;
        let slot = &mut self.slots[index];
        debug_assert_ne!(
            slot.state,
            SlotState::Recording,
            "frame slot {index} begun twice"
        );

        gpu.wait_for_fence(&slot.sync.completion, timeout, "frame completion")?;
        slot.state = SlotState::Idle;
        gpu.reset_fence(&slot.sync.completion)?;

        let flushed = slot.deletion_queue.flush();
        if flushed > 0 {
            trace!(
                "Frame {} (slot {}): flushed {} deferred deletion(s)",
                frame_number, index, flushed
            );
        }

        slot.active = PerQueue::default();
        gpu.begin_commands(&slot.commands[QueueKind::Graphics])?;
        slot.active[QueueKind::Graphics] = true;
        slot.state = SlotState::Recording;

        Ok(())
    }

    /// Hands the current slot to recording code.
    pub fn context<'a>(
        &'a mut self,
        gpu: &'a G,
        image_index: u32,
        target_image: G::Image,
        target_extent: vk::Extent2D,
    ) -> FrameContext<'a, G> {
        let slot_index = self.current_index();
        let frame_number = self.frame_number;
        let slot = &mut self.slots[slot_index];
        debug_assert_eq!(slot.state, SlotState::Recording);

        FrameContext {
            gpu,
            slot,
            slot_index,
            frame_number,
            image_index,
            target_image,
            target_extent,
        }
    }

    /// Ends and submits every context opened for the current frame.
    ///
    /// Contexts go out in [`SUBMIT_ORDER`], each waiting on the handoff
    /// semaphore of the one before. The graphics submission waits on the
    /// acquire semaphore and signals the release semaphore and the
    /// completion fence.
    ///
    /// # Errors
    ///
    /// Returns an error if ending a context or submitting fails.
    pub fn submit_frame(&mut self, gpu: &G) -> RhiResult<()> {
        let slot = self.current_mut();
        debug_assert_eq!(
            slot.state,
            SlotState::Recording,
            "submitting a frame slot that is not recording"
        );

        let sync = &slot.sync;
        let mut previous: Option<QueueKind> = None;

        for kind in SUBMIT_ORDER {
            if !slot.active[kind] {
                continue;
            }

            let commands = &slot.commands[kind];
            gpu.end_commands(commands)?;

            let mut submission = Submission::<G>::new();
            if let Some(previous) = previous {
                submission = submission.wait(
                    &sync.handoff[previous],
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                );
            }

            submission = if kind == QueueKind::Graphics {
                submission
                    .wait(
                        &sync.acquire,
                        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    )
                    .signal(&sync.release, vk::PipelineStageFlags2::ALL_GRAPHICS)
                    .fence(&sync.completion)
            } else {
                submission.signal(&sync.handoff[kind], vk::PipelineStageFlags2::ALL_COMMANDS)
            };

            gpu.submit(kind, commands, &submission)?;
            previous = Some(kind);
        }

        slot.state = SlotState::Submitted;
        Ok(())
    }

    /// Closes a frame that failed between [`begin_frame`](Self::begin_frame)
    /// and [`submit_frame`](Self::submit_frame).
    ///
    /// Open contexts are ended and an empty graphics submission re-signals
    /// the completion fence, so the next use of the slot waits normally.
    /// When `acquired` is set that submission also consumes the acquire
    /// semaphore. Does nothing unless the slot is recording.
    ///
    /// # Errors
    ///
    /// Returns an error if ending, re-recording or submitting fails.
    pub fn abandon_frame(&mut self, gpu: &G, acquired: bool) -> RhiResult<()> {
        let frame_number = self.frame_number;
        let slot = self.current_mut();
        if slot.state != SlotState::Recording {
            return Ok(());
        }

        for kind in SUBMIT_ORDER {
            if slot.active[kind] {
                gpu.end_commands(&slot.commands[kind])?;
            }
        }
        slot.active = PerQueue::default();

        // Re-beginning an ended context discards what was recorded.
        let graphics = &slot.commands[QueueKind::Graphics];
        gpu.begin_commands(graphics)?;
        gpu.end_commands(graphics)?;

        let mut submission = Submission::<G>::new().fence(&slot.sync.completion);
        if acquired {
            submission = submission.wait(
                &slot.sync.acquire,
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            );
        }
        gpu.submit(QueueKind::Graphics, graphics, &submission)?;

        slot.state = SlotState::Submitted;
        debug!("Frame {} abandoned", frame_number);
        Ok(())
    }

    /// Moves to the next frame.
    #[inline]
    pub fn advance(&mut self) {
        self.frame_number += 1;
    }

    /// Flushes every slot's deletion queue, returning how many actions ran.
    ///
    /// Only valid once the device is idle.
    pub fn flush_all(&mut self) -> usize {
        self.slots
            .iter_mut()
            .map(|slot| slot.deletion_queue.flush())
            .sum()
    }
}
