//! Per-slot frame resources.
//!
//! A [`FrameSlot`] owns one recording context per [`QueueKind`], the
//! [`SyncSet`] that orders its work against presentation, and the
//! [`DeletionQueue`] for objects its last submission may still read.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on completion (CPU waits for the previous use of this slot)
//! 2. Reset completion, flush the slot's deletion queue
//! 3. Acquire target image (signals acquire)
//! 4. Record transfer / compute / graphics work
//! 5. Submit transfer -> compute -> graphics, chained by handoff semaphores;
//!    graphics waits on acquire, signals release and completion
//! 6. Present (waits on release)
//! ```

use std::ops::{Index, IndexMut};

use ash::vk;

use renderer_rhi::RhiResult;
use renderer_rhi::gpu::{GpuDevice, QueueKind};

use crate::deletion_queue::DeletionQueue;

/// One value per [`QueueKind`], indexed by the kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PerQueue<T>(pub [T; QueueKind::COUNT]);

impl<T> PerQueue<T> {
    /// Builds each entry from its kind, stopping at the first error in kind
    /// order. Entries built before the failure are dropped.
    pub fn try_from_fn<E>(mut f: impl FnMut(QueueKind) -> Result<T, E>) -> Result<Self, E> {
        let compute = f(QueueKind::Compute)?;
        let graphics = f(QueueKind::Graphics)?;
        let transfer = f(QueueKind::Transfer)?;
        Ok(Self([compute, graphics, transfer]))
    }
}

impl<T> Index<QueueKind> for PerQueue<T> {
    type Output = T;

    #[inline]
    fn index(&self, kind: QueueKind) -> &T {
        &self.0[kind.index()]
    }
}

impl<T> IndexMut<QueueKind> for PerQueue<T> {
    #[inline]
    fn index_mut(&mut self, kind: QueueKind) -> &mut T {
        &mut self.0[kind.index()]
    }
}

/// The synchronization primitives of one slot.
pub struct SyncSet<G: GpuDevice> {
    /// Signaled when the acquired target image may be written.
    pub acquire: G::Semaphore,
    /// Signaled when rendering finished and the image may be presented.
    pub release: G::Semaphore,
    /// CPU-observable; signaled when all of the slot's work finished.
    /// Created signaled.
    pub completion: G::Fence,
    /// Signaled by a queue's submission for the next queue in the chain.
    pub handoff: PerQueue<G::Semaphore>,
}

impl<G: GpuDevice> SyncSet<G> {
    /// Creates the primitives; the completion fence starts signaled so the
    /// first wait on a fresh slot returns at once.
    ///
    /// # Errors
    ///
    /// Returns an error if any primitive cannot be created.
    pub fn new(gpu: &G) -> RhiResult<Self> {
        Ok(Self {
            acquire: gpu.create_semaphore()?,
            release: gpu.create_semaphore()?,
            completion: gpu.create_fence(true)?,
            handoff: PerQueue::try_from_fn(|_| gpu.create_semaphore())?,
        })
    }
}

/// Lifecycle of a slot within one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Not yet begun, or its previous submission has been waited on.
    Idle,
    /// Recording contexts are open.
    Recording,
    /// Handed to the GPU; the completion fence tracks it.
    Submitted,
}

/// Recording resources, synchronization and deferred deletions of one slot.
pub struct FrameSlot<G: GpuDevice> {
    pub(crate) commands: PerQueue<G::Commands>,
    /// Which contexts were begun during the current recording.
    pub(crate) active: PerQueue<bool>,
    pub(crate) sync: SyncSet<G>,
    pub(crate) deletion_queue: DeletionQueue,
    pub(crate) state: SlotState,
}

impl<G: GpuDevice> FrameSlot<G> {
    /// Creates a slot with a context for every queue kind.
    ///
    /// # Errors
    ///
    /// Returns an error if a context or primitive cannot be created.
    pub fn new(gpu: &G) -> RhiResult<Self> {
        Ok(Self {
            commands: PerQueue::try_from_fn(|kind| gpu.create_commands(kind))?,
            active: PerQueue::default(),
            sync: SyncSet::new(gpu)?,
            deletion_queue: DeletionQueue::new(),
            state: SlotState::Idle,
        })
    }

    /// Returns the slot's synchronization primitives.
    #[inline]
    pub fn sync(&self) -> &SyncSet<G> {
        &self.sync
    }

    /// Returns the slot's deletion queue.
    #[inline]
    pub fn deletion_queue(&mut self) -> &mut DeletionQueue {
        &mut self.deletion_queue
    }

    /// Number of actions waiting for this slot's next reuse.
    #[inline]
    pub fn pending_deletions(&self) -> usize {
        self.deletion_queue.len()
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }
}

/// What recording code sees of the frame being built.
///
/// Recording code may record commands and register deferred deletions; it
/// never submits, waits or presents.
pub struct FrameContext<'a, G: GpuDevice> {
    pub(crate) gpu: &'a G,
    pub(crate) slot: &'a mut FrameSlot<G>,
    pub(crate) slot_index: usize,
    pub(crate) frame_number: u64,
    pub(crate) image_index: u32,
    pub(crate) target_image: G::Image,
    pub(crate) target_extent: vk::Extent2D,
}

impl<'a, G: GpuDevice> FrameContext<'a, G> {
    /// The device commands are recorded through.
    #[inline]
    pub fn gpu(&self) -> &'a G {
        self.gpu
    }

    /// The graphics context; always open while recording.
    #[inline]
    pub fn graphics(&self) -> &G::Commands {
        &self.slot.commands[QueueKind::Graphics]
    }

    /// The context for `kind`, begun on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if beginning the context fails.
    pub fn commands(&mut self, kind: QueueKind) -> RhiResult<&G::Commands> {
        if !self.slot.active[kind] {
            self.gpu.begin_commands(&self.slot.commands[kind])?;
            self.slot.active[kind] = true;
        }
        Ok(&self.slot.commands[kind])
    }

    /// Deferred deletions that run once this frame's work has finished.
    #[inline]
    pub fn deletion_queue(&mut self) -> &mut DeletionQueue {
        &mut self.slot.deletion_queue
    }

    /// The presentation image acquired for this frame.
    #[inline]
    pub fn target_image(&self) -> G::Image {
        self.target_image
    }

    /// Size of the presentation image.
    #[inline]
    pub fn target_extent(&self) -> vk::Extent2D {
        self.target_extent
    }

    /// Index of the acquired image within the target.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Frame counter value for this frame.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Ring slot this frame records into.
    #[inline]
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }
}
