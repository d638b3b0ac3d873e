//! In-memory GPU and presentation target for scheduling tests.
//!
//! Every call is appended to a shared event log. Fences signal on submit
//! unless auto-completion is turned off, in which case they stay pending
//! until [`MockGpu::complete_all`] is called.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use renderer_rhi::buffer::BufferUsage;
use renderer_rhi::gpu::{AcquiredImage, GpuDevice, PresentTarget, QueueKind, Submission};
use renderer_rhi::vk;
use renderer_rhi::{RhiError, RhiResult};

/// One recorded submission.
#[derive(Clone, Debug, PartialEq)]
pub struct SubmitRecord {
    pub queue: QueueKind,
    pub commands: u32,
    pub waits: Vec<(u32, vk::PipelineStageFlags2)>,
    pub signals: Vec<u32>,
    pub fence: Option<u32>,
}

/// Something the mock observed.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    WaitFence(u32),
    ResetFence(u32),
    WaitIdle,
    Begin(u32),
    End(u32),
    Submit(SubmitRecord),
    Transition {
        image: u64,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    },
    CopyBuffer {
        src: u32,
        dst: u32,
        size: u64,
    },
    CreateBuffer {
        id: u32,
        usage: BufferUsage,
        size: u64,
    },
    WriteBuffer {
        id: u32,
        len: usize,
    },
    DropBuffer(u32),
    WriteDescriptor {
        set: u32,
        binding: u32,
        buffer: u32,
    },
    ResetPool(u32),
    DestroyPool(u32),
    Acquire,
    Present(u32),
    Rebuild,
    Note(&'static str),
}

struct State {
    events: Vec<Event>,
    next_id: u32,
    signaled: HashSet<u32>,
    pending: Vec<u32>,
    auto_complete: bool,
}

/// Cloneable handle to the shared mock state.
#[derive(Clone)]
pub struct MockGpu {
    state: Arc<Mutex<State>>,
}

#[derive(Debug)]
pub struct MockFence {
    pub id: u32,
}

#[derive(Debug)]
pub struct MockSemaphore {
    pub id: u32,
}

#[derive(Debug)]
pub struct MockCommands {
    pub id: u32,
    pub queue: QueueKind,
}

#[derive(Debug)]
pub struct MockPool {
    pub id: u32,
}

#[derive(Debug)]
pub struct MockLayout {
    pub id: u32,
}

/// Logs its own release.
pub struct MockBuffer {
    pub id: u32,
    pub size: u64,
    gpu: MockGpu,
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        self.gpu.log(Event::DropBuffer(self.id));
    }
}

impl MockGpu {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                events: Vec::new(),
                next_id: 1,
                signaled: HashSet::new(),
                pending: Vec::new(),
                auto_complete: true,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn next_id(&self) -> u32 {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    pub fn log(&self, event: Event) {
        self.lock().events.push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// When off, submitted fences stay unsignaled until `complete_all`.
    pub fn set_auto_complete(&self, enabled: bool) {
        self.lock().auto_complete = enabled;
    }

    /// Signals every fence submitted while auto-completion was off.
    pub fn complete_all(&self) {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        state.signaled.extend(pending);
    }

    pub fn submits(&self) -> Vec<SubmitRecord> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Submit(record) => Some(record),
                _ => None,
            })
            .collect()
    }

    /// Position of the first event matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(predicate)
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl GpuDevice for MockGpu {
    type Fence = MockFence;
    type Semaphore = MockSemaphore;
    type Commands = MockCommands;
    type DescriptorPool = MockPool;
    type DescriptorLayout = MockLayout;
    type DescriptorSet = u32;
    type Buffer = MockBuffer;
    type Image = u64;

    fn create_fence(&self, signaled: bool) -> RhiResult<MockFence> {
        let id = self.next_id();
        if signaled {
            self.lock().signaled.insert(id);
        }
        Ok(MockFence { id })
    }

    fn create_semaphore(&self) -> RhiResult<MockSemaphore> {
        Ok(MockSemaphore { id: self.next_id() })
    }

    fn wait_for_fence(
        &self,
        fence: &MockFence,
        _timeout: Duration,
        operation: &'static str,
    ) -> RhiResult<()> {
        self.log(Event::WaitFence(fence.id));
        if self.lock().signaled.contains(&fence.id) {
            Ok(())
        } else {
            Err(RhiError::Timeout { operation })
        }
    }

    fn reset_fence(&self, fence: &MockFence) -> RhiResult<()> {
        self.log(Event::ResetFence(fence.id));
        self.lock().signaled.remove(&fence.id);
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        self.log(Event::WaitIdle);
        self.complete_all();
        Ok(())
    }

    fn create_commands(&self, queue: QueueKind) -> RhiResult<MockCommands> {
        Ok(MockCommands {
            id: self.next_id(),
            queue,
        })
    }

    fn begin_commands(&self, commands: &MockCommands) -> RhiResult<()> {
        self.log(Event::Begin(commands.id));
        Ok(())
    }

    fn end_commands(&self, commands: &MockCommands) -> RhiResult<()> {
        self.log(Event::End(commands.id));
        Ok(())
    }

    fn submit(
        &self,
        queue: QueueKind,
        commands: &MockCommands,
        submission: &Submission<'_, Self>,
    ) -> RhiResult<()> {
        assert_eq!(commands.queue, queue, "commands submitted to the wrong queue");

        let record = SubmitRecord {
            queue,
            commands: commands.id,
            waits: submission
                .waits
                .iter()
                .map(|(semaphore, stage)| (semaphore.id, *stage))
                .collect(),
            signals: submission.signals.iter().map(|(s, _)| s.id).collect(),
            fence: submission.fence.map(|fence| fence.id),
        };

        let mut state = self.lock();
        state.events.push(Event::Submit(record));
        if let Some(fence) = submission.fence {
            if state.auto_complete {
                state.signaled.insert(fence.id);
            } else {
                state.pending.push(fence.id);
            }
        }
        Ok(())
    }

    fn cmd_transition_image(
        &self,
        _commands: &MockCommands,
        image: u64,
        from: vk::ImageLayout,
        to: vk::ImageLayout,
    ) {
        self.log(Event::Transition { image, from, to });
    }

    fn cmd_copy_buffer(&self, _commands: &MockCommands, src: &MockBuffer, dst: &MockBuffer, size: u64) {
        self.log(Event::CopyBuffer {
            src: src.id,
            dst: dst.id,
            size,
        });
    }

    fn create_descriptor_layout(
        &self,
        _bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<MockLayout> {
        Ok(MockLayout { id: self.next_id() })
    }

    fn create_descriptor_pool(
        &self,
        _max_sets: u32,
        _sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<MockPool> {
        Ok(MockPool { id: self.next_id() })
    }

    fn allocate_descriptor_set(&self, _pool: &MockPool, _layout: &MockLayout) -> RhiResult<u32> {
        Ok(self.next_id())
    }

    fn reset_descriptor_pool(&self, pool: &MockPool) -> RhiResult<()> {
        self.log(Event::ResetPool(pool.id));
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: MockPool) {
        self.log(Event::DestroyPool(pool.id));
    }

    fn write_storage_buffer(&self, set: u32, binding: u32, buffer: &MockBuffer) {
        self.log(Event::WriteDescriptor {
            set,
            binding,
            buffer: buffer.id,
        });
    }

    fn create_buffer(&self, usage: BufferUsage, size: u64) -> RhiResult<MockBuffer> {
        let id = self.next_id();
        self.log(Event::CreateBuffer { id, usage, size });
        Ok(MockBuffer {
            id,
            size,
            gpu: self.clone(),
        })
    }

    fn write_buffer(&self, buffer: &MockBuffer, data: &[u8]) -> RhiResult<()> {
        self.log(Event::WriteBuffer {
            id: buffer.id,
            len: data.len(),
        });
        Ok(())
    }
}

/// Result of one scripted acquire.
#[derive(Clone, Copy, Debug)]
pub enum AcquireOutcome {
    Ready,
    Suboptimal,
    OutOfDate,
}

/// Base value of image handles handed out by [`MockTarget`].
pub const IMAGE_BASE: u64 = 100;

/// Presentation target with scripted acquire and present results.
/// Unscripted calls succeed.
pub struct MockTarget {
    gpu: MockGpu,
    image_count: u32,
    next_image: u32,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<RhiResult<bool>>,
    rebuilds: Arc<Mutex<u32>>,
}

impl MockTarget {
    pub fn new(gpu: &MockGpu) -> Self {
        Self {
            gpu: gpu.clone(),
            image_count: 3,
            next_image: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            rebuilds: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_acquires(mut self, outcomes: &[AcquireOutcome]) -> Self {
        self.acquire_script.extend(outcomes.iter().copied());
        self
    }

    pub fn with_presents(mut self, results: Vec<RhiResult<bool>>) -> Self {
        self.present_script.extend(results);
        self
    }

    /// Shared rebuild counter, readable after the target is moved.
    pub fn rebuild_counter(&self) -> Arc<Mutex<u32>> {
        self.rebuilds.clone()
    }
}

impl PresentTarget<MockGpu> for MockTarget {
    fn acquire_next_image(
        &mut self,
        _signal: &MockSemaphore,
        _timeout: Duration,
    ) -> RhiResult<AcquiredImage> {
        self.gpu.log(Event::Acquire);
        let outcome = self
            .acquire_script
            .pop_front()
            .unwrap_or(AcquireOutcome::Ready);

        let index = self.next_image;
        match outcome {
            AcquireOutcome::OutOfDate => Err(RhiError::OutOfDate),
            AcquireOutcome::Ready | AcquireOutcome::Suboptimal => {
                self.next_image = (self.next_image + 1) % self.image_count;
                Ok(AcquiredImage {
                    index,
                    suboptimal: matches!(outcome, AcquireOutcome::Suboptimal),
                })
            }
        }
    }

    fn present(&mut self, image_index: u32, _wait: &MockSemaphore) -> RhiResult<bool> {
        self.gpu.log(Event::Present(image_index));
        self.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn rebuild(&mut self) -> RhiResult<()> {
        self.gpu.log(Event::Rebuild);
        *self.rebuilds.lock().unwrap() += 1;
        self.next_image = 0;
        Ok(())
    }

    fn image(&self, index: u32) -> u64 {
        IMAGE_BASE + u64::from(index)
    }

    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: 800,
            height: 600,
        }
    }
}
