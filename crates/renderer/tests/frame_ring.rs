//! Frame ring scheduling against the mock GPU.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Event, MockGpu};
use renderer_renderer::{FRAME_OVERLAP, FrameRing, SlotState};
use renderer_rhi::RhiError;
use renderer_rhi::gpu::QueueKind;
use renderer_rhi::vk;

const TIMEOUT: Duration = Duration::from_millis(100);

#[test]
fn test_slot_deletions_flush_when_slot_is_reused() {
    let gpu = MockGpu::new();
    let mut ring = FrameRing::new(&gpu).unwrap();

    let cycle = Arc::new(Mutex::new(0u64));
    let flushes: Arc<Mutex<Vec<(usize, u64)>>> = Arc::new(Mutex::new(Vec::new()));

    let register = |ring: &mut FrameRing<MockGpu>, slot: usize| {
        let cycle = cycle.clone();
        let flushes = flushes.clone();
        ring.slot_mut(slot)
            .deletion_queue()
            .push(move || flushes.lock().unwrap().push((slot, *cycle.lock().unwrap())));
    };

    // One action per slot up front, so even the first use of a slot flushes
    // something observable.
    for slot in 0..FRAME_OVERLAP {
        register(&mut ring, slot);
    }

    for n in 0..5u64 {
        *cycle.lock().unwrap() = n;
        ring.begin_frame(&gpu, TIMEOUT).unwrap();
        let slot = ring.current_index();
        assert_eq!(slot, (n % 2) as usize);
        register(&mut ring, slot);
        ring.submit_frame(&gpu).unwrap();
        ring.advance();
    }

    let flushes = flushes.lock().unwrap().clone();
    let cycles_for = |slot: usize| -> Vec<u64> {
        flushes
            .iter()
            .filter(|(s, _)| *s == slot)
            .map(|(_, c)| *c)
            .collect()
    };

    assert_eq!(cycles_for(0), vec![0, 2, 4]);
    assert_eq!(cycles_for(1), vec![1, 3]);
    assert_eq!(ring.frame_number(), 5);
}

#[test]
fn test_at_most_two_frames_in_flight() {
    let gpu = MockGpu::new();
    gpu.set_auto_complete(false);
    let mut ring = FrameRing::new(&gpu).unwrap();

    // Fresh slots start signaled, so two frames go out without any GPU progress.
    for _ in 0..FRAME_OVERLAP {
        ring.begin_frame(&gpu, TIMEOUT).unwrap();
        ring.submit_frame(&gpu).unwrap();
        ring.advance();
    }

    // The third frame reuses slot 0, whose work has not completed.
    let err = ring.begin_frame(&gpu, TIMEOUT).unwrap_err();
    assert!(matches!(
        err,
        RhiError::Timeout {
            operation: "frame completion"
        }
    ));
    assert_eq!(ring.current().state(), SlotState::Submitted);

    gpu.complete_all();
    ring.begin_frame(&gpu, TIMEOUT).unwrap();
    assert_eq!(ring.current().state(), SlotState::Recording);
}

#[test]
fn test_begin_waits_before_reset_and_flush() {
    let gpu = MockGpu::new();
    let mut ring = FrameRing::new(&gpu).unwrap();
    let fence = ring.current().sync().completion.id;

    let log = gpu.clone();
    ring.current_mut()
        .deletion_queue()
        .push(move || log.log(Event::Note("deferred")));
    ring.begin_frame(&gpu, TIMEOUT).unwrap();

    let wait = gpu.position(|e| *e == Event::WaitFence(fence)).unwrap();
    let reset = gpu.position(|e| *e == Event::ResetFence(fence)).unwrap();
    let flush = gpu.position(|e| *e == Event::Note("deferred")).unwrap();
    assert!(wait < reset);
    assert!(reset < flush);
}

#[test]
fn test_graphics_only_frame_waits_acquire_and_signals_release() {
    let gpu = MockGpu::new();
    let mut ring = FrameRing::new(&gpu).unwrap();
    ring.begin_frame(&gpu, TIMEOUT).unwrap();
    ring.submit_frame(&gpu).unwrap();

    let sync = ring.current().sync();
    let submits = gpu.submits();
    assert_eq!(submits.len(), 1);

    let graphics = &submits[0];
    assert_eq!(graphics.queue, QueueKind::Graphics);
    assert_eq!(
        graphics.waits,
        vec![(
            sync.acquire.id,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        )]
    );
    assert_eq!(graphics.signals, vec![sync.release.id]);
    assert_eq!(graphics.fence, Some(sync.completion.id));
}

#[test]
fn test_cross_queue_work_is_chained_by_handoff() {
    let gpu = MockGpu::new();
    let mut ring = FrameRing::new(&gpu).unwrap();
    ring.begin_frame(&gpu, TIMEOUT).unwrap();

    {
        let mut frame = ring.context(&gpu, 0, 100, vk::Extent2D::default());
        // Opened out of order on purpose; submission order is fixed.
        frame.commands(QueueKind::Compute).unwrap();
        frame.commands(QueueKind::Transfer).unwrap();
        frame.commands(QueueKind::Compute).unwrap();
    }
    ring.submit_frame(&gpu).unwrap();

    let sync = ring.current().sync();
    let submits = gpu.submits();
    let queues: Vec<QueueKind> = submits.iter().map(|s| s.queue).collect();
    assert_eq!(
        queues,
        vec![QueueKind::Transfer, QueueKind::Compute, QueueKind::Graphics]
    );

    let transfer = sync.handoff[QueueKind::Transfer].id;
    let compute = sync.handoff[QueueKind::Compute].id;

    assert!(submits[0].waits.is_empty());
    assert_eq!(submits[0].signals, vec![transfer]);
    assert_eq!(submits[0].fence, None);

    assert_eq!(submits[1].waits.len(), 1);
    assert_eq!(submits[1].waits[0].0, transfer);
    assert_eq!(submits[1].signals, vec![compute]);
    assert_eq!(submits[1].fence, None);

    let graphics_waits: Vec<u32> = submits[2].waits.iter().map(|(id, _)| *id).collect();
    assert_eq!(graphics_waits, vec![compute, sync.acquire.id]);
    assert_eq!(submits[2].signals, vec![sync.release.id]);
    assert_eq!(submits[2].fence, Some(sync.completion.id));
}

#[test]
fn test_each_context_begins_once_per_frame() {
    let gpu = MockGpu::new();
    let mut ring = FrameRing::new(&gpu).unwrap();
    ring.begin_frame(&gpu, TIMEOUT).unwrap();

    {
        let mut frame = ring.context(&gpu, 0, 100, vk::Extent2D::default());
        frame.commands(QueueKind::Transfer).unwrap();
        frame.commands(QueueKind::Transfer).unwrap();
    }

    let begins = gpu.count(|e| matches!(e, Event::Begin(_)));
    assert_eq!(begins, 2, "graphics plus one transfer begin");
}

#[test]
fn test_abandoned_frame_ends_open_contexts_and_resignals_fence() {
    let gpu = MockGpu::new();
    let mut ring = FrameRing::new(&gpu).unwrap();

    // Nothing to abandon before a frame has begun.
    ring.abandon_frame(&gpu, false).unwrap();
    assert!(gpu.submits().is_empty());

    ring.begin_frame(&gpu, TIMEOUT).unwrap();
    {
        let mut frame = ring.context(&gpu, 0, 100, vk::Extent2D::default());
        frame.commands(QueueKind::Transfer).unwrap();
    }
    ring.abandon_frame(&gpu, false).unwrap();
    assert_eq!(ring.current().state(), SlotState::Submitted);

    let ends = gpu.count(|e| matches!(e, Event::End(_)));
    assert_eq!(ends, 3, "graphics and transfer ended, then the empty graphics re-record");

    let submits = gpu.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].queue, QueueKind::Graphics);
    assert_eq!(submits[0].fence, Some(ring.current().sync().completion.id));

    // The same slot can be begun again without any other GPU progress.
    ring.begin_frame(&gpu, TIMEOUT).unwrap();
    assert_eq!(ring.current().state(), SlotState::Recording);
}
