//! Immediate submission channel against the mock GPU.

mod common;

use std::time::Duration;

use common::{Event, MockGpu};
use renderer_renderer::{ImmediateSubmitter, upload};
use renderer_rhi::RhiError;
use renderer_rhi::buffer::BufferUsage;
use renderer_rhi::gpu::QueueKind;

const TIMEOUT: Duration = Duration::from_millis(1000);

#[test]
fn test_sequential_submissions_never_overlap() {
    let gpu = MockGpu::new();
    let mut immediate = ImmediateSubmitter::new(&gpu, TIMEOUT).unwrap();

    immediate
        .submit(&gpu, |_| {
            gpu.log(Event::Note("first"));
            Ok(())
        })
        .unwrap();
    immediate
        .submit(&gpu, |_| {
            gpu.log(Event::Note("second"));
            Ok(())
        })
        .unwrap();

    let events = gpu.events();
    let first_wait = events
        .iter()
        .position(|e| matches!(e, Event::WaitFence(_)))
        .unwrap();
    let second_begin = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, Event::Begin(_)))
        .map(|(i, _)| i)
        .nth(1)
        .unwrap();
    let second_record = events
        .iter()
        .position(|e| *e == Event::Note("second"))
        .unwrap();

    assert!(first_wait < second_begin);
    assert!(second_begin < second_record);
    assert_eq!(immediate.submissions(), 2);
}

#[test]
fn test_submission_goes_to_graphics_with_fence() {
    let gpu = MockGpu::new();
    let mut immediate = ImmediateSubmitter::new(&gpu, TIMEOUT).unwrap();
    immediate.submit(&gpu, |_| Ok(())).unwrap();

    let submits = gpu.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].queue, QueueKind::Graphics);
    assert!(submits[0].waits.is_empty());
    assert!(submits[0].signals.is_empty());
    let fence = submits[0].fence.expect("immediate work carries a fence");

    // Reset before submitting, waited on after.
    let events = gpu.events();
    let reset = events.iter().position(|e| *e == Event::ResetFence(fence)).unwrap();
    let submit = events
        .iter()
        .position(|e| matches!(e, Event::Submit(_)))
        .unwrap();
    let wait = events.iter().position(|e| *e == Event::WaitFence(fence)).unwrap();
    assert!(reset < submit && submit < wait);
}

#[test]
fn test_stalled_submission_times_out() {
    let gpu = MockGpu::new();
    gpu.set_auto_complete(false);
    let mut immediate = ImmediateSubmitter::new(&gpu, TIMEOUT).unwrap();

    let err = immediate.submit(&gpu, |_| Ok(())).unwrap_err();
    assert!(matches!(
        err,
        RhiError::Timeout {
            operation: "immediate submission"
        }
    ));
    assert_eq!(immediate.submissions(), 0);
}

#[test]
fn test_record_error_skips_submit() {
    let gpu = MockGpu::new();
    let mut immediate = ImmediateSubmitter::new(&gpu, TIMEOUT).unwrap();

    let err = immediate
        .submit(&gpu, |_| Err(RhiError::InvalidHandle("bad copy".to_string())))
        .unwrap_err();
    assert!(matches!(err, RhiError::InvalidHandle(_)));
    assert!(gpu.submits().is_empty());
}

#[test]
fn test_upload_copies_through_staging() {
    let gpu = MockGpu::new();
    let mut immediate = ImmediateSubmitter::new(&gpu, TIMEOUT).unwrap();

    let buffer = upload(&gpu, &mut immediate, BufferUsage::Storage, &[7u8; 96]).unwrap();
    assert_eq!(buffer.size, 96);

    let events = gpu.events();
    let staging = events
        .iter()
        .find_map(|e| match e {
            Event::CreateBuffer {
                id,
                usage: BufferUsage::Staging,
                ..
            } => Some(*id),
            _ => None,
        })
        .unwrap();

    assert!(events.contains(&Event::WriteBuffer {
        id: staging,
        len: 96
    }));
    assert!(events.contains(&Event::CopyBuffer {
        src: staging,
        dst: buffer.id,
        size: 96
    }));

    // Staging memory goes away only after the copy has been waited on.
    let wait = events
        .iter()
        .position(|e| matches!(e, Event::WaitFence(_)))
        .unwrap();
    let released = events
        .iter()
        .position(|e| *e == Event::DropBuffer(staging))
        .unwrap();
    assert!(wait < released);
    assert!(!events.contains(&Event::DropBuffer(buffer.id)));
}

#[test]
fn test_empty_upload_is_rejected() {
    let gpu = MockGpu::new();
    let mut immediate = ImmediateSubmitter::new(&gpu, TIMEOUT).unwrap();

    let result = upload(&gpu, &mut immediate, BufferUsage::Storage, &[]);
    assert!(matches!(result, Err(RhiError::InvalidHandle(_))));
    assert!(gpu.submits().is_empty());
}
