//! Descriptor pool accounting against the mock GPU.

mod common;

use common::{Event, MockGpu};
use renderer_renderer::{
    DeletionQueue, DescriptorAllocator, DescriptorKind, DescriptorLayoutBuilder, PoolSizeRatio,
};
use renderer_rhi::RhiError;
use renderer_rhi::vk;

fn storage_layout(gpu: &MockGpu) -> renderer_renderer::DescriptorLayout<MockGpu> {
    DescriptorLayoutBuilder::new()
        .add_binding(0, DescriptorKind::StorageBuffer)
        .build(gpu, vk::ShaderStageFlags::COMPUTE)
        .unwrap()
}

#[test]
fn test_capacity_ten_allows_exactly_ten_sets() {
    let gpu = MockGpu::new();
    let layout = storage_layout(&gpu);
    let mut allocator = DescriptorAllocator::create_pool(
        &gpu,
        10,
        &[PoolSizeRatio::new(DescriptorKind::StorageBuffer, 1.0)],
    )
    .unwrap();

    for _ in 0..10 {
        allocator.allocate(&gpu, &layout).unwrap();
    }

    let err = allocator.allocate(&gpu, &layout).unwrap_err();
    assert!(matches!(err, RhiError::PoolExhausted { .. }));
    assert_eq!(allocator.remaining_sets(), 0);
    assert_eq!(allocator.remaining(DescriptorKind::StorageBuffer), 0);
}

#[test]
fn test_ratio_limits_descriptors_of_kind() {
    let gpu = MockGpu::new();
    let layout = storage_layout(&gpu);
    let mut allocator = DescriptorAllocator::create_pool(
        &gpu,
        10,
        &[PoolSizeRatio::new(DescriptorKind::StorageBuffer, 0.5)],
    )
    .unwrap();

    for _ in 0..5 {
        allocator.allocate(&gpu, &layout).unwrap();
    }

    let err = allocator.allocate(&gpu, &layout).unwrap_err();
    assert!(matches!(
        err,
        RhiError::PoolExhausted {
            kind: "storage buffers"
        }
    ));
    assert_eq!(allocator.remaining_sets(), 5);
}

#[test]
fn test_kind_missing_from_ratios_is_exhausted_immediately() {
    let gpu = MockGpu::new();
    let layout = DescriptorLayoutBuilder::new()
        .add_binding(0, DescriptorKind::StorageImage)
        .build(&gpu, vk::ShaderStageFlags::COMPUTE)
        .unwrap();
    let mut allocator = DescriptorAllocator::create_pool(
        &gpu,
        4,
        &[PoolSizeRatio::new(DescriptorKind::StorageBuffer, 1.0)],
    )
    .unwrap();

    let err = allocator.allocate(&gpu, &layout).unwrap_err();
    assert!(matches!(
        err,
        RhiError::PoolExhausted {
            kind: "storage images"
        }
    ));
    assert_eq!(allocator.remaining_sets(), 4);
}

#[test]
fn test_reset_restores_full_capacity() {
    let gpu = MockGpu::new();
    let layout = storage_layout(&gpu);
    let mut allocator = DescriptorAllocator::create_pool(
        &gpu,
        3,
        &[PoolSizeRatio::new(DescriptorKind::StorageBuffer, 1.0)],
    )
    .unwrap();

    for _ in 0..3 {
        allocator.allocate(&gpu, &layout).unwrap();
    }
    assert!(allocator.allocate(&gpu, &layout).is_err());

    allocator.reset(&gpu).unwrap();
    assert_eq!(gpu.count(|e| matches!(e, Event::ResetPool(_))), 1);
    assert_eq!(allocator.remaining_sets(), 3);

    for _ in 0..3 {
        allocator.allocate(&gpu, &layout).unwrap();
    }
}

#[test]
fn test_layout_counts_bindings_per_kind() {
    let gpu = MockGpu::new();
    let layout = DescriptorLayoutBuilder::new()
        .add_binding(0, DescriptorKind::StorageBuffer)
        .add_binding(1, DescriptorKind::StorageBuffer)
        .add_binding(2, DescriptorKind::UniformBuffer)
        .build(&gpu, vk::ShaderStageFlags::COMPUTE)
        .unwrap();

    assert_eq!(layout.count(DescriptorKind::StorageBuffer), 2);
    assert_eq!(layout.count(DescriptorKind::UniformBuffer), 1);
    assert_eq!(layout.count(DescriptorKind::CombinedImageSampler), 0);
}

#[test]
fn test_pool_destruction_can_be_deferred() {
    let gpu = MockGpu::new();
    let allocator = DescriptorAllocator::create_pool(
        &gpu,
        2,
        &[PoolSizeRatio::new(DescriptorKind::StorageBuffer, 1.0)],
    )
    .unwrap();

    let mut queue = DeletionQueue::new();
    let owner = gpu.clone();
    queue.push(move || allocator.destroy_pool(&owner));

    assert_eq!(gpu.count(|e| matches!(e, Event::DestroyPool(_))), 0);
    queue.flush();
    assert_eq!(gpu.count(|e| matches!(e, Event::DestroyPool(_))), 1);
}

#[test]
fn test_ratio_counts_round_toward_zero() {
    let gpu = MockGpu::new();
    let layout = storage_layout(&gpu);
    let mut allocator = DescriptorAllocator::create_pool(
        &gpu,
        3,
        &[PoolSizeRatio::new(DescriptorKind::StorageBuffer, 0.5)],
    )
    .unwrap();

    assert_eq!(allocator.remaining(DescriptorKind::StorageBuffer), 1);
    allocator.allocate(&gpu, &layout).unwrap();
    assert!(matches!(
        allocator.allocate(&gpu, &layout),
        Err(RhiError::PoolExhausted {
            kind: "storage buffers"
        })
    ));
}

#[test]
fn test_zero_capacity_pool_is_rejected() {
    let gpu = MockGpu::new();
    let result = DescriptorAllocator::create_pool(
        &gpu,
        0,
        &[PoolSizeRatio::new(DescriptorKind::StorageBuffer, 1.0)],
    );

    assert!(matches!(result, Err(RhiError::InvalidHandle(_))));
}
