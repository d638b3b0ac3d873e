//! Pool-backed descriptor set allocation.
//!
//! A [`DescriptorAllocator`] wraps one fixed-capacity pool sized from a
//! ratio table: each kind gets `ratio * capacity` descriptors and the pool
//! holds `capacity` sets. Sets are never freed one by one; the pool is
//! reset or destroyed as a whole. There is no growth path: exhaustion is
//! reported as [`RhiError::PoolExhausted`] and the caller creates a larger
//! pool.
//!
//! The allocator keeps its own count of what remains so exhaustion is
//! detected the same way on every driver.

use ash::vk;
use tracing::{debug, info};

use renderer_rhi::gpu::GpuDevice;
use renderer_rhi::{RhiError, RhiResult};

/// Descriptor kinds the allocator accounts for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Read/write buffer.
    StorageBuffer,
    /// Read-only uniform buffer.
    UniformBuffer,
    /// Read/write image.
    StorageImage,
    /// Image and sampler pair.
    CombinedImageSampler,
}

impl DescriptorKind {
    /// Number of kinds.
    pub const COUNT: usize = 4;

    /// The Vulkan descriptor type.
    pub const fn to_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorKind::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }

    /// Name used in logs and [`RhiError::PoolExhausted`].
    pub const fn name(self) -> &'static str {
        match self {
            DescriptorKind::StorageBuffer => "storage buffers",
            DescriptorKind::UniformBuffer => "uniform buffers",
            DescriptorKind::StorageImage => "storage images",
            DescriptorKind::CombinedImageSampler => "combined image samplers",
        }
    }

    const fn index(self) -> usize {
        match self {
            DescriptorKind::StorageBuffer => 0,
            DescriptorKind::UniformBuffer => 1,
            DescriptorKind::StorageImage => 2,
            DescriptorKind::CombinedImageSampler => 3,
        }
    }
}

/// Relative weight of one kind in a pool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolSizeRatio {
    /// Descriptor kind.
    pub kind: DescriptorKind,
    /// Descriptors of this kind per set of capacity.
    pub ratio: f32,
}

impl PoolSizeRatio {
    /// Shorthand constructor.
    pub const fn new(kind: DescriptorKind, ratio: f32) -> Self {
        Self { kind, ratio }
    }
}

/// Per-kind descriptor counts.
type KindCounts = [u32; DescriptorKind::COUNT];

/// Accumulates bindings for one set layout.
#[derive(Debug, Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<(u32, DescriptorKind)>,
}

impl DescriptorLayoutBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single-descriptor binding.
    pub fn add_binding(&mut self, binding: u32, kind: DescriptorKind) -> &mut Self {
        debug_assert!(
            self.bindings.iter().all(|(existing, _)| *existing != binding),
            "binding {binding} added twice"
        );
        self.bindings.push((binding, kind));
        self
    }

    /// Removes every binding.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Creates the layout with every binding visible to `stages`.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn build<G: GpuDevice>(
        &self,
        gpu: &G,
        stages: vk::ShaderStageFlags,
    ) -> RhiResult<DescriptorLayout<G>> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding<'static>> = self
            .bindings
            .iter()
            .map(|&(binding, kind)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(binding)
                    .descriptor_type(kind.to_vk())
                    .descriptor_count(1)
                    .stage_flags(stages)
            })
            .collect();

        let mut counts = KindCounts::default();
        for &(_, kind) in &self.bindings {
            counts[kind.index()] += 1;
        }

        let handle = gpu.create_descriptor_layout(&bindings)?;
        debug!("Built descriptor layout with {} binding(s)", bindings.len());

        Ok(DescriptorLayout { handle, counts })
    }
}

/// A set layout plus the descriptors each set of it consumes.
pub struct DescriptorLayout<G: GpuDevice> {
    handle: G::DescriptorLayout,
    counts: KindCounts,
}

impl<G: GpuDevice> DescriptorLayout<G> {
    /// The device layout.
    #[inline]
    pub fn handle(&self) -> &G::DescriptorLayout {
        &self.handle
    }

    /// Descriptors of `kind` consumed per set.
    #[inline]
    pub fn count(&self, kind: DescriptorKind) -> u32 {
        self.counts[kind.index()]
    }
}

/// A fixed-capacity descriptor pool.
pub struct DescriptorAllocator<G: GpuDevice> {
    pool: G::DescriptorPool,
    max_sets: u32,
    capacity: KindCounts,
    remaining_sets: u32,
    remaining: KindCounts,
}

impl<G: GpuDevice> DescriptorAllocator<G> {
    /// Creates a pool holding `capacity` sets, with `ratio * capacity`
    /// descriptors of each listed kind, rounded toward zero.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for a zero `capacity`, or an
    /// error if the device cannot create the pool.
    pub fn create_pool(gpu: &G, capacity: u32, ratios: &[PoolSizeRatio]) -> RhiResult<Self> {
        if capacity == 0 {
            return Err(RhiError::InvalidHandle(
                "descriptor pool capacity must be at least one set".to_string(),
            ));
        }

        let mut sizes = KindCounts::default();
        for ratio in ratios {
            sizes[ratio.kind.index()] += (ratio.ratio * capacity as f32) as u32;
        }

        let pool_sizes: Vec<vk::DescriptorPoolSize> = ALL_KINDS
            .into_iter()
            .filter(|kind| sizes[kind.index()] > 0)
            .map(|kind| {
                vk::DescriptorPoolSize::default()
                    .ty(kind.to_vk())
                    .descriptor_count(sizes[kind.index()])
            })
            .collect();

        let pool = gpu.create_descriptor_pool(capacity, &pool_sizes)?;

        info!(
            "Descriptor pool created: {} sets, sizes {:?}",
            capacity,
            pool_sizes
                .iter()
                .map(|size| (size.ty, size.descriptor_count))
                .collect::<Vec<_>>()
        );

        Ok(Self {
            pool,
            max_sets: capacity,
            capacity: sizes,
            remaining_sets: capacity,
            remaining: sizes,
        })
    }

    /// Allocates one set conforming to `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PoolExhausted`] naming the first kind (or "sets")
    /// that has no room left. Nothing is consumed on failure.
    pub fn allocate(&mut self, gpu: &G, layout: &DescriptorLayout<G>) -> RhiResult<G::DescriptorSet> {
        if self.remaining_sets == 0 {
            return Err(RhiError::PoolExhausted { kind: "sets" });
        }

        for kind in ALL_KINDS {
            if layout.count(kind) > self.remaining[kind.index()] {
                return Err(RhiError::PoolExhausted { kind: kind.name() });
            }
        }

        let set = gpu.allocate_descriptor_set(&self.pool, layout.handle())?;

        self.remaining_sets -= 1;
        for kind in ALL_KINDS {
            self.remaining[kind.index()] -= layout.count(kind);
        }

        Ok(set)
    }

    /// Invalidates every set allocated so far and restores full capacity.
    ///
    /// No set from this pool may still be in use by the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if the device reset fails.
    pub fn reset(&mut self, gpu: &G) -> RhiResult<()> {
        gpu.reset_descriptor_pool(&self.pool)?;
        self.remaining_sets = self.max_sets;
        self.remaining = self.capacity;
        debug!("Descriptor pool reset");
        Ok(())
    }

    /// Releases the pool. Typically deferred through a deletion queue.
    pub fn destroy_pool(self, gpu: &G) {
        gpu.destroy_descriptor_pool(self.pool);
        debug!("Descriptor pool destroyed");
    }

    /// Sets still available.
    #[inline]
    pub fn remaining_sets(&self) -> u32 {
        self.remaining_sets
    }

    /// Descriptors of `kind` still available.
    #[inline]
    pub fn remaining(&self, kind: DescriptorKind) -> u32 {
        self.remaining[kind.index()]
    }
}

const ALL_KINDS: [DescriptorKind; DescriptorKind::COUNT] = [
    DescriptorKind::StorageBuffer,
    DescriptorKind::UniformBuffer,
    DescriptorKind::StorageImage,
    DescriptorKind::CombinedImageSampler,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_match_table_order() {
        for (position, kind) in ALL_KINDS.iter().enumerate() {
            assert_eq!(kind.index(), position);
        }
    }

    #[test]
    fn test_kind_maps_to_vulkan_type() {
        assert_eq!(
            DescriptorKind::StorageBuffer.to_vk(),
            vk::DescriptorType::STORAGE_BUFFER
        );
        assert_eq!(
            DescriptorKind::StorageImage.to_vk(),
            vk::DescriptorType::STORAGE_IMAGE
        );
    }

    #[test]
    fn test_builder_clear_empties_bindings() {
        let mut builder = DescriptorLayoutBuilder::new();
        builder
            .add_binding(0, DescriptorKind::StorageBuffer)
            .add_binding(1, DescriptorKind::StorageImage);
        assert_eq!(builder.bindings.len(), 2);
        builder.clear();
        assert!(builder.bindings.is_empty());
    }
}
