//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, and gpu-allocator initialization.
//!
//! # Overview
//!
//! The [`Device`] struct provides a safe abstraction over the Vulkan logical device:
//! - Logical device creation with the swapchain extension and synchronization2
//! - One queue per [`QueueKind`] plus the presentation queue
//! - Memory allocation via gpu-allocator
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::device::Device;
//! use renderer_rhi::gpu::QueueKind;
//! use renderer_rhi::instance::Instance;
//! use renderer_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let physical_device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &physical_device_info)
//!     .expect("Failed to create logical device");
//!
//! let transfer_queue = device.queue(QueueKind::Transfer);
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::QueueKind;
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// Shared as `Arc<Device>`; every RAII wrapper in this crate keeps one
/// clone so the device outlives the objects created from it.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// GPU memory allocator, dropped before the device in `Drop`.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Queue handle per kind, indexed by [`QueueKind::index`].
    queues: [vk::Queue; QueueKind::COUNT],
    /// Queue family per kind, indexed by [`QueueKind::index`].
    queue_families: [u32; QueueKind::COUNT],
    /// Presentation queue handle.
    present_queue: vk::Queue,
    /// Presentation queue family.
    present_family: u32,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// Enables synchronization2 (Vulkan 1.3) and creates one queue for each
    /// unique family among compute, graphics, transfer and present.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The physical device lacks a required queue family
    /// - Device creation fails
    /// - Allocator initialization fails
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let indices = &physical_device_info.queue_families;
        let (Some(graphics), Some(present)) = (indices.graphics_family, indices.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };
        let compute = indices.compute_family.unwrap_or(graphics);
        let transfer = indices.transfer_family.unwrap_or(graphics);

        let mut queue_families = [0u32; QueueKind::COUNT];
        queue_families[QueueKind::Compute.index()] = compute;
        queue_families[QueueKind::Graphics.index()] = graphics;
        queue_families[QueueKind::Transfer.index()] = transfer;

        let unique_families = indices.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let queues = QueueKind::ALL.map(|kind| {
            let family = queue_families[kind.index()];
            debug!("{} queue retrieved from family {}", kind.name(), family);
            unsafe { device.get_device_queue(family, 0) }
        });
        let present_queue = unsafe { device.get_device_queue(present, 0) };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queues,
            queue_families,
            present_queue,
            present_family: present,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the queue serving `kind`.
    #[inline]
    pub fn queue(&self, kind: QueueKind) -> vk::Queue {
        self.queues[kind.index()]
    }

    /// Returns the queue family serving `kind`.
    #[inline]
    pub fn queue_family(&self, kind: QueueKind) -> u32 {
        self.queue_families[kind.index()]
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the presentation queue family.
    #[inline]
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    /// Locks the GPU memory allocator.
    ///
    /// Allocation calls cannot leave the allocator in a torn state, so a
    /// poisoned lock is recovered.
    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the device to become idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
        }

        // The allocator frees its memory blocks through the device, so it
        // goes first.
        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, queues and the physical device are plain
// handles, and the allocator sits behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}
