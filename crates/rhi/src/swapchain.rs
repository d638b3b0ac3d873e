//! Swapchain management.
//!
//! The [`Swapchain`] is the Vulkan [`PresentTarget`]. Its images are only
//! ever written by a blit, so they are created with `TRANSFER_DST` usage and
//! no views. Rebuilding hands the old handle to the driver through
//! `old_swapchain` and then destroys it.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::gpu::{AcquiredImage, PresentTarget, QueueKind};
use crate::instance::Instance;
use crate::sync::Semaphore;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image count, extents, transforms, usage).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space pairs.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True when at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything that changes when the swapchain is rebuilt.
struct Generation {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

/// Vulkan swapchain wrapper.
///
/// Holds the surface handle but does not own it; the surface must outlive
/// the swapchain.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    current: Generation,
    /// Size used when the surface leaves the extent to the application.
    desired_extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries or swapchain creation fail, or the
    /// surface cannot be a transfer destination.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let desired_extent = vk::Extent2D { width, height };

        let current = create_generation(
            &device,
            &loader,
            &surface_loader,
            surface,
            desired_extent,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            loader,
            surface_loader,
            surface,
            current,
            desired_extent,
        })
    }

    /// Records the window size to use on the next rebuild.
    pub fn set_desired_extent(&mut self, width: u32, height: u32) {
        self.desired_extent = vk::Extent2D { width, height };
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.current.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.current.format.format
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.current.present_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.current.images.len() as u32
    }
}

impl PresentTarget<Arc<Device>> for Swapchain {
    fn acquire_next_image(
        &mut self,
        signal: &Semaphore,
        timeout: Duration,
    ) -> RhiResult<AcquiredImage> {
        let timeout_ns = u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX);
        let result = unsafe {
            self.loader.acquire_next_image(
                self.current.swapchain,
                timeout_ns,
                signal.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RhiError::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Err(RhiError::Timeout {
                operation: "swapchain image acquire",
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn present(&mut self, image_index: u32, wait: &Semaphore) -> RhiResult<bool> {
        let swapchains = [self.current.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait.handle()];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.loader
                .queue_present(self.device.present_queue(), &present_info)
        };

        match result {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RhiError::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn rebuild(&mut self) -> RhiResult<()> {
        info!(
            "Rebuilding swapchain for {}x{}",
            self.desired_extent.width, self.desired_extent.height
        );

        let next = create_generation(
            &self.device,
            &self.loader,
            &self.surface_loader,
            self.surface,
            self.desired_extent,
            self.current.swapchain,
        )?;

        let old = std::mem::replace(&mut self.current, next);
        unsafe {
            self.loader.destroy_swapchain(old.swapchain, None);
        }

        Ok(())
    }

    fn image(&self, index: u32) -> vk::Image {
        self.current.images[index as usize]
    }

    fn extent(&self) -> vk::Extent2D {
        self.current.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.current.swapchain, None);
        }

        info!(
            "Swapchain destroyed (was {}x{}, {} images)",
            self.current.extent.width,
            self.current.extent.height,
            self.current.images.len()
        );
    }
}

fn create_generation(
    device: &Device,
    loader: &ash::khr::swapchain::Device,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    desired_extent: vk::Extent2D,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<Generation> {
    let support =
        SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;

    if !support.is_adequate() {
        return Err(RhiError::SwapchainError(
            "Inadequate swapchain support (no formats or present modes)".to_string(),
        ));
    }

    let usage = vk::ImageUsageFlags::TRANSFER_DST;
    if !support.capabilities.supported_usage_flags.contains(usage) {
        return Err(RhiError::SwapchainError(
            "Surface images cannot be transfer destinations".to_string(),
        ));
    }

    let format = choose_surface_format(&support.formats);
    let present_mode = choose_present_mode(&support.present_modes);
    let extent = choose_extent(
        &support.capabilities,
        desired_extent.width,
        desired_extent.height,
    );
    let image_count = determine_image_count(&support.capabilities);

    let graphics_family = device.queue_family(QueueKind::Graphics);
    let present_family = device.present_family();
    let families = [graphics_family, present_family];

    let (sharing_mode, family_indices) = if graphics_family != present_family {
        (vk::SharingMode::CONCURRENT, families.as_slice())
    } else {
        (vk::SharingMode::EXCLUSIVE, &[][..])
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(format.format)
        .image_color_space(format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(usage)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(family_indices)
        .pre_transform(support.capabilities.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

    let images = match unsafe { loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            return Err(e.into());
        }
    };

    info!(
        "Swapchain created: {}x{}, {:?}, {:?}, {} images",
        extent.width,
        extent.height,
        format.format,
        present_mode,
        images.len()
    );

    Ok(Generation {
        swapchain,
        images,
        format,
        present_mode,
        extent,
    })
}

/// Picks the surface format.
///
/// The draw image is blitted in linear space, so a UNORM target is
/// preferred over SRGB.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = [vk::Format::B8G8R8A8_UNORM, vk::Format::R8G8B8A8_UNORM];

    for wanted in preferred {
        if let Some(&format) = formats.iter().find(|f| {
            f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            return format;
        }
    }

    warn!(
        "Using first available surface format: {:?}",
        formats[0].format
    );
    formats[0]
}

/// Prefers MAILBOX, falling back to FIFO which is always available.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Uses the surface's current extent when it defines one, otherwise clamps
/// the requested size to the surface limits.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}
