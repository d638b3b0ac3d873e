//! The Vulkan point viewer renderer.
//!
//! [`Renderer`] builds the Vulkan stack for a window and drives it through
//! a [`PresentationDriver`]. Each frame clears an offscreen draw image and
//! blits it to the presentation image; the loaded point cloud lives in a
//! storage buffer written to [`POINT_BINDING`] of a compute-visible set,
//! which no draw consumes yet.
//!
//! # Resource Destruction Order
//!
//! 1. Driver shutdown: wait for the GPU, flush slot and global deletions
//!    (descriptor pool, then its layout)
//! 2. Driver (frame ring, immediate channel, swapchain)
//! 3. Point buffer and draw image
//! 4. Device
//! 5. Surface
//! 6. Instance

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use renderer_core::{RendererConfig, SharedConfig};
use renderer_platform::{Surface, Window};
use renderer_resources::PointCloud;
use renderer_rhi::device::Device;
use renderer_rhi::image::Image;
use renderer_rhi::instance::Instance;
use renderer_rhi::physical_device::select_physical_device;
use renderer_rhi::swapchain::Swapchain;
use renderer_rhi::{RhiError, RhiResult};

use crate::descriptor_allocator::{
    DescriptorAllocator, DescriptorKind, DescriptorLayoutBuilder, PoolSizeRatio,
};
use crate::driver::PresentationDriver;
use crate::upload::StorageBinding;

/// Binding of the point storage buffer in its descriptor set.
pub const POINT_BINDING: u32 = 0;

/// Vulkan renderer for one window.
pub struct Renderer {
    driver: ManuallyDrop<PresentationDriver<Arc<Device>, Swapchain>>,
    points: ManuallyDrop<StorageBinding<Arc<Device>>>,
    draw_image: ManuallyDrop<Image>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    shared: SharedConfig,
    clear_color: [f32; 4],
    width: u32,
    height: u32,
}

impl Renderer {
    /// Creates the renderer for `window` and loads the configured points.
    ///
    /// A point file that fails to load is logged and the renderer starts
    /// with an empty binding.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created.
    pub fn new(window: &Window, config: &RendererConfig, shared: SharedConfig) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(config.validation, &surface_extensions)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            surface.loader().clone(),
            width,
            height,
        )?;

        let mut driver = PresentationDriver::new(
            device.clone(),
            swapchain,
            config.frame_timeout(),
            config.immediate_timeout(),
        )?;

        let draw_image = Image::draw_target(device.clone(), vk::Extent2D { width, height })?;

        let layout = DescriptorLayoutBuilder::new()
            .add_binding(POINT_BINDING, DescriptorKind::StorageBuffer)
            .build(&device, vk::ShaderStageFlags::COMPUTE)?;
        let mut descriptors = DescriptorAllocator::create_pool(
            &device,
            config.descriptor_capacity,
            &[PoolSizeRatio::new(DescriptorKind::StorageBuffer, 1.0)],
        )?;
        // Written on every point upload but not bound by any pipeline yet;
        // frames only clear and blit.
        let point_set = descriptors.allocate(&device, &layout)?;

        // Both outlive every frame; released after the final drain.
        let gpu = device.clone();
        let session = driver.global_deletion_queue();
        session.defer_drop(layout);
        session.push(move || descriptors.destroy_pool(&gpu));

        let mut renderer = Self {
            driver: ManuallyDrop::new(driver),
            points: ManuallyDrop::new(StorageBinding::new(point_set, POINT_BINDING)),
            draw_image: ManuallyDrop::new(draw_image),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            shared,
            clear_color: config.clear_color,
            width,
            height,
        };

        renderer.load_points(&config.point_file)?;

        info!(
            "Renderer initialized: {} point(s), draw image {}x{}",
            renderer.point_count(),
            width,
            height
        );

        Ok(renderer)
    }

    /// Loads `path` into the point binding, keeping the current points if
    /// the file cannot be read.
    fn load_points(&mut self, path: &Path) -> RhiResult<()> {
        let cloud = match PointCloud::load(path) {
            Ok(cloud) => cloud,
            Err(e) => {
                warn!("Keeping current points: {}", e);
                return Ok(());
            }
        };

        self.driver
            .swap_storage(&mut self.points, cloud.as_bytes(), cloud.len() as u32)?;
        info!("Displaying {} point(s) from {}", cloud.len(), path.display());
        Ok(())
    }

    /// Renders and presents one frame.
    ///
    /// Pending reload requests from [`SharedConfig`] are served first.
    ///
    /// # Errors
    ///
    /// Every error returned here is fatal.
    pub fn render_frame(&mut self) -> RhiResult<()> {
        if let Some(path) = self.shared.take_reload_request() {
            self.load_points(&path)?;
        }

        let draw_image = self.draw_image.handle();
        let draw_extent = self.draw_image.extent();
        let clear_color = self.clear_color;

        self.driver.draw_frame(|frame| {
            let cmd = frame.graphics().cmd();
            cmd.transition_image(
                draw_image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            cmd.clear_color_image(draw_image, clear_color);
            cmd.transition_image(
                draw_image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            );
            cmd.blit_image(
                draw_image,
                draw_extent,
                frame.target_image(),
                frame.target_extent(),
            );
            Ok(())
        })
    }

    /// Handles a window resize.
    ///
    /// The swapchain is rebuilt before the next acquire.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to zero dimensions");
            return;
        }

        if width != self.width || height != self.height {
            debug!(
                "Resize triggered: {}x{} -> {}x{}",
                self.width, self.height, width, height
            );
            self.width = width;
            self.height = height;
            self.driver.target_mut().set_desired_extent(width, height);
            self.driver.request_rebuild();
        }
    }

    /// Number of points currently bound.
    #[inline]
    pub fn point_count(&self) -> u32 {
        self.points.element_count()
    }

    /// Frames presented so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.driver.frame_number()
    }

    /// The reload surface polled each frame.
    #[inline]
    pub fn shared_config(&self) -> &SharedConfig {
        &self.shared
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.driver.shutdown() {
            error!("Failed to drain the GPU during renderer drop: {}", e);
        }

        // SAFETY: each field is dropped exactly once, here, in dependency
        // order; nothing touches them afterwards.
        unsafe {
            ManuallyDrop::drop(&mut self.driver);
            ManuallyDrop::drop(&mut self.points);
            ManuallyDrop::drop(&mut self.draw_image);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
