//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, device and queue creation
//! - Swapchain management
//! - Command recording and synchronization primitives
//! - Buffers, images and descriptors backed by gpu-allocator
//!
//! Frame scheduling code is written against the [`gpu::GpuDevice`] and
//! [`gpu::PresentTarget`] traits; [`vulkan`] and [`swapchain`] implement
//! them.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod gpu;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod swapchain;
pub mod sync;
pub mod vulkan;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
