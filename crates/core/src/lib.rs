//! Core utilities for the Vulkan renderer.
//!
//! This crate provides foundational types and utilities used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration, including the shared reload request polled by the driver

pub mod config;
mod error;
mod logging;

pub use config::{RendererConfig, SharedConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
