//! Platform layer for the point viewer.
//!
//! Provides the winit window wrapper, the instance extensions its display
//! needs, and the RAII Vulkan surface created for it.

mod window;

pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
