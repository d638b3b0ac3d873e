//! Point Viewer - Main Entry Point
//!
//! Usage: `point-viewer [config.toml]`
//!
//! `R` reloads the configured point file, `Esc` quits.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use renderer_core::{RendererConfig, SharedConfig};
use renderer_platform::Window;
use renderer_renderer::Renderer;

const DEFAULT_CONFIG: &str = "point-viewer.toml";

struct App {
    // Dropped before the window its surface belongs to.
    renderer: Option<Renderer>,
    window: Option<Window>,
    config: RendererConfig,
    shared: SharedConfig,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        let shared = SharedConfig::new(config.point_file.clone());
        Self {
            renderer: None,
            window: None,
            config,
            shared,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, what: &str, e: impl std::fmt::Display) {
        error!("{}: {}", what, e);
        self.renderer = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, "Failed to create window", e),
        };

        match Renderer::new(&window, &self.config, self.shared.clone()) {
            Ok(renderer) => {
                info!("Initialization complete, entering main loop");
                self.renderer = Some(renderer);
                self.window = Some(window);
            }
            Err(e) => self.fail(event_loop, "Failed to create renderer", e),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if self.window.as_ref().is_some_and(Window::is_minimized) {
                    return;
                }

                let result = match self.renderer.as_mut() {
                    Some(renderer) => renderer.render_frame(),
                    None => Ok(()),
                };
                if let Err(e) = result {
                    self.fail(event_loop, "Fatal render error", e);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => event_loop.exit(),
                    PhysicalKey::Code(KeyCode::KeyR) if !event.repeat => {
                        info!(
                            "Reload requested for {}",
                            self.shared.snapshot().current_point_file.display()
                        );
                        self.shared.request_reload_current();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = self.renderer.take() {
            info!("Exiting after {} frame(s)", renderer.frame_number());
        }
    }
}

fn main() -> Result<()> {
    renderer_core::init_logging();
    info!("Starting Point Viewer");

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = RendererConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
