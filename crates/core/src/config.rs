//! Renderer configuration.
//!
//! [`RendererConfig`] is read once at startup from an optional TOML file.
//! [`SharedConfig`] is the small mutable surface the UI side writes to and
//! the frame loop polls once per frame boundary to pick up reload requests.
//!
//! # Example
//!
//! ```toml
//! point_file = "resources/flowers.obj"
//! frame_timeout_ms = 100
//! immediate_timeout_ms = 1000
//! clear_color = [0.02, 0.02, 0.03, 1.0]
//!
//! [window]
//! width = 1280
//! height = 720
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Window creation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Initial inner width in physical pixels.
    pub width: u32,
    /// Initial inner height in physical pixels.
    pub height: u32,
    /// Title bar text.
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Point Viewer".to_string(),
        }
    }
}

/// Startup configuration for the renderer.
///
/// Every field has a default, so a partial TOML file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Window parameters.
    pub window: WindowConfig,
    /// Upper bound for the per-frame fence wait, in milliseconds.
    pub frame_timeout_ms: u64,
    /// Upper bound for immediate submissions and uploads, in milliseconds.
    pub immediate_timeout_ms: u64,
    /// Enables the Khronos validation layer when available.
    pub validation: bool,
    /// Point cloud loaded at startup and on reload requests.
    pub point_file: PathBuf,
    /// Clear color of the offscreen draw image.
    pub clear_color: [f32; 4],
    /// Number of descriptor sets the global pool can hold.
    pub descriptor_capacity: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            frame_timeout_ms: 100,
            immediate_timeout_ms: 1000,
            validation: cfg!(debug_assertions),
            point_file: PathBuf::from("resources/flowers.obj"),
            clear_color: [0.02, 0.02, 0.03, 1.0],
            descriptor_capacity: 10,
        }
    }
}

impl RendererConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and
    /// [`Error::Config`] if it is not valid TOML for this schema.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text, path)?;
        info!("Loaded renderer config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Per-frame completion wait bound.
    #[inline]
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms)
    }

    /// Immediate submission wait bound.
    #[inline]
    pub fn immediate_timeout(&self) -> Duration {
        Duration::from_millis(self.immediate_timeout_ms)
    }
}

/// State behind [`SharedConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadState {
    /// Point file currently displayed, or requested next.
    pub current_point_file: PathBuf,
    /// Set when `current_point_file` should be (re)loaded.
    pub load_new_file: bool,
}

/// Clonable handle to the mutable reload state.
///
/// Writers (key handlers, UI) call [`request_reload`](Self::request_reload);
/// the frame loop calls [`take_reload_request`](Self::take_reload_request)
/// between frames.
#[derive(Debug, Clone)]
pub struct SharedConfig {
    inner: Arc<Mutex<ReloadState>>,
}

impl SharedConfig {
    /// Creates the shared state pointing at `point_file`, with no pending request.
    pub fn new(point_file: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ReloadState {
                current_point_file: point_file.into(),
                load_new_file: false,
            })),
        }
    }

    // A panicking writer cannot leave the state half-updated, so the
    // poisoned guard is still usable.
    fn lock(&self) -> MutexGuard<'_, ReloadState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Requests that `path` be loaded at the next frame boundary.
    pub fn request_reload(&self, path: impl Into<PathBuf>) {
        let mut state = self.lock();
        state.current_point_file = path.into();
        state.load_new_file = true;
    }

    /// Requests a reload of the current point file.
    pub fn request_reload_current(&self) {
        self.lock().load_new_file = true;
    }

    /// Returns the pending path and clears the flag, or `None` if nothing is pending.
    pub fn take_reload_request(&self) -> Option<PathBuf> {
        let mut state = self.lock();
        if state.load_new_file {
            state.load_new_file = false;
            Some(state.current_point_file.clone())
        } else {
            None
        }
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> ReloadState {
        self.lock().clone()
    }
}
