//! Resource loading.
//!
//! Point clouds are read from OBJ files and handed to the renderer as a
//! flat array of fixed-size [`Point`] records.

mod error;
pub mod point_cloud;

pub use error::{ResourceError, ResourceResult};
pub use point_cloud::{Point, PointCloud};
