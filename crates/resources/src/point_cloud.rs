//! Point cloud loading from OBJ files.
//!
//! Every vertex referenced by the file's elements becomes one [`Point`].
//! A file whose `v` records no element references (a bare point list) loads
//! every record instead. Positions are recentered on the cloud's centroid
//! and the bounds are computed after centering. Files without per-vertex
//! colors load white.

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use tracing::{debug, info, trace, warn};

use crate::error::{ResourceError, ResourceResult};

/// One point as laid out in the storage buffer: two 16-byte aligned
/// `vec3`s, each padded with `w = 1`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Point {
    /// Position; `w` is 1.
    pub position: Vec4,
    /// Linear RGB color; `w` is 1.
    pub color: Vec4,
}

impl Point {
    /// Size of one point in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Creates a point from a position and RGB color.
    pub fn new(position: Vec3, color: Vec3) -> Self {
        Self {
            position: position.extend(1.0),
            color: color.extend(1.0),
        }
    }
}

/// A centered point cloud with its bounds.
#[derive(Debug, Clone, Default)]
pub struct PointCloud {
    /// Points, centered on their centroid.
    pub points: Vec<Point>,
    /// Component-wise minimum of the centered positions.
    pub min: Vec3,
    /// Component-wise maximum of the centered positions.
    pub max: Vec3,
}

impl PointCloud {
    /// Loads a point cloud from an OBJ file.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::FileNotFound`] if `path` does not exist,
    /// [`ResourceError::ObjLoad`] if it cannot be parsed, and
    /// [`ResourceError::NoPoints`] if it yields no vertices.
    pub fn load(path: impl AsRef<Path>) -> ResourceResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ResourceError::FileNotFound(path.to_path_buf()));
        }

        info!("Loading point cloud from {}", path.display());

        let text = std::fs::read_to_string(path)?;
        let mut parsed = parse_obj(path, &text)?;

        if parsed.positions.is_empty() {
            let records = count_vertex_records(&text);
            if records > 0 {
                debug!(
                    "{} has {} unreferenced vertex record(s); loading them as points",
                    path.display(),
                    records
                );
                parsed = parse_obj(path, &with_point_element(&text, records))?;
            }
        }

        let Parsed {
            positions,
            colors,
            colored,
        } = parsed;

        if positions.is_empty() {
            return Err(ResourceError::NoPoints(path.to_path_buf()));
        }
        if !colored {
            warn!("{} has no vertex colors for some points; using white", path.display());
        }

        let cloud = Self::from_positions(&positions, Some(&colors));
        info!(
            "Loaded {} point(s) from {} (bounds {:?} .. {:?})",
            cloud.len(),
            path.display(),
            cloud.min,
            cloud.max
        );
        Ok(cloud)
    }

    /// Builds a centered cloud from raw positions.
    ///
    /// `colors`, when given, must have one entry per position; otherwise
    /// every point is white.
    pub fn from_positions(positions: &[Vec3], colors: Option<&[Vec3]>) -> Self {
        if positions.is_empty() {
            return Self::default();
        }

        let centroid = positions.iter().copied().sum::<Vec3>() / positions.len() as f32;

        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        let points = positions
            .iter()
            .enumerate()
            .map(|(i, &position)| {
                let centered = position - centroid;
                min = min.min(centered);
                max = max.max(centered);
                let color = colors
                    .and_then(|colors| colors.get(i).copied())
                    .unwrap_or(Vec3::ONE);
                Point::new(centered, color)
            })
            .collect();

        Self { points, min, max }
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when the cloud holds no points.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The points as raw bytes, ready for upload.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.points)
    }

    /// Length of the largest bounding box edge.
    pub fn extent(&self) -> f32 {
        (self.max - self.min).max_element()
    }
}

struct Parsed {
    positions: Vec<Vec3>,
    colors: Vec<Vec3>,
    colored: bool,
}

fn parse_obj(path: &Path, text: &str) -> ResourceResult<Parsed> {
    let options = tobj::LoadOptions {
        single_index: false,
        triangulate: false,
        ignore_points: false,
        ignore_lines: true,
        ..Default::default()
    };

    // Materials are irrelevant for points; `mtllib` lines are not followed.
    let (models, materials) = tobj::load_obj_buf(&mut text.as_bytes(), &options, |_| {
        Err(tobj::LoadError::OpenFileFailed)
    })
    .map_err(|e| ResourceError::ObjLoad {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if let Err(e) = materials {
        trace!("Ignoring OBJ materials: {}", e);
    }

    let mut parsed = Parsed {
        positions: Vec::new(),
        colors: Vec::new(),
        colored: true,
    };

    for model in &models {
        let mesh = &model.mesh;
        let count = mesh.positions.len() / 3;
        parsed.positions.extend(
            mesh.positions
                .chunks_exact(3)
                .map(|p| Vec3::new(p[0], p[1], p[2])),
        );

        if mesh.vertex_color.len() == mesh.positions.len() {
            parsed.colors.extend(
                mesh.vertex_color
                    .chunks_exact(3)
                    .map(|c| Vec3::new(c[0], c[1], c[2])),
            );
        } else {
            if count > 0 {
                parsed.colored = false;
            }
            parsed.colors.extend(std::iter::repeat_n(Vec3::ONE, count));
        }
    }

    Ok(parsed)
}

/// Number of `v` records in an OBJ source.
fn count_vertex_records(text: &str) -> usize {
    text.lines()
        .filter(|line| line.split_whitespace().next() == Some("v"))
        .count()
}

/// Appends a `p` element referencing the first `count` vertices.
fn with_point_element(text: &str, count: usize) -> String {
    let mut source = String::with_capacity(text.len() + count * 8 + 4);
    source.push_str(text);
    if !text.ends_with('\n') {
        source.push('\n');
    }
    source.push('p');
    for index in 1..=count {
        source.push(' ');
        source.push_str(&index.to_string());
    }
    source.push('\n');
    source
}
