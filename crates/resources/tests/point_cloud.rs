//! Integration tests for OBJ point cloud loading.

use std::fs;
use std::path::PathBuf;

use glam::{Vec3, Vec4};
use renderer_resources::{PointCloud, ResourceError};

fn write_obj(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "renderer_resources_{}_{}.obj",
        name,
        std::process::id()
    ));
    fs::write(&path, contents).expect("failed to write test OBJ");
    path
}

#[test]
fn test_load_colored_points() {
    let path = write_obj(
        "colored",
        "v 0 0 0 1 0 0\n\
         v 2 0 0 0 1 0\n\
         v 0 2 0 0 0 1\n\
         v 2 2 0 1 1 1\n\
         p 1 2 3 4\n",
    );

    let cloud = PointCloud::load(&path).expect("failed to load point cloud");
    fs::remove_file(&path).ok();

    assert_eq!(cloud.len(), 4);
    assert_eq!(cloud.min, Vec3::new(-1.0, -1.0, 0.0));
    assert_eq!(cloud.max, Vec3::new(1.0, 1.0, 0.0));

    let red = cloud
        .points
        .iter()
        .find(|p| p.position.truncate() == Vec3::new(-1.0, -1.0, 0.0))
        .expect("first vertex missing");
    assert_eq!(red.color, Vec4::new(1.0, 0.0, 0.0, 1.0));
}

#[test]
fn test_load_bare_vertex_list() {
    let path = write_obj(
        "vertex_only",
        "v 0 0 0 1 0 0\n\
         v 2 0 0 0 1 0\n\
         v 0 2 0 0 0 1\n\
         v 2 2 0 1 1 1\n",
    );

    let cloud = PointCloud::load(&path).expect("failed to load bare vertex list");
    fs::remove_file(&path).ok();

    assert_eq!(cloud.len(), 4);
    assert_eq!(cloud.min, Vec3::new(-1.0, -1.0, 0.0));
    assert_eq!(cloud.max, Vec3::new(1.0, 1.0, 0.0));

    let green = cloud
        .points
        .iter()
        .find(|p| p.position.truncate() == Vec3::new(1.0, -1.0, 0.0))
        .expect("second vertex missing");
    assert_eq!(green.color, Vec4::new(0.0, 1.0, 0.0, 1.0));
}

#[test]
fn test_load_uncolored_points_are_white() {
    let path = write_obj("uncolored", "v 1 1 1\nv 3 3 3\np 1 2\n");

    let cloud = PointCloud::load(&path).expect("failed to load point cloud");
    fs::remove_file(&path).ok();

    assert_eq!(cloud.len(), 2);
    assert!(cloud.points.iter().all(|p| p.color == Vec4::ONE));
    assert_eq!(cloud.as_bytes().len(), 2 * renderer_resources::Point::SIZE);
}

#[test]
fn test_missing_file_is_reported() {
    let result = PointCloud::load("does/not/exist.obj");
    assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
}

#[test]
fn test_file_without_elements_has_no_points() {
    let path = write_obj("empty", "# nothing here\n");

    let result = PointCloud::load(&path);
    fs::remove_file(&path).ok();

    assert!(matches!(result, Err(ResourceError::NoPoints(_))));
}
