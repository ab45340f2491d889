//! Readers for the manifests inside an extracted course archive.
//!
//! Layout:
//! - `<root>/data.json`: course metadata ([`CourseInfo`])
//! - `<root>/resources/**/data.json`: one descriptor per resource

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use ocwharvest_shared::{CourseInfo, HarvestError, ResourceDescriptor, Result};

/// File name shared by the root and per-resource manifests.
pub const MANIFEST_FILE: &str = "data.json";

/// Directory holding per-resource manifests.
pub const RESOURCES_DIR: &str = "resources";

/// The fields we read from a per-resource manifest.
#[derive(Debug, Deserialize)]
struct ResourceManifest {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    learning_resource_types: Option<Vec<String>>,
}

/// Read the root course manifest at `<root>/data.json`.
///
/// A missing file is a [`HarvestError::MissingManifest`]; the course cannot be
/// processed without it.
pub fn read_course_info(root: &Path) -> Result<CourseInfo> {
    let path = root.join(MANIFEST_FILE);
    if !path.is_file() {
        return Err(HarvestError::missing_manifest(path));
    }

    let content = std::fs::read_to_string(&path).map_err(|e| HarvestError::io(&path, e))?;
    let info: CourseInfo = serde_json::from_str(&content)
        .map_err(|e| HarvestError::parse(format!("{}: {e}", path.display())))?;

    debug!(title = %info.course_title, number = %info.primary_course_number, "course manifest read");
    Ok(info)
}

/// Read every per-resource descriptor under `<root>/resources/`.
///
/// Manifests are visited in file-name order so results are reproducible.
/// A manifest that cannot be read or parsed is skipped with a warning. Finding
/// no manifest at all is a [`HarvestError::MissingManifest`].
pub fn read_descriptors(root: &Path) -> Result<Vec<ResourceDescriptor>> {
    let resources = root.join(RESOURCES_DIR);
    let paths = manifest_paths(&resources);

    if paths.is_empty() {
        return Err(HarvestError::missing_manifest(resources.join("**").join(MANIFEST_FILE)));
    }

    let mut descriptors = Vec::with_capacity(paths.len());
    for path in paths {
        match read_descriptor(&path) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable resource manifest"),
        }
    }

    debug!(count = descriptors.len(), "resource descriptors read");
    Ok(descriptors)
}

fn manifest_paths(resources: &Path) -> Vec<PathBuf> {
    if !resources.is_dir() {
        return Vec::new();
    }

    WalkDir::new(resources)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE)
        .map(|entry| entry.into_path())
        .collect()
}

fn read_descriptor(path: &Path) -> Result<ResourceDescriptor> {
    let content = std::fs::read_to_string(path).map_err(|e| HarvestError::io(path, e))?;
    let raw: ResourceManifest = serde_json::from_str(&content)
        .map_err(|e| HarvestError::parse(format!("{}: {e}", path.display())))?;

    let file = raw.file.as_deref().filter(|f| !f.is_empty());
    Ok(ResourceDescriptor::new(
        file,
        raw.learning_resource_types.unwrap_or_default(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_root() -> PathBuf {
        let root = std::env::temp_dir().join(format!("ocwh-manifest-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn course_info_missing_is_fatal() {
        let root = temp_root();
        let err = read_course_info(&root).unwrap_err();
        assert!(matches!(err, HarvestError::MissingManifest { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn course_info_is_read() {
        let root = temp_root();
        write(
            &root.join("data.json"),
            r#"{"course_title": "Dynamics", "primary_course_number": "2.003", "level": ["Undergraduate"]}"#,
        );

        let info = read_course_info(&root).unwrap();
        assert_eq!(info.course_title, "Dynamics");
        assert_eq!(info.primary_course_number, "2.003");
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn descriptors_are_read_recursively_in_order() {
        let root = temp_root();
        write(
            &root.join("resources/b-hw01/data.json"),
            r#"{"file": "/courses/x/hw01.pdf", "learning_resource_types": ["Assignments"]}"#,
        );
        write(
            &root.join("resources/a-lec1/data.json"),
            r#"{"file": "/courses/x/lec1.pdf", "learning_resource_types": ["Lecture Notes"]}"#,
        );
        write(
            &root.join("resources/c-video/data.json"),
            r#"{"title": "A video", "learning_resource_types": null}"#,
        );
        write(&root.join("resources/d-broken/data.json"), "{not json");

        let descriptors = read_descriptors(&root).unwrap();
        let names: Vec<&str> = descriptors.iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(names, vec!["lec1.pdf", "hw01.pdf", ""]);
        assert!(descriptors[2].learning_resource_types.is_empty());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn no_resource_manifests_is_fatal() {
        let root = temp_root();
        std::fs::create_dir_all(root.join("resources/empty")).unwrap();

        let err = read_descriptors(&root).unwrap_err();
        assert!(matches!(err, HarvestError::MissingManifest { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }
}
