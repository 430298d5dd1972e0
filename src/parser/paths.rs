//! Path handling for descriptor-provided locations.
//!
//! The descriptors store Windows paths from the microscope computer. Layer
//! metadata locations are relative and only need their separators converted;
//! tile image folders are absolute device paths that must be rebased into
//! the project folder, anchored at the raw-data directory.

use std::path::{Path, PathBuf};

use crate::constants::LAYERS_DATA_DIR;
use crate::error::SiteError;

/// Convert a backslash-separated path string into a path.
pub fn path_from_backslashes(raw: &str) -> PathBuf {
    let mut path = PathBuf::new();
    for component in raw.split('\\').filter(|c| !c.is_empty()) {
        path.push(component);
    }
    path
}

/// Rebase a device-local image path under the project folder.
///
/// The acquisition tool records where the images lived on its own machine
/// (e.g. `D:\Project\LayersData\layer\...`); after the project is copied to
/// a share only the part from the raw-data directory onward still applies.
pub fn rebase_under_project(project_folder: &Path, device_path: &str) -> Result<PathBuf, SiteError> {
    let components: Vec<&str> = device_path.split('\\').collect();
    let anchor = components
        .iter()
        .position(|component| *component == LAYERS_DATA_DIR)
        .ok_or_else(|| {
            SiteError::invalid_descriptor(format!(
                "Could not find the folder {LAYERS_DATA_DIR} that should contain the raw data \
                 in the image path: {device_path}"
            ))
        })?;

    let mut path = project_folder.to_path_buf();
    for component in components[anchor..].iter().filter(|c| !c.is_empty()) {
        path.push(component);
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backslash_conversion() {
        let path = path_from_backslashes("LayersData\\layer-1\\meta");
        assert_eq!(path, PathBuf::from("LayersData/layer-1/meta"));
    }

    #[test]
    fn test_rebase_strips_device_prefix() {
        let rebased =
            rebase_under_project(Path::new("/share/project"), "D:\\MyProject\\LayersData\\sq-1")
                .unwrap();
        assert_eq!(rebased, PathBuf::from("/share/project/LayersData/sq-1"));
    }

    #[test]
    fn test_rebase_without_anchor_fails() {
        let result = rebase_under_project(Path::new("/share/project"), "D:\\Other\\sq-1");
        assert!(matches!(result, Err(SiteError::InvalidDescriptor { .. })));
    }
}
