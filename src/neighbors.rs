//! Neighbor tile resolution.
//!
//! Enumerates the grid addresses within the stitch radius around a matched
//! tile and probes which of them exist on disk. The scan order is row-major
//! (increasing row delta, then increasing column delta), so the center tile
//! always sits at the middle index of the resulting sequences; downstream
//! stitching depends on this exact ordering.

use std::fs;
use std::path::Path;

use crate::error::SiteError;
use crate::model::AnnotationTile;

/// Attach the neighbor filename list and existence mask to a matched record.
///
/// Produces two parallel sequences of length `(2 * radius + 1)²`. An I/O
/// error while probing aborts only this annotation's processing.
pub fn resolve_neighbors(record: &mut AnnotationTile, radius: u32) -> Result<(), SiteError> {
    let address = record.tile.address()?;
    let radius = i32::try_from(radius).unwrap_or(i32::MAX);
    let side = 2 * radius as usize + 1;

    let mut names = Vec::with_capacity(side * side);
    let mut exists = Vec::with_capacity(side * side);

    for row_delta in -radius..=radius {
        for col_delta in -radius..=radius {
            let candidate = address.shifted(row_delta, col_delta).filename();
            let path = record.tile.image_dir.join(&candidate);
            exists.push(probe_file(&path)?);
            names.push(candidate);
        }
    }

    log::debug!(
        "Annotation {}: {}/{} neighbor tiles exist around {}",
        record.annotation_name,
        exists.iter().filter(|e| **e).count(),
        exists.len(),
        record.tile.filename
    );
    record.neighbor_names = names;
    record.neighbor_exists = exists;
    Ok(())
}

/// Check whether a regular file exists at `path`.
///
/// Absence is an ordinary `false`; any other I/O failure is surfaced so the
/// caller can skip the affected annotation.
fn probe_file(path: &Path) -> Result<bool, SiteError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(metadata.is_file()),
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(SiteError::Filesystem {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec2;
    use crate::model::{Annotation, PixelPosition, Tile};
    use std::path::PathBuf;

    fn record_for_dir(dir: &Path, filename: &str) -> AnnotationTile {
        let annotation = Annotation::new("site_1", Vec2::new(0.0, 0.0));
        let tile = Tile::new("meta", "square-1", filename, dir, Vec2::new(0.0, 0.0));
        AnnotationTile::new(&annotation, tile, 1e-9, PixelPosition::new(0, 0))
    }

    fn fixture_dir(name: &str, filenames: &[String]) -> PathBuf {
        let dir = std::env::temp_dir()
            .join("sitestitch-tests")
            .join(format!("{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for filename in filenames {
            fs::write(dir.join(filename), b"tif").unwrap();
        }
        dir
    }

    fn tile_name(row: i32, col: i32) -> String {
        format!("Tile_{:03}-{:03}-000000_0-000.tif", row, col)
    }

    #[test]
    fn test_interior_tile_has_full_neighborhood() {
        let mut all = Vec::new();
        for row in 4..=6 {
            for col in 9..=11 {
                all.push(tile_name(row, col));
            }
        }
        let dir = fixture_dir("interior", &all);
        let mut record = record_for_dir(&dir, &tile_name(5, 10));

        resolve_neighbors(&mut record, 1).unwrap();

        assert_eq!(record.neighbor_names.len(), 9);
        assert_eq!(record.neighbor_exists.len(), 9);
        assert!(record.neighbor_exists.iter().all(|e| *e));
        // Row-major scan order: the center tile is the middle entry.
        assert_eq!(record.neighbor_names[0], tile_name(4, 9));
        assert_eq!(record.neighbor_names[4], tile_name(5, 10));
        assert_eq!(record.neighbor_names[8], tile_name(6, 11));
    }

    #[test]
    fn test_corner_tile_has_quadrant_neighborhood() {
        // Only the tile itself and its bottom-right neighbors exist, as for
        // a tile in the top-left corner of its layer grid.
        let present = vec![
            tile_name(0, 0),
            tile_name(0, 1),
            tile_name(1, 0),
            tile_name(1, 1),
        ];
        let dir = fixture_dir("corner", &present);
        let mut record = record_for_dir(&dir, &tile_name(0, 0));

        resolve_neighbors(&mut record, 1).unwrap();

        assert_eq!(
            record.neighbor_exists,
            vec![false, false, false, false, true, true, false, true, true]
        );
    }

    #[test]
    fn test_radius_two_side_length() {
        let dir = fixture_dir("radius-two", &[tile_name(5, 5)]);
        let mut record = record_for_dir(&dir, &tile_name(5, 5));

        resolve_neighbors(&mut record, 2).unwrap();

        assert_eq!(record.neighbor_names.len(), 25);
        assert_eq!(record.neighbor_names[12], tile_name(5, 5));
        assert_eq!(record.existing_neighbor_count(), 1);
    }
}
