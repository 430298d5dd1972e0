//! Annotation-to-tile matching.
//!
//! Finds, for every annotation, the tile whose computed center is physically
//! closest, and solves for the annotation's pixel offset inside that tile.

use std::collections::BTreeMap;

use crate::error::{ResolutionWarning, SiteError};
use crate::geometry::{Vec2, step_vectors};
use crate::model::{AcquisitionGeometry, Annotation, AnnotationTile, Layer, PixelPosition, Tile};

/// Relative tolerance for the Cramer determinant. The determinant scales
/// with the squared pixel size, so the cutoff does too.
const DEGENERATE_DET_EPSILON: f64 = 1e-9;

/// Result of matching a set of annotations against the resolved tiles.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// One record per annotation that landed inside a tile.
    pub matched: Vec<AnnotationTile>,

    /// Recoverable conditions encountered during matching.
    pub warnings: Vec<ResolutionWarning>,
}

/// Assign each annotation to its containing tile.
///
/// Tiles are scanned in lexicographic (layer name, filename) order with a
/// strict minimum comparison, so equidistant ties deterministically resolve
/// to the smallest tile identifier. Annotations farther than the tile
/// bounding radius from every center are dropped with a warning.
pub fn match_annotations(
    annotations: &[Annotation],
    tiles: &[Tile],
    layers: &BTreeMap<String, Layer>,
    geometry: &AcquisitionGeometry,
) -> Result<MatchOutcome, SiteError> {
    if tiles.is_empty() {
        return Err(SiteError::NoTileLayers);
    }

    let mut ordered: Vec<&Tile> = tiles.iter().collect();
    ordered.sort_by(|a, b| {
        (&a.layer_name, &a.filename).cmp(&(&b.layer_name, &b.filename))
    });

    let centers = ordered
        .iter()
        .map(|tile| {
            tile.center.ok_or_else(|| {
                SiteError::invalid_descriptor(format!(
                    "tile '{}' has no resolved center; coordinate resolution did not run",
                    tile.key()
                ))
            })
        })
        .collect::<Result<Vec<Vec2>, SiteError>>()?;

    let threshold_sq = geometry.matching_threshold_sq();
    let mut outcome = MatchOutcome::default();

    for annotation in annotations {
        let mut best_index = 0;
        let mut best_distance_sq = f64::INFINITY;
        for (index, center) in centers.iter().enumerate() {
            let distance_sq = (*center - annotation.stage_position).length_sq();
            if distance_sq < best_distance_sq {
                best_distance_sq = distance_sq;
                best_index = index;
            }
        }

        if best_distance_sq >= threshold_sq {
            let warning = ResolutionWarning::AnnotationUnmatched {
                annotation: annotation.name.clone(),
                distance_sq: best_distance_sq,
                threshold_sq,
            };
            warning.log();
            outcome.warnings.push(warning);
            continue;
        }

        let tile = ordered[best_index];
        let layer = layers.get(&tile.layer_key).ok_or_else(|| {
            SiteError::invalid_descriptor(format!(
                "tile '{}' references unknown layer '{}'",
                tile.key(),
                tile.layer_key
            ))
        })?;

        let (pixel_position, warning) = in_tile_position(
            &annotation.name,
            centers[best_index] - annotation.stage_position,
            layer.rotation_degrees,
            geometry,
        );
        if let Some(warning) = warning {
            warning.log();
            outcome.warnings.push(warning);
        }

        log::debug!(
            "Annotation {} matched to tile {} at pixel ({}, {})",
            annotation.name,
            tile.key(),
            pixel_position.x,
            pixel_position.y
        );
        outcome.matched.push(AnnotationTile::new(
            annotation,
            tile.clone(),
            geometry.pixel_size,
            pixel_position,
        ));
    }

    Ok(outcome)
}

/// Solve for the annotation's pixel position inside the matched tile.
///
/// `distance` is the tile center minus the annotation position, in meters.
/// The 2x2 system `distance = x_shift * step_x + y_shift * step_y` is solved
/// with Cramer's rule over the same rotated step vectors used for tile
/// centers. A singular system (specific degenerate rotations) falls back to
/// the tile's geometric center.
fn in_tile_position(
    annotation_name: &str,
    distance: Vec2,
    rotation_degrees: f64,
    geometry: &AcquisitionGeometry,
) -> (PixelPosition, Option<ResolutionWarning>) {
    let (step_x, step_y) = step_vectors(rotation_degrees, geometry.pixel_size);
    let det = step_y.y * step_x.x - step_x.y * step_y.x;
    let det_scale = geometry.pixel_size * geometry.pixel_size;

    let (x_shift, y_shift, warning) = if det.abs() <= det_scale * DEGENERATE_DET_EPSILON {
        let warning = ResolutionWarning::DegenerateRotation {
            annotation: annotation_name.to_string(),
            rotation: rotation_degrees,
        };
        (0.0, 0.0, Some(warning))
    } else {
        let x_shift = (step_y.y * distance.x - distance.y * step_y.x) / det;
        let y_shift = (step_x.y * distance.x - distance.y * step_x.x) / -det;
        (x_shift, y_shift, None)
    };

    let position = PixelPosition::new(
        (f64::from(geometry.image_height) / 2.0 - x_shift).round() as i64,
        (f64::from(geometry.image_width) / 2.0 - y_shift).round() as i64,
    );
    (position, warning)
}
