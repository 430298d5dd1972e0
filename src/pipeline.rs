//! End-to-end resolution and stitching control flow.
//!
//! `resolve_project` drives extraction, coordinate resolution, matching, and
//! neighbor resolution; `stitch_annotation` drives one record through the
//! external engine and the quality validator. Data flows strictly forward.

use std::collections::BTreeMap;
use std::path::Path;

use image::DynamicImage;

use crate::config::{ParserOptions, ValidationOptions};
use crate::constants::STITCH_DIMENSIONALITY;
use crate::error::{ResolutionWarning, SiteError};
use crate::geometry::{self, Vec2, match_annotations};
use crate::model::{AcquisitionGeometry, Annotation, AnnotationTile, Layer, Tile};
use crate::neighbors::resolve_neighbors;
use crate::parser::ProjectParser;
use crate::stitching::validator::{NeighborhoodShape, review_registration};
use crate::stitching::{StitchingEngine, nominal_offsets};

/// A fully resolved project: records ready to be batched and stitched.
#[derive(Debug)]
pub struct ResolvedProject {
    /// Tile layers keyed by their metadata location, corners resolved.
    pub layers: BTreeMap<String, Layer>,

    /// All tiles, centers resolved.
    pub tiles: Vec<Tile>,

    /// All annotations, matched or not.
    pub annotations: Vec<Annotation>,

    /// Acquisition-wide pixel geometry.
    pub geometry: AcquisitionGeometry,

    /// One record per matched annotation, neighborhoods resolved.
    pub annotation_tiles: Vec<AnnotationTile>,

    /// Recoverable conditions encountered along the way.
    pub warnings: Vec<ResolutionWarning>,
}

/// Parse a project folder and resolve every annotation to its tile and
/// neighborhood.
///
/// Fatal descriptor or configuration problems abort the whole project;
/// per-annotation conditions are logged, recorded as warnings, and the
/// affected annotation is dropped or degraded as specified.
pub fn resolve_project(
    project_folder: &Path,
    options: &ParserOptions,
) -> Result<ResolvedProject, SiteError> {
    let parser = ProjectParser::new(project_folder, options.clone());
    let mut model = parser.parse()?;

    geometry::resolve_coordinates(&mut model.layers, &mut model.tiles, &model.geometry)?;

    let outcome = match_annotations(
        &model.annotations,
        &model.tiles,
        &model.layers,
        &model.geometry,
    )?;
    let warnings = outcome.warnings;

    let mut annotation_tiles = Vec::with_capacity(outcome.matched.len());
    for mut record in outcome.matched {
        match resolve_neighbors(&mut record, options.stitch_radius) {
            Ok(()) => annotation_tiles.push(record),
            Err(error) => {
                // An I/O failure during probing aborts only this annotation.
                log::error!(
                    "Skipping annotation {}: {error}",
                    record.annotation_name
                );
            }
        }
    }

    Ok(ResolvedProject {
        layers: model.layers,
        tiles: model.tiles,
        annotations: model.annotations,
        geometry: model.geometry,
        annotation_tiles,
        warnings,
    })
}

/// One annotation record paired with the per-layer overlap fractions needed
/// to seed the external engine.
#[derive(Debug, Clone)]
pub struct StitchTask {
    /// The record to stitch.
    pub record: AnnotationTile,

    /// Horizontal overlap fraction of the record's layer.
    pub overlap_horizontal: f64,

    /// Vertical overlap fraction of the record's layer.
    pub overlap_vertical: f64,
}

impl StitchTask {
    /// Pair a record with the overlaps of its layer.
    pub fn new(record: AnnotationTile, layer: &Layer) -> Self {
        Self {
            record,
            overlap_horizontal: layer.overlap_horizontal,
            overlap_vertical: layer.overlap_vertical,
        }
    }
}

/// Result of driving one record through the external engine.
#[derive(Debug)]
pub struct StitchOutcome {
    /// The record, finalized with the stitching decision.
    pub record: AnnotationTile,

    /// The fused composite, when stitching succeeded.
    pub fused: Option<DynamicImage>,

    /// Recoverable conditions encountered while stitching.
    pub warnings: Vec<ResolutionWarning>,
}

impl StitchOutcome {
    fn unfused(record: AnnotationTile, warnings: Vec<ResolutionWarning>) -> Self {
        Self {
            record,
            fused: None,
            warnings,
        }
    }
}

/// Stitch one annotation's neighborhood with the external engine and decide
/// whether to trust the result.
///
/// Every failure path leaves the record well-formed: `stitched` stays false
/// and the original pixel position is preserved so the caller can fall back
/// to copying the unfused center tile.
pub fn stitch_annotation<E: StitchingEngine>(
    task: StitchTask,
    engine: &mut E,
    geometry: &AcquisitionGeometry,
    options: &ValidationOptions,
) -> StitchOutcome {
    let StitchTask {
        mut record,
        overlap_horizontal,
        overlap_vertical,
    } = task;
    let mut warnings = Vec::new();

    let Some((shape, center_index)) = NeighborhoodShape::from_mask(&record.neighbor_exists) else {
        let warning = ResolutionWarning::UnsupportedNeighborhood {
            annotation: record.annotation_name.clone(),
            mask: record.neighbor_exists.clone(),
        };
        warning.log();
        warnings.push(warning);
        return StitchOutcome::unfused(record, warnings);
    };
    log::info!(
        "Stitching {} ({} neighborhood, {} tiles)",
        record.annotation_name,
        shape.name(),
        shape.tile_count()
    );

    let mut images = Vec::with_capacity(shape.tile_count());
    for (name, present) in record.neighbor_names.iter().zip(&record.neighbor_exists) {
        if !*present {
            continue;
        }
        let path = record.tile.image_dir.join(name);
        match image::open(&path) {
            Ok(image) => images.push(image),
            Err(error) => {
                log::error!(
                    "Not stitching {}: failed to load tile {path:?}: {error}",
                    record.annotation_name
                );
                return StitchOutcome::unfused(record, warnings);
            }
        }
    }

    let radius = stitch_radius_of(&record.neighbor_exists) as u32;
    let nominal = nominal_offsets(
        &record.neighbor_exists,
        radius,
        geometry,
        overlap_horizontal,
        overlap_vertical,
    );

    let models = match engine.register(
        &images,
        &nominal,
        STITCH_DIMENSIONALITY,
        options.compute_overlap,
    ) {
        Ok(models) => models,
        Err(error) => {
            log::error!(
                "Not stitching {}: registration failed: {error}",
                record.annotation_name
            );
            return StitchOutcome::unfused(record, warnings);
        }
    };

    let displacements: Vec<Vec2> = match models.iter().map(|model| model.displacement()).collect()
    {
        Ok(displacements) => displacements,
        Err(error) => {
            log::error!(
                "Not stitching {}: {error}",
                record.annotation_name
            );
            return StitchOutcome::unfused(record, warnings);
        }
    };

    let review = match review_registration(
        &record.annotation_name,
        &displacements,
        &nominal,
        center_index,
        record.pixel_position,
        options.displacement_threshold,
    ) {
        Ok((review, warning)) => {
            warnings.extend(warning);
            review
        }
        Err(error) => {
            log::error!(
                "Not stitching {}: {error}",
                record.annotation_name
            );
            return StitchOutcome::unfused(record, warnings);
        }
    };

    if !review.accepted {
        return StitchOutcome::unfused(record, warnings);
    }

    match engine.fuse(&images, &models) {
        Ok(fused) => {
            record.stitched = true;
            record.stitched_position = review.stitched_position;
            StitchOutcome {
                record,
                fused: Some(fused),
                warnings,
            }
        }
        Err(error) => {
            // A registration we trust but cannot fuse still falls back to
            // the unfused center tile.
            log::error!(
                "Fusion failed for {}: {error}",
                record.annotation_name
            );
            StitchOutcome::unfused(record, warnings)
        }
    }
}

/// Stitch radius implied by the length of an existence mask.
fn stitch_radius_of(mask: &[bool]) -> usize {
    let mut side = 1usize;
    while side * side < mask.len() {
        side += 1;
    }
    (side - 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Annotation, PixelPosition};
    use crate::stitching::TileModel;

    /// Engine double returning displacements fixed at construction.
    struct FixedEngine {
        displacements: Vec<Vec2>,
    }

    impl StitchingEngine for FixedEngine {
        fn register(
            &mut self,
            _tiles: &[DynamicImage],
            _nominal_offsets: &[Vec2],
            _dimensionality: u32,
            _compute_overlap: bool,
        ) -> Result<Vec<TileModel>, SiteError> {
            Ok(self
                .displacements
                .iter()
                .map(|d| TileModel::translation(d.x, d.y))
                .collect())
        }

        fn fuse(
            &mut self,
            _tiles: &[DynamicImage],
            _models: &[TileModel],
        ) -> Result<DynamicImage, SiteError> {
            Ok(DynamicImage::new_luma8(4, 4))
        }
    }

    fn geometry() -> AcquisitionGeometry {
        AcquisitionGeometry {
            pixel_size: 1e-9,
            image_width: 100,
            image_height: 100,
        }
    }

    fn task_with_mask(name: &str, mask: Vec<bool>, dir: &Path) -> StitchTask {
        let annotation = Annotation::new(name, Vec2::new(0.0, 0.0));
        let tile = Tile::new(
            "meta",
            "sq-1",
            "Tile_001-001-000000_0-000.tif",
            dir,
            Vec2::new(0.0, 0.0),
        );
        let mut record =
            AnnotationTile::new(&annotation, tile, 1e-9, PixelPosition::new(50, 50));
        record.neighbor_names = (0..mask.len())
            .map(|i| format!("Tile_{:03}-{:03}-000000_0-000.tif", i / 3, i % 3))
            .collect();
        record.neighbor_exists = mask;
        StitchTask {
            record,
            overlap_horizontal: 0.1,
            overlap_vertical: 0.1,
        }
    }

    fn tile_fixture_dir(name: &str, names: &[String]) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join("sitestitch-tests")
            .join(format!("pipeline-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for filename in names {
            DynamicImage::new_luma8(2, 2).save(dir.join(filename)).unwrap();
        }
        dir
    }

    #[test]
    fn test_unsupported_mask_skips_stitching() {
        let dir = std::env::temp_dir();
        let mut mask = vec![true; 9];
        mask[1] = false;
        let task = task_with_mask("site_hole", mask.clone(), &dir);
        let mut engine = FixedEngine {
            displacements: vec![],
        };

        let outcome = stitch_annotation(task, &mut engine, &geometry(), &ValidationOptions::new());

        assert!(!outcome.record.stitched);
        assert!(outcome.fused.is_none());
        assert!(matches!(
            &outcome.warnings[0],
            ResolutionWarning::UnsupportedNeighborhood { mask: m, .. } if *m == mask
        ));
    }

    #[test]
    fn test_accepted_registration_marks_record_stitched() {
        // Corner neighborhood: only the bottom-right quadrant exists, so the
        // center tile is the first of the four fed to the engine.
        let mask = vec![false, false, false, false, true, true, false, true, true];
        let names: Vec<String> = (0..9)
            .map(|i| format!("Tile_{:03}-{:03}-000000_0-000.tif", i / 3, i % 3))
            .collect();
        let present: Vec<String> = names
            .iter()
            .zip(&mask)
            .filter(|(_, p)| **p)
            .map(|(n, _)| n.clone())
            .collect();
        let dir = tile_fixture_dir("corner", &present);

        let mut task = task_with_mask("site_corner", mask, &dir);
        task.record.neighbor_names = names;

        // Displacements exactly on the nominal grid: 100 px tiles at 10%
        // overlap step by 90 px.
        let mut engine = FixedEngine {
            displacements: vec![
                Vec2::new(90.0, 90.0),
                Vec2::new(180.0, 90.0),
                Vec2::new(90.0, 180.0),
                Vec2::new(180.0, 180.0),
            ],
        };

        let outcome = stitch_annotation(task, &mut engine, &geometry(), &ValidationOptions::new());

        assert!(outcome.record.stitched);
        assert!(outcome.fused.is_some());
        assert!(outcome.warnings.is_empty());
        // The center tile is the canvas origin, so the position is unmoved.
        assert_eq!(
            outcome.record.stitched_position,
            Some(PixelPosition::new(50, 50))
        );
    }

    #[test]
    fn test_rejected_registration_preserves_pixel_position() {
        let mask = vec![false, false, false, false, true, true, false, true, true];
        let names: Vec<String> = (0..9)
            .map(|i| format!("Tile_{:03}-{:03}-000000_0-000.tif", i / 3, i % 3))
            .collect();
        let present: Vec<String> = names
            .iter()
            .zip(&mask)
            .filter(|(_, p)| **p)
            .map(|(n, _)| n.clone())
            .collect();
        let dir = tile_fixture_dir("corner-reject", &present);

        let mut task = task_with_mask("site_reject", mask, &dir);
        task.record.neighbor_names = names;

        // One tile shifted one unit past the threshold.
        let threshold = 10.0;
        let mut engine = FixedEngine {
            displacements: vec![
                Vec2::new(90.0, 90.0),
                Vec2::new(180.0 + threshold + 1.0, 90.0),
                Vec2::new(90.0, 180.0),
                Vec2::new(180.0, 180.0),
            ],
        };

        let options = ValidationOptions::new().displacement_threshold(threshold);
        let outcome = stitch_annotation(task, &mut engine, &geometry(), &options);

        assert!(!outcome.record.stitched);
        assert_eq!(outcome.record.stitched_position, None);
        assert_eq!(outcome.record.pixel_position, PixelPosition::new(50, 50));
        assert!(matches!(
            &outcome.warnings[0],
            ResolutionWarning::RegistrationRejected { .. }
        ));
    }

    #[test]
    fn test_radius_from_mask_length() {
        assert_eq!(stitch_radius_of(&[true; 9]), 1);
        assert_eq!(stitch_radius_of(&[true; 25]), 2);
        assert_eq!(stitch_radius_of(&[true]), 0);
    }
}
