//! Bounded worker pool for batch stitching.
//!
//! Batches of annotations are distributed across named worker threads, each
//! owning its own instance of the external stitching engine. Workers share
//! no mutable state; finished records are funneled back over an mpsc channel
//! and log records go through the log facade, so output cannot interleave
//! corruptly. There is no cancellation: a worker either completes an
//! annotation or logs its rejection and proceeds to the next.

use std::path::Path;
use std::sync::mpsc;
use std::thread;

use crate::config::ValidationOptions;
use crate::error::SiteError;
use crate::model::{AcquisitionGeometry, AnnotationTile};
use crate::pipeline::{StitchOutcome, StitchTask, stitch_annotation};
use crate::stitching::StitchingEngine;

/// Process batches of stitch tasks on up to `max_workers` worker threads.
///
/// `make_engine` is called once per worker so every thread owns its engine
/// exclusively. When `output_dir` is given, each annotation's fused image is
/// saved there as `<name>.png`; annotations that could not be stitched get
/// an unfused copy of their center tile instead. Returns the finalized
/// records sorted by annotation name.
pub fn process_batches<E, F>(
    batches: Vec<Vec<StitchTask>>,
    geometry: AcquisitionGeometry,
    options: &ValidationOptions,
    max_workers: usize,
    output_dir: Option<&Path>,
    make_engine: F,
) -> Result<Vec<AnnotationTile>, SiteError>
where
    E: StitchingEngine,
    F: Fn() -> E + Sync,
{
    let total: usize = batches.iter().map(Vec::len).sum();
    if total == 0 {
        return Ok(Vec::new());
    }
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)?;
    }

    let worker_count = max_workers.clamp(1, batches.len().max(1));
    let mut assignments: Vec<Vec<Vec<StitchTask>>> = (0..worker_count).map(|_| Vec::new()).collect();
    for (index, batch) in batches.into_iter().enumerate() {
        assignments[index % worker_count].push(batch);
    }

    log::info!(
        "Stitching {total} annotations in {} batches on {worker_count} workers",
        assignments.iter().map(Vec::len).sum::<usize>()
    );

    let (result_tx, result_rx) = mpsc::channel::<AnnotationTile>();
    let make_engine = &make_engine;

    thread::scope(|scope| -> Result<(), SiteError> {
        for (index, work) in assignments.into_iter().enumerate() {
            let result_tx = result_tx.clone();
            thread::Builder::new()
                .name(format!("stitch-worker-{index}"))
                .spawn_scoped(scope, move || {
                    log::debug!("Stitch worker {index} started");
                    let mut engine = make_engine();
                    for batch in work {
                        for task in batch {
                            let outcome =
                                stitch_annotation(task, &mut engine, &geometry, options);
                            if let Some(dir) = output_dir {
                                save_outcome(dir, &outcome);
                            }
                            if result_tx.send(outcome.record).is_err() {
                                log::warn!("Result channel closed, worker {index} exiting");
                                return;
                            }
                        }
                    }
                    log::debug!("Stitch worker {index} finished");
                })?;
        }
        drop(result_tx);
        Ok(())
    })?;

    let mut records: Vec<AnnotationTile> = result_rx.into_iter().collect();
    records.sort_by(|a, b| a.annotation_name.cmp(&b.annotation_name));

    let stitched = records.iter().filter(|r| r.stitched).count();
    log::info!(
        "Stitched {stitched}/{} annotations successfully",
        records.len()
    );
    Ok(records)
}

/// Persist one annotation's image output.
///
/// Failures here are logged, not propagated: the record itself stays valid
/// and is still returned to the caller.
fn save_outcome(output_dir: &Path, outcome: &StitchOutcome) {
    let record = &outcome.record;
    match &outcome.fused {
        Some(fused) => {
            let target = output_dir.join(format!("{}.png", record.annotation_name));
            if let Err(error) = fused.save(&target) {
                log::error!(
                    "Failed to save fused image for {} to {target:?}: {error}",
                    record.annotation_name
                );
            }
        }
        None => {
            // Unfused fallback: copy only the center tile so downstream
            // records stay well-formed.
            let source = record.tile.image_path();
            let target = output_dir.join(format!("{}.tif", record.annotation_name));
            if let Err(error) = std::fs::copy(&source, &target) {
                log::error!(
                    "Failed to copy unfused tile for {} from {source:?}: {error}",
                    record.annotation_name
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec2;
    use crate::model::{Annotation, PixelPosition, Tile};
    use crate::stitching::TileModel;
    use image::DynamicImage;

    /// Engine double that reports every tile exactly on its nominal offset.
    struct PerfectEngine;

    impl StitchingEngine for PerfectEngine {
        fn register(
            &mut self,
            _tiles: &[DynamicImage],
            nominal_offsets: &[Vec2],
            _dimensionality: u32,
            _compute_overlap: bool,
        ) -> Result<Vec<TileModel>, SiteError> {
            Ok(nominal_offsets
                .iter()
                .map(|offset| TileModel::translation(offset.x, offset.y))
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

    fn full_task(name: &str, dir: &Path) -> StitchTask {
        let annotation = Annotation::new(name, Vec2::new(0.0, 0.0));
        let tile = Tile::new(
            "meta",
            "sq-1",
            "Tile_001-001-000000_0-000.tif",
            dir,
            Vec2::new(0.0, 0.0),
        );
        let mut record = AnnotationTile::new(&annotation, tile, 1e-9, PixelPosition::new(50, 50));
        record.neighbor_names = (0..9)
            .map(|i| format!("Tile_{:03}-{:03}-000000_0-000.tif", i / 3, i % 3))
            .collect();
        record.neighbor_exists = vec![true; 9];
        StitchTask {
            record,
            overlap_horizontal: 0.1,
            overlap_vertical: 0.1,
        }
    }

    fn fixture_dir(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir()
            .join("sitestitch-tests")
            .join(format!("worker-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        for row in 0..3 {
            for col in 0..3 {
                DynamicImage::new_luma8(2, 2)
                    .save(dir.join(format!("Tile_{row:03}-{col:03}-000000_0-000.tif")))
                    .unwrap();
            }
        }
        dir
    }

    #[test]
    fn test_pool_processes_all_batches() {
        let dir = fixture_dir("pool");
        let batches = vec![
            vec![full_task("site_b", &dir), full_task("site_a", &dir)],
            vec![full_task("site_c", &dir)],
        ];

        let records = process_batches(
            batches,
            geometry(),
            &ValidationOptions::new(),
            2,
            None,
            || PerfectEngine,
        )
        .unwrap();

        assert_eq!(records.len(), 3);
        // Records come back sorted regardless of worker interleaving.
        let names: Vec<&str> = records.iter().map(|r| r.annotation_name.as_str()).collect();
        assert_eq!(names, vec!["site_a", "site_b", "site_c"]);
        assert!(records.iter().all(|r| r.stitched));
    }

    #[test]
    fn test_fused_images_are_saved() {
        let dir = fixture_dir("saved");
        let output = dir.join("stitched");
        let batches = vec![vec![full_task("site_a", &dir)]];

        process_batches(
            batches,
            geometry(),
            &ValidationOptions::new(),
            1,
            Some(&output),
            || PerfectEngine,
        )
        .unwrap();

        assert!(output.join("site_a.png").is_file());
    }

    #[test]
    fn test_empty_input_spawns_nothing() {
        let records = process_batches(
            Vec::new(),
            geometry(),
            &ValidationOptions::new(),
            4,
            None,
            || PerfectEngine,
        )
        .unwrap();
        assert!(records.is_empty());
    }
}
