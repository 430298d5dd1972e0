//! Annotation import from an external classifier.
//!
//! Instead of operator-placed descriptor annotations, a classifier can emit
//! a CSV of detections, one row per detection: the tile-set (layer) name,
//! the tile filename, and the top-left corner of the detection window. The
//! import maps each detection onto the already-extracted tiles and
//! synthesizes sequential annotation names. Stage positions are not
//! recomputed; the classifier already names the tile of interest.

use std::collections::BTreeMap;
use std::path::Path;

use crate::batch::split_line;
use crate::error::SiteError;
use crate::model::{AnnotationTile, PixelPosition, Tile};
use crate::parser::ProjectModel;

/// Half the classifier's detection window: added to the reported top-left
/// corner to land on the detection center.
pub const DEFAULT_ANNOTATION_SHIFT: i64 = 128;

/// Build annotation-tile records from a classifier's detection CSV.
///
/// `annotation_shift` moves the reported top-left corners to window centers.
/// Detections referencing unknown tiles are a fatal error: they indicate the
/// classifier ran against a different project.
pub fn parse_classifier_output(
    model: &ProjectModel,
    csv_path: &Path,
    annotation_shift: i64,
) -> Result<Vec<AnnotationTile>, SiteError> {
    let tiles_by_key: BTreeMap<String, &Tile> =
        model.tiles.iter().map(|tile| (tile.key(), tile)).collect();

    let content = std::fs::read_to_string(csv_path)?;
    let mut records = Vec::new();

    for (line_number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_line(line);
        let [tile_set, filename, x, y] = fields.as_slice() else {
            return Err(SiteError::malformed_record(format!(
                "classifier row {} has {} fields, expected tile set, filename, x, y",
                line_number + 1,
                fields.len()
            )));
        };

        let key = format!("{tile_set}_{filename}");
        let tile = tiles_by_key.get(&key).ok_or_else(|| {
            SiteError::malformed_record(format!(
                "classifier row {} references unknown tile '{key}'",
                line_number + 1
            ))
        })?;
        let corner_x = parse_coordinate(x, line_number)?;
        let corner_y = parse_coordinate(y, line_number)?;

        let name = format!("Site_{:05}", records.len() + 1);
        records.push(AnnotationTile::without_stage_position(
            name,
            (*tile).clone(),
            model.geometry.pixel_size,
            PixelPosition::new(corner_x + annotation_shift, corner_y + annotation_shift),
        ));
    }

    log::info!(
        "Imported {} classifier detections from {csv_path:?}",
        records.len()
    );
    Ok(records)
}

fn parse_coordinate(field: &str, line_number: usize) -> Result<i64, SiteError> {
    field.trim().parse().map_err(|_| {
        SiteError::malformed_record(format!(
            "classifier row {} holds non-integer coordinate '{field}'",
            line_number + 1
        ))
    })
}
