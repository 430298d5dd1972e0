//! CSV persistence for annotation-tile batches.
//!
//! Batches are tabular files whose rows are annotation names and whose
//! columns are the record fields, preceded by a caller-supplied base header
//! of blank categorization columns filled in by users afterwards.
//! List-valued fields are serialized as a bracketed, comma-joined string and
//! boolean lists as the literal strings `True`/`False`; loading parses these
//! back symmetrically.

pub mod worker;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::SiteError;
use crate::geometry::Vec2;
use crate::model::{AnnotationTile, PixelPosition, Tile};

/// Record columns written after the annotation name and the base header.
const RECORD_COLUMNS: [&str; 17] = [
    "layer_key",
    "layer_name",
    "filename",
    "image_dir",
    "relative_position_x",
    "relative_position_y",
    "pixel_size",
    "annotation_stage_x",
    "annotation_stage_y",
    "pixel_position_x",
    "pixel_position_y",
    "neighbor_names",
    "neighbor_exists",
    "stitched",
    "stitched_position_x",
    "stitched_position_y",
    "existing_neighbors",
];

/// Save annotation-tile records to one CSV file, or to numbered batches of
/// `batch_size` records when it is non-zero.
///
/// Returns the paths of all files written. Existing files are overwritten.
pub fn save_batches(
    records: &[AnnotationTile],
    base_header: &[&str],
    csv_path: &Path,
    batch_size: usize,
) -> Result<Vec<PathBuf>, SiteError> {
    if csv_path.extension().is_none_or(|ext| ext != "csv") {
        return Err(SiteError::malformed_record(format!(
            "batch path {csv_path:?} must end in .csv"
        )));
    }
    if records.is_empty() {
        log::warn!("No annotation records to save to {csv_path:?}");
        return Ok(Vec::new());
    }

    let batches: Vec<&[AnnotationTile]> = if batch_size == 0 {
        vec![records]
    } else {
        records.chunks(batch_size).collect()
    };

    let mut files = Vec::new();
    for (index, batch) in batches.iter().enumerate() {
        let path = if batch_size == 0 {
            csv_path.to_path_buf()
        } else {
            batch_path(csv_path, index)
        };

        let mut content = String::new();
        let header = std::iter::once("Image")
            .chain(base_header.iter().copied())
            .chain(RECORD_COLUMNS)
            .map(escape_field)
            .collect::<Vec<_>>()
            .join(",");
        content.push_str(&header);
        content.push('\n');

        for record in *batch {
            let mut row: Vec<String> = Vec::with_capacity(1 + base_header.len() + 17);
            row.push(escape_field(&record.annotation_name));
            row.extend(base_header.iter().map(|_| String::new()));
            push_record_fields(&mut row, record);
            let _ = writeln!(content, "{}", row.join(","));
        }

        std::fs::write(&path, content)?;
        log::info!("Saved {} annotations to {:?}", batch.len(), path);
        files.push(path);
    }
    Ok(files)
}

/// Load the records of one batch file written by [`save_batches`].
///
/// Columns outside the record set (the base header) are ignored.
pub fn load_batch(csv_path: &Path) -> Result<Vec<AnnotationTile>, SiteError> {
    let content = std::fs::read_to_string(csv_path)?;
    let mut lines = content.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| SiteError::malformed_record(format!("{csv_path:?} is empty")))?;
    let columns: HashMap<String, usize> = split_line(header_line)
        .into_iter()
        .enumerate()
        .map(|(index, name)| (name, index))
        .collect();

    let mut records = Vec::new();
    for line in lines.filter(|line| !line.trim().is_empty()) {
        let fields = split_line(line);
        let field = |name: &str| column(&columns, &fields, name, csv_path);

        let annotation_name = field("Image")?;
        let tile = Tile {
            layer_key: field("layer_key")?,
            layer_name: field("layer_name")?,
            filename: field("filename")?,
            image_dir: PathBuf::from(field("image_dir")?),
            relative_position: Vec2::new(
                parse_number(&field("relative_position_x")?, "relative_position_x")?,
                parse_number(&field("relative_position_y")?, "relative_position_y")?,
            ),
            center: None,
        };

        let stage_position = match (
            field("annotation_stage_x")?.as_str(),
            field("annotation_stage_y")?.as_str(),
        ) {
            ("", _) | (_, "") => None,
            (x, y) => Some(Vec2::new(
                parse_number(x, "annotation_stage_x")?,
                parse_number(y, "annotation_stage_y")?,
            )),
        };
        let stitched_position = match (
            field("stitched_position_x")?.as_str(),
            field("stitched_position_y")?.as_str(),
        ) {
            ("", _) | (_, "") => None,
            (x, y) => Some(PixelPosition::new(
                parse_int(x, "stitched_position_x")?,
                parse_int(y, "stitched_position_y")?,
            )),
        };

        records.push(AnnotationTile {
            annotation_name,
            stage_position,
            tile,
            pixel_size: parse_number(&field("pixel_size")?, "pixel_size")?,
            pixel_position: PixelPosition::new(
                parse_int(&field("pixel_position_x")?, "pixel_position_x")?,
                parse_int(&field("pixel_position_y")?, "pixel_position_y")?,
            ),
            neighbor_names: parse_string_list(&field("neighbor_names")?),
            neighbor_exists: parse_bool_list(&field("neighbor_exists")?)?,
            stitched: parse_bool(&field("stitched")?)?,
            stitched_position,
        });
    }

    log::info!("Loaded {} annotations from {:?}", records.len(), csv_path);
    Ok(records)
}

/// Look up one named column in a split row.
fn column(
    columns: &HashMap<String, usize>,
    fields: &[String],
    name: &str,
    csv_path: &Path,
) -> Result<String, SiteError> {
    columns
        .get(name)
        .and_then(|index| fields.get(*index))
        .cloned()
        .ok_or_else(|| {
            SiteError::malformed_record(format!("column '{name}' missing in {csv_path:?}"))
        })
}

/// Path of the numbered batch file for `index`.
fn batch_path(csv_path: &Path, index: usize) -> PathBuf {
    let stem = csv_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("annotations");
    csv_path.with_file_name(format!("{stem}_{index:05}.csv"))
}

fn push_record_fields(row: &mut Vec<String>, record: &AnnotationTile) {
    row.push(escape_field(&record.tile.layer_key));
    row.push(escape_field(&record.tile.layer_name));
    row.push(escape_field(&record.tile.filename));
    row.push(escape_field(&record.tile.image_dir.to_string_lossy()));
    row.push(record.tile.relative_position.x.to_string());
    row.push(record.tile.relative_position.y.to_string());
    row.push(record.pixel_size.to_string());
    match record.stage_position {
        Some(position) => {
            row.push(position.x.to_string());
            row.push(position.y.to_string());
        }
        None => {
            row.push(String::new());
            row.push(String::new());
        }
    }
    row.push(record.pixel_position.x.to_string());
    row.push(record.pixel_position.y.to_string());
    row.push(escape_field(&format_list(
        record.neighbor_names.iter().map(String::as_str),
    )));
    row.push(escape_field(&format_list(
        record.neighbor_exists.iter().map(|e| bool_literal(*e)),
    )));
    row.push(bool_literal(record.stitched).to_string());
    match record.stitched_position {
        Some(position) => {
            row.push(position.x.to_string());
            row.push(position.y.to_string());
        }
        None => {
            row.push(String::new());
            row.push(String::new());
        }
    }
    row.push(record.existing_neighbor_count().to_string());
}

fn bool_literal(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn format_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(","))
}

fn parse_string_list(field: &str) -> Vec<String> {
    let inner = field.trim().trim_start_matches('[').trim_end_matches(']');
    inner
        .split(',')
        .filter(|item| !item.is_empty())
        .map(|item| item.trim().to_string())
        .collect()
}

fn parse_bool_list(field: &str) -> Result<Vec<bool>, SiteError> {
    parse_string_list(field)
        .iter()
        .map(|item| parse_bool(item))
        .collect()
}

fn parse_bool(field: &str) -> Result<bool, SiteError> {
    match field {
        "True" => Ok(true),
        "False" => Ok(false),
        other => Err(SiteError::malformed_record(format!(
            "expected True or False, found '{other}'"
        ))),
    }
}

fn parse_number(field: &str, column: &str) -> Result<f64, SiteError> {
    field.parse().map_err(|_| {
        SiteError::malformed_record(format!("column '{column}' holds non-numeric '{field}'"))
    })
}

fn parse_int(field: &str, column: &str) -> Result<i64, SiteError> {
    field.parse().map_err(|_| {
        SiteError::malformed_record(format!("column '{column}' holds non-integer '{field}'"))
    })
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
pub(crate) fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Split one CSV line into fields, honoring double-quote escaping.
pub(crate) fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
