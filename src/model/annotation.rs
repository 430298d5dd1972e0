//! Annotation records and the matched annotation-tile unit of work.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;
use crate::model::Tile;

/// A user-placed point of interest with a globally unique name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Unique display name of the annotation.
    pub name: String,

    /// Physical stage position in meters.
    pub stage_position: Vec2,
}

impl Annotation {
    /// Create a new annotation.
    pub fn new(name: impl Into<String>, stage_position: Vec2) -> Self {
        Self {
            name: name.into(),
            stage_position,
        }
    }
}

/// An integer pixel position within a tile or fused image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPosition {
    pub x: i64,
    pub y: i64,
}

impl PixelPosition {
    /// Create a new pixel position.
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// The tile containing a given annotation, augmented step by step as it
/// moves through the pipeline.
///
/// Created by the annotation matcher, extended with the neighborhood by the
/// neighbor resolver, and finalized by the stitching quality validator. This
/// is the unit of work handed to, and returned from, the external stitching
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationTile {
    /// Name of the matched annotation.
    pub annotation_name: String,

    /// Physical stage position of the annotation in meters. Absent for
    /// annotations imported from a classifier, which locates them by tile
    /// and pixel directly.
    pub stage_position: Option<Vec2>,

    /// The tile the annotation lies in.
    pub tile: Tile,

    /// Physical size of one pixel in meters.
    pub pixel_size: f64,

    /// Pixel position of the annotation inside the tile image.
    pub pixel_position: PixelPosition,

    /// Filenames of the tiles within the stitch radius, in row-major scan
    /// order; includes the center tile itself.
    pub neighbor_names: Vec<String>,

    /// Parallel existence mask for `neighbor_names`.
    pub neighbor_exists: Vec<bool>,

    /// Whether the neighborhood was stitched and the registration accepted.
    pub stitched: bool,

    /// Pixel position of the annotation in the fused image, when stitched.
    pub stitched_position: Option<PixelPosition>,
}

impl AnnotationTile {
    /// Create a freshly matched record with an empty neighborhood.
    pub fn new(
        annotation: &Annotation,
        tile: Tile,
        pixel_size: f64,
        pixel_position: PixelPosition,
    ) -> Self {
        Self {
            annotation_name: annotation.name.clone(),
            stage_position: Some(annotation.stage_position),
            tile,
            pixel_size,
            pixel_position,
            neighbor_names: Vec::new(),
            neighbor_exists: Vec::new(),
            stitched: false,
            stitched_position: None,
        }
    }

    /// Create a record for an annotation located by tile and pixel alone,
    /// with no known stage position.
    pub fn without_stage_position(
        annotation_name: impl Into<String>,
        tile: Tile,
        pixel_size: f64,
        pixel_position: PixelPosition,
    ) -> Self {
        Self {
            annotation_name: annotation_name.into(),
            stage_position: None,
            tile,
            pixel_size,
            pixel_position,
            neighbor_names: Vec::new(),
            neighbor_exists: Vec::new(),
            stitched: false,
            stitched_position: None,
        }
    }

    /// Number of neighbors present on disk, center tile included.
    pub fn existing_neighbor_count(&self) -> usize {
        self.neighbor_exists.iter().filter(|e| **e).count()
    }
}
