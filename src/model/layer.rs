//! Layer records and acquisition-wide geometry.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;

/// Values that must be identical across every layer of an acquisition pass.
///
/// Divergence between layers is a fatal configuration error, so these are
/// held once instead of per layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionGeometry {
    /// Physical size of one pixel in meters.
    pub pixel_size: f64,

    /// Width of each tile image in pixels.
    pub image_width: u32,

    /// Height of each tile image in pixels.
    pub image_height: u32,
}

impl AcquisitionGeometry {
    /// Squared physical distance from a tile center to its corner.
    ///
    /// An annotation farther than this from every tile center lies outside
    /// all tiles.
    pub fn matching_threshold_sq(&self) -> f64 {
        let half_height = f64::from(self.image_height) / 2.0 * self.pixel_size;
        let half_width = f64::from(self.image_width) / 2.0 * self.pixel_size;
        half_height * half_height + half_width * half_width
    }
}

/// One acquisition square: a grid of overlapping tiles captured at a fixed
/// stage rotation and center position.
///
/// Created during extraction; `tile_vfw` and `corner` are attached during
/// coordinate resolution and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Layer key: the metadata-file location as written in the descriptor.
    pub key: String,

    /// Display name of the layer, taken from its tile image folder.
    pub name: String,

    /// Physical stage position of the layer center in meters.
    pub center: Vec2,

    /// Rotation of the layer in degrees, clockwise from the stage X axis.
    pub rotation_degrees: f64,

    /// Number of tile rows in the layer grid.
    pub rows: u32,

    /// Number of tile columns in the layer grid.
    pub columns: u32,

    /// Horizontal overlap between neighboring tiles as a 0-1 fraction.
    pub overlap_horizontal: f64,

    /// Vertical overlap between neighboring tiles as a 0-1 fraction.
    pub overlap_vertical: f64,

    /// Horizontal field width of one tile in meters.
    pub tile_hfw: f64,

    /// Horizontal field width of the whole layer in meters.
    pub total_hfw: f64,

    /// Vertical field width of one tile in meters; attached during
    /// coordinate resolution.
    pub tile_vfw: Option<f64>,

    /// Physical stage position of the layer's top-left corner; attached
    /// during coordinate resolution.
    pub corner: Option<Vec2>,
}
