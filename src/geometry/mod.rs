//! Physical-coordinate resolution.
//!
//! Converts layer-relative tile offsets into absolute stage coordinates,
//! accounting for per-layer rotation. The rotation formulas were derived
//! empirically against one instrument's output and validated for rotations
//! near 90°; they are kept exactly and pinned by the tests below.

mod matcher;

pub use matcher::{MatchOutcome, match_annotations};

use std::collections::BTreeMap;
use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::error::SiteError;
use crate::model::{AcquisitionGeometry, Layer, Tile};

/// A 2D vector in either physical (meters) or pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    /// Create a new vector.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean length.
    pub fn length_sq(&self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Component-wise minimum of two vectors.
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    /// Largest absolute component.
    pub fn max_abs_component(&self) -> f64 {
        self.x.abs().max(self.y.abs())
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

/// Physical per-pixel step vectors along a layer's rotated X and Y axes.
///
/// Note the basis is deliberately not an orthogonal rotation pair: both
/// components of the Y step use the same sign as the X step. This matches the
/// instrument's coordinate convention and is reused verbatim when solving for
/// in-tile annotation offsets.
pub fn step_vectors(rotation_degrees: f64, pixel_size: f64) -> (Vec2, Vec2) {
    let theta = rotation_degrees.to_radians();
    let step_x = Vec2::new(pixel_size * theta.cos(), pixel_size * theta.sin());
    let step_y = Vec2::new(pixel_size * theta.sin(), pixel_size * theta.cos());
    (step_x, step_y)
}

/// Compute a layer's vertical tile field width and top-left physical corner.
///
/// Returns `(tile_vfw, corner)`. The corner is derived from the layer center,
/// its rotation, and the total horizontal/vertical spans of the tile grid.
pub fn layer_corner(layer: &Layer, geometry: &AcquisitionGeometry) -> (f64, Vec2) {
    // Tile images are uniform across the acquisition, so the vertical field
    // width follows from the aspect ratio of the tile images.
    let tile_vfw =
        f64::from(geometry.image_height) / f64::from(geometry.image_width) * layer.tile_hfw;

    let horizontal_span = (f64::from(layer.columns) - 1.0)
        * layer.tile_hfw
        * (1.0 - layer.overlap_horizontal)
        + layer.tile_hfw;
    let vertical_span =
        (f64::from(layer.rows) - 1.0) * tile_vfw * (1.0 - layer.overlap_vertical) + tile_vfw;

    let theta = layer.rotation_degrees.to_radians();
    let corner = Vec2::new(
        layer.center.x - theta.sin() * vertical_span / 2.0 + theta.cos() * horizontal_span / 2.0,
        layer.center.y - theta.cos() * vertical_span / 2.0 - theta.sin() * horizontal_span / 2.0,
    );
    (tile_vfw, corner)
}

/// Attach absolute physical positions to every layer corner and tile center.
///
/// Pure function of already-extracted data. A tile referencing a layer that
/// was never extracted is a fatal precondition violation.
pub fn resolve_coordinates(
    layers: &mut BTreeMap<String, Layer>,
    tiles: &mut [Tile],
    geometry: &AcquisitionGeometry,
) -> Result<(), SiteError> {
    for (key, layer) in layers.iter_mut() {
        let (tile_vfw, corner) = layer_corner(layer, geometry);
        layer.tile_vfw = Some(tile_vfw);
        layer.corner = Some(corner);

        let (step_x, step_y) = step_vectors(layer.rotation_degrees, geometry.pixel_size);
        let half_width = f64::from(geometry.image_width) / 2.0;
        let half_height = f64::from(geometry.image_height) / 2.0;

        for tile in tiles.iter_mut().filter(|t| t.layer_key == *key) {
            // The offset lands on the tile corner; stepping in by half a tile
            // in both axes yields the center.
            let tile_corner =
                corner + step_x * tile.relative_position.x + step_y * tile.relative_position.y;
            tile.center = Some(tile_corner + step_x * half_width + step_y * half_height);
        }
    }

    if let Some(orphan) = tiles.iter().find(|t| t.center.is_none()) {
        return Err(SiteError::invalid_descriptor(format!(
            "tile '{}' references unknown layer '{}'",
            orphan.key(),
            orphan.layer_key
        )));
    }
    Ok(())
}
