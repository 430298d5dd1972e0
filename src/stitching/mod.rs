//! External stitching engine interface and registration seeding.
//!
//! The pixel-level alignment and fusion is performed by an external engine
//! consumed as a black box behind [`StitchingEngine`]. This module only
//! defines the boundary types and computes the nominal grid offsets that
//! seed the engine; whether the engine's output is trusted is decided in
//! [`validator`].

pub mod validator;

use image::DynamicImage;

use crate::error::SiteError;
use crate::geometry::Vec2;
use crate::model::AcquisitionGeometry;

/// One affine/translation model returned by the external engine, one per
/// input tile, as a serialized parameter array.
#[derive(Debug, Clone, PartialEq)]
pub struct TileModel {
    /// Serialized model parameters; the final two entries are the tile's 2D
    /// displacement in the fused canvas.
    pub parameters: Vec<f64>,
}

impl TileModel {
    /// Create a model from its serialized parameters.
    pub fn new(parameters: Vec<f64>) -> Self {
        Self { parameters }
    }

    /// Create a pure-translation model.
    pub fn translation(x: f64, y: f64) -> Self {
        Self {
            parameters: vec![x, y],
        }
    }

    /// Extract the 2D displacement from the parameter array.
    pub fn displacement(&self) -> Result<Vec2, SiteError> {
        let count = self.parameters.len();
        if count < 2 {
            return Err(SiteError::ModelParameters { count });
        }
        Ok(Vec2::new(
            self.parameters[count - 2],
            self.parameters[count - 1],
        ))
    }
}

/// The external image-stitching engine.
///
/// Implementations are owned per worker and passed explicitly into each unit
/// of work. Calls are synchronous and may hold substantial memory; there is
/// no timeout on a call (known limitation inherited from the engine).
pub trait StitchingEngine {
    /// Register an ordered set of tile images against their nominal offsets.
    ///
    /// Returns one model per input image, in input order.
    fn register(
        &mut self,
        tiles: &[DynamicImage],
        nominal_offsets: &[Vec2],
        dimensionality: u32,
        compute_overlap: bool,
    ) -> Result<Vec<TileModel>, SiteError>;

    /// Fuse the registered tiles into one composite image.
    fn fuse(
        &mut self,
        tiles: &[DynamicImage],
        models: &[TileModel],
    ) -> Result<DynamicImage, SiteError>;
}

/// Nominal pixel offsets for the present tiles of a neighborhood, in the
/// same row-major scan order as the existence mask.
///
/// These are the uniform-grid starting positions handed to the external
/// engine: each step advances by the tile size reduced by the overlap.
pub fn nominal_offsets(
    mask: &[bool],
    radius: u32,
    geometry: &AcquisitionGeometry,
    overlap_horizontal: f64,
    overlap_vertical: f64,
) -> Vec<Vec2> {
    let radius = radius as i64;
    let side = 2 * radius + 1;
    let step_x = f64::from(geometry.image_width) * (1.0 - overlap_horizontal);
    let step_y = f64::from(geometry.image_height) * (1.0 - overlap_vertical);

    let mut offsets = Vec::new();
    for (slot, present) in mask.iter().enumerate() {
        if !present {
            continue;
        }
        let row = slot as i64 / side;
        let col = slot as i64 % side;
        offsets.push(Vec2::new(col as f64 * step_x, row as f64 * step_y));
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> AcquisitionGeometry {
        AcquisitionGeometry {
            pixel_size: 1e-9,
            image_width: 4096,
            image_height: 4096,
        }
    }

    #[test]
    fn test_displacement_takes_last_two_parameters() {
        let model = TileModel::new(vec![1.0, 0.0, 0.0, 1.0, 12.5, -3.0]);
        assert_eq!(model.displacement().unwrap(), Vec2::new(12.5, -3.0));
    }

    #[test]
    fn test_short_model_is_rejected() {
        let model = TileModel::new(vec![5.0]);
        assert!(matches!(
            model.displacement(),
            Err(SiteError::ModelParameters { count: 1 })
        ));
    }

    #[test]
    fn test_full_grid_offsets() {
        let mask = vec![true; 9];
        let offsets = nominal_offsets(&mask, 1, &geometry(), 0.1, 0.1);
        assert_eq!(offsets.len(), 9);
        // 4096 * 0.9 = 3686.4 px per grid step.
        assert_eq!(offsets[0], Vec2::new(0.0, 0.0));
        assert_eq!(offsets[4], Vec2::new(3686.4, 3686.4));
        assert_eq!(offsets[8], Vec2::new(7372.8, 7372.8));
    }

    #[test]
    fn test_offsets_skip_absent_tiles() {
        // Bottom-right 2x2 quadrant only.
        let mask = vec![false, false, false, false, true, true, false, true, true];
        let offsets = nominal_offsets(&mask, 1, &geometry(), 0.1, 0.1);
        assert_eq!(offsets.len(), 4);
        assert_eq!(offsets[0], Vec2::new(3686.4, 3686.4));
        assert_eq!(offsets[3], Vec2::new(7372.8, 7372.8));
    }
}
