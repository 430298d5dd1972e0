//! Stitching quality validation.
//!
//! Pure numeric policy over coordinates: decides whether an externally
//! computed registration is trustworthy and, if so, where the annotation
//! lands in the fused canvas. Performs no image I/O.

use crate::error::{ResolutionWarning, SiteError};
use crate::geometry::Vec2;
use crate::model::PixelPosition;

/// The supported rectangular neighborhood patterns around a matched tile,
/// parameterized by which neighbor slots exist.
///
/// Shapes are named for where the matched tile sits in its layer grid: a
/// tile on the top edge has no neighbors above it, a tile in the top-left
/// corner additionally has none to its left, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborhoodShape {
    /// Full 3x3 neighborhood, all nine tiles present.
    Full,
    /// Top-edge tile: the row above is missing (3x2).
    EdgeTop,
    /// Bottom-edge tile: the row below is missing (3x2).
    EdgeBottom,
    /// Left-edge tile: the column to the left is missing (2x3).
    EdgeLeft,
    /// Right-edge tile: the column to the right is missing (2x3).
    EdgeRight,
    /// Top-left corner tile: only the bottom-right 2x2 quadrant exists.
    CornerTopLeft,
    /// Top-right corner tile: only the bottom-left 2x2 quadrant exists.
    CornerTopRight,
    /// Bottom-left corner tile: only the top-right 2x2 quadrant exists.
    CornerBottomLeft,
    /// Bottom-right corner tile: only the top-left 2x2 quadrant exists.
    CornerBottomRight,
}

/// Existence patterns in row-major scan order, paired with the shape they
/// identify. Only radius-1 neighborhoods (nine slots) are supported.
const PATTERNS: [([bool; 9], NeighborhoodShape); 9] = [
    (
        [true, true, true, true, true, true, true, true, true],
        NeighborhoodShape::Full,
    ),
    (
        [false, false, false, true, true, true, true, true, true],
        NeighborhoodShape::EdgeTop,
    ),
    (
        [true, true, true, true, true, true, false, false, false],
        NeighborhoodShape::EdgeBottom,
    ),
    (
        [false, true, true, false, true, true, false, true, true],
        NeighborhoodShape::EdgeLeft,
    ),
    (
        [true, true, false, true, true, false, true, true, false],
        NeighborhoodShape::EdgeRight,
    ),
    (
        [false, false, false, false, true, true, false, true, true],
        NeighborhoodShape::CornerTopLeft,
    ),
    (
        [false, false, false, true, true, false, true, true, false],
        NeighborhoodShape::CornerTopRight,
    ),
    (
        [false, true, true, false, true, true, false, false, false],
        NeighborhoodShape::CornerBottomLeft,
    ),
    (
        [true, true, false, true, true, false, false, false, false],
        NeighborhoodShape::CornerBottomRight,
    ),
];

impl NeighborhoodShape {
    /// Classify an existence mask, returning the shape and the index of the
    /// center tile within the compacted sequence of present tiles.
    ///
    /// Returns `None` for any mask that is not one of the nine supported
    /// rectangular patterns (including non-radius-1 masks); callers must
    /// treat that as an unsupported neighborhood rather than mis-stitching.
    pub fn from_mask(mask: &[bool]) -> Option<(Self, usize)> {
        let (pattern, shape) = PATTERNS.iter().find(|entry| entry.0.as_slice() == mask)?;
        // The center tile occupies full-grid slot 4; its index among the
        // present tiles is the number of present slots before it.
        let center_index = pattern[..4].iter().filter(|p| **p).count();
        Some((*shape, center_index))
    }

    /// Get the display name for this shape.
    pub fn name(&self) -> &'static str {
        match self {
            NeighborhoodShape::Full => "full 3x3",
            NeighborhoodShape::EdgeTop => "top edge",
            NeighborhoodShape::EdgeBottom => "bottom edge",
            NeighborhoodShape::EdgeLeft => "left edge",
            NeighborhoodShape::EdgeRight => "right edge",
            NeighborhoodShape::CornerTopLeft => "top-left corner",
            NeighborhoodShape::CornerTopRight => "top-right corner",
            NeighborhoodShape::CornerBottomLeft => "bottom-left corner",
            NeighborhoodShape::CornerBottomRight => "bottom-right corner",
        }
    }

    /// Number of tiles present in this shape.
    pub fn tile_count(&self) -> usize {
        match self {
            NeighborhoodShape::Full => 9,
            NeighborhoodShape::EdgeTop
            | NeighborhoodShape::EdgeBottom
            | NeighborhoodShape::EdgeLeft
            | NeighborhoodShape::EdgeRight => 6,
            _ => 4,
        }
    }
}

/// Outcome of reviewing an external registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationReview {
    /// Whether the registration is trustworthy.
    pub accepted: bool,

    /// Per-tile shifts between registered displacement and nominal offset.
    pub shifts: Vec<Vec2>,

    /// Largest absolute shift component across all tiles.
    pub max_shift: f64,

    /// The annotation's pixel position in the fused canvas, when accepted.
    pub stitched_position: Option<PixelPosition>,
}

/// Review a registration result against the nominal grid offsets.
///
/// The registration is accepted when every tile's shift component stays
/// strictly below `threshold` pixels. On acceptance the annotation's pixel
/// position is re-based into the fused canvas, whose origin is the
/// top-left-most placed tile. On rejection the original position is left
/// untouched so the caller can fall back to the unfused center tile.
pub fn review_registration(
    annotation_name: &str,
    displacements: &[Vec2],
    nominal_offsets: &[Vec2],
    center_index: usize,
    original_position: PixelPosition,
    threshold: f64,
) -> Result<(RegistrationReview, Option<ResolutionWarning>), SiteError> {
    if displacements.len() != nominal_offsets.len() {
        return Err(SiteError::invalid_registration(format!(
            "{} displacement models for {} nominal offsets",
            displacements.len(),
            nominal_offsets.len()
        )));
    }
    if center_index >= displacements.len() {
        return Err(SiteError::invalid_registration(format!(
            "center index {} out of range for {} tiles",
            center_index,
            displacements.len()
        )));
    }

    let shifts: Vec<Vec2> = displacements
        .iter()
        .zip(nominal_offsets)
        .map(|(displacement, nominal)| *displacement - *nominal)
        .collect();
    let max_shift = shifts
        .iter()
        .map(Vec2::max_abs_component)
        .fold(0.0, f64::max);

    if max_shift < threshold {
        let origin = displacements
            .iter()
            .copied()
            .reduce(Vec2::min)
            .unwrap_or_default();
        let center = displacements[center_index];
        let stitched_position = PixelPosition::new(
            original_position.x + (center.x - origin.x).round() as i64,
            original_position.y + (center.y - origin.y).round() as i64,
        );
        log::info!(
            "Registration for annotation {annotation_name} accepted \
             (max shift {max_shift:.1} px < {threshold:.1} px)"
        );
        Ok((
            RegistrationReview {
                accepted: true,
                shifts,
                max_shift,
                stitched_position: Some(stitched_position),
            },
            None,
        ))
    } else {
        let warning = ResolutionWarning::RegistrationRejected {
            annotation: annotation_name.to_string(),
            shifts: shifts.clone(),
            max_shift,
            threshold,
        };
        warning.log();
        Ok((
            RegistrationReview {
                accepted: false,
                shifts,
                max_shift,
                stitched_position: None,
            },
            Some(warning),
        ))
    }
}
