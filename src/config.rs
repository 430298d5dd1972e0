//! Option types configuring parsing and registration validation.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DISPLACEMENT_THRESHOLD, DEFAULT_HIGHMAG_LAYER, DEFAULT_STITCH_RADIUS,
};

/// Which of the two alternative per-tile position fields to read from the
/// layer stitching descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TilePositionSource {
    /// Positions as the acquisition tool believes it acquired the tiles.
    /// This is the default since registered positions are frequently absent.
    #[default]
    AsAcquired,
    /// Positions as calculated by the acquisition tool's own registration.
    AsCalculated,
}

impl TilePositionSource {
    /// Get the display name for this source.
    pub fn name(&self) -> &'static str {
        match self {
            TilePositionSource::AsAcquired => "as-acquired",
            TilePositionSource::AsCalculated => "as-calculated",
        }
    }

    /// Local name of the descriptor element carrying this position.
    pub fn element_name(&self) -> &'static str {
        match self {
            TilePositionSource::AsAcquired => "UnalignedPosition",
            TilePositionSource::AsCalculated => "CalculatedPosition",
        }
    }
}

/// Options for parsing a project folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserOptions {
    /// Name of the acquisition group whose tile layers are searched for
    /// annotation-bearing tiles.
    pub highmag_layer: String,

    /// Which per-tile position field to extract.
    pub position_source: TilePositionSource,

    /// Number of tile-steps in each direction around a matched tile to
    /// include in the stitched neighborhood.
    pub stitch_radius: u32,

    /// Whether parsing fails when the descriptor contains no annotations.
    /// Disable when annotations come from an external classifier instead.
    pub require_annotations: bool,
}

impl ParserOptions {
    /// Create new parser options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the name of the high-magnification acquisition group.
    pub fn highmag_layer(mut self, name: impl Into<String>) -> Self {
        self.highmag_layer = name.into();
        self
    }

    /// Set which per-tile position field to extract.
    pub fn position_source(mut self, source: TilePositionSource) -> Self {
        self.position_source = source;
        self
    }

    /// Set the stitch radius.
    pub fn stitch_radius(mut self, radius: u32) -> Self {
        self.stitch_radius = radius;
        self
    }

    /// Set whether a project without annotations is an error.
    pub fn require_annotations(mut self, require: bool) -> Self {
        self.require_annotations = require;
        self
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            highmag_layer: DEFAULT_HIGHMAG_LAYER.to_string(),
            position_source: TilePositionSource::default(),
            stitch_radius: DEFAULT_STITCH_RADIUS,
            require_annotations: true,
        }
    }
}

/// Options for validating an external registration result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Maximum per-tile shift component (pixels) between registered and
    /// nominal offsets for the registration to be accepted.
    pub displacement_threshold: f64,

    /// Whether the external engine should compute tile overlaps itself.
    pub compute_overlap: bool,
}

impl ValidationOptions {
    /// Create new validation options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the displacement acceptance threshold in pixels.
    pub fn displacement_threshold(mut self, threshold: f64) -> Self {
        self.displacement_threshold = threshold;
        self
    }

    /// Set whether the engine computes overlaps.
    pub fn compute_overlap(mut self, compute: bool) -> Self {
        self.compute_overlap = compute;
        self
    }
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            displacement_threshold: DEFAULT_DISPLACEMENT_THRESHOLD,
            compute_overlap: true,
        }
    }
}
