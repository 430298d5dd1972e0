//! Project-wide constants for descriptor parsing and stitching defaults.

use std::ops::Range;

/// File name of the project descriptor inside a project folder.
pub const PROJECT_DESCRIPTOR_FILENAME: &str = "MapsProject.xml";

/// File name of the per-layer stitching descriptor.
pub const LAYER_DESCRIPTOR_FILENAME: &str = "StitchingData.xml";

/// Path component under which the acquisition tool stores raw layer data.
/// Device-local image paths are rebased into the project folder from here.
pub const LAYERS_DATA_DIR: &str = "LayersData";

/// Character range of the zero-padded row field in a tile filename.
pub const TILE_ROW_FIELD: Range<usize> = 5..8;

/// Character range of the zero-padded column field in a tile filename.
pub const TILE_COL_FIELD: Range<usize> = 9..12;

/// Width of the zero-padded row/column fields in a tile filename.
pub const TILE_ADDRESS_WIDTH: usize = 3;

/// Name of the acquisition group whose tile layers carry the annotated images.
pub const DEFAULT_HIGHMAG_LAYER: &str = "highmag";

/// Default number of tile-steps in each direction around a matched tile.
pub const DEFAULT_STITCH_RADIUS: u32 = 1;

/// Default maximum per-tile displacement shift (in pixels) for accepting an
/// external registration result.
pub const DEFAULT_DISPLACEMENT_THRESHOLD: f64 = 1000.0;

/// Dimensionality passed to the external stitching engine.
pub const STITCH_DIMENSIONALITY: u32 = 2;

/// Default number of annotations per CSV batch file.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default number of worker threads for batch stitching.
pub const DEFAULT_MAX_WORKERS: usize = 4;
