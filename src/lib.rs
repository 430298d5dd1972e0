//! sitestitch - annotation site resolution for mosaic EM acquisitions.
//!
//! Locates the image tiles containing operator-marked sites of interest in a
//! tiled microscope acquisition, resolves the neighborhood of tiles to
//! stitch around each site, and validates externally computed registrations
//! before trusting them.

pub mod batch;
pub mod config;
pub mod constants;
pub mod error;
pub mod geometry;
pub mod model;
pub mod neighbors;
pub mod parser;
pub mod pipeline;
pub mod stitching;

pub use config::{ParserOptions, TilePositionSource, ValidationOptions};
pub use error::{ResolutionWarning, SiteError};
pub use model::{
    AcquisitionGeometry, Annotation, AnnotationTile, Layer, PixelPosition, Tile, TileAddress,
};
pub use parser::{ProjectModel, ProjectParser};
pub use pipeline::{ResolvedProject, StitchOutcome, StitchTask, resolve_project, stitch_annotation};
pub use stitching::{StitchingEngine, TileModel};
