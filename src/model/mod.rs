//! Record types for layers, tiles, and annotations.
//!
//! These replace the acquisition tool's loosely-keyed metadata with explicit
//! structs carrying only the fields the resolution pipeline needs.

mod annotation;
mod layer;
mod tile;

pub use annotation::{Annotation, AnnotationTile, PixelPosition};
pub use layer::{AcquisitionGeometry, Layer};
pub use tile::{Tile, TileAddress};
