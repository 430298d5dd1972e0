//! Tile records and the filename-encoded grid address.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{TILE_COL_FIELD, TILE_ROW_FIELD};
use crate::error::SiteError;
use crate::geometry::Vec2;

/// One captured image belonging to a layer.
///
/// Tile filenames are not globally unique; the identity key combines the
/// layer name with the filename. Created during extraction; the absolute
/// center is attached during coordinate resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Key of the layer this tile belongs to (its metadata location).
    pub layer_key: String,

    /// Display name of the layer this tile belongs to.
    pub layer_name: String,

    /// Filename encoding the tile's grid address.
    pub filename: String,

    /// Local directory containing the tile image.
    pub image_dir: PathBuf,

    /// Relative pixel offset of the tile within its layer.
    pub relative_position: Vec2,

    /// Absolute stage position of the tile center in meters; attached
    /// during coordinate resolution.
    pub center: Option<Vec2>,
}

impl Tile {
    /// Create a new tile with an unresolved center.
    pub fn new(
        layer_key: impl Into<String>,
        layer_name: impl Into<String>,
        filename: impl Into<String>,
        image_dir: impl Into<PathBuf>,
        relative_position: Vec2,
    ) -> Self {
        Self {
            layer_key: layer_key.into(),
            layer_name: layer_name.into(),
            filename: filename.into(),
            image_dir: image_dir.into(),
            relative_position,
            center: None,
        }
    }

    /// Identity key: layer name combined with the filename.
    pub fn key(&self) -> String {
        format!("{}_{}", self.layer_name, self.filename)
    }

    /// Full local path to the tile image.
    pub fn image_path(&self) -> PathBuf {
        self.image_dir.join(&self.filename)
    }

    /// Parse this tile's grid address from its filename.
    pub fn address(&self) -> Result<TileAddress, SiteError> {
        TileAddress::parse(&self.filename)
    }
}

/// The `(row, column)` grid address encoded in a tile filename, with the
/// literal text outside the two numeric fields preserved verbatim.
///
/// The canonical pattern is `Tile_{row:03}-{col:03}-000000_0-000.tif`, rows
/// at characters 5-7 and columns at characters 9-11.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileAddress {
    prefix: String,
    /// Grid row of the tile.
    pub row: i32,
    /// Grid column of the tile.
    pub col: i32,
    suffix: String,
}

impl TileAddress {
    /// Parse a grid address out of a tile filename.
    pub fn parse(filename: &str) -> Result<Self, SiteError> {
        let malformed = || SiteError::MalformedTileName {
            filename: filename.to_string(),
        };

        let row_field = filename.get(TILE_ROW_FIELD).ok_or_else(malformed)?;
        let col_field = filename.get(TILE_COL_FIELD).ok_or_else(malformed)?;
        let row = row_field.parse::<i32>().map_err(|_| malformed())?;
        let col = col_field.parse::<i32>().map_err(|_| malformed())?;

        Ok(Self {
            prefix: filename[..TILE_ROW_FIELD.start].to_string(),
            row,
            col,
            suffix: filename[TILE_COL_FIELD.end..].to_string(),
        })
    }

    /// Synthesize the filename for this address, zero-padded to field width.
    pub fn filename(&self) -> String {
        format!("{}{:03}-{:03}{}", self.prefix, self.row, self.col, self.suffix)
    }

    /// The address shifted by a number of rows and columns.
    ///
    /// Shifts past the grid edge produce addresses whose files simply do not
    /// exist; the existence probe reports them as absent.
    pub fn shifted(&self, row_delta: i32, col_delta: i32) -> Self {
        Self {
            prefix: self.prefix.clone(),
            row: self.row + row_delta,
            col: self.col + col_delta,
            suffix: self.suffix.clone(),
        }
    }
}
