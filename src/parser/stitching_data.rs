//! Per-layer stitching descriptor parsing.
//!
//! Each tile layer carries its own metadata file with the relative pixel
//! position of every tile. Positions exist in two variants: as-acquired
//! (`UnalignedPosition`) and as-calculated (`CalculatedPosition`); which one
//! is read is selected at construction time.

use std::path::Path;

use crate::config::TilePositionSource;
use crate::error::SiteError;
use crate::geometry::Vec2;
use crate::model::Tile;
use crate::parser::paths::rebase_under_project;
use crate::parser::xml_tree::XmlNode;

/// Tiles of one layer together with the layer's display name.
#[derive(Debug)]
pub struct LayerTiles {
    /// Display name of the layer, the last component of its image folder.
    pub layer_name: String,

    /// Tiles in document order, centers unresolved.
    pub tiles: Vec<Tile>,
}

/// Extract the tiles of one layer from its stitching descriptor.
pub fn parse_stitching_data(
    root: &XmlNode,
    project_folder: &Path,
    layer_key: &str,
    source: TilePositionSource,
) -> Result<LayerTiles, SiteError> {
    let mut layer_name = None;
    let mut image_dir = None;
    let mut tiles = Vec::new();

    for tile_set in root.children_named("tileSet") {
        // The image folder names the layer and anchors the tile paths; read
        // it before walking the tile collection so document order does not
        // matter.
        if let Some(folder) = tile_set.child("TileImageFolder") {
            let device_path = folder.text();
            let name = device_path
                .split('\\')
                .next_back()
                .unwrap_or(device_path)
                .to_string();
            image_dir = Some(rebase_under_project(project_folder, device_path)?);
            layer_name = Some(name);
        }
    }

    let layer_name = layer_name.ok_or_else(|| {
        SiteError::invalid_descriptor(format!(
            "stitching descriptor for layer '{layer_key}' has no TileImageFolder"
        ))
    })?;
    let image_dir = image_dir.unwrap_or_default();

    for tile_set in root.children_named("tileSet") {
        for collection in tile_set.children_named("_tileCollection") {
            for inner in collection.children_named("_innerCollection") {
                for item in inner.children() {
                    for pair in item.children_named("Value") {
                        if let Some(tile) =
                            extract_tile(pair, layer_key, &layer_name, &image_dir, source)?
                        {
                            tiles.push(tile);
                        }
                    }
                }
            }
        }
    }

    log::debug!("Layer '{layer_name}': extracted {} tiles", tiles.len());
    Ok(LayerTiles { layer_name, tiles })
}

/// Build one tile from a key/value entry of the tile collection.
fn extract_tile(
    pair: &XmlNode,
    layer_key: &str,
    layer_name: &str,
    image_dir: &Path,
    source: TilePositionSource,
) -> Result<Option<Tile>, SiteError> {
    let Some(filename) = pair.child("ImageFileName").map(|node| node.text()) else {
        return Ok(None);
    };

    let position = pair
        .child("PositioningDetails")
        .and_then(|details| details.child(source.element_name()))
        .ok_or_else(|| {
            SiteError::invalid_descriptor(format!(
                "tile '{layer_name}_{filename}' has no {} position",
                source.name()
            ))
        })?;

    let mut x = None;
    let mut y = None;
    for scalar in position.children() {
        match scalar.local_name() {
            "x" => x = scalar.text().parse::<f64>().ok(),
            "y" => y = scalar.text().parse::<f64>().ok(),
            _ => {}
        }
    }
    let (x, y) = x.zip(y).ok_or_else(|| {
        SiteError::invalid_descriptor(format!(
            "tile '{layer_name}_{filename}' has an incomplete {} position",
            source.name()
        ))
    })?;

    Ok(Some(Tile::new(
        layer_key,
        layer_name,
        filename,
        image_dir,
        Vec2::new(x, y),
    )))
}
