//! Project descriptor traversal.
//!
//! Walks the layer-group tree of the project descriptor and extracts the
//! image-tile layers of the high-magnification acquisition group together
//! with every point annotation found anywhere in the tree. Layer kind is
//! dispatched on the explicit `type` discriminator attribute, never inferred
//! from node shape.

use std::collections::BTreeMap;

use crate::config::ParserOptions;
use crate::error::SiteError;
use crate::geometry::Vec2;
use crate::model::{AcquisitionGeometry, Annotation, Layer};
use crate::parser::xml_tree::XmlNode;

/// Raw result of the descriptor traversal.
#[derive(Debug)]
pub struct DescriptorData {
    /// Tile layers keyed by their metadata location.
    pub layers: BTreeMap<String, Layer>,

    /// Point annotations in document order.
    pub annotations: Vec<Annotation>,

    /// Acquisition-wide pixel geometry shared by all layers.
    pub geometry: AcquisitionGeometry,
}

/// Values that must agree across every tile layer of the acquisition.
#[derive(Debug, Default)]
struct GeometryAccumulator {
    pixel_size: Option<f64>,
    image_width: Option<u32>,
    image_height: Option<u32>,
}

impl GeometryAccumulator {
    fn merge_pixel_size(&mut self, value: f64, layer: &str) -> Result<(), SiteError> {
        match self.pixel_size {
            Some(previous) if previous != value => {
                Err(SiteError::inconsistent("Pixel size", previous, value, layer))
            }
            _ => {
                self.pixel_size = Some(value);
                Ok(())
            }
        }
    }

    fn merge_image_width(&mut self, value: u32, layer: &str) -> Result<(), SiteError> {
        match self.image_width {
            Some(previous) if previous != value => Err(SiteError::inconsistent(
                "Image width",
                previous,
                value,
                layer,
            )),
            _ => {
                self.image_width = Some(value);
                Ok(())
            }
        }
    }

    fn merge_image_height(&mut self, value: u32, layer: &str) -> Result<(), SiteError> {
        match self.image_height {
            Some(previous) if previous != value => Err(SiteError::inconsistent(
                "Image height",
                previous,
                value,
                layer,
            )),
            _ => {
                self.image_height = Some(value);
                Ok(())
            }
        }
    }

    fn finish(self) -> Result<AcquisitionGeometry, SiteError> {
        Ok(AcquisitionGeometry {
            pixel_size: self
                .pixel_size
                .ok_or_else(|| SiteError::invalid_descriptor("no layer carried a pixelSize"))?,
            image_width: self
                .image_width
                .ok_or_else(|| SiteError::invalid_descriptor("no layer carried a scan width"))?,
            image_height: self
                .image_height
                .ok_or_else(|| SiteError::invalid_descriptor("no layer carried a scan height"))?,
        })
    }
}

#[derive(Debug, Default)]
struct ExtractionState {
    layers: BTreeMap<String, Layer>,
    annotations: Vec<Annotation>,
    geometry: GeometryAccumulator,
}

/// Traverse the descriptor tree and extract layers and annotations.
pub fn parse_descriptor(
    root: &XmlNode,
    options: &ParserOptions,
) -> Result<DescriptorData, SiteError> {
    let mut state = ExtractionState::default();

    for category in root.children_named("LayerGroups") {
        for group in category.children_named("LayerGroup") {
            process_layer_group(group, options, &mut state)?;
        }
    }

    let geometry = state.geometry.finish();
    // An empty project reports the dedicated error before the geometry one.
    if state.layers.is_empty() {
        return Err(SiteError::NoTileLayers);
    }

    Ok(DescriptorData {
        layers: state.layers,
        annotations: state.annotations,
        geometry: geometry?,
    })
}

/// Recursively process one layer group.
///
/// Tile layers are only extracted inside the group whose display name is the
/// configured high-magnification layer; annotation layers are extracted
/// wherever they appear.
fn process_layer_group(
    group: &XmlNode,
    options: &ParserOptions,
    state: &mut ExtractionState,
) -> Result<(), SiteError> {
    let is_highmag = group
        .children_named("displayName")
        .any(|name| name.text() == options.highmag_layer);
    if is_highmag {
        log::info!("Extracting images from {} layers", options.highmag_layer);
    }

    for layers_node in group.children_named("Layers") {
        for layer in layers_node.children() {
            match layer.attribute("type") {
                Some("TileLayer") if is_highmag => process_tile_layer(layer, state)?,
                Some("LayerGroup") => process_layer_group(layer, options, state)?,
                Some("AnnotationLayer") => extract_annotation(layer, state)?,
                Some(other) if is_highmag => {
                    log::warn!(
                        "Descriptor parser does not know how to deal with {other} layers \
                         and does not parse them"
                    );
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Extract one high-magnification tile layer into the layer map.
fn process_tile_layer(layer: &XmlNode, state: &mut ExtractionState) -> Result<(), SiteError> {
    let metadata_location = layer
        .child("metaDataLocation")
        .map(|node| node.text().to_string())
        .ok_or_else(|| {
            SiteError::invalid_descriptor("Can't find the metaDataLocation in the descriptor")
        })?;

    let mut total_hfw = None;
    let mut tile_hfw = None;
    let mut overlap_horizontal = None;
    let mut overlap_vertical = None;
    let mut rotation = None;
    let mut rows = None;
    let mut columns = None;
    let mut center_x = None;
    let mut center_y = None;

    for content in layer.children() {
        match content.local_name() {
            "totalHfw" => total_hfw = content.scalar_value(),
            "tileHfw" => tile_hfw = content.scalar_value(),
            // Overlaps are stored as percentages in a nested value element.
            "overlapHorizontal" => overlap_horizontal = percentage_fraction(content),
            "overlapVertical" => overlap_vertical = percentage_fraction(content),
            "rotation" => rotation = content.scalar_value(),
            "rows" => rows = content.text().parse::<u32>().ok(),
            "columns" => columns = content.text().parse::<u32>().ok(),
            "scanResolution" => {
                for resolution in content.children() {
                    match resolution.local_name() {
                        "height" => {
                            if let Ok(height) = resolution.text().parse::<u32>() {
                                state
                                    .geometry
                                    .merge_image_height(height, &metadata_location)?;
                            }
                        }
                        "width" => {
                            if let Ok(width) = resolution.text().parse::<u32>() {
                                state
                                    .geometry
                                    .merge_image_width(width, &metadata_location)?;
                            }
                        }
                        _ => {}
                    }
                }
            }
            "pixelSize" => {
                if let Some(pixel_size) = content.scalar_value() {
                    state
                        .geometry
                        .merge_pixel_size(pixel_size, &metadata_location)?;
                }
            }
            "StagePosition" => {
                for position in content.children() {
                    match position.local_name() {
                        "x" => center_x = position.text().parse::<f64>().ok(),
                        "y" => center_y = position.text().parse::<f64>().ok(),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    let require = |value: Option<f64>, field: &str| {
        value.ok_or_else(|| {
            SiteError::invalid_descriptor(format!(
                "tile layer '{metadata_location}' is missing {field}"
            ))
        })
    };

    let layer = Layer {
        key: metadata_location.clone(),
        // Attached from the layer's own stitching descriptor.
        name: String::new(),
        center: Vec2::new(
            require(center_x, "its StagePosition x")?,
            require(center_y, "its StagePosition y")?,
        ),
        rotation_degrees: require(rotation, "its rotation")?,
        rows: rows.ok_or_else(|| {
            SiteError::invalid_descriptor(format!(
                "tile layer '{metadata_location}' is missing its rows"
            ))
        })?,
        columns: columns.ok_or_else(|| {
            SiteError::invalid_descriptor(format!(
                "tile layer '{metadata_location}' is missing its columns"
            ))
        })?,
        overlap_horizontal: require(overlap_horizontal, "its overlapHorizontal")?,
        overlap_vertical: require(overlap_vertical, "its overlapVertical")?,
        tile_hfw: require(tile_hfw, "its tileHfw")?,
        total_hfw: require(total_hfw, "its totalHfw")?,
        tile_vfw: None,
        corner: None,
    };
    log::debug!("Extracted tile layer '{metadata_location}'");
    state.layers.insert(metadata_location, layer);
    Ok(())
}

fn percentage_fraction(node: &XmlNode) -> Option<f64> {
    node.children()
        .first()
        .and_then(|value| value.text().parse::<f64>().ok())
        .map(|percent| percent / 100.0)
}

/// Extract one point annotation, ignoring area markers.
fn extract_annotation(layer: &XmlNode, state: &mut ExtractionState) -> Result<(), SiteError> {
    // Sites of interest carry isArea = false; areas of interest are skipped.
    let is_point = layer
        .children_named("isArea")
        .any(|flag| flag.text() == "false");
    if !is_point {
        return Ok(());
    }

    let name = layer
        .child("RealDisplayName")
        .map(|node| node.text().to_string())
        .ok_or_else(|| {
            SiteError::invalid_descriptor("Can't find the annotation names in the descriptor")
        })?;

    let position = layer.child("StagePosition").ok_or_else(|| {
        SiteError::invalid_descriptor(format!("annotation '{name}' is missing its StagePosition"))
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
        SiteError::invalid_descriptor(format!("annotation '{name}' has an incomplete position"))
    })?;

    log::debug!("Extracted annotation '{name}' at ({x:.3e}, {y:.3e})");
    state.annotations.push(Annotation::new(name, Vec2::new(x, y)));
    Ok(())
}
