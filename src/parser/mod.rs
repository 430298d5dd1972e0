//! Metadata extraction from a project folder.
//!
//! The parser reads the project descriptor and every layer's stitching
//! descriptor and produces the three record collections the rest of the
//! pipeline works on: layers, tiles, and annotations. It mutates no external
//! state.

mod classifier;
mod descriptor;
mod paths;
mod stitching_data;
mod xml_tree;

#[cfg(test)]
mod tests;

pub use classifier::parse_classifier_output;
pub use xml_tree::XmlNode;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ParserOptions;
use crate::constants::{LAYER_DESCRIPTOR_FILENAME, PROJECT_DESCRIPTOR_FILENAME};
use crate::error::SiteError;
use crate::model::{AcquisitionGeometry, Annotation, Layer, Tile};
use crate::parser::paths::path_from_backslashes;

/// The three record collections extracted from a project folder.
#[derive(Debug)]
pub struct ProjectModel {
    /// Tile layers keyed by their metadata location.
    pub layers: BTreeMap<String, Layer>,

    /// All tiles across all layers, centers unresolved.
    pub tiles: Vec<Tile>,

    /// Point annotations placed by the operator.
    pub annotations: Vec<Annotation>,

    /// Acquisition-wide pixel geometry.
    pub geometry: AcquisitionGeometry,
}

/// Parser for one project folder.
pub struct ProjectParser {
    project_folder: PathBuf,
    options: ParserOptions,
}

impl ProjectParser {
    /// Create a parser for the given project folder.
    pub fn new(project_folder: impl Into<PathBuf>, options: ParserOptions) -> Self {
        Self {
            project_folder: project_folder.into(),
            options,
        }
    }

    /// The options this parser was created with.
    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// The project folder this parser reads from.
    pub fn project_folder(&self) -> &Path {
        &self.project_folder
    }

    /// Extract layers, tiles, and annotations from the project folder.
    pub fn parse(&self) -> Result<ProjectModel, SiteError> {
        let descriptor_path = self.project_folder.join(PROJECT_DESCRIPTOR_FILENAME);
        let content = match std::fs::read_to_string(&descriptor_path) {
            Ok(content) => content,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(SiteError::DescriptorMissing {
                    path: descriptor_path,
                });
            }
            Err(source) => return Err(source.into()),
        };
        let root = XmlNode::parse_str(&content)?;

        let extracted = descriptor::parse_descriptor(&root, &self.options)?;
        if self.options.require_annotations && extracted.annotations.is_empty() {
            return Err(SiteError::NoAnnotations);
        }

        let mut layers = extracted.layers;
        let mut tiles = Vec::new();
        for (key, layer) in layers.iter_mut() {
            let layer_tiles = self.parse_layer_descriptor(key)?;
            layer.name = layer_tiles.layer_name;
            tiles.extend(layer_tiles.tiles);
        }

        log::info!(
            "Parsed project {:?}: {} layers, {} tiles, {} annotations",
            self.project_folder,
            layers.len(),
            tiles.len(),
            extracted.annotations.len()
        );
        Ok(ProjectModel {
            layers,
            tiles,
            annotations: extracted.annotations,
            geometry: extracted.geometry,
        })
    }

    /// Read and parse one layer's stitching descriptor.
    fn parse_layer_descriptor(
        &self,
        layer_key: &str,
    ) -> Result<stitching_data::LayerTiles, SiteError> {
        let metadata_path = self
            .project_folder
            .join(path_from_backslashes(layer_key))
            .join(LAYER_DESCRIPTOR_FILENAME);
        let content = match std::fs::read_to_string(&metadata_path) {
            Ok(content) => content,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Err(SiteError::invalid_descriptor(format!(
                    "Can't find the stitching descriptor at {metadata_path:?}"
                )));
            }
            Err(source) => return Err(source.into()),
        };
        let root = XmlNode::parse_str(&content)?;
        stitching_data::parse_stitching_data(
            &root,
            &self.project_folder,
            layer_key,
            self.options.position_source,
        )
    }
}
