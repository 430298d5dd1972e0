//! Error and warning types for site resolution.
//!
//! Fatal conditions abort the enclosing project and are modeled as
//! [`SiteError`] variants. Recoverable per-annotation conditions are modeled
//! as [`ResolutionWarning`] values: they are logged, collected alongside the
//! output records, and the affected annotation proceeds in a well-defined
//! degraded state instead of being silently omitted.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::geometry::Vec2;

/// Errors that can occur while resolving a project.
#[derive(Error, Debug)]
pub enum SiteError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The project descriptor file does not exist
    #[error("Can't find the project descriptor at {path:?}")]
    DescriptorMissing {
        /// Path where the descriptor was expected
        path: PathBuf,
    },

    /// The descriptor contained no image-tile layers at all
    #[error("Parsing the project descriptor did not find any tile layers")]
    NoTileLayers,

    /// The descriptor contained no point annotations
    #[error("No annotations were found in the project descriptor")]
    NoAnnotations,

    /// Malformed or incomplete descriptor content
    #[error("Invalid descriptor: {message}")]
    InvalidDescriptor {
        /// Description of what was malformed or missing
        message: String,
    },

    /// A value that must be constant across the acquisition differed between layers
    #[error(
        "{field} needs to be constant for the whole acquisition. \
         It was {previous} before and is {current} in layer '{layer}'"
    )]
    ConfigurationInconsistency {
        /// Name of the diverging field
        field: &'static str,
        /// Value seen on earlier layers
        previous: String,
        /// Value seen on the offending layer
        current: String,
        /// Key of the offending layer
        layer: String,
    },

    /// Filesystem probe failed for a reason other than the file being absent
    #[error("Filesystem error probing {path:?}: {source}")]
    Filesystem {
        /// Path that was being probed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A tile filename does not follow the grid-address convention
    #[error("Malformed tile filename: '{filename}'")]
    MalformedTileName {
        /// The offending filename
        filename: String,
    },

    /// A registration model does not carry a 2D displacement
    #[error("Stitching model has {count} parameters, expected at least 2")]
    ModelParameters {
        /// Number of parameters the model carried
        count: usize,
    },

    /// Registration inputs do not line up with the neighborhood
    #[error("Invalid registration input: {message}")]
    InvalidRegistration {
        /// Description of the mismatch
        message: String,
    },

    /// Malformed batch CSV content
    #[error("Malformed batch record: {message}")]
    MalformedBatchRecord {
        /// Description of the malformed row or column
        message: String,
    },

    /// The external stitching engine reported a failure
    #[error("Stitching engine failure: {message}")]
    Engine {
        /// Engine-provided description
        message: String,
    },
}

impl SiteError {
    /// Create an invalid descriptor error with a message.
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }

    /// Create a configuration inconsistency error from two diverging values.
    pub fn inconsistent(
        field: &'static str,
        previous: impl fmt::Display,
        current: impl fmt::Display,
        layer: impl Into<String>,
    ) -> Self {
        Self::ConfigurationInconsistency {
            field,
            previous: previous.to_string(),
            current: current.to_string(),
            layer: layer.into(),
        }
    }

    /// Create an invalid registration error with a message.
    pub fn invalid_registration(message: impl Into<String>) -> Self {
        Self::InvalidRegistration {
            message: message.into(),
        }
    }

    /// Create a malformed batch record error with a message.
    pub fn malformed_record(message: impl Into<String>) -> Self {
        Self::MalformedBatchRecord {
            message: message.into(),
        }
    }

    /// Create an engine failure error with a message.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}

/// Recoverable per-annotation conditions.
///
/// Each value corresponds to one human-readable log line sufficient to locate
/// and manually re-examine the annotation afterwards.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionWarning {
    /// The annotation is farther from every tile center than the tile's own
    /// bounding radius and was dropped from the output.
    AnnotationUnmatched {
        /// Name of the dropped annotation
        annotation: String,
        /// Squared distance to the nearest tile center (m²)
        distance_sq: f64,
        /// Squared bounding-radius threshold (m²)
        threshold_sq: f64,
    },

    /// The in-tile offset system was singular at this rotation; the
    /// annotation was placed at the tile's geometric center instead.
    DegenerateRotation {
        /// Name of the affected annotation
        annotation: String,
        /// Layer rotation in degrees that produced the singular system
        rotation: f64,
    },

    /// The existence mask does not form one of the supported rectangular
    /// neighborhoods; the annotation is excluded from stitching.
    UnsupportedNeighborhood {
        /// Name of the affected annotation
        annotation: String,
        /// The offending existence mask, in scan order
        mask: Vec<bool>,
    },

    /// The external registration was rejected; the annotation keeps its
    /// original un-fused pixel coordinates.
    RegistrationRejected {
        /// Name of the affected annotation
        annotation: String,
        /// Per-tile shifts between registered and nominal offsets (pixels)
        shifts: Vec<Vec2>,
        /// Largest shift component observed (pixels)
        max_shift: f64,
        /// Threshold the shift exceeded (pixels)
        threshold: f64,
    },
}

impl ResolutionWarning {
    /// Name of the annotation this warning concerns.
    pub fn annotation(&self) -> &str {
        match self {
            Self::AnnotationUnmatched { annotation, .. }
            | Self::DegenerateRotation { annotation, .. }
            | Self::UnsupportedNeighborhood { annotation, .. }
            | Self::RegistrationRejected { annotation, .. } => annotation,
        }
    }

    /// Emit this warning through the log facade.
    pub fn log(&self) {
        log::warn!("{}", self);
    }
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnnotationUnmatched {
                annotation,
                distance_sq,
                threshold_sq,
            } => write!(
                f,
                "Annotation {annotation} is not within any of the tiles and will be ignored \
                 (squared distance {distance_sq:.3e} m², threshold {threshold_sq:.3e} m²)"
            ),
            Self::DegenerateRotation {
                annotation,
                rotation,
            } => write!(
                f,
                "In-tile position of annotation {annotation} could not be calculated: \
                 a rotation of {rotation}° leads to division by zero. \
                 The marker is placed in the middle of the tile instead"
            ),
            Self::UnsupportedNeighborhood { annotation, mask } => write!(
                f,
                "Annotation {annotation} has an unsupported neighborhood pattern {mask:?} \
                 and is excluded from stitching"
            ),
            Self::RegistrationRejected {
                annotation,
                max_shift,
                threshold,
                ..
            } => write!(
                f,
                "Registration for annotation {annotation} rejected: \
                 maximum shift {max_shift:.1} px exceeds threshold {threshold:.1} px; \
                 falling back to the unfused center tile"
            ),
        }
    }
}
