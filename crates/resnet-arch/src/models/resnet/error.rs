//! # Graph Construction Errors

use thiserror::Error;

/// Errors raised while building a [`super::graph::LayerGraph`].
///
/// Both kinds are fatal: the builder never returns a partial graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The version tag does not name a supported `ResNet` topology.
    #[error("unsupported ResNet version {version}; expected one of 18, 34, 50, 101, 152")]
    InvalidVersion {
        /// The rejected version tag.
        version: usize,
    },

    /// A layer would produce a non-positive (or mismatched) shape.
    #[error("invalid shape at `{layer}`: {reason}")]
    InvalidShape {
        /// The name of the layer where construction failed.
        layer: String,

        /// What went wrong.
        reason: String,
    },
}

impl BuildError {
    /// Construct an [`BuildError::InvalidShape`].
    pub fn invalid_shape(
        layer: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidShape {
            layer: layer.into(),
            reason: reason.into(),
        }
    }
}

/// Result alias for graph construction.
pub type BuildResult<T> = Result<T, BuildError>;
