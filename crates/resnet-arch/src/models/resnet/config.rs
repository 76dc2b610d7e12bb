//! # Architecture Config

use crate::models::resnet::builder;
use crate::models::resnet::error::BuildResult;
use crate::models::resnet::graph::{ActivationSpec, LayerGraph};
use crate::models::resnet::shape::RunningShape;
use crate::models::resnet::version::ResNetVersion;
use burn::config::Config;

/// Hyperparameters of a `ResNet` build.
///
/// ``version`` is a raw tag; it is only resolved (and rejected) by
/// [`ArchitectureConfig::build`].
#[derive(Config, Debug, PartialEq, Eq)]
pub struct ArchitectureConfig {
    /// Version tag: one of 18, 34, 50, 101, 152.
    pub version: usize,

    /// Input channels.
    pub input_channels: usize,

    /// Input width.
    pub input_width: usize,

    /// Input height.
    pub input_height: usize,

    /// Classifier outputs.
    #[config(default = 1000)]
    pub num_classes: usize,

    /// Append the pool + linear classification head.
    #[config(default = true)]
    pub include_top: bool,

    /// Load pretrained ImageNet weights when instantiating a model.
    #[config(default = false)]
    pub pretrained: bool,

    /// Activation used throughout the network.
    #[config(default = "ActivationSpec::Relu")]
    pub activation: ActivationSpec,
}

impl ArchitectureConfig {
    /// Config from a ``(channels, width, height)`` shape.
    pub fn from_shape(
        (channels, width, height): (usize, usize, usize),
        version: usize,
    ) -> Self {
        Self::new(version, channels, width, height)
    }

    /// The input shape.
    pub fn input_shape(&self) -> RunningShape {
        RunningShape::new(self.input_channels, self.input_width, self.input_height)
    }

    /// Resolve the version tag.
    pub fn resolve_version(&self) -> BuildResult<ResNetVersion> {
        ResNetVersion::from_tag(self.version)
    }

    /// Build the layer graph.
    ///
    /// See [`builder::build`].
    pub fn build(&self) -> BuildResult<LayerGraph> {
        builder::build(self)
    }
}
