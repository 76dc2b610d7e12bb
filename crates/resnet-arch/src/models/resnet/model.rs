//! # `ResNet` Model
//!
//! [`ResNet`] instantiates a [`LayerGraph`] as a `burn` [`Module`].
//!
//! The graph's nodes map one-to-one onto [`GraphLayer`]s; residual merges
//! become [`ResidualBlock`]s holding their main branch and (optional)
//! downsample branch. A trailing `Linear` node becomes the classifier.

use crate::layers::activation::Activation;
use crate::layers::padding::ZeroPad2d;
use crate::models::resnet::graph::{LayerGraph, LayerNode, LayerOp, Shortcut};
use anyhow::bail;
use bimm_contracts::{ShapeContract, run_every_nth, shape_contract};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};

/// A layer inside a residual branch.
#[derive(Module, Debug)]
pub enum BranchLayer<B: Backend> {
    /// Convolution.
    Conv2d(Conv2d<B>),

    /// Batch normalization.
    BatchNorm(BatchNorm<B, 2>),

    /// Activation.
    Activation(Activation),
}

impl<B: Backend> BranchLayer<B> {
    fn init(
        node: &LayerNode,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        Ok(match &node.op {
            LayerOp::Conv2d(spec) => BranchLayer::Conv2d(
                Conv2dConfig::new(
                    [spec.in_channels, spec.out_channels],
                    [spec.kernel_size, spec.kernel_size],
                )
                .with_stride([spec.stride, spec.stride])
                .with_padding(PaddingConfig2d::Explicit(spec.padding, spec.padding))
                .with_bias(spec.bias)
                .init(device),
            ),
            LayerOp::BatchNorm(spec) => {
                BranchLayer::BatchNorm(BatchNormConfig::new(spec.num_features).init(device))
            }
            LayerOp::Activation(spec) => BranchLayer::Activation(spec.init()),
            op => bail!(
                "`{}`: {} is not supported inside a residual branch",
                node.name,
                op.kind_name()
            ),
        })
    }

    /// Forward pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            BranchLayer::Conv2d(layer) => layer.forward(input),
            BranchLayer::BatchNorm(layer) => layer.forward(input),
            BranchLayer::Activation(layer) => layer.forward(input),
        }
    }
}

fn forward_branch<B: Backend>(
    layers: &[BranchLayer<B>],
    input: Tensor<B, 4>,
) -> Tensor<B, 4> {
    layers.iter().fold(input, |x, layer| layer.forward(x))
}

/// A residual block: ``main(x) + shortcut(x)``.
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    /// The main branch.
    pub main: Vec<BranchLayer<B>>,

    /// The downsample branch; `None` is the identity.
    pub downsample: Option<Vec<BranchLayer<B>>>,

    pub(crate) out_channels: usize,
}

impl<B: Backend> ResidualBlock<B> {
    /// Output channels.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Forward pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let shortcut = match &self.downsample {
            Some(layers) => forward_branch(layers, input.clone()),
            None => input.clone(),
        };
        forward_branch(&self.main, input) + shortcut
    }
}

/// A top-level layer of a [`ResNet`].
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum GraphLayer<B: Backend> {
    /// Convolution.
    Conv2d(Conv2d<B>),

    /// Batch normalization.
    BatchNorm(BatchNorm<B, 2>),

    /// Activation.
    Activation(Activation),

    /// Explicit zero padding.
    ZeroPad(ZeroPad2d),

    /// Max pooling.
    MaxPool(MaxPool2d),

    /// Adaptive average pooling.
    AdaptiveAvgPool(AdaptiveAvgPool2d),

    /// Residual block.
    Residual(ResidualBlock<B>),
}

impl<B: Backend> GraphLayer<B> {
    fn init(
        node: &LayerNode,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        Ok(match &node.op {
            LayerOp::Conv2d(_) | LayerOp::BatchNorm(_) | LayerOp::Activation(_) => {
                match BranchLayer::init(node, device)? {
                    BranchLayer::Conv2d(layer) => GraphLayer::Conv2d(layer),
                    BranchLayer::BatchNorm(layer) => GraphLayer::BatchNorm(layer),
                    BranchLayer::Activation(layer) => GraphLayer::Activation(layer),
                }
            }
            LayerOp::ZeroPad(spec) => GraphLayer::ZeroPad(spec.into()),
            LayerOp::MaxPool(spec) => GraphLayer::MaxPool(
                MaxPool2dConfig::new([spec.kernel_size, spec.kernel_size])
                    .with_strides([spec.stride, spec.stride])
                    .with_padding(PaddingConfig2d::Explicit(spec.padding, spec.padding))
                    .init(),
            ),
            LayerOp::AdaptiveAvgPool(spec) => {
                GraphLayer::AdaptiveAvgPool(AdaptiveAvgPool2dConfig::new(spec.output_size).init())
            }
            LayerOp::ResidualMerge(spec) => {
                let main = spec
                    .main
                    .iter()
                    .map(|n| BranchLayer::init(n, device))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                let downsample = match &spec.shortcut {
                    Shortcut::Identity => None,
                    Shortcut::Downsample(nodes) => Some(
                        nodes
                            .iter()
                            .map(|n| BranchLayer::init(n, device))
                            .collect::<anyhow::Result<Vec<_>>>()?,
                    ),
                };
                GraphLayer::Residual(ResidualBlock {
                    main,
                    downsample,
                    out_channels: node.output.channels,
                })
            }
            LayerOp::Linear(_) => bail!(
                "`{}`: a linear layer is only supported as the final node",
                node.name
            ),
        })
    }

    /// Forward pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            GraphLayer::Conv2d(layer) => layer.forward(input),
            GraphLayer::BatchNorm(layer) => layer.forward(input),
            GraphLayer::Activation(layer) => layer.forward(input),
            GraphLayer::ZeroPad(layer) => layer.forward(input),
            GraphLayer::MaxPool(layer) => layer.forward(input),
            GraphLayer::AdaptiveAvgPool(layer) => layer.forward(input),
            GraphLayer::Residual(layer) => layer.forward(input),
        }
    }
}

/// `ResNet` model, instantiated from a [`LayerGraph`].
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// Every layer before the classifier.
    pub features: Vec<GraphLayer<B>>,

    /// The classifier, applied to the flattened features.
    pub fc: Option<Linear<B>>,

    pub(crate) in_channels: usize,
    pub(crate) feature_channels: usize,
}

impl<B: Backend> ResNet<B> {
    /// Instantiate the layers of `graph` on `device`.
    ///
    /// # Errors
    ///
    /// If the graph fails validation, or places a linear layer anywhere but
    /// last.
    #[tracing::instrument(skip_all, fields(version = %graph.version))]
    pub fn from_graph(
        graph: &LayerGraph,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        graph.validate()?;

        let (body, fc) = match graph.nodes.split_last() {
            Some((
                LayerNode {
                    op: LayerOp::Linear(spec),
                    ..
                },
                body,
            )) => (body, Some(spec)),
            _ => (graph.nodes.as_slice(), None),
        };

        let features = body
            .iter()
            .map(|node| GraphLayer::init(node, device))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let feature_channels = body
            .last()
            .map(|node| node.output.channels)
            .unwrap_or(graph.input.channels);

        let fc = fc.map(|spec| {
            LinearConfig::new(spec.in_features, spec.out_features)
                .with_bias(spec.bias)
                .init(device)
        });

        tracing::debug!(layers = features.len(), head = fc.is_some(), "instantiated");

        Ok(Self {
            features,
            fc,
            in_channels: graph.input.channels,
            feature_channels,
        })
    }

    /// Input channels.
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Channels produced by [`Self::forward_features`].
    pub fn feature_channels(&self) -> usize {
        self.feature_channels
    }

    /// Classifier outputs, if the model has a head.
    pub fn num_classes(&self) -> Option<usize> {
        self.fc.as_ref().map(|fc| fc.weight.dims()[1])
    }

    /// Run every layer before the classifier.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, feature_channels, out_height, out_width]``
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        static INPUT_CONTRACT: ShapeContract =
            shape_contract!["batch", "in_channels", "in_height", "in_width"];
        let [batch] = INPUT_CONTRACT.unpack_shape(
            &input,
            &["batch"],
            &[("in_channels", self.in_channels)],
        );

        let x = self.features.iter().fold(input, |x, layer| layer.forward(x));

        run_every_nth!({
            static OUTPUT_CONTRACT: ShapeContract =
                shape_contract!["batch", "out_channels", "out_height", "out_width"];
            OUTPUT_CONTRACT.assert_shape(
                &x,
                &[("batch", batch), ("out_channels", self.feature_channels)],
            );
        });

        x
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, num_classes]`` logits with a head, otherwise the flattened
    /// features.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.forward_features(input);
        // [B, C, H, W] -> [B, C * H * W]
        let x = x.flatten(1, 3);
        match &self.fc {
            Some(fc) => fc.forward(x),
            None => x,
        }
    }
}
