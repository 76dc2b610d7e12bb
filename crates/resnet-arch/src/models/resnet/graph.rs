//! # Layer Graph
//!
//! Framework-neutral operator descriptors, and the [`LayerGraph`] that the
//! builder emits.
//!
//! A [`LayerGraph`] is an ordered sequence of [`LayerNode`]s. Each node names
//! one operator ([`LayerOp`]) and records the [`RunningShape`] it produces.
//! Residual blocks appear as a [`LayerOp::ResidualMerge`] node which owns its
//! main branch and its [`Shortcut`] as nested node lists, followed by the
//! block's output activation.
//!
//! Descriptors carry no tensors; [`crate::models::resnet::model::ResNet`]
//! instantiates them as `burn` modules.

use crate::models::resnet::error::{BuildError, BuildResult};
use crate::models::resnet::shape::RunningShape;
use crate::models::resnet::version::{BlockKind, ResNetVersion};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Square 2D convolution descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvSpec {
    /// Input channels.
    pub in_channels: usize,

    /// Output channels.
    pub out_channels: usize,

    /// Kernel size (square).
    pub kernel_size: usize,

    /// Stride (both dimensions).
    pub stride: usize,

    /// Zero padding (all sides).
    pub padding: usize,

    /// Whether the convolution has a bias term.
    pub bias: bool,
}

impl ConvSpec {
    /// A bias-free, stride 1, unpadded convolution.
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
    ) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride: 1,
            padding: 0,
            bias: false,
        }
    }

    /// Set the stride.
    pub fn with_stride(
        self,
        stride: usize,
    ) -> Self {
        Self { stride, ..self }
    }

    /// Set the padding.
    pub fn with_padding(
        self,
        padding: usize,
    ) -> Self {
        Self { padding, ..self }
    }

    /// Set the bias flag.
    pub fn with_bias(
        self,
        bias: bool,
    ) -> Self {
        Self { bias, ..self }
    }
}

/// 2D batch normalization descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchNormSpec {
    /// Normalized channels.
    pub num_features: usize,
}

/// Activation descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActivationSpec {
    /// ``max(0, x)``.
    #[default]
    Relu,

    /// Gaussian error linear unit.
    Gelu,

    /// Logistic sigmoid.
    Sigmoid,

    /// Hyperbolic tangent.
    Tanh,
}

/// Explicit zero padding descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroPadSpec {
    /// Columns added on the left.
    pub left: usize,

    /// Columns added on the right.
    pub right: usize,

    /// Rows added on top.
    pub top: usize,

    /// Rows added on the bottom.
    pub bottom: usize,
}

impl ZeroPadSpec {
    /// The same padding on every side.
    pub fn uniform(padding: usize) -> Self {
        Self {
            left: padding,
            right: padding,
            top: padding,
            bottom: padding,
        }
    }
}

/// Square max pooling descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// Window size (square).
    pub kernel_size: usize,

    /// Stride (both dimensions).
    pub stride: usize,

    /// Implicit padding (all sides).
    pub padding: usize,
}

/// Adaptive average pooling descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveAvgPoolSpec {
    /// Output ``[height, width]``.
    pub output_size: [usize; 2],
}

/// Fully connected layer descriptor; applied to the flattened features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearSpec {
    /// Input features.
    pub in_features: usize,

    /// Output features.
    pub out_features: usize,

    /// Whether the layer has a bias term.
    pub bias: bool,
}

/// The secondary path of a residual block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shortcut {
    /// Pass the block input through unchanged.
    Identity,

    /// Project the block input (1x1 conv + batch norm).
    Downsample(Vec<LayerNode>),
}

impl Shortcut {
    /// Is this a downsample projection?
    pub fn is_downsample(&self) -> bool {
        matches!(self, Shortcut::Downsample(_))
    }
}

/// Additive merge of a main branch and a shortcut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualMergeSpec {
    /// The block flavor of the main branch.
    pub block_kind: BlockKind,

    /// Stage index, ``0..4``.
    pub stage: usize,

    /// Block index within the stage.
    pub index: usize,

    /// The main branch.
    pub main: Vec<LayerNode>,

    /// The shortcut branch.
    pub shortcut: Shortcut,
}

impl ResidualMergeSpec {
    /// Thread `input` through both branches; they must agree.
    pub fn merged_shape(
        &self,
        layer: &str,
        input: RunningShape,
    ) -> BuildResult<RunningShape> {
        let main = thread_nodes(&self.main, input)?;
        let shortcut = match &self.shortcut {
            Shortcut::Identity => input,
            Shortcut::Downsample(nodes) => thread_nodes(nodes, input)?,
        };
        if main != shortcut {
            return Err(BuildError::invalid_shape(
                layer,
                format!("main branch {main} does not match shortcut {shortcut}"),
            ));
        }
        Ok(main)
    }
}

/// A layer operator descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerOp {
    /// 2D convolution.
    Conv2d(ConvSpec),

    /// 2D batch normalization.
    BatchNorm(BatchNormSpec),

    /// Element-wise activation.
    Activation(ActivationSpec),

    /// Explicit zero padding.
    ZeroPad(ZeroPadSpec),

    /// Max pooling.
    MaxPool(PoolSpec),

    /// Adaptive average pooling.
    AdaptiveAvgPool(AdaptiveAvgPoolSpec),

    /// Residual (additive) merge of two branches.
    ResidualMerge(ResidualMergeSpec),

    /// Fully connected projection of the flattened features.
    Linear(LinearSpec),
}

impl LayerOp {
    /// Short operator kind name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            LayerOp::Conv2d(_) => "Conv2d",
            LayerOp::BatchNorm(_) => "BatchNorm",
            LayerOp::Activation(_) => "Activation",
            LayerOp::ZeroPad(_) => "ZeroPad",
            LayerOp::MaxPool(_) => "MaxPool",
            LayerOp::AdaptiveAvgPool(_) => "AdaptiveAvgPool",
            LayerOp::ResidualMerge(_) => "ResidualMerge",
            LayerOp::Linear(_) => "Linear",
        }
    }

    /// Compute the output shape of this operator for `input`.
    ///
    /// # Errors
    ///
    /// [`BuildError::InvalidShape`] when the input does not fit the operator,
    /// or the output would collapse.
    pub fn apply(
        &self,
        layer: &str,
        input: RunningShape,
    ) -> BuildResult<RunningShape> {
        let input = input.check_positive(layer)?;
        match self {
            LayerOp::Conv2d(spec) => input
                .expect_channels(layer, spec.in_channels)?
                .window(
                    layer,
                    spec.out_channels,
                    spec.kernel_size,
                    spec.stride,
                    spec.padding,
                ),
            LayerOp::BatchNorm(spec) => input.expect_channels(layer, spec.num_features),
            LayerOp::Activation(_) => Ok(input),
            LayerOp::ZeroPad(spec) => {
                input.padded(layer, spec.left, spec.right, spec.top, spec.bottom)
            }
            LayerOp::MaxPool(spec) => input.window(
                layer,
                input.channels,
                spec.kernel_size,
                spec.stride,
                spec.padding,
            ),
            LayerOp::AdaptiveAvgPool(spec) => {
                let [height, width] = spec.output_size;
                RunningShape::new(input.channels, width, height).check_positive(layer)
            }
            LayerOp::ResidualMerge(spec) => spec.merged_shape(layer, input),
            LayerOp::Linear(spec) => {
                if input.numel() != Some(spec.in_features) {
                    return Err(BuildError::invalid_shape(
                        layer,
                        format!(
                            "expected {} input features, got shape {input}",
                            spec.in_features
                        ),
                    ));
                }
                RunningShape::new(spec.out_features, 1, 1).check_positive(layer)
            }
        }
    }

    /// Number of trainable parameters.
    ///
    /// Batch-norm running statistics are buffers, not parameters.
    /// Saturates at `usize::MAX`.
    pub fn num_params(&self) -> usize {
        match self {
            LayerOp::Conv2d(spec) => {
                let weights = spec
                    .out_channels
                    .saturating_mul(spec.in_channels)
                    .saturating_mul(spec.kernel_size)
                    .saturating_mul(spec.kernel_size);
                weights.saturating_add(if spec.bias { spec.out_channels } else { 0 })
            }
            LayerOp::BatchNorm(spec) => spec.num_features.saturating_mul(2),
            LayerOp::Linear(spec) => spec
                .in_features
                .saturating_mul(spec.out_features)
                .saturating_add(if spec.bias { spec.out_features } else { 0 }),
            LayerOp::ResidualMerge(spec) => {
                let shortcut: &[LayerNode] = match &spec.shortcut {
                    Shortcut::Identity => &[],
                    Shortcut::Downsample(nodes) => nodes,
                };
                sum_params(spec.main.iter().chain(shortcut))
            }
            LayerOp::Activation(_)
            | LayerOp::ZeroPad(_)
            | LayerOp::MaxPool(_)
            | LayerOp::AdaptiveAvgPool(_) => 0,
        }
    }
}

impl fmt::Display for LayerOp {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            LayerOp::Conv2d(s) => write!(
                f,
                "Conv2d({}->{}, k={}, s={}, p={})",
                s.in_channels, s.out_channels, s.kernel_size, s.stride, s.padding
            ),
            LayerOp::BatchNorm(s) => write!(f, "BatchNorm({})", s.num_features),
            LayerOp::Activation(s) => write!(f, "Activation({s:?})"),
            LayerOp::ZeroPad(s) => write!(
                f,
                "ZeroPad(l={}, r={}, t={}, b={})",
                s.left, s.right, s.top, s.bottom
            ),
            LayerOp::MaxPool(s) => write!(
                f,
                "MaxPool(k={}, s={}, p={})",
                s.kernel_size, s.stride, s.padding
            ),
            LayerOp::AdaptiveAvgPool(s) => write!(
                f,
                "AdaptiveAvgPool({}x{})",
                s.output_size[0], s.output_size[1]
            ),
            LayerOp::ResidualMerge(s) => write!(
                f,
                "ResidualMerge({}, shortcut={})",
                s.block_kind,
                if s.shortcut.is_downsample() {
                    "downsample"
                } else {
                    "identity"
                }
            ),
            LayerOp::Linear(s) => write!(f, "Linear({}->{})", s.in_features, s.out_features),
        }
    }
}

/// A named operator and the shape it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerNode {
    /// Dotted layer path, e.g. ``layer2.0.conv1``.
    pub name: String,

    /// The operator.
    pub op: LayerOp,

    /// The output shape.
    pub output: RunningShape,
}

/// Re-thread `input` through `nodes`, checking each recorded output.
fn thread_nodes(
    nodes: &[LayerNode],
    input: RunningShape,
) -> BuildResult<RunningShape> {
    nodes.iter().try_fold(input, |shape, node| {
        let output = node.op.apply(&node.name, shape)?;
        if output != node.output {
            return Err(BuildError::invalid_shape(
                &node.name,
                format!("recorded output {} != computed {output}", node.output),
            ));
        }
        Ok(output)
    })
}

fn sum_params<'a>(nodes: impl IntoIterator<Item = &'a LayerNode>) -> usize {
    nodes
        .into_iter()
        .fold(0, |acc, node| acc.saturating_add(node.op.num_params()))
}

/// A complete `ResNet` layer graph.
///
/// Produced by [`crate::models::resnet::builder::build`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerGraph {
    /// The resolved version.
    pub version: ResNetVersion,

    /// The graph input shape.
    pub input: RunningShape,

    /// The ordered nodes.
    pub nodes: Vec<LayerNode>,

    /// The final output shape; the builder's running shape after the last node.
    pub output: RunningShape,
}

impl LayerGraph {
    /// The block flavor of every residual block.
    pub fn block_kind(&self) -> BlockKind {
        self.version.block_kind()
    }

    /// Iterate over the residual blocks, in order.
    pub fn residual_blocks(&self) -> impl Iterator<Item = &ResidualMergeSpec> {
        self.nodes.iter().filter_map(|node| match &node.op {
            LayerOp::ResidualMerge(spec) => Some(spec),
            _ => None,
        })
    }

    /// Number of residual blocks in each stage.
    ///
    /// Blocks with an out-of-range stage (only possible in unvalidated
    /// graphs) are not counted.
    pub fn stage_block_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for block in self.residual_blocks() {
            if let Some(count) = counts.get_mut(block.stage) {
                *count += 1;
            }
        }
        counts
    }

    /// The classifier, if the graph has a head.
    pub fn head(&self) -> Option<&LinearSpec> {
        self.nodes.iter().find_map(|node| match &node.op {
            LayerOp::Linear(spec) => Some(spec),
            _ => None,
        })
    }

    /// Does the graph end in a classifier?
    pub fn has_head(&self) -> bool {
        self.head().is_some()
    }

    /// Total trainable parameters.
    pub fn num_params(&self) -> usize {
        sum_params(&self.nodes)
    }

    /// Re-thread the input shape through every node.
    ///
    /// Graphs from the builder are always valid; this guards graphs that were
    /// deserialized or edited by hand.
    pub fn validate(&self) -> BuildResult<()> {
        for node in &self.nodes {
            if let LayerOp::ResidualMerge(spec) = &node.op {
                self.check_block_position(&node.name, spec)?;
            }
        }

        let output = thread_nodes(&self.nodes, self.input)?;
        if output != self.output {
            return Err(BuildError::invalid_shape(
                "output",
                format!("recorded output {} != computed {output}", self.output),
            ));
        }
        Ok(())
    }

    /// A residual block must sit inside this version's topology.
    fn check_block_position(
        &self,
        layer: &str,
        spec: &ResidualMergeSpec,
    ) -> BuildResult<()> {
        let topology = self.version.topology();
        if spec.block_kind != topology.block_kind {
            return Err(BuildError::invalid_shape(
                layer,
                format!("{} block in a {} graph", spec.block_kind, self.version),
            ));
        }
        match topology.blocks.get(spec.stage) {
            Some(&count) if spec.index < count => Ok(()),
            Some(&count) => Err(BuildError::invalid_shape(
                layer,
                format!(
                    "block index {} out of range for stage {} ({count} blocks)",
                    spec.index, spec.stage
                ),
            )),
            None => Err(BuildError::invalid_shape(
                layer,
                format!("stage {} out of range for {}", spec.stage, self.version),
            )),
        }
    }

    /// Serialize the graph as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize and validate a graph from JSON.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let graph: Self = serde_json::from_str(json)?;
        graph.validate()?;
        Ok(graph)
    }
}

impl fmt::Display for LayerGraph {
    /// A layer summary table; `{:#}` also lists the residual branches.
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fn write_nodes(
            f: &mut fmt::Formatter<'_>,
            nodes: &[LayerNode],
            depth: usize,
            expand: bool,
        ) -> fmt::Result {
            for node in nodes {
                let name = format!("{:indent$}{}", "", node.name, indent = depth * 2);
                writeln!(
                    f,
                    "{:<32} {:<48} {:>16} {:>12}",
                    name,
                    node.op.to_string(),
                    node.output.to_string(),
                    node.op.num_params()
                )?;
                if let (true, LayerOp::ResidualMerge(spec)) = (expand, &node.op) {
                    write_nodes(f, &spec.main, depth + 1, expand)?;
                    if let Shortcut::Downsample(shortcut) = &spec.shortcut {
                        write_nodes(f, shortcut, depth + 1, expand)?;
                    }
                }
            }
            Ok(())
        }

        let expand = f.alternate();
        writeln!(f, "{} ({} blocks)", self.version, self.block_kind())?;
        writeln!(
            f,
            "{:<32} {:<48} {:>16} {:>12}",
            "layer", "op", "output (cxwxh)", "params"
        )?;
        writeln!(f, "{:<32} {:<48} {:>16}", "input", "", self.input.to_string())?;
        write_nodes(f, &self.nodes, 0, expand)?;
        write!(f, "total params: {}", self.num_params())
    }
}
