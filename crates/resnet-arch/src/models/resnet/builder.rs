//! # `ResNet` Graph Builder
//!
//! Assemble the layer graph of a `ResNet` from an [`ArchitectureConfig`].
//!
//! Construction is pure and deterministic: the running shape is a local value
//! threaded through each emit step, and the first failing layer aborts the
//! whole build.
//!
//! Layer names follow the `torchvision` parameter paths (``conv1``, ``bn1``,
//! ``layer{stage}.{block}.conv1``, ``layer{stage}.{block}.downsample.0``,
//! ``fc``, ...).

use crate::models::resnet::config::ArchitectureConfig;
use crate::models::resnet::error::{BuildError, BuildResult};
use crate::models::resnet::graph::{
    ActivationSpec, AdaptiveAvgPoolSpec, BatchNormSpec, ConvSpec, LayerGraph, LayerNode, LayerOp,
    LinearSpec, PoolSpec, ResidualMergeSpec, Shortcut, ZeroPadSpec,
};
use crate::models::resnet::shape::RunningShape;
use crate::models::resnet::version::{BlockKind, ResNetVersion, StageSpec};

/// Stem output channels.
pub const STEM_CHANNELS: usize = 64;

/// Build the layer graph described by `config`.
///
/// # Errors
///
/// - [`BuildError::InvalidVersion`] if ``config.version`` is not one of
///   18, 34, 50, 101, 152.
/// - [`BuildError::InvalidShape`] if any layer would produce a zero-sized
///   output, or the head has no classes.
#[tracing::instrument(skip_all, fields(version = config.version))]
pub fn build(config: &ArchitectureConfig) -> BuildResult<LayerGraph> {
    let version = ResNetVersion::from_tag(config.version)?;
    let input = config.input_shape().check_positive("input")?;
    if config.include_top && config.num_classes == 0 {
        return Err(BuildError::invalid_shape(
            "fc",
            "num_classes must be positive",
        ));
    }
    let act = config.activation;

    let mut nodes = Vec::new();
    let mut shape = emit_stem(&mut nodes, input, act)?;

    for (stage_idx, stage) in version.stages().iter().enumerate() {
        shape = emit_stage(&mut nodes, stage_idx, stage, shape, act)?;
    }

    if config.include_top {
        shape = emit_head(&mut nodes, version, shape, config.num_classes)?;
    }

    tracing::debug!(
        version = %version,
        nodes = nodes.len(),
        output = %shape,
        "built layer graph"
    );

    Ok(LayerGraph {
        version,
        input,
        nodes,
        output: shape,
    })
}

/// Build a graph from a ``(channels, width, height)`` input shape.
pub fn build_from_shape(
    input_shape: (usize, usize, usize),
    version: usize,
    include_top: bool,
    num_classes: usize,
) -> BuildResult<LayerGraph> {
    build(
        &ArchitectureConfig::from_shape(input_shape, version)
            .with_include_top(include_top)
            .with_num_classes(num_classes),
    )
}

/// Append a node; returns its output shape.
fn push(
    nodes: &mut Vec<LayerNode>,
    name: String,
    op: LayerOp,
    input: RunningShape,
) -> BuildResult<RunningShape> {
    let output = op.apply(&name, input)?;
    tracing::trace!(layer = %name, %op, %output, "emit");
    nodes.push(LayerNode { name, op, output });
    Ok(output)
}

fn conv(
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> LayerOp {
    LayerOp::Conv2d(
        ConvSpec::new(in_channels, out_channels, kernel_size)
            .with_stride(stride)
            .with_padding(padding),
    )
}

fn norm(num_features: usize) -> LayerOp {
    LayerOp::BatchNorm(BatchNormSpec { num_features })
}

/// ``conv 7x7/2 -> bn -> act -> pad 1 -> maxpool 3x3/2``
fn emit_stem(
    nodes: &mut Vec<LayerNode>,
    input: RunningShape,
    act: ActivationSpec,
) -> BuildResult<RunningShape> {
    let shape = push(
        nodes,
        "conv1".into(),
        conv(input.channels, STEM_CHANNELS, 7, 2, 3),
        input,
    )?;
    let shape = push(nodes, "bn1".into(), norm(STEM_CHANNELS), shape)?;
    let shape = push(nodes, "relu".into(), LayerOp::Activation(act), shape)?;
    let shape = push(
        nodes,
        "pad".into(),
        LayerOp::ZeroPad(ZeroPadSpec::uniform(1)),
        shape,
    )?;
    push(
        nodes,
        "maxpool".into(),
        LayerOp::MaxPool(PoolSpec {
            kernel_size: 3,
            stride: 2,
            padding: 0,
        }),
        shape,
    )
}

fn emit_stage(
    nodes: &mut Vec<LayerNode>,
    stage_idx: usize,
    stage: &StageSpec,
    input: RunningShape,
    act: ActivationSpec,
) -> BuildResult<RunningShape> {
    let _span = tracing::debug_span!("stage", stage = stage_idx + 1).entered();
    (0..stage.block_count).try_fold(input, |shape, index| {
        let stride = if index == 0 { stage.stride } else { 1 };
        emit_block(nodes, stage_idx, index, stage, shape, stride, act)
    })
}

/// One residual block, its merge, and its output activation.
fn emit_block(
    nodes: &mut Vec<LayerNode>,
    stage_idx: usize,
    index: usize,
    stage: &StageSpec,
    input: RunningShape,
    stride: usize,
    act: ActivationSpec,
) -> BuildResult<RunningShape> {
    let prefix = format!("layer{}.{}", stage_idx + 1, index);
    let planes = stage.planes;
    let out_channels = stage.out_channels();

    let mut main = Vec::new();
    let mut shape = input;
    match stage.block_kind {
        BlockKind::Basic => {
            shape = push(
                &mut main,
                format!("{prefix}.conv1"),
                conv(input.channels, planes, 3, stride, 1),
                shape,
            )?;
            shape = push(&mut main, format!("{prefix}.bn1"), norm(planes), shape)?;
            shape = push(
                &mut main,
                format!("{prefix}.relu1"),
                LayerOp::Activation(act),
                shape,
            )?;
            shape = push(
                &mut main,
                format!("{prefix}.conv2"),
                conv(planes, out_channels, 3, 1, 1),
                shape,
            )?;
            push(
                &mut main,
                format!("{prefix}.bn2"),
                norm(out_channels),
                shape,
            )?;
        }
        BlockKind::Bottleneck => {
            shape = push(
                &mut main,
                format!("{prefix}.conv1"),
                conv(input.channels, planes, 1, 1, 0),
                shape,
            )?;
            shape = push(&mut main, format!("{prefix}.bn1"), norm(planes), shape)?;
            shape = push(
                &mut main,
                format!("{prefix}.relu1"),
                LayerOp::Activation(act),
                shape,
            )?;
            shape = push(
                &mut main,
                format!("{prefix}.conv2"),
                conv(planes, planes, 3, stride, 1),
                shape,
            )?;
            shape = push(&mut main, format!("{prefix}.bn2"), norm(planes), shape)?;
            shape = push(
                &mut main,
                format!("{prefix}.relu2"),
                LayerOp::Activation(act),
                shape,
            )?;
            shape = push(
                &mut main,
                format!("{prefix}.conv3"),
                conv(planes, out_channels, 1, 1, 0),
                shape,
            )?;
            push(
                &mut main,
                format!("{prefix}.bn3"),
                norm(out_channels),
                shape,
            )?;
        }
    }

    let shortcut = if stride != 1 || input.channels != out_channels {
        let mut downsample = Vec::new();
        let shape = push(
            &mut downsample,
            format!("{prefix}.downsample.0"),
            conv(input.channels, out_channels, 1, stride, 0),
            input,
        )?;
        push(
            &mut downsample,
            format!("{prefix}.downsample.1"),
            norm(out_channels),
            shape,
        )?;
        Shortcut::Downsample(downsample)
    } else {
        Shortcut::Identity
    };

    let merge = LayerOp::ResidualMerge(ResidualMergeSpec {
        block_kind: stage.block_kind,
        stage: stage_idx,
        index,
        main,
        shortcut,
    });
    let shape = push(nodes, prefix.clone(), merge, input)?;
    push(
        nodes,
        format!("{prefix}.relu"),
        LayerOp::Activation(act),
        shape,
    )
}

/// ``adaptive avgpool 1x1 -> linear``
fn emit_head(
    nodes: &mut Vec<LayerNode>,
    version: ResNetVersion,
    input: RunningShape,
    num_classes: usize,
) -> BuildResult<RunningShape> {
    let shape = push(
        nodes,
        "avgpool".into(),
        LayerOp::AdaptiveAvgPool(AdaptiveAvgPoolSpec {
            output_size: [1, 1],
        }),
        input,
    )?;
    push(
        nodes,
        "fc".into(),
        LayerOp::Linear(LinearSpec {
            in_features: version.head_features(),
            out_features: num_classes,
            bias: true,
        }),
        shape,
    )
}
