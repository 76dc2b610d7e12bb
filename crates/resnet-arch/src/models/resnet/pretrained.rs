//! # Pretrained `ResNet` Weights
//!
//! `torchvision` ImageNet-1k (V1) weights for every supported version.

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::{PretrainedWeightsDescriptor, StaticPretrainedWeightsDescriptor};
use crate::models::resnet::graph::{ActivationSpec, LayerGraph, LayerOp};
use crate::models::resnet::model::ResNet;
use crate::models::resnet::resnet_io::pytorch_stubs::{copy_weights, load_resnet_stub_record};
use crate::models::resnet::version::ResNetVersion;
use anyhow::bail;
use burn::prelude::Backend;

/// Classes of the pretrained classifiers.
pub const IMAGENET_CLASSES: usize = 1000;

/// Input channels of the pretrained stems.
pub const IMAGENET_CHANNELS: usize = 3;

type WeightsEntry = (ResNetVersion, StaticPretrainedWeightsDescriptor<'static>);

/// Pretrained weights, by version; in [`ResNetVersion::ALL`] order.
pub static RESNET_PRETRAINED_WEIGHTS: [WeightsEntry; 5] = [
    (
        ResNetVersion::ResNet18,
        StaticPretrainedWeightsDescriptor {
            name: "resnet18.tv_in1k",
            description: "ResNet-18 pretrained on ImageNet-1k",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            urls: &["https://download.pytorch.org/models/resnet18-f37072fd.pth"],
        },
    ),
    (
        ResNetVersion::ResNet34,
        StaticPretrainedWeightsDescriptor {
            name: "resnet34.tv_in1k",
            description: "ResNet-34 pretrained on ImageNet-1k",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            urls: &["https://download.pytorch.org/models/resnet34-b627a593.pth"],
        },
    ),
    (
        ResNetVersion::ResNet50,
        StaticPretrainedWeightsDescriptor {
            name: "resnet50.tv_in1k",
            description: "ResNet-50 pretrained on ImageNet-1k",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            urls: &["https://download.pytorch.org/models/resnet50-0676ba61.pth"],
        },
    ),
    (
        ResNetVersion::ResNet101,
        StaticPretrainedWeightsDescriptor {
            name: "resnet101.tv_in1k",
            description: "ResNet-101 pretrained on ImageNet-1k",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            urls: &["https://download.pytorch.org/models/resnet101-63fe2227.pth"],
        },
    ),
    (
        ResNetVersion::ResNet152,
        StaticPretrainedWeightsDescriptor {
            name: "resnet152.tv_in1k",
            description: "ResNet-152 pretrained on ImageNet-1k",
            license: Some("bsd-3-clause"),
            origin: Some("https://github.com/pytorch/vision"),
            urls: &["https://download.pytorch.org/models/resnet152-394f9c45.pth"],
        },
    ),
];

/// The pretrained weights for `version`.
pub fn pretrained_weights(version: ResNetVersion) -> PretrainedWeightsDescriptor {
    let idx = match version {
        ResNetVersion::ResNet18 => 0,
        ResNetVersion::ResNet34 => 1,
        ResNetVersion::ResNet50 => 2,
        ResNetVersion::ResNet101 => 3,
        ResNetVersion::ResNet152 => 4,
    };
    RESNET_PRETRAINED_WEIGHTS[idx].1.to_descriptor()
}

/// Fetch (read-through cached) and load the pretrained weights for `graph`.
///
/// The classifier is kept only for graphs with a 1000-class head; any other
/// head keeps its fresh initialization.
///
/// # Errors
///
/// If the graph input is not 3-channel, the graph uses a non-ReLU
/// activation, or the download / import fails.
#[tracing::instrument(skip_all, fields(version = %graph.version))]
pub fn load_pretrained<B: Backend>(
    model: ResNet<B>,
    graph: &LayerGraph,
    device: &B::Device,
) -> anyhow::Result<ResNet<B>> {
    check_pretrained_compatible(graph)?;

    let weights = pretrained_weights(graph.version);
    let path = weights.fetch_weights_to_disk_cache(&DiskCacheConfig::default())?;
    tracing::info!(weights = %weights.name, path = %path.display(), "loading pretrained weights");

    let record = load_resnet_stub_record::<B>(path, device)?;
    let copy_fc = graph
        .head()
        .is_some_and(|head| head.out_features == IMAGENET_CLASSES);
    if !copy_fc && graph.has_head() {
        tracing::info!("classifier width differs from ImageNet; re-initialized");
    }

    copy_weights(record, model, copy_fc)
}

/// Check that pretrained weights can be applied to `graph`.
///
/// The weights were trained with a 3-channel input and ReLU activations.
pub fn check_pretrained_compatible(graph: &LayerGraph) -> anyhow::Result<()> {
    if graph.input.channels != IMAGENET_CHANNELS {
        bail!(
            "pretrained {} weights expect {IMAGENET_CHANNELS} input channels, got {}",
            graph.version,
            graph.input.channels
        );
    }
    let activation = graph.nodes.iter().find_map(|node| match node.op {
        LayerOp::Activation(act) if act != ActivationSpec::Relu => Some(act),
        _ => None,
    });
    if let Some(act) = activation {
        bail!(
            "pretrained {} weights were trained with ReLU, not {act:?}",
            graph.version
        );
    }
    Ok(())
}
