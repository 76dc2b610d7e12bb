#![allow(missing_docs)]
//! # `torchvision` `ResNet` Stubs
//!
//! Stub modules mirroring the `torchvision` parameter layout, so that
//! `burn-import` can read ``.pth`` files. The loaded conv / norm records are
//! then copied, in graph order, onto a [`ResNet`] built from a
//! [`crate::models::resnet::graph::LayerGraph`].
//!
//! Stateless layers (activations, pools, padding) carry no weights and are
//! skipped.
use crate::models::resnet::model::{BranchLayer, GraphLayer, ResNet, ResidualBlock};
use anyhow::bail;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dRecord};
use burn::nn::{BatchNorm, BatchNormRecord, Linear, LinearRecord};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::collections::VecDeque;
use std::path::PathBuf;

/// Load a [`ResNetStubRecord`] from a ``torch`` weights path.
pub fn load_resnet_stub_record<B: Backend>(
    path: PathBuf,
    device: &B::Device,
) -> anyhow::Result<ResNetStubRecord<B>> {
    let load_args = LoadArgs::new(path)
        .with_key_remap(r"^layer1\.", "layers.0.blocks.")
        .with_key_remap(r"^layer2\.", "layers.1.blocks.")
        .with_key_remap(r"^layer3\.", "layers.2.blocks.")
        .with_key_remap(r"^layer4\.", "layers.3.blocks.")
        .with_key_remap(r"downsample\.0", "downsample.conv")
        .with_key_remap(r"downsample\.1", "downsample.bn");

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)?;

    Ok(record)
}

/// ``torchvision.models.ResNet``
#[derive(Module, Debug)]
pub struct ResNetStub<B: Backend> {
    /// Stem conv.
    pub conv1: Conv2d<B>,
    /// Stem norm.
    pub bn1: BatchNorm<B, 2>,
    /// ``layer1`` .. ``layer4``.
    pub layers: Vec<LayerStub<B>>,
    /// Classifier.
    pub fc: Linear<B>,
}

/// One ``layer{n}`` stage.
#[derive(Module, Debug)]
pub struct LayerStub<B: Backend> {
    /// The stage's blocks.
    pub blocks: Vec<BlockStub<B>>,
}

/// A basic block, or a bottleneck (with ``conv3`` / ``bn3``).
#[derive(Module, Debug)]
pub struct BlockStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv3: Option<Conv2d<B>>,
    pub bn3: Option<BatchNorm<B, 2>>,
    pub downsample: Option<DownsampleStub<B>>,
}

/// ``downsample = Sequential(conv, bn)``
#[derive(Module, Debug)]
pub struct DownsampleStub<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

enum ParamRecord<B: Backend> {
    Conv(Conv2dRecord<B>),
    Norm(BatchNormRecord<B, 2>),
}

impl<B: Backend> ResNetStubRecord<B> {
    /// Conv / norm records in graph order, and the classifier record.
    fn into_param_records(self) -> (VecDeque<ParamRecord<B>>, LinearRecord<B>) {
        let mut params = VecDeque::new();
        params.push_back(ParamRecord::Conv(self.conv1));
        params.push_back(ParamRecord::Norm(self.bn1));

        for block in self.layers.into_iter().flat_map(|layer| layer.blocks) {
            params.push_back(ParamRecord::Conv(block.conv1));
            params.push_back(ParamRecord::Norm(block.bn1));
            params.push_back(ParamRecord::Conv(block.conv2));
            params.push_back(ParamRecord::Norm(block.bn2));
            if let Some(conv3) = block.conv3 {
                params.push_back(ParamRecord::Conv(conv3));
            }
            if let Some(bn3) = block.bn3 {
                params.push_back(ParamRecord::Norm(bn3));
            }
            if let Some(downsample) = block.downsample {
                params.push_back(ParamRecord::Conv(downsample.conv));
                params.push_back(ParamRecord::Norm(downsample.bn));
            }
        }

        (params, self.fc)
    }
}

/// Copy stub weights onto `target`.
///
/// The classifier is only copied when `copy_fc` is set; otherwise it keeps
/// its fresh initialization.
///
/// # Errors
///
/// If the stub and the target disagree on the number or order of conv / norm
/// layers.
pub fn copy_weights<B: Backend>(
    record: ResNetStubRecord<B>,
    target: ResNet<B>,
    copy_fc: bool,
) -> anyhow::Result<ResNet<B>> {
    let (mut params, fc_record) = record.into_param_records();

    let features = target
        .features
        .into_iter()
        .map(|layer| copy_graph_layer(layer, &mut params))
        .collect::<anyhow::Result<Vec<_>>>()?;

    if !params.is_empty() {
        bail!("{} weight records left after copying", params.len());
    }

    let fc = match target.fc {
        Some(fc) if copy_fc => Some(fc.load_record(fc_record)),
        fc => fc,
    };

    Ok(ResNet {
        features,
        fc,
        ..target
    })
}

fn next_conv<B: Backend>(params: &mut VecDeque<ParamRecord<B>>) -> anyhow::Result<Conv2dRecord<B>> {
    match params.pop_front() {
        Some(ParamRecord::Conv(record)) => Ok(record),
        Some(ParamRecord::Norm(_)) => bail!("expected a conv record, found a norm record"),
        None => bail!("ran out of weight records"),
    }
}

fn next_norm<B: Backend>(
    params: &mut VecDeque<ParamRecord<B>>,
) -> anyhow::Result<BatchNormRecord<B, 2>> {
    match params.pop_front() {
        Some(ParamRecord::Norm(record)) => Ok(record),
        Some(ParamRecord::Conv(_)) => bail!("expected a norm record, found a conv record"),
        None => bail!("ran out of weight records"),
    }
}

fn copy_branch<B: Backend>(
    layers: Vec<BranchLayer<B>>,
    params: &mut VecDeque<ParamRecord<B>>,
) -> anyhow::Result<Vec<BranchLayer<B>>> {
    layers
        .into_iter()
        .map(|layer| -> anyhow::Result<BranchLayer<B>> {
            Ok(match layer {
                BranchLayer::Conv2d(conv) => {
                    BranchLayer::Conv2d(conv.load_record(next_conv(params)?))
                }
                BranchLayer::BatchNorm(bn) => {
                    BranchLayer::BatchNorm(bn.load_record(next_norm(params)?))
                }
                layer => layer,
            })
        })
        .collect()
}

fn copy_graph_layer<B: Backend>(
    layer: GraphLayer<B>,
    params: &mut VecDeque<ParamRecord<B>>,
) -> anyhow::Result<GraphLayer<B>> {
    Ok(match layer {
        GraphLayer::Conv2d(conv) => GraphLayer::Conv2d(conv.load_record(next_conv(params)?)),
        GraphLayer::BatchNorm(bn) => GraphLayer::BatchNorm(bn.load_record(next_norm(params)?)),
        GraphLayer::Residual(block) => {
            let main = copy_branch(block.main, params)?;
            let downsample = block
                .downsample
                .map(|layers| copy_branch(layers, params))
                .transpose()?;
            GraphLayer::Residual(ResidualBlock {
                main,
                downsample,
                ..block
            })
        }
        layer => layer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resnet::builder::build_from_shape;
    use crate::models::resnet::graph::{LayerGraph, LayerNode, LayerOp, Shortcut};
    use burn::backend::NdArray;
    use burn::module::Param;
    use burn::nn::conv::Conv2dConfig;
    use burn::nn::{BatchNormConfig, LinearConfig, PaddingConfig2d};
    use burn::prelude::Tensor;

    type TestBackend = NdArray<f32>;

    fn conv_of<B: Backend>(
        node: &LayerNode,
        device: &B::Device,
    ) -> Conv2d<B> {
        match &node.op {
            LayerOp::Conv2d(s) => Conv2dConfig::new(
                [s.in_channels, s.out_channels],
                [s.kernel_size, s.kernel_size],
            )
            .with_stride([s.stride, s.stride])
            .with_padding(PaddingConfig2d::Explicit(s.padding, s.padding))
            .with_bias(false)
            .init(device),
            op => panic!("not a conv: {op}"),
        }
    }

    fn bn_of<B: Backend>(
        node: &LayerNode,
        device: &B::Device,
    ) -> BatchNorm<B, 2> {
        match &node.op {
            LayerOp::BatchNorm(s) => BatchNormConfig::new(s.num_features).init(device),
            op => panic!("not a norm: {op}"),
        }
    }

    /// A randomly initialized stub with the layout `torchvision` would save.
    fn stub_from_graph<B: Backend>(
        graph: &LayerGraph,
        device: &B::Device,
    ) -> ResNetStub<B> {
        let mut layers: Vec<LayerStub<B>> = (0..4).map(|_| LayerStub { blocks: vec![] }).collect();
        for block in graph.residual_blocks() {
            let convs: Vec<&LayerNode> = block
                .main
                .iter()
                .filter(|n| matches!(n.op, LayerOp::Conv2d(_)))
                .collect();
            let norms: Vec<&LayerNode> = block
                .main
                .iter()
                .filter(|n| matches!(n.op, LayerOp::BatchNorm(_)))
                .collect();

            layers[block.stage].blocks.push(BlockStub {
                conv1: conv_of(convs[0], device),
                bn1: bn_of(norms[0], device),
                conv2: conv_of(convs[1], device),
                bn2: bn_of(norms[1], device),
                conv3: convs.get(2).map(|n| conv_of(n, device)),
                bn3: norms.get(2).map(|n| bn_of(n, device)),
                downsample: match &block.shortcut {
                    Shortcut::Identity => None,
                    Shortcut::Downsample(nodes) => Some(DownsampleStub {
                        conv: conv_of(&nodes[0], device),
                        bn: bn_of(&nodes[1], device),
                    }),
                },
            });
        }

        ResNetStub {
            conv1: conv_of(&graph.nodes[0], device),
            bn1: bn_of(&graph.nodes[1], device),
            layers,
            fc: LinearConfig::new(graph.version.head_features(), 1000).init(device),
        }
    }

    fn first_conv_weights<B: Backend>(model: &ResNet<B>) -> Vec<f32> {
        match &model.features[0] {
            GraphLayer::Conv2d(conv) => conv.weight.val().into_data().to_vec().unwrap(),
            layer => panic!("unexpected layer: {layer:?}"),
        }
    }

    fn scalar<B: Backend, const D: usize>(param: &Param<Tensor<B, D>>) -> f32 {
        param.val().into_data().to_vec::<f32>().unwrap()[0]
    }

    #[test]
    fn test_load_torchvision_key_layout() {
        // See tests/fixtures/make_torchvision_layout.py for the tagging scheme.
        let device = Default::default();
        let path = PathBuf::from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/torchvision_layout.pth"
        ));
        let record: ResNetStubRecord<TestBackend> =
            load_resnet_stub_record(path, &device).unwrap();

        assert_eq!(scalar(&record.conv1.weight), 1.0);
        assert_eq!(scalar(&record.bn1.gamma), 1.5);
        assert_eq!(
            record
                .layers
                .iter()
                .map(|layer| layer.blocks.len())
                .collect::<Vec<_>>(),
            vec![2, 2, 2, 2]
        );

        for (stage, layer) in record.layers.iter().enumerate() {
            for (index, block) in layer.blocks.iter().enumerate() {
                let tag = (100 * (stage + 1) + 10 * index) as f32;
                assert_eq!(scalar(&block.conv1.weight), tag + 1.0);
                assert_eq!(scalar(&block.bn1.gamma), tag + 1.5);
                assert_eq!(scalar(&block.conv2.weight), tag + 2.0);
                assert_eq!(scalar(&block.bn2.beta), tag + 2.25);
                assert!(block.conv3.is_none());
                assert!(block.bn3.is_none());

                match &block.downsample {
                    Some(downsample) => {
                        assert!(stage > 0 && index == 0);
                        assert_eq!(scalar(&downsample.conv.weight), tag + 9.0);
                        assert_eq!(scalar(&downsample.bn.gamma), tag + 9.5);
                    }
                    None => assert!(stage == 0 || index > 0),
                }
            }
        }

        // torch stores ``[out, in]``; burn stores ``[in, out]``.
        assert_eq!(record.fc.weight.val().dims(), [1, 2]);
        let fc: Vec<f32> = record.fc.weight.val().into_data().to_vec().unwrap();
        assert_eq!(fc, vec![7.0, 8.0]);
    }

    #[test]
    fn test_copy_bottleneck_weights() {
        let device = Default::default();
        let graph = build_from_shape((3, 32, 32), 50, true, 1000).unwrap();

        let stub: ResNetStub<TestBackend> = stub_from_graph(&graph, &device);
        let expected_conv1: Vec<f32> = stub.conv1.weight.val().into_data().to_vec().unwrap();
        let expected_fc: Vec<f32> = stub.fc.weight.val().into_data().to_vec().unwrap();

        let model: ResNet<TestBackend> = ResNet::from_graph(&graph, &device).unwrap();
        let model = copy_weights(stub.into_record(), model, true).unwrap();

        assert_eq!(first_conv_weights(&model), expected_conv1);
        let fc: Vec<f32> = model
            .fc
            .as_ref()
            .unwrap()
            .weight
            .val()
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(fc, expected_fc);
    }

    #[test]
    fn test_copy_skips_fc() {
        let device = Default::default();
        let graph = build_from_shape((3, 32, 32), 18, true, 10).unwrap();

        let stub: ResNetStub<TestBackend> = stub_from_graph(&graph, &device);
        let expected_conv1: Vec<f32> = stub.conv1.weight.val().into_data().to_vec().unwrap();

        let model: ResNet<TestBackend> = ResNet::from_graph(&graph, &device).unwrap();
        let model = copy_weights(stub.into_record(), model, false).unwrap();

        assert_eq!(first_conv_weights(&model), expected_conv1);
        assert_eq!(model.num_classes(), Some(10));
    }

    #[test]
    fn test_copy_layout_mismatch() {
        let device = Default::default();
        let small = build_from_shape((3, 32, 32), 18, true, 1000).unwrap();
        let large = build_from_shape((3, 32, 32), 34, true, 1000).unwrap();

        let stub: ResNetStub<TestBackend> = stub_from_graph(&small, &device);
        let model: ResNet<TestBackend> = ResNet::from_graph(&large, &device).unwrap();
        assert!(copy_weights(stub.into_record(), model, true).is_err());

        let stub: ResNetStub<TestBackend> = stub_from_graph(&large, &device);
        let model: ResNet<TestBackend> = ResNet::from_graph(&small, &device).unwrap();
        assert!(copy_weights(stub.into_record(), model, true).is_err());
    }
}
