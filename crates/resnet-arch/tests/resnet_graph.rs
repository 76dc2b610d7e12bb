use bimm_contracts::{ShapeContract, shape_contract};
use burn::backend::NdArray;
use burn::prelude::Tensor;
use resnet_arch::models::resnet::graph::{LayerOp, Shortcut};
use resnet_arch::models::resnet::{
    ArchitectureConfig, BlockKind, BuildError, LayerGraph, ResNetHandle, ResNetVersion,
    RunningShape, build, build_from_shape,
};

type TestBackend = NdArray<f32>;

#[test]
fn resnet18_imagenet_layout() {
    let graph = build_from_shape((3, 224, 224), 18, true, 1000).unwrap();

    assert_eq!(graph.version, ResNetVersion::ResNet18);
    assert_eq!(graph.block_kind(), BlockKind::Basic);
    assert_eq!(graph.input, RunningShape::new(3, 224, 224));
    assert_eq!(graph.stage_block_counts(), [2, 2, 2, 2]);
    assert_eq!(graph.residual_blocks().count(), 8);

    let head = graph.head().unwrap();
    assert_eq!((head.in_features, head.out_features), (512, 1000));
    assert_eq!(graph.num_params(), 11_689_512);

    let maxpool = graph.nodes.iter().find(|n| n.name == "maxpool").unwrap();
    assert_eq!(maxpool.output, RunningShape::new(64, 56, 56));
}

#[test]
fn every_version_resolves() {
    let expected = [
        (18, [2, 2, 2, 2], 512),
        (34, [3, 4, 6, 3], 512),
        (50, [3, 4, 6, 3], 2048),
        (101, [3, 4, 23, 3], 2048),
        (152, [3, 8, 36, 3], 2048),
    ];
    for (tag, blocks, width) in expected {
        let graph = build(&ArchitectureConfig::new(tag, 3, 224, 224)).unwrap();
        assert_eq!(graph.version.tag(), tag);
        assert_eq!(graph.stage_block_counts(), blocks);
        assert_eq!(graph.head().unwrap().in_features, width);
    }
}

#[test]
fn version_36_is_rejected() {
    let err = build(&ArchitectureConfig::new(36, 3, 224, 224)).unwrap_err();
    assert_eq!(err, BuildError::InvalidVersion { version: 36 });
    assert!(err.to_string().contains("36"));
}

#[test]
fn shortcuts_only_project_on_stage_entry() {
    let graph = build_from_shape((3, 224, 224), 152, false, 0).unwrap();
    let downsampled: Vec<(usize, usize)> = graph
        .residual_blocks()
        .filter(|b| b.shortcut.is_downsample())
        .map(|b| (b.stage, b.index))
        .collect();
    assert_eq!(downsampled, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);

    let graph = build_from_shape((3, 224, 224), 18, false, 0).unwrap();
    let first = graph.residual_blocks().next().unwrap();
    assert_eq!(first.shortcut, Shortcut::Identity);
}

#[test]
fn graph_json_is_stable() {
    let config = ArchitectureConfig::new(34, 3, 128, 96).with_num_classes(21);
    let a = config.build().unwrap();
    let b = config.build().unwrap();
    assert_eq!(a, b);

    let json = a.to_json().unwrap();
    assert_eq!(LayerGraph::from_json(&json).unwrap(), b);
}

#[test]
fn tampered_json_is_rejected() {
    let mut graph = build_from_shape((3, 64, 64), 18, true, 10).unwrap();
    if let Some(node) = graph.nodes.iter_mut().find(|n| n.name == "fc") {
        if let LayerOp::Linear(spec) = &mut node.op {
            spec.in_features = 256;
        }
    }
    assert!(LayerGraph::from_json(&graph.to_json().unwrap()).is_err());
}

#[test]
fn out_of_range_stage_json_is_rejected() {
    let graph = build_from_shape((3, 64, 64), 18, true, 10).unwrap();
    let json = graph.to_json().unwrap();
    assert!(json.contains("\"stage\": 3"));

    let tampered = json.replace("\"stage\": 3", "\"stage\": 7");
    assert!(LayerGraph::from_json(&tampered).is_err());

    let tampered = json.replace("\"block_kind\": \"Basic\"", "\"block_kind\": \"Bottleneck\"");
    assert!(LayerGraph::from_json(&tampered).is_err());
}

#[test]
fn oversized_input_is_rejected() {
    let err = build_from_shape((3, usize::MAX, 224), 18, true, 1000).unwrap_err();
    assert!(matches!(err, BuildError::InvalidShape { ref layer, .. } if layer == "conv1"));

    let err = build_from_shape((3, 224, usize::MAX - 1), 50, false, 0).unwrap_err();
    assert!(matches!(err, BuildError::InvalidShape { .. }));
}

#[test]
fn handle_forward_and_roundtrip() {
    let device = Default::default();
    let config = ArchitectureConfig::new(34, 3, 64, 48).with_num_classes(7);

    let handle: ResNetHandle<TestBackend> = ResNetHandle::new(&config, &device).unwrap();
    let input = Tensor::<TestBackend, 4>::ones([2, 3, 48, 64], &device);
    let logits = handle.get_model().forward(input.clone());
    static LOGITS: ShapeContract = shape_contract!["batch", "classes"];
    LOGITS.assert_shape(&logits, &[("batch", 2), ("classes", 7)]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resnet34");
    handle.save_model(&path).unwrap();

    let mut restored: ResNetHandle<TestBackend> = ResNetHandle::new(&config, &device).unwrap();
    restored.load_model(&path).unwrap();
    restored
        .into_model()
        .forward(input)
        .to_data()
        .assert_eq(&logits.to_data(), true);
}
