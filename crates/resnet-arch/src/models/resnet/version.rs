//! # `ResNet` Versions
//!
//! The static version -> topology table. Version dispatch happens once, here;
//! unknown tags are rejected with [`BuildError::InvalidVersion`].

use crate::models::resnet::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// ResNet-18 block depths.
pub const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
/// ResNet-34 block depths.
pub const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// ResNet-50 block depths.
pub const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// ResNet-101 block depths.
pub const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
/// ResNet-152 block depths.
pub const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// Stage widths, before block expansion.
pub const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// Stage strides; only the first block of a stage uses it.
pub const STAGE_STRIDES: [usize; 4] = [1, 2, 2, 2];

/// Residual block flavor; chosen once per network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// Two 3x3 convolutions.
    Basic,

    /// 1x1 -> 3x3 -> 1x1 convolutions, with a 4x channel expansion.
    Bottleneck,
}

impl BlockKind {
    /// Ratio between a block's output channels and its stage planes.
    pub const fn expansion(&self) -> usize {
        match self {
            BlockKind::Basic => 1,
            BlockKind::Bottleneck => 4,
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            BlockKind::Basic => write!(f, "BasicBlock"),
            BlockKind::Bottleneck => write!(f, "Bottleneck"),
        }
    }
}

/// A supported `ResNet` depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResNetVersion {
    /// ResNet-18.
    ResNet18,
    /// ResNet-34.
    ResNet34,
    /// ResNet-50.
    ResNet50,
    /// ResNet-101.
    ResNet101,
    /// ResNet-152.
    ResNet152,
}

/// One row of the version table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResNetTopology {
    /// The version.
    pub version: ResNetVersion,

    /// The numeric tag (the network depth).
    pub tag: usize,

    /// Blocks per stage.
    pub blocks: [usize; 4],

    /// The block flavor.
    pub block_kind: BlockKind,
}

/// The version table.
pub static RESNET_TOPOLOGIES: [ResNetTopology; 5] = [
    ResNetTopology {
        version: ResNetVersion::ResNet18,
        tag: 18,
        blocks: RESNET18_BLOCKS,
        block_kind: BlockKind::Basic,
    },
    ResNetTopology {
        version: ResNetVersion::ResNet34,
        tag: 34,
        blocks: RESNET34_BLOCKS,
        block_kind: BlockKind::Basic,
    },
    ResNetTopology {
        version: ResNetVersion::ResNet50,
        tag: 50,
        blocks: RESNET50_BLOCKS,
        block_kind: BlockKind::Bottleneck,
    },
    ResNetTopology {
        version: ResNetVersion::ResNet101,
        tag: 101,
        blocks: RESNET101_BLOCKS,
        block_kind: BlockKind::Bottleneck,
    },
    ResNetTopology {
        version: ResNetVersion::ResNet152,
        tag: 152,
        blocks: RESNET152_BLOCKS,
        block_kind: BlockKind::Bottleneck,
    },
];

/// Per-stage descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageSpec {
    /// The block flavor.
    pub block_kind: BlockKind,

    /// Stage width before expansion (64, 128, 256, 512).
    pub planes: usize,

    /// Number of residual blocks.
    pub block_count: usize,

    /// Stride of the first block.
    pub stride: usize,
}

impl StageSpec {
    /// Output channels of every block in the stage.
    pub fn out_channels(&self) -> usize {
        self.planes * self.block_kind.expansion()
    }
}

impl ResNetVersion {
    /// All versions, in table order.
    pub const ALL: [ResNetVersion; 5] = [
        ResNetVersion::ResNet18,
        ResNetVersion::ResNet34,
        ResNetVersion::ResNet50,
        ResNetVersion::ResNet101,
        ResNetVersion::ResNet152,
    ];

    /// Resolve a numeric version tag.
    pub fn from_tag(tag: usize) -> BuildResult<Self> {
        RESNET_TOPOLOGIES
            .iter()
            .find(|t| t.tag == tag)
            .map(|t| t.version)
            .ok_or(BuildError::InvalidVersion { version: tag })
    }

    /// The table row for this version.
    pub fn topology(&self) -> &'static ResNetTopology {
        match self {
            ResNetVersion::ResNet18 => &RESNET_TOPOLOGIES[0],
            ResNetVersion::ResNet34 => &RESNET_TOPOLOGIES[1],
            ResNetVersion::ResNet50 => &RESNET_TOPOLOGIES[2],
            ResNetVersion::ResNet101 => &RESNET_TOPOLOGIES[3],
            ResNetVersion::ResNet152 => &RESNET_TOPOLOGIES[4],
        }
    }

    /// The numeric tag.
    pub fn tag(&self) -> usize {
        self.topology().tag
    }

    /// The block flavor.
    pub fn block_kind(&self) -> BlockKind {
        self.topology().block_kind
    }

    /// The four stage descriptors.
    pub fn stages(&self) -> [StageSpec; 4] {
        let topology = self.topology();
        std::array::from_fn(|idx| StageSpec {
            block_kind: topology.block_kind,
            planes: STAGE_PLANES[idx],
            block_count: topology.blocks[idx],
            stride: STAGE_STRIDES[idx],
        })
    }

    /// Input features of the classifier head.
    pub fn head_features(&self) -> usize {
        STAGE_PLANES[3] * self.block_kind().expansion()
    }
}

impl TryFrom<usize> for ResNetVersion {
    type Error = BuildError;

    fn try_from(tag: usize) -> Result<Self, Self::Error> {
        Self::from_tag(tag)
    }
}

impl fmt::Display for ResNetVersion {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "ResNet-{}", self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_table_is_consistent() {
        let mut tags = HashSet::new();
        for (idx, row) in RESNET_TOPOLOGIES.iter().enumerate() {
            assert!(tags.insert(row.tag), "duplicate tag {}", row.tag);
            assert_eq!(ResNetVersion::ALL[idx], row.version);
            assert_eq!(row.version.topology(), row);
            assert!(row.blocks.iter().all(|&b| b > 0));
        }
    }

    #[test]
    fn test_from_tag() {
        assert_eq!(ResNetVersion::from_tag(18), Ok(ResNetVersion::ResNet18));
        assert_eq!(ResNetVersion::try_from(152), Ok(ResNetVersion::ResNet152));

        for tag in [0, 1, 19, 36, 51, 200] {
            assert_eq!(
                ResNetVersion::from_tag(tag),
                Err(BuildError::InvalidVersion { version: tag })
            );
        }
    }

    #[test]
    fn test_stages() {
        let stages = ResNetVersion::ResNet101.stages();
        assert_eq!(
            stages.map(|s| s.block_count),
            [3, 4, 23, 3]
        );
        assert_eq!(stages.map(|s| s.stride), [1, 2, 2, 2]);
        assert_eq!(stages.map(|s| s.out_channels()), [256, 512, 1024, 2048]);

        let stages = ResNetVersion::ResNet34.stages();
        assert_eq!(stages.map(|s| s.out_channels()), [64, 128, 256, 512]);
        assert!(stages.iter().all(|s| s.block_kind == BlockKind::Basic));
    }

    #[test]
    fn test_head_features() {
        assert_eq!(ResNetVersion::ResNet18.head_features(), 512);
        assert_eq!(ResNetVersion::ResNet34.head_features(), 512);
        assert_eq!(ResNetVersion::ResNet50.head_features(), 2048);
        assert_eq!(ResNetVersion::ResNet101.head_features(), 2048);
        assert_eq!(ResNetVersion::ResNet152.head_features(), 2048);
        assert_eq!(ResNetVersion::ResNet50.to_string(), "ResNet-50");
    }
}
