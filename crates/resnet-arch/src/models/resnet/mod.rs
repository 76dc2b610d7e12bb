//! # `ResNet`
//!
//! Build the layer graph of a `ResNet` (18, 34, 50, 101, 152), then
//! instantiate it as a `burn` module.
//!
//! ```rust,no_run
//! use resnet_arch::models::resnet::{ArchitectureConfig, ResNetHandle};
//! use burn::backend::NdArray;
//!
//! let config = ArchitectureConfig::new(50, 3, 224, 224).with_num_classes(10);
//! let graph = config.build().unwrap();
//! println!("{graph}");
//!
//! let handle: ResNetHandle<NdArray> = ResNetHandle::new(&config, &Default::default()).unwrap();
//! handle.save_model("/tmp/resnet50").unwrap();
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod graph;
pub mod handle;
pub mod model;
pub mod shape;
pub mod version;

#[cfg(feature = "pretrained")]
pub mod pretrained;
#[cfg(feature = "pretrained")]
pub mod resnet_io;

pub use builder::{build, build_from_shape};
pub use config::ArchitectureConfig;
pub use error::{BuildError, BuildResult};
pub use graph::LayerGraph;
pub use handle::ResNetHandle;
pub use model::ResNet;
pub use shape::RunningShape;
pub use version::{BlockKind, ResNetVersion};
