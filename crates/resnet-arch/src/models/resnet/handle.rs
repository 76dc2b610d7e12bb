//! # Model Handle
//!
//! [`ResNetHandle`] pairs a [`LayerGraph`] with its instantiated [`ResNet`],
//! and passes persistence through to `burn`'s recorders.

use crate::models::resnet::config::ArchitectureConfig;
use crate::models::resnet::graph::LayerGraph;
use crate::models::resnet::model::ResNet;
use anyhow::anyhow;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use std::path::Path;

/// The recorder used by [`ResNetHandle::save_model`] and [`ResNetHandle::load_model`].
pub type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// A built graph and its model.
#[derive(Debug)]
pub struct ResNetHandle<B: Backend> {
    graph: LayerGraph,
    model: ResNet<B>,
    device: B::Device,
}

impl<B: Backend> ResNetHandle<B> {
    /// Build the graph for `config` and instantiate it on `device`.
    ///
    /// When ``config.pretrained`` is set, ImageNet weights are fetched and
    /// loaded (requires the `pretrained` feature).
    #[tracing::instrument(skip_all, fields(version = config.version))]
    pub fn new(
        config: &ArchitectureConfig,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        let graph = config.build()?;
        let model = ResNet::from_graph(&graph, device)?;
        let model = if config.pretrained {
            load_pretrained(model, &graph, device)?
        } else {
            model
        };

        Ok(Self {
            graph,
            model,
            device: device.clone(),
        })
    }

    /// The layer graph.
    pub fn graph(&self) -> &LayerGraph {
        &self.graph
    }

    /// The model.
    pub fn get_model(&self) -> &ResNet<B> {
        &self.model
    }

    /// Take the model.
    pub fn into_model(self) -> ResNet<B> {
        self.model
    }

    /// Load a record saved by [`Self::save_model`] onto the model.
    ///
    /// `burn` appends the recorder's file extension.
    pub fn load_model<P: AsRef<Path>>(
        &mut self,
        path: P,
    ) -> anyhow::Result<()> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "loading model");

        let model = self.model.clone();
        self.model = model
            .load_file(path.to_path_buf(), &ModelRecorder::new(), &self.device)
            .map_err(|e| anyhow!("failed to load {}: {e:?}", path.display()))?;
        Ok(())
    }

    /// Save the model record.
    ///
    /// `burn` appends the recorder's file extension.
    pub fn save_model<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> anyhow::Result<()> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "saving model");

        self.model
            .clone()
            .save_file(path.to_path_buf(), &ModelRecorder::new())
            .map_err(|e| anyhow!("failed to save {}: {e:?}", path.display()))
    }
}

#[cfg(feature = "pretrained")]
fn load_pretrained<B: Backend>(
    model: ResNet<B>,
    graph: &LayerGraph,
    device: &B::Device,
) -> anyhow::Result<ResNet<B>> {
    crate::models::resnet::pretrained::load_pretrained(model, graph, device)
}

#[cfg(not(feature = "pretrained"))]
fn load_pretrained<B: Backend>(
    _model: ResNet<B>,
    graph: &LayerGraph,
    _device: &B::Device,
) -> anyhow::Result<ResNet<B>> {
    anyhow::bail!(
        "pretrained weights for {} require the `pretrained` feature",
        graph.version
    )
}
