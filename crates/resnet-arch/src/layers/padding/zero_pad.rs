use crate::models::resnet::graph::ZeroPadSpec;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};

/// Explicit (possibly asymmetric) zero padding of the spatial dimensions.
///
/// Equivalent to ``F.pad(x, (left, right, top, bottom), value=0)``.
#[derive(Module, Clone, Debug)]
pub struct ZeroPad2d {
    left: usize,
    right: usize,
    top: usize,
    bottom: usize,
}

impl From<&ZeroPadSpec> for ZeroPad2d {
    fn from(spec: &ZeroPadSpec) -> Self {
        Self::new(spec.left, spec.right, spec.top, spec.bottom)
    }
}

impl ZeroPad2d {
    /// Create a padding layer.
    pub fn new(
        left: usize,
        right: usize,
        top: usize,
        bottom: usize,
    ) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// ``(left, right, top, bottom)``
    pub fn padding(&self) -> (usize, usize, usize, usize) {
        (self.left, self.right, self.top, self.bottom)
    }

    /// Forward Pass.
    ///
    /// ``[batch, channels, height, width]`` ->
    /// ``[batch, channels, height + top + bottom, width + left + right]``
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        input.pad(self.padding(), 0.0)
    }
}
