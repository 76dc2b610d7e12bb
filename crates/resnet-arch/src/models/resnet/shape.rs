//! # Running Shape
//!
//! [`RunningShape`] is the `{channels, width, height}` accumulator threaded
//! through graph construction. Every spatial transform produces a new value;
//! nothing holds it between builds.

use crate::compat::conv_shape::maybe_conv2d_output_resolution;
use crate::models::resnet::error::{BuildError, BuildResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The feature-map shape at a point in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunningShape {
    /// Number of feature channels.
    pub channels: usize,

    /// Spatial width.
    pub width: usize,

    /// Spatial height.
    pub height: usize,
}

impl From<(usize, usize, usize)> for RunningShape {
    /// Convert a ``(channels, width, height)`` tuple.
    fn from((channels, width, height): (usize, usize, usize)) -> Self {
        Self::new(channels, width, height)
    }
}

impl fmt::Display for RunningShape {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}x{}x{}", self.channels, self.width, self.height)
    }
}

impl RunningShape {
    /// Create a new shape.
    pub fn new(
        channels: usize,
        width: usize,
        height: usize,
    ) -> Self {
        Self {
            channels,
            width,
            height,
        }
    }

    /// The spatial resolution, ``[height, width]``.
    pub fn resolution(&self) -> [usize; 2] {
        [self.height, self.width]
    }

    /// The flattened feature count, ``channels * width * height``.
    ///
    /// `None` if the count overflows `usize`.
    pub fn numel(&self) -> Option<usize> {
        self.channels
            .checked_mul(self.width)?
            .checked_mul(self.height)
    }

    /// Check that every dimension is positive.
    pub fn check_positive(
        self,
        layer: &str,
    ) -> BuildResult<Self> {
        if self.channels == 0 || self.width == 0 || self.height == 0 {
            return Err(BuildError::invalid_shape(
                layer,
                format!("shape {self} has a zero dimension"),
            ));
        }
        Ok(self)
    }

    /// Check that the channel count matches what a layer expects.
    pub fn expect_channels(
        self,
        layer: &str,
        channels: usize,
    ) -> BuildResult<Self> {
        if self.channels != channels {
            return Err(BuildError::invalid_shape(
                layer,
                format!("expected {channels} input channels, got shape {self}"),
            ));
        }
        Ok(self)
    }

    /// Apply a square convolution or pooling window.
    ///
    /// ``size' = floor((size + 2*padding - kernel_size) / stride) + 1``
    pub fn window(
        self,
        layer: &str,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
    ) -> BuildResult<Self> {
        let [height, width] =
            maybe_conv2d_output_resolution(self.resolution(), kernel_size, stride, padding)
                .ok_or_else(|| {
                    BuildError::invalid_shape(
                        layer,
                        format!(
                            "window kernel={kernel_size} stride={stride} padding={padding} collapses input {self}"
                        ),
                    )
                })?;

        Self::new(out_channels, width, height).check_positive(layer)
    }

    /// Grow the spatial dimensions by explicit padding.
    pub fn padded(
        self,
        layer: &str,
        left: usize,
        right: usize,
        top: usize,
        bottom: usize,
    ) -> BuildResult<Self> {
        let width = self
            .width
            .checked_add(left)
            .and_then(|w| w.checked_add(right));
        let height = self
            .height
            .checked_add(top)
            .and_then(|h| h.checked_add(bottom));
        match (width, height) {
            (Some(width), Some(height)) => Ok(Self::new(self.channels, width, height)),
            _ => Err(BuildError::invalid_shape(
                layer,
                format!("padding ({left}, {right}, {top}, {bottom}) overflows input {self}"),
            )),
        }
    }
}
