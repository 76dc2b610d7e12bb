#![warn(missing_docs)]
//!# resnet-arch - `ResNet` Architecture Graphs
//!
//! ## Notable Components
//!
//! * [`compat`] - compat code, ported or planned for an upcoming release of ``burn``.
//!   * [`compat::conv_shape`] - convolution output-size arithmetic.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::activation`] - activation layer wrapper.
//!   * [`layers::padding`] - explicit zero padding.
//! * [`models`] - complete model families.
//!   * [`models::resnet`] - `ResNet` graph builder and model.
//! * `cache` - pretrained weight cache (feature `pretrained`).

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;

pub mod layers;

#[cfg(feature = "pretrained")]
pub mod cache;
pub mod models;
