//! # Padding Layers
mod zero_pad;

pub use zero_pad::*;
