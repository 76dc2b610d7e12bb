//! # Compat
//!
//! Shape arithmetic shared by the graph builder and the `burn` layers.

pub mod conv_shape;
