//! Common low-level modules for building graph layers in Burn.
pub mod activation;
pub mod padding;
