//! # `ResNet` Weight Import
pub mod pytorch_stubs;
