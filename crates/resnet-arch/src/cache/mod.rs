//! # Pretrained Weight Cache
//!
//! Read-through disk cache for downloaded weight files.
pub mod disk;
pub mod weights;
