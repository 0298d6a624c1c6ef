//! Shared helpers for the removal pipeline

pub mod preprocessing;

pub use preprocessing::ImagePreprocessor;
