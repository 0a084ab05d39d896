//! Error taxonomy for training runs.

use std::path::PathBuf;
use thiserror::Error;

pub type TrainResult<T> = Result<T, TrainError>;

/// Errors surfaced by a single training run.
///
/// `ResourceExhausted` is the one recoverable class: a sweep reports it and
/// moves on to the next point. Every other variant aborts the sweep.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("resource exhausted: {message}")]
    ResourceExhausted { message: String },
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image decode error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("mask missing for image {path}")]
    MissingMask { path: PathBuf },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("checkpoint save failed: {0}")]
    Checkpoint(String),
    #[error("{0}")]
    Other(String),
}

impl TrainError {
    /// True for the one failure class a sweep survives.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::ResourceExhausted { .. })
    }
}
