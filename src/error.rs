use std::path::PathBuf;

use thiserror::Error;

/// Failure to build a light handle.
#[derive(Debug, Error)]
pub enum LightError {
    #[error("could not allocate {0} bytes for the cache")]
    Alloc(usize),
    #[error("invalid epoch parameters: {0}")]
    InvalidParams(&'static str),
}

/// A failed filesystem operation on the dataset directory.
#[derive(Debug, Error)]
#[error("could not {op} {}: {source}", path.display())]
pub struct IoError {
    pub op: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Failure to build a full handle.
#[derive(Debug, Error)]
pub enum DagError {
    #[error(transparent)]
    Light(#[from] LightError),
    #[error("could not allocate {0} bytes for the dataset")]
    Alloc(usize),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("dataset generation aborted at {0}%")]
    Aborted(u32),
    #[error("could not start dataset workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
