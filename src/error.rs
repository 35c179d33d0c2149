//! Everything that can stop a reconstruction.
//!
//! None of these are recovered from: configuration and dataset errors abort
//! before the first iteration, anything raised during an iteration leaves the
//! model undefined and the run must be restarted from the last saved model.

use crate::utils::group_digits as g;

#[derive(Debug, thiserror::Error)]
pub enum EmcError {

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Photons file has {found} pixels, but the detector has {expected}")]
    SchemaMismatch { expected: usize, found: usize },

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("A single frame needs {} bytes of probabilities, but only {} bytes are available",
            g(*required), g(*budget))]
    InsufficientMemory { required: usize, budget: usize },

    #[error("Collective communication failed: {0}")]
    Collective(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Could not start stream pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}

impl EmcError {
    pub fn config(message: impl Into<String>) -> Self { Self::Config(message.into()) }
    pub fn dataset(message: impl Into<String>) -> Self { Self::InvalidDataset(message.into()) }
    pub fn collective(message: impl Into<String>) -> Self { Self::Collective(message.into()) }
}

pub type Result<T> = std::result::Result<T, EmcError>;
