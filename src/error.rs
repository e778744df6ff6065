use std::{io, path::PathBuf};

use thiserror::Error;

/// Reasons a statistics file couldn't be written.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No storage directory was configured for this device.
    #[error("no storage directory configured")]
    NoStorage,

    #[error("storage directory {0:?} doesn't exist")]
    MissingDirectory(PathBuf),

    /// The in-memory state was rejected on load; writing it would clobber a file
    /// that may still be recoverable.
    #[error("refusing to overwrite {0:?} with invalid statistics")]
    Invalid(PathBuf),

    #[error("couldn't write statistics: {0}")]
    Io(#[from] io::Error),

    #[error("couldn't serialize statistics: {0}")]
    Serialize(#[from] serde_json::Error),
}
