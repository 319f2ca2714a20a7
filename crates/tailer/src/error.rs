use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailError {
    #[error("Record delimiter must not be empty")]
    EmptyDelimiter,

    #[error("Output buffer too small: need {needed} bytes, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Read failed: {0}")]
    Read(#[source] io::Error),
}

pub type TailResult<T> = Result<T, TailError>;
