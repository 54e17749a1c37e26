use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading, linking or writing a particle table
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing '{0}' column in particle table")]
    MissingColumn(String),

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config file: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Frame {frame} arrived after frame {previous}; frames must be linked in increasing order")]
    FrameOrder { previous: i64, frame: i64 },

    #[error("Subnetwork contains {size} points at frame {frame} (maximum is {max})")]
    SubnetOversize { frame: i64, size: usize, max: usize },
}

impl LinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LinkError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
