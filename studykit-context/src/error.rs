//! Error types for document ingestion

use std::path::PathBuf;

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Failure to turn a source document into text.
///
/// Batch callers such as [`crate::document::load_folder`] treat every variant
/// except a failure on the folder itself as "skip this document and continue".
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The source path does not exist
    #[error("Source not found: {path}")]
    NotFound { path: PathBuf },

    /// The source could not be parsed as a PDF (corrupt or unsupported)
    #[error("Failed to parse {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: lopdf::Error,
    },

    /// The document parsed but contains no extractable text
    #[error("No extractable text in {name}")]
    NoText { name: String },

    /// A chunking delimiter is not a valid regular expression
    #[error("Invalid delimiter pattern {pattern:?}: {source}")]
    InvalidDelimiter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// IO errors when reading sources
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IngestError {
    /// Wraps an IO error, mapping `NotFound` to [`IngestError::NotFound`].
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}
