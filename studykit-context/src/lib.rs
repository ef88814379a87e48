//! # studykit-context
//!
//! Turns uploaded study material into plain-text units ready for embedding.
//!
//! - [`document`]: PDF text extraction and best-effort folder ingestion
//! - [`text`]: optional splitting of long documents into smaller chunks
//! - [`error`]: the [`IngestError`] type

pub mod document;
pub mod error;
pub mod text;

#[doc(hidden)]
pub mod test_support;

pub use document::{
    IngestBatch, IngestFailure, SourceDocument, extract_pdf, extract_pdf_bytes, load_folder,
};
pub use error::{IngestError, Result};
pub use text::{ChunkingMode, DocumentChunker, PROSE_DELIMITERS, TextChunk};
