//! Splitting extracted document text into retrievable chunks.
//!
//! By default every source document is a single context unit
//! ([`ChunkingMode::WholeDocument`]). Long study material retrieves better in
//! smaller pieces, so [`ChunkingMode::Windowed`] splits a document into chunks
//! no longer than `max_chunk_length` bytes.
//!
//! Windowed splitting is recursive: the text is first cut at the most
//! significant delimiter (page breaks), and any piece that is still too long is
//! cut at the next one (paragraphs, lines, sentence ends, spaces). When no
//! delimiter helps, the piece is cut at the byte limit, moved back to the
//! nearest character boundary. The resulting segments are then packed greedily
//! into chunks. Concatenating the chunks of a document always reproduces the
//! document text exactly.
//!
//! ```
//! use studykit_context::text::{ChunkingMode, DocumentChunker};
//!
//! let chunker = DocumentChunker::new("notes.pdf", ChunkingMode::Windowed { max_chunk_length: 40 })?;
//! let text = "Mitosis produces two cells.\n\nMeiosis produces four gametes.";
//! let chunks = chunker.chunk(text);
//!
//! assert_eq!(chunks.len(), 2);
//! assert!(chunks.iter().all(|c| c.text.len() <= 40));
//! let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
//! assert_eq!(rebuilt, text);
//! # Ok::<(), studykit_context::IngestError>(())
//! ```

use crate::error::{IngestError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Delimiters for prose extracted from PDFs, most significant first.
///
/// - `\n{3,}`: runs of blank lines, typically page or section breaks
/// - `\n\s*\n`: paragraph breaks
/// - `\n`: line breaks
/// - `[.!?]["')\]]*\s+`: sentence ends, including trailing quotes or brackets
/// - ` `: spaces
pub const PROSE_DELIMITERS: &[&str] = &[
    r"\n{3,}",
    r"\n\s*\n",
    r"\n",
    r#"[.!?]["')\]]*\s+"#,
    r" ",
];

/// How a document is turned into context units.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChunkingMode {
    /// One chunk per document
    #[default]
    WholeDocument,
    /// Chunks of at most `max_chunk_length` bytes
    Windowed { max_chunk_length: usize },
}

/// One piece of a source document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Name of the document the chunk came from
    pub source: String,
    /// Position of the chunk within its document (0-indexed)
    pub sequence: usize,
    /// The chunk's text
    pub text: String,
}

/// Splits document text according to a [`ChunkingMode`].
#[derive(Debug, Clone)]
pub struct DocumentChunker {
    source: String,
    mode: ChunkingMode,
    delimiters: Vec<Regex>,
}

impl DocumentChunker {
    /// Creates a chunker using [`PROSE_DELIMITERS`].
    ///
    /// # Errors
    /// [`IngestError::InvalidDelimiter`] never occurs for the built-in delimiters,
    /// but is returned by [`with_delimiters`](Self::with_delimiters) for bad patterns.
    pub fn new(source: impl Into<String>, mode: ChunkingMode) -> Result<Self> {
        Self::with_delimiters(source, mode, PROSE_DELIMITERS)
    }

    /// Creates a chunker with custom delimiter patterns, most significant first.
    pub fn with_delimiters(
        source: impl Into<String>,
        mode: ChunkingMode,
        delimiter_patterns: &[&str],
    ) -> Result<Self> {
        let delimiters = delimiter_patterns
            .iter()
            .map(|&pattern| {
                Regex::new(pattern).map_err(|source| IngestError::InvalidDelimiter {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            source: source.into(),
            mode,
            delimiters,
        })
    }

    /// The configured mode.
    pub fn mode(&self) -> &ChunkingMode {
        &self.mode
    }

    /// Splits `text` into chunks. Empty text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.is_empty() {
            return Vec::new();
        }

        let max_len = match self.mode {
            ChunkingMode::WholeDocument => return vec![self.make_chunk(0, text)],
            // A zero limit would never make progress.
            ChunkingMode::Windowed { max_chunk_length } => max_chunk_length.max(1),
        };

        let segments = self.split_segments(text, 0, max_len, 0);

        let mut chunks = Vec::new();
        let mut current: Range<usize> = 0..0;
        for segment in segments {
            if current.is_empty() {
                current = segment;
            } else if segment.end - current.start > max_len {
                chunks.push(self.make_chunk(chunks.len(), &text[current.clone()]));
                current = segment;
            } else {
                current.end = segment.end;
            }
        }
        if !current.is_empty() {
            chunks.push(self.make_chunk(chunks.len(), &text[current]));
        }

        chunks
    }

    fn make_chunk(&self, sequence: usize, text: &str) -> TextChunk {
        TextChunk {
            source: self.source.clone(),
            sequence,
            text: text.to_string(),
        }
    }

    // Returns contiguous byte ranges covering `text`, each at most `max_len`
    // long unless it is a single delimiter match. `offset` is the position of
    // `text` within the full document.
    fn split_segments(
        &self,
        text: &str,
        delimiter_idx: usize,
        max_len: usize,
        offset: usize,
    ) -> Vec<Range<usize>> {
        if text.is_empty() {
            return Vec::new();
        }
        if text.len() <= max_len {
            return vec![offset..offset + text.len()];
        }

        let Some(delimiter) = self.delimiters.get(delimiter_idx) else {
            return split_at_char_boundaries(text, max_len, offset);
        };

        let mut segments = Vec::new();
        let mut start = 0;
        for mat in delimiter.find_iter(text) {
            if mat.start() > start {
                segments.extend(self.split_segments(
                    &text[start..mat.start()],
                    delimiter_idx + 1,
                    max_len,
                    offset + start,
                ));
            }
            // An oversized delimiter run is itself split by the next delimiter.
            segments.extend(self.split_segments(
                mat.as_str(),
                delimiter_idx + 1,
                max_len,
                offset + mat.start(),
            ));
            start = mat.end();
        }
        if start < text.len() {
            segments.extend(self.split_segments(
                &text[start..],
                delimiter_idx + 1,
                max_len,
                offset + start,
            ));
        }

        segments
    }
}

fn split_at_char_boundaries(text: &str, max_len: usize, offset: usize) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            // A single character wider than max_len.
            end = start + text[start..].chars().next().map_or(1, char::len_utf8);
        }
        segments.push(offset + start..offset + end);
        start = end;
    }
    segments
}
