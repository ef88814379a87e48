//! PDF ingestion: turns source documents into plain text.
//!
//! Each source document becomes one [`SourceDocument`] whose text is the
//! extracted text of every page, in page order. Pages are separated by
//! [`PAGE_BREAK`] so a downstream chunker can split on page boundaries;
//! consumers that treat the document as a single unit can ignore it.
//!
//! Folder ingestion is best-effort: [`load_folder`] skips documents that fail
//! to load, logs them, and reports them in [`IngestBatch::failures`] so the
//! caller can decide what to do with a partial batch.
//!
//! ```no_run
//! use studykit_context::document::load_folder;
//! use std::path::Path;
//!
//! let batch = load_folder(Path::new("Data/Upload"))?;
//! for doc in &batch.documents {
//!     println!("{}: {} pages, {} bytes", doc.name, doc.page_count, doc.text.len());
//! }
//! for failure in &batch.failures {
//!     eprintln!("skipped {}: {}", failure.path.display(), failure.error);
//! }
//! # Ok::<(), studykit_context::IngestError>(())
//! ```

use crate::error::{IngestError, Result};
use lopdf::Document;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Separator placed between the text of consecutive pages.
pub const PAGE_BREAK: &str = "\n\n";

/// Blake3 hash of a document's extracted text (32 bytes).
pub type ContentHash = [u8; 32];

/// Plain text extracted from one source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name (or caller-supplied name for in-memory sources)
    pub name: String,
    /// Location on disk, if the document was read from a file
    pub path: Option<PathBuf>,
    /// Text of all pages in page order, trimmed
    pub text: String,
    /// Number of pages in the source
    pub page_count: usize,
    /// Hash of `text`, used as provenance
    pub content_hash: ContentHash,
}

impl SourceDocument {
    /// Identifier unique to where the document came from.
    ///
    /// For a file this is the file name followed by a short hash of its
    /// canonical path (`"notes.pdf@1f3a9c02"`), so same-named files in
    /// different folders stay distinct while re-reading the same file gives
    /// the same id. In-memory documents use their name.
    pub fn source_id(&self) -> String {
        match &self.path {
            Some(path) => {
                let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
                let digest = blake3::hash(canonical.to_string_lossy().as_bytes());
                format!("{}@{}", self.name, hex::encode(&digest.as_bytes()[..4]))
            }
            None => self.name.clone(),
        }
    }

    /// Hex-encoded content hash.
    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }
}

/// A document that could not be ingested, with the reason.
#[derive(Debug)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: IngestError,
}

/// Outcome of ingesting a folder: the documents that loaded and the ones skipped.
#[derive(Debug, Default)]
pub struct IngestBatch {
    pub documents: Vec<SourceDocument>,
    pub failures: Vec<IngestFailure>,
}

impl IngestBatch {
    /// Total number of candidate documents seen.
    pub fn attempted(&self) -> usize {
        self.documents.len() + self.failures.len()
    }
}

/// Returns true when the path has a `.pdf` extension (any case).
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Extracts the text of a PDF file on disk.
///
/// # Errors
/// - [`IngestError::NotFound`] if the file does not exist
/// - [`IngestError::Parse`] if it is not a readable PDF
/// - [`IngestError::NoText`] if no page yields any text
pub fn extract_pdf(path: &Path) -> Result<SourceDocument> {
    let bytes = std::fs::read(path).map_err(|e| IngestError::io(path, e))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let mut document = extract_pdf_bytes(name, &bytes)?;
    document.path = Some(path.to_path_buf());
    Ok(document)
}

/// Extracts the text of an in-memory PDF.
///
/// `name` identifies the document in errors and provenance.
pub fn extract_pdf_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<SourceDocument> {
    let name = name.into();
    let pdf = Document::load_mem(bytes).map_err(|source| IngestError::Parse {
        name: name.clone(),
        source,
    })?;

    let pages = pdf.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());
    for page_number in pages.keys() {
        let page_text =
            pdf.extract_text(&[*page_number])
                .map_err(|source| IngestError::Parse {
                    name: name.clone(),
                    source,
                })?;
        page_texts.push(page_text);
    }

    let text = page_texts.join(PAGE_BREAK).trim().to_string();
    if text.is_empty() {
        return Err(IngestError::NoText { name });
    }

    debug!(
        "Extracted {} bytes of text from {} ({} pages)",
        text.len(),
        name,
        pages.len()
    );

    Ok(SourceDocument {
        content_hash: *blake3::hash(text.as_bytes()).as_bytes(),
        name,
        path: None,
        text,
        page_count: pages.len(),
    })
}

/// Extracts every PDF directly inside `dir`, skipping the ones that fail.
///
/// Files are visited in name order; sub-directories and non-PDF files are
/// ignored. Only a failure to read `dir` itself is returned as an error.
pub fn load_folder(dir: &Path) -> Result<IngestBatch> {
    let entries = std::fs::read_dir(dir).map_err(|e| IngestError::io(dir, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() && is_pdf(&path) {
                    candidates.push(path);
                }
            }
            Err(e) => warn!("Skipping unreadable entry in {}: {}", dir.display(), e),
        }
    }
    candidates.sort();

    let mut batch = IngestBatch::default();
    for path in candidates {
        match extract_pdf(&path) {
            Ok(document) => batch.documents.push(document),
            Err(error) => {
                warn!("Skipping {}: {}", path.display(), error);
                batch.failures.push(IngestFailure { path, error });
            }
        }
    }

    info!(
        "Loaded {} documents from {} ({} skipped)",
        batch.documents.len(),
        dir.display(),
        batch.failures.len()
    );
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use tempfile::tempdir;

    fn make_pdf(pages: &[&str]) -> Vec<u8> {
        test_support::make_pdf(pages).unwrap()
    }

    #[test]
    fn test_extract_pages_in_order() {
        let bytes = make_pdf(&["Cells divide by mitosis", "Meiosis halves chromosomes"]);
        let doc = extract_pdf_bytes("biology.pdf", &bytes).unwrap();

        assert_eq!(doc.page_count, 2);
        let first = doc.text.find("mitosis").expect("first page text");
        let second = doc.text.find("Meiosis").expect("second page text");
        assert!(first < second);
        assert_eq!(doc.content_hash, *blake3::hash(doc.text.as_bytes()).as_bytes());
        assert_eq!(doc.content_hash_hex().len(), 64);
    }

    #[test]
    fn test_extract_from_disk_records_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, make_pdf(&["Newton's second law"])).unwrap();

        let doc = extract_pdf(&path).unwrap();
        assert_eq!(doc.name, "notes.pdf");
        assert_eq!(doc.path.as_deref(), Some(path.as_path()));
        assert!(doc.text.contains("second law"));
    }

    #[test]
    fn test_source_id_separates_same_named_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("week1")).unwrap();
        std::fs::create_dir(dir.path().join("week2")).unwrap();
        let first = dir.path().join("week1").join("notes.pdf");
        let second = dir.path().join("week2").join("notes.pdf");
        std::fs::write(&first, make_pdf(&["Same text"])).unwrap();
        std::fs::write(&second, make_pdf(&["Same text"])).unwrap();

        let a = extract_pdf(&first).unwrap();
        let b = extract_pdf(&second).unwrap();
        assert_ne!(a.source_id(), b.source_id());
        assert!(a.source_id().starts_with("notes.pdf@"));

        // Reading the same file again, even through a different spelling of
        // its path, yields the same id
        let roundabout = dir.path().join("week2").join("..").join("week1").join("notes.pdf");
        let again = extract_pdf(&roundabout).unwrap();
        assert_eq!(a.source_id(), again.source_id());

        let in_memory = extract_pdf_bytes("notes.pdf", &make_pdf(&["Same text"])).unwrap();
        assert_eq!(in_memory.source_id(), "notes.pdf");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let err = extract_pdf(&dir.path().join("absent.pdf")).unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
    }

    #[test]
    fn test_corrupt_bytes_fail_to_parse() {
        let err = extract_pdf_bytes("broken.pdf", b"this is not a pdf").unwrap_err();
        assert!(matches!(err, IngestError::Parse { ref name, .. } if name == "broken.pdf"));
    }

    #[test]
    fn test_blank_pages_have_no_text() {
        let bytes = make_pdf(&["   "]);
        let err = extract_pdf_bytes("blank.pdf", &bytes).unwrap_err();
        assert!(matches!(err, IngestError::NoText { .. }));
    }

    #[test]
    fn test_load_folder_skips_failures() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b_chemistry.pdf"), make_pdf(&["Covalent bonds"])).unwrap();
        std::fs::write(dir.path().join("a_physics.PDF"), make_pdf(&["Kinetic energy"])).unwrap();
        std::fs::write(dir.path().join("c_corrupt.pdf"), b"%PDF-garbage").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not a pdf").unwrap();
        std::fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let batch = load_folder(dir.path()).unwrap();

        let names: Vec<&str> = batch.documents.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a_physics.PDF", "b_chemistry.pdf"]);
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures[0].path.ends_with("c_corrupt.pdf"));
        assert_eq!(batch.attempted(), 3);
    }

    #[test]
    fn test_load_missing_folder_fails() {
        let dir = tempdir().unwrap();
        let err = load_folder(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, IngestError::NotFound { .. }));
    }
}
