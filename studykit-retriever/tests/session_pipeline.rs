//! End-to-end tests: PDFs on disk → session → retrieval, with a deterministic
//! keyword-counting embedding provider standing in for the real model.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use studykit_context::test_support;
use studykit_context::{ChunkingMode, extract_pdf_bytes};
use studykit_embed::{
    EmbedConfig, EmbedError, EmbeddingProvider, EmbeddingResult, ensure_non_empty,
};
use studykit_retriever::{ContextUnit, SessionConfig, SqliteSnapshot, StudySession};
use tempfile::{TempDir, tempdir};

const VOCABULARY: &[&str] = &["cell", "energy", "star", "planet", "atom"];

/// Embeds text as keyword counts over [`VOCABULARY`].
struct KeywordProvider;

#[async_trait]
impl EmbeddingProvider for KeywordProvider {
    async fn embed_many(&self, texts: &[String]) -> studykit_embed::Result<EmbeddingResult> {
        ensure_non_empty(texts)?;
        Ok(EmbeddingResult::new(
            texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    VOCABULARY
                        .iter()
                        .map(|word| lower.matches(word).count() as f32)
                        .collect()
                })
                .collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        VOCABULARY.len()
    }

    fn provider_name(&self) -> &str {
        "keywords"
    }
}

/// Provider whose backend is always down.
struct FailingProvider;

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed_many(&self, _texts: &[String]) -> studykit_embed::Result<EmbeddingResult> {
        Err(EmbedError::EmbeddingGeneration {
            source: "backend unavailable".into(),
        })
    }

    fn embedding_dimension(&self) -> usize {
        VOCABULARY.len()
    }

    fn provider_name(&self) -> &str {
        "failing"
    }
}

fn make_pdf(pages: &[&str]) -> Vec<u8> {
    test_support::make_pdf(pages).unwrap()
}

/// The file a unit was ingested from.
fn source(unit: &ContextUnit) -> &str {
    unit.metadata["source"].as_str()
}

/// The first unit ingested from the file `name`.
fn unit_from(session: &StudySession, name: &str) -> ContextUnit {
    session
        .store()
        .get_all()
        .into_iter()
        .find(|u| source(u) == name && u.metadata["sequence"] == "0")
        .unwrap_or_else(|| panic!("{name} was ingested"))
}

/// An upload folder with three readable PDFs, one corrupt PDF and a text file.
fn upload_folder() -> TempDir {
    let dir = tempdir().unwrap();
    let write = |name: &str, bytes: &[u8]| std::fs::write(dir.path().join(name), bytes).unwrap();

    write(
        "biology.pdf",
        &make_pdf(&["Cells divide by mitosis.", "Each cell has a nucleus."]),
    );
    write(
        "physics.pdf",
        &make_pdf(&["Energy is conserved. Atoms store energy."]),
    );
    write(
        "astronomy.pdf",
        &make_pdf(&["Stars burn for billions of years. A planet orbits a star."]),
    );
    write("broken.pdf", b"%PDF-1.5 this file was truncated");
    write("syllabus.txt", b"Not a PDF");
    dir
}

fn session(config: SessionConfig) -> StudySession {
    StudySession::new(config, Arc::new(KeywordProvider)).unwrap()
}

async fn ingested_session(dir: &Path) -> StudySession {
    let session = session(SessionConfig::default());
    session.ingest_folder(dir).await.unwrap();
    session
}

#[tokio::test]
async fn test_ingest_skips_unreadable_documents() {
    let dir = upload_folder();
    let session = session(SessionConfig::default());

    let report = session.ingest_folder(dir.path()).await.unwrap();

    assert_eq!(report.documents, 3);
    assert_eq!(report.units_inserted, 3);
    assert_eq!(report.units_replaced, 0);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("broken.pdf"));

    let units = session.store().get_all();
    let sources: Vec<&str> = units.iter().map(source).collect();
    assert_eq!(sources, ["astronomy.pdf", "biology.pdf", "physics.pdf"]);
    assert!(units[1].id.starts_with("biology.pdf@"));
    assert!(units[1].id.ends_with(":0"));
}

#[tokio::test]
async fn test_units_carry_provenance() {
    let dir = upload_folder();
    let session = ingested_session(dir.path()).await;

    let unit = unit_from(&session, "biology.pdf");
    assert!(unit.text.contains("mitosis"));
    assert!(unit.text.contains("nucleus"));
    assert_eq!(unit.metadata["source"], "biology.pdf");
    assert_eq!(unit.metadata["sequence"], "0");
    assert_eq!(unit.metadata["pages"], "2");
    assert_eq!(unit.metadata["content_hash"].len(), 64);
    assert_eq!(unit.vector.len(), VOCABULARY.len());
}

#[tokio::test]
async fn test_search_returns_relevant_material_first() {
    let dir = upload_folder();
    let session = ingested_session(dir.path()).await;

    let results = session.search("How does a cell divide?", Some(1)).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(source(&results[0].unit), "biology.pdf");

    let results = session.search("energy inside atoms", Some(3)).await.unwrap();
    assert_eq!(source(&results[0].unit), "physics.pdf");
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    // Default k is larger than the store
    let results = session.search("planet", None).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(source(&results[0].unit), "astronomy.pdf");
}

#[tokio::test]
async fn test_context_for_query_joins_ranked_texts() {
    let dir = upload_folder();
    let session = ingested_session(dir.path()).await;

    let context = session.context_for_query("stars and planets", Some(2)).await.unwrap();

    // Biology and physics tie at zero similarity; the earlier one wins.
    let astronomy = unit_from(&session, "astronomy.pdf");
    let biology = unit_from(&session, "biology.pdf");
    assert_eq!(context, format!("{}\n\n{}", astronomy.text, biology.text));
}

#[tokio::test]
async fn test_full_context_respects_cap() {
    let dir = upload_folder();
    let config = SessionConfig::default().with_full_context_cap(Some(2));
    let session = session(config);
    session.ingest_folder(dir.path()).await.unwrap();
    let units = session.store().get_all();

    assert_eq!(
        session.full_context(None),
        format!("{}\n\n{}", units[0].text, units[1].text)
    );
    assert_eq!(session.full_context(Some(1)), units[0].text);
    assert_eq!(
        session.full_context(Some(10)),
        format!("{}\n\n{}\n\n{}", units[0].text, units[1].text, units[2].text)
    );
}

#[tokio::test]
async fn test_reingest_overwrites_instead_of_duplicating() {
    let dir = upload_folder();
    let session = ingested_session(dir.path()).await;
    let before = session.store().get_all();

    let report = session.ingest_folder(dir.path()).await.unwrap();

    assert_eq!(report.units_inserted, 0);
    assert_eq!(report.units_replaced, 3);
    assert_eq!(session.store().get_all(), before);
}

#[tokio::test]
async fn test_same_file_name_in_two_folders_keeps_both() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    std::fs::write(first.path().join("notes.pdf"), make_pdf(&["A cell membrane."])).unwrap();
    std::fs::write(second.path().join("notes.pdf"), make_pdf(&["A distant star."])).unwrap();
    let session = session(SessionConfig::default());

    session.ingest_folder(first.path()).await.unwrap();
    let report = session.ingest_folder(second.path()).await.unwrap();

    assert_eq!(report.units_inserted, 1);
    assert_eq!(report.units_replaced, 0);
    let units = session.store().get_all();
    assert_eq!(units.len(), 2);
    assert_ne!(units[0].id, units[1].id);
    assert!(units[0].text.contains("membrane"));
    assert!(units[1].text.contains("star"));

    // Each folder still re-ingests onto its own unit
    let report = session.ingest_folder(first.path()).await.unwrap();
    assert_eq!((report.units_inserted, report.units_replaced), (0, 1));
    assert_eq!(session.store().len(), 2);
}

#[tokio::test]
async fn test_names_differing_only_in_extension_case_stay_apart() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("x.pdf"), make_pdf(&["Every cell has DNA."])).unwrap();
    std::fs::write(dir.path().join("x.PDF"), make_pdf(&["Every atom has a nucleus."])).unwrap();
    let session = session(SessionConfig::default());

    let report = session.ingest_folder(dir.path()).await.unwrap();

    assert_eq!(report.documents, 2);
    assert_eq!(report.units_inserted, 2);
    let mut sources: Vec<String> = session
        .store()
        .get_all()
        .iter()
        .map(|u| source(u).to_string())
        .collect();
    sources.sort();
    assert_eq!(sources, ["x.PDF", "x.pdf"]);
}

#[tokio::test]
async fn test_windowed_chunking_splits_documents() {
    let dir = upload_folder();
    let config = SessionConfig::default().with_chunking(ChunkingMode::Windowed {
        max_chunk_length: 30,
    });
    let session = session(config);

    let report = session.ingest_folder(dir.path()).await.unwrap();
    assert_eq!(report.documents, 3);
    assert!(report.units_inserted > 3);

    let units = session.store().get_all();
    assert!(units.iter().all(|u| u.text.len() <= 30));

    let biology: Vec<_> = units.iter().filter(|u| source(u) == "biology.pdf").collect();
    assert!(biology.len() >= 2);
    assert!(biology.iter().all(|u| u.metadata["pages"] == "2"));
    let prefix = biology[0].id.strip_suffix(":0").unwrap();
    assert!(session.store().get(&format!("{prefix}:1")).is_some());
}

#[tokio::test]
async fn test_ingest_documents_from_memory() {
    let session = session(SessionConfig::default());
    let document = extract_pdf_bytes(
        "lecture-notes.pdf",
        &make_pdf(&["A star is a ball of plasma."]),
    )
    .unwrap();

    let report = session.ingest_documents(vec![document]).await.unwrap();
    assert_eq!(report.units_inserted, 1);

    let results = session.search("star", Some(1)).await.unwrap();
    assert_eq!(results[0].unit.id, "lecture-notes.pdf:0");
}

#[tokio::test]
async fn test_embedding_failure_propagates_and_stores_nothing() {
    let dir = upload_folder();
    let session = StudySession::new(SessionConfig::default(), Arc::new(FailingProvider)).unwrap();

    let err = session.ingest_folder(dir.path()).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EmbedError>(),
        Some(EmbedError::EmbeddingGeneration { .. })
    ));
    assert!(session.store().is_empty());
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let dir = upload_folder();
    let session = ingested_session(dir.path()).await;

    let err = session.search("   ", Some(2)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EmbedError>(),
        Some(EmbedError::EmptyInput { index: 0 })
    ));
}

#[tokio::test]
async fn test_concurrent_queries_share_one_store() {
    let dir = upload_folder();
    let session = Arc::new(ingested_session(dir.path()).await);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.search("cell biology", Some(1)).await })
        })
        .collect();

    for handle in handles {
        let results = handle.await.unwrap().unwrap();
        assert_eq!(source(&results[0].unit), "biology.pdf");
    }
}

#[tokio::test]
async fn test_snapshot_restores_session() -> anyhow::Result<()> {
    let dir = upload_folder();
    let db_dir = tempdir()?;
    let snapshot = SqliteSnapshot::open(&db_dir.path().join("study.db")).await?;

    let original = ingested_session(dir.path()).await;
    let expected = original.search("energy", Some(3)).await?;
    let info = original.save_snapshot(&snapshot).await?;
    assert_eq!(info.unit_count, 3);
    assert_eq!(info.model_name, "all-MiniLM-L6-v2");

    let restored =
        StudySession::restore(SessionConfig::default(), Arc::new(KeywordProvider), &snapshot)
            .await?;
    assert_eq!(restored.store().get_all(), original.store().get_all());
    assert_eq!(restored.search("energy", Some(3)).await?, expected);
    Ok(())
}

#[tokio::test]
async fn test_snapshot_from_other_model_is_refused() -> anyhow::Result<()> {
    let dir = upload_folder();
    let snapshot = SqliteSnapshot::open_memory().await?;
    ingested_session(dir.path())
        .await
        .save_snapshot(&snapshot)
        .await?;

    let config = SessionConfig::default().with_embedding(EmbedConfig::new("bge-small-en-v1.5"));
    let result = StudySession::restore(config, Arc::new(KeywordProvider), &snapshot).await;
    assert!(result.is_err());
    Ok(())
}

#[tokio::test]
async fn test_restore_without_snapshot_starts_empty() -> anyhow::Result<()> {
    let snapshot = SqliteSnapshot::open_memory().await?;
    let session =
        StudySession::restore(SessionConfig::default(), Arc::new(KeywordProvider), &snapshot)
            .await?;

    assert!(session.store().is_empty());
    assert_eq!(session.store().dimension(), Some(VOCABULARY.len()));
    Ok(())
}
