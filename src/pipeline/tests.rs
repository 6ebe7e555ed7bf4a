use super::*;
use crate::answer::NO_DOCUMENTS_ANSWER;
use crate::generation::PromptContent;
use crate::index::partition_key;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Deterministic fake embedder: a 26-dim letter histogram. Texts sharing
/// vocabulary score high against each other, disjoint texts score zero.
struct LetterEmbedder;

impl EmbeddingProvider for LetterEmbedder {
    fn embed(&self, text: &str) -> crate::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; 26];
        for c in text.chars() {
            let lower = c.to_ascii_lowercase();
            if lower.is_ascii_lowercase() {
                vector[usize::from(lower as u8 - b'a')] += 1.0;
            }
        }
        Ok(vector)
    }
}

#[derive(Default)]
struct CountingGenerator {
    calls: AtomicUsize,
}

impl GenerationProvider for CountingGenerator {
    fn generate(&self, _contents: &[PromptContent]) -> crate::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("a grounded answer".to_string())
    }
}

struct FailingGenerator;

impl GenerationProvider for FailingGenerator {
    fn generate(&self, _contents: &[PromptContent]) -> crate::Result<String> {
        Err(DocQaError::Generation(
            "generation service returned HTTP 500".to_string(),
        ))
    }
}

fn engine_with<G: GenerationProvider>(
    dir: &TempDir,
    generator: G,
) -> QaEngine<LetterEmbedder, G> {
    let config = Config::load(dir.path()).expect("config should load");
    QaEngine::new(config, LetterEmbedder, generator)
}

/// 2400 characters built from 8-character words: the first half talks about
/// "alphaaa", the second half about "zumzumm", so window edges land on word
/// boundaries and the two topics embed into disjoint letter histograms.
fn two_topic_document() -> String {
    let mut text = String::new();
    for _ in 0..150 {
        text.push_str("alphaaa ");
    }
    for _ in 0..150 {
        text.push_str("zumzumm ");
    }
    text
}

#[test]
fn ingest_splits_into_exactly_overlapping_chunks() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    let text = two_topic_document();
    assert_eq!(text.chars().count(), 2400);

    let added = engine
        .ingest_text(&text, "topics.pdf", "alice@example.com")
        .expect("ingest should succeed");
    assert_eq!(added, 3);

    // pull everything back out and restore insertion order
    let index = UserIndex::open(&engine.config().storage_root(), "alice@example.com")
        .expect("open should succeed");
    let query = LetterEmbedder.embed("anything").expect("embed should succeed");
    let mut chunks: Vec<Chunk> = index
        .search(&query, 10)
        .expect("search should succeed")
        .into_iter()
        .map(|scored| scored.chunk)
        .collect();
    chunks.sort_by_key(|chunk| chunk.chunk_index);

    assert_eq!(chunks.len(), 3);
    for pair in chunks.windows(2) {
        let prev: Vec<char> = pair[0].text.chars().collect();
        let prefix: String = pair[1].text.chars().take(200).collect();
        let tail: String = prev[prev.len() - 200..].iter().collect();
        assert_eq!(prefix, tail, "consecutive chunks must share 200 characters");
    }
    for chunk in &chunks {
        assert_eq!(chunk.source, "topics.pdf");
        assert_eq!(chunk.user_id, "alice@example.com");
    }
}

#[test]
fn retrieval_ranks_matching_chunks_first() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    engine
        .ingest_text(&two_topic_document(), "topics.pdf", "alice@example.com")
        .expect("ingest should succeed");

    let chunks = engine
        .retrieve("alice@example.com", "what is alphaaa")
        .expect("retrieve should succeed");

    assert_eq!(chunks.len(), 3);
    assert!(chunks[0].text.contains("alphaaa"));
    // the all-zumzumm chunk is unrelated to the question and ranks last
    assert!(!chunks[2].text.contains("alphaaa"));
}

#[test]
fn users_are_isolated_from_each_other() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    engine
        .ingest_text("alice's private document text", "private.pdf", "alice@example.com")
        .expect("ingest should succeed");

    let err = engine
        .retrieve("bob@example.com", "alice's private document text")
        .expect_err("bob must not see alice's index");
    assert!(matches!(err, DocQaError::NoIndex(_)));
}

#[test]
fn answer_without_documents_skips_generation() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    let answer = engine
        .answer("nobody@example.com", "anything?", &[])
        .expect("missing index should produce the fixed message");

    assert_eq!(answer, NO_DOCUMENTS_ANSWER);
    assert_eq!(engine.generator.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn answer_uses_generation_service() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    engine
        .ingest_text("alpha is the first greek letter", "greek.pdf", "alice@example.com")
        .expect("ingest should succeed");

    let answer = engine
        .answer("alice@example.com", "what is alpha?", &[])
        .expect("answer should succeed");

    assert_eq!(answer, "a grounded answer");
    assert_eq!(engine.generator.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn generation_failure_leaves_index_untouched() {
    let dir = TempDir::new().expect("tempdir should create");

    let ingest_engine = engine_with(&dir, CountingGenerator::default());
    ingest_engine
        .ingest_text("alpha is the first greek letter", "greek.pdf", "alice@example.com")
        .expect("ingest should succeed");

    let index_path = dir
        .path()
        .join("users")
        .join(partition_key("alice@example.com"))
        .join("index.json");
    let before = std::fs::read(&index_path).expect("index snapshot should read");

    let failing_engine = engine_with(&dir, FailingGenerator);
    let err = failing_engine
        .answer("alice@example.com", "what is alpha?", &[])
        .expect_err("generation failure should propagate");

    assert!(matches!(err, DocQaError::Generation(_)));
    let after = std::fs::read(&index_path).expect("index snapshot should read");
    assert_eq!(before, after, "a failed query must not mutate the index");
}

#[test]
fn ingest_from_pdf_bytes_end_to_end() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    let pdf = crate::document::tests::build_pdf(&[
        "alpha is the first greek letter",
        "beta comes right after alpha",
    ]);
    let added = engine
        .ingest(&pdf, "greek.pdf", "alice@example.com")
        .expect("ingest should succeed");
    assert!(added >= 1);

    let chunks = engine
        .retrieve("alice@example.com", "what is alpha?")
        .expect("retrieve should succeed");
    assert!(!chunks.is_empty());
    assert!(chunks[0].text.contains("alpha"));

    let answer = engine
        .answer("alice@example.com", "what is alpha?", &[])
        .expect("answer should succeed");
    assert_eq!(answer, "a grounded answer");
}

#[test]
fn unreadable_pdf_is_an_ingestion_error() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    let err = engine
        .ingest(b"not a pdf at all", "junk.pdf", "alice@example.com")
        .expect_err("garbage bytes should fail ingestion");

    assert!(matches!(err, DocQaError::Ingestion(_)));
    let source = std::error::Error::source(&err).expect("cause should be preserved");
    assert!(source.to_string().contains("junk.pdf"));
}

#[test]
fn empty_text_is_an_ingestion_error() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    let err = engine
        .ingest_text("   \n  ", "empty.pdf", "alice@example.com")
        .expect_err("blank text should fail ingestion");
    assert!(matches!(err, DocQaError::Ingestion(_)));
}

#[test]
fn reingesting_a_filename_replaces_its_chunks() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    engine
        .ingest_text("first version of the document", "doc.pdf", "alice@example.com")
        .expect("ingest should succeed");
    engine
        .ingest_text("second version of the document", "doc.pdf", "alice@example.com")
        .expect("re-ingest should succeed");

    let index = UserIndex::open(&engine.config().storage_root(), "alice@example.com")
        .expect("open should succeed");
    assert_eq!(index.len(), 1);
    assert_eq!(index.sources(), vec!["doc.pdf"]);

    let chunks = engine
        .retrieve("alice@example.com", "version of the document")
        .expect("retrieve should succeed");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.contains("second version"));
}

#[test]
fn list_documents_is_sorted_and_requires_an_index() {
    let dir = TempDir::new().expect("tempdir should create");
    let engine = engine_with(&dir, CountingGenerator::default());

    let err = engine
        .list_documents("nobody@example.com")
        .expect_err("fresh user has no index");
    assert!(matches!(err, DocQaError::NoIndex(_)));

    engine
        .ingest_text("some zebra text", "zebra.pdf", "alice@example.com")
        .expect("ingest should succeed");
    engine
        .ingest_text("some apple text", "apple.pdf", "alice@example.com")
        .expect("ingest should succeed");

    let documents = engine
        .list_documents("alice@example.com")
        .expect("list should succeed");
    assert_eq!(documents, vec!["apple.pdf", "zebra.pdf"]);
}

#[test]
fn persisted_index_survives_a_new_engine() {
    let dir = TempDir::new().expect("tempdir should create");

    {
        let engine = engine_with(&dir, CountingGenerator::default());
        engine
            .ingest_text("alpha is the first greek letter", "greek.pdf", "alice@example.com")
            .expect("ingest should succeed");
    }

    let engine = engine_with(&dir, CountingGenerator::default());
    let chunks = engine
        .retrieve("alice@example.com", "what is alpha?")
        .expect("retrieve should succeed");
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.contains("alpha"));
}
