#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::info;

use crate::answer::{AnswerComposer, ChatTurn};
use crate::chunker;
use crate::config::Config;
use crate::document;
use crate::embeddings::EmbeddingProvider;
use crate::generation::GenerationProvider;
use crate::index::{Chunk, UserIndex};
use crate::retrieval::Retriever;
use crate::{DocQaError, Result};

/// Orchestrates the ingestion and query pipelines over one pair of embedding
/// and generation providers.
///
/// Operations touching the same user's index serialize on a per-user lock;
/// operations for different users never contend.
pub struct QaEngine<E: EmbeddingProvider, G: GenerationProvider> {
    config: Config,
    embedder: E,
    generator: G,
    user_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<E: EmbeddingProvider, G: GenerationProvider> QaEngine<E, G> {
    #[inline]
    pub fn new(config: Config, embedder: E, generator: G) -> Self {
        Self {
            config,
            embedder,
            generator,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ingest an uploaded PDF into `user_id`'s index and persist it.
    ///
    /// Returns the number of chunks added. Re-uploading a filename replaces
    /// the chunks previously indexed from it. Any failure is reported as
    /// [`DocQaError::Ingestion`] wrapping the underlying cause; the on-disk
    /// index only changes at the final persist.
    #[inline]
    pub fn ingest(&self, pdf_bytes: &[u8], filename: &str, user_id: &str) -> Result<usize> {
        let extracted = document::extract_pages(pdf_bytes, filename).map_err(wrap_ingestion)?;
        if extracted.is_empty() {
            return Err(wrap_ingestion(DocQaError::InvalidInput(format!(
                "no text extracted from '{filename}'"
            ))));
        }
        self.ingest_text(&extracted.text(), filename, user_id)
    }

    /// Ingest already-extracted text under `filename` for `user_id`.
    #[inline]
    pub fn ingest_text(&self, text: &str, filename: &str, user_id: &str) -> Result<usize> {
        if text.trim().is_empty() {
            return Err(wrap_ingestion(DocQaError::InvalidInput(format!(
                "no text extracted from '{filename}'"
            ))));
        }

        info!("ingesting '{filename}' for user {user_id}");

        let fragments = chunker::split(text, &self.config.chunking).map_err(wrap_ingestion)?;
        let chunks: Vec<Chunk> = fragments
            .into_iter()
            .enumerate()
            .map(|(i, fragment)| Chunk::new(fragment, filename, user_id, i))
            .collect();
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        // embedding happens outside the critical section; only the index
        // open/append/persist cycle below needs exclusive access
        let vectors = self.embedder.embed_batch(&texts).map_err(wrap_ingestion)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let storage_root = self.config.storage_root();
        let mut index = UserIndex::open(&storage_root, user_id).map_err(wrap_ingestion)?;
        let replaced = index.remove_source(filename);
        if replaced > 0 {
            info!("replacing {replaced} previously indexed chunks from '{filename}'");
        }
        let added = chunks.len();
        index.append(chunks, vectors).map_err(wrap_ingestion)?;
        index.persist().map_err(wrap_ingestion)?;

        info!("indexed {added} chunks from '{filename}' for user {user_id}");
        Ok(added)
    }

    /// Answer `question` for `user_id`, grounded in the user's indexed
    /// documents, using the configured retrieval depth.
    #[inline]
    pub fn answer(&self, user_id: &str, question: &str, history: &[ChatTurn]) -> Result<String> {
        self.answer_with_top_k(user_id, question, history, self.config.retrieval.top_k)
    }

    /// Same as [`QaEngine::answer`] with an explicit retrieval depth.
    #[inline]
    pub fn answer_with_top_k(
        &self,
        user_id: &str,
        question: &str,
        history: &[ChatTurn],
        top_k: usize,
    ) -> Result<String> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let storage_root = self.config.storage_root();
        let retriever = Retriever::new(&storage_root, &self.embedder, top_k);
        let composer = AnswerComposer::new(retriever, &self.generator);
        composer.answer(user_id, question, history)
    }

    /// Top-k chunks for `question` from `user_id`'s index, without
    /// generation.
    #[inline]
    pub fn retrieve(&self, user_id: &str, question: &str) -> Result<Vec<Chunk>> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let storage_root = self.config.storage_root();
        let retriever = Retriever::new(&storage_root, &self.embedder, self.config.retrieval.top_k);
        retriever.retrieve(user_id, question)
    }

    /// Sorted distinct filenames indexed for `user_id`.
    ///
    /// Signals [`DocQaError::NoIndex`] when the user has never ingested
    /// anything.
    #[inline]
    pub fn list_documents(&self, user_id: &str) -> Result<Vec<String>> {
        let index = UserIndex::open(&self.config.storage_root(), user_id)?;
        if !index.exists() {
            return Err(DocQaError::NoIndex(user_id.to_string()));
        }
        Ok(index.sources())
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }
}

fn wrap_ingestion(cause: DocQaError) -> DocQaError {
    DocQaError::Ingestion(Box::new(cause))
}
