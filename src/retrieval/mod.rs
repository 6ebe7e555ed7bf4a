
use std::path::Path;

use tracing::debug;

use crate::embeddings::EmbeddingProvider;
use crate::index::{Chunk, ScoredChunk, UserIndex};
use crate::{DocQaError, Result};

/// Embeds a question and returns the most similar chunks from one user's
/// index.
pub struct Retriever<'a, E: EmbeddingProvider> {
    storage_root: &'a Path,
    embedder: &'a E,
    top_k: usize,
}

impl<'a, E: EmbeddingProvider> Retriever<'a, E> {
    #[inline]
    pub fn new(storage_root: &'a Path, embedder: &'a E, top_k: usize) -> Self {
        Self {
            storage_root,
            embedder,
            top_k,
        }
    }

    /// Top-k chunks for `question`, most similar first, scores discarded.
    ///
    /// Signals [`DocQaError::NoIndex`] when the user has no persisted index
    /// at all, which callers must distinguish from an existing index that
    /// simply matched nothing (an `Ok` with an empty list).
    #[inline]
    pub fn retrieve(&self, user_id: &str, question: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_scored(user_id, question)?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    /// Same as [`Retriever::retrieve`] but keeps similarity scores.
    #[inline]
    pub fn retrieve_scored(&self, user_id: &str, question: &str) -> Result<Vec<ScoredChunk>> {
        let index = UserIndex::open(self.storage_root, user_id)?;
        if !index.exists() {
            return Err(DocQaError::NoIndex(user_id.to_string()));
        }

        let query_vector = self.embedder.embed(question)?;
        let results = index.search(&query_vector, self.top_k)?;

        debug!(
            "retrieved {} of up to {} chunks for user {user_id}",
            results.len(),
            self.top_k
        );
        Ok(results)
    }
}
