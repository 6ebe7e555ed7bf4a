
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{DocQaError, Result};

pub const INDEX_FILE_NAME: &str = "index.json";

const INDEX_FORMAT_VERSION: u32 = 1;

/// A bounded text segment derived from a document, the unit stored in and
/// returned from the vector index. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    /// Filename of the document this chunk was extracted from
    pub source: String,
    pub user_id: String,
    /// Position of this chunk within its document
    pub chunk_index: usize,
    pub ingested_at: String,
}

impl Chunk {
    #[inline]
    pub fn new(text: String, source: &str, user_id: &str, chunk_index: usize) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text,
            source: source.to_string(),
            user_id: user_id.to_string(),
            chunk_index,
            ingested_at: Utc::now().to_rfc3339(),
        }
    }
}

/// A chunk returned from similarity search together with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct PersistedIndex {
    version: u32,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Serialize)]
struct PersistedIndexRef<'a> {
    version: u32,
    dimension: Option<usize>,
    entries: &'a [IndexEntry],
}

/// Handle over one user's vector index.
///
/// Each user identifier maps to its own partition directory; no operation on
/// one handle can read or write another user's partition. Mutations stay in
/// memory until [`UserIndex::persist`] atomically replaces the on-disk
/// snapshot.
#[derive(Debug)]
pub struct UserIndex {
    user_id: String,
    partition_dir: PathBuf,
    dimension: Option<usize>,
    entries: Vec<IndexEntry>,
    existed: bool,
}

impl UserIndex {
    /// Open the index for `user_id`, loading persisted state when present.
    ///
    /// A missing partition is a valid empty index, not an error; whether
    /// persisted state was found is reported by [`UserIndex::exists`].
    #[inline]
    pub fn open(storage_root: &Path, user_id: &str) -> Result<Self> {
        if user_id.trim().is_empty() {
            return Err(DocQaError::InvalidInput(
                "user identifier must not be empty".to_string(),
            ));
        }

        let partition_dir = storage_root.join(partition_key(user_id));
        let index_path = partition_dir.join(INDEX_FILE_NAME);

        if !index_path.exists() {
            debug!("no persisted index for user {user_id}, starting empty");
            return Ok(Self {
                user_id: user_id.to_string(),
                partition_dir,
                dimension: None,
                entries: Vec::new(),
                existed: false,
            });
        }

        let content = fs::read_to_string(&index_path).map_err(|e| {
            DocQaError::Storage(format!(
                "failed to read index at {}: {e}",
                index_path.display()
            ))
        })?;
        let persisted: PersistedIndex = serde_json::from_str(&content).map_err(|e| {
            DocQaError::Storage(format!(
                "corrupt index at {}: {e}",
                index_path.display()
            ))
        })?;
        if persisted.version != INDEX_FORMAT_VERSION {
            return Err(DocQaError::Storage(format!(
                "unsupported index format version {} at {}",
                persisted.version,
                index_path.display()
            )));
        }

        debug!(
            "loaded {} entries for user {user_id} from {}",
            persisted.entries.len(),
            index_path.display()
        );

        Ok(Self {
            user_id: user_id.to_string(),
            partition_dir,
            dimension: persisted.dimension,
            entries: persisted.entries,
            existed: true,
        })
    }

    /// Whether persisted state was present when this handle was opened.
    #[inline]
    pub fn exists(&self) -> bool {
        self.existed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Dimensionality established by the first vector ever added, if any.
    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Sorted distinct source filenames stored in this index.
    #[inline]
    pub fn sources(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.chunk.source.clone())
            .unique()
            .sorted()
            .collect()
    }

    /// Drop all chunks originating from `source`, returning how many were
    /// removed. Used when a document is re-ingested under the same filename.
    #[inline]
    pub fn remove_source(&mut self, source: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.chunk.source != source);
        before - self.entries.len()
    }

    /// Add `(chunk, vector)` pairs to the in-memory index.
    ///
    /// All-or-nothing: every pair is validated against the established
    /// dimensionality before any entry is added, so a failed append leaves
    /// the index exactly as it was.
    #[inline]
    pub fn append(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != vectors.len() {
            return Err(DocQaError::InvalidInput(format!(
                "chunk/vector count mismatch: {} chunks, {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let expected = self.dimension.or_else(|| vectors.first().map(Vec::len));
        if let Some(expected) = expected {
            for vector in &vectors {
                if vector.len() != expected {
                    return Err(DocQaError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
            }
        }

        self.dimension = expected;
        let added = chunks.len();
        self.entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| IndexEntry { chunk, vector }),
        );

        debug!("appended {added} entries for user {}", self.user_id);
        Ok(())
    }

    /// Durably write the current state to the user's partition, atomically
    /// replacing any prior snapshot (write to a temp file, then rename).
    #[inline]
    pub fn persist(&self) -> Result<()> {
        fs::create_dir_all(&self.partition_dir).map_err(|e| {
            DocQaError::Storage(format!(
                "failed to create partition directory {}: {e}",
                self.partition_dir.display()
            ))
        })?;

        let snapshot = PersistedIndexRef {
            version: INDEX_FORMAT_VERSION,
            dimension: self.dimension,
            entries: &self.entries,
        };
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| DocQaError::Storage(format!("failed to serialize index: {e}")))?;

        let final_path = self.partition_dir.join(INDEX_FILE_NAME);
        let tmp_path = self.partition_dir.join(format!("{INDEX_FILE_NAME}.tmp"));
        fs::write(&tmp_path, json).map_err(|e| {
            DocQaError::Storage(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|e| {
            DocQaError::Storage(format!(
                "failed to replace {}: {e}",
                final_path.display()
            ))
        })?;

        info!(
            "persisted {} entries for user {} to {}",
            self.entries.len(),
            self.user_id,
            final_path.display()
        );
        Ok(())
    }

    /// Return the `k` stored chunks most similar to `query_vector`, ordered
    /// by descending cosine similarity with ties broken by insertion order.
    ///
    /// Fewer than `k` entries returns all of them; an empty index returns an
    /// empty list.
    #[inline]
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if let Some(expected) = self.dimension {
            if query_vector.len() != expected {
                return Err(DocQaError::DimensionMismatch {
                    expected,
                    actual: query_vector.len(),
                });
            }
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_vector, &entry.vector),
            })
            .collect();

        // sort_by is stable, so equal scores keep insertion order
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        debug!(
            "search over {} entries for user {} returned {} results",
            self.entries.len(),
            self.user_id,
            scored.len()
        );
        Ok(scored)
    }
}

/// Encode a user identifier into a filesystem-safe partition directory name.
///
/// The encoding is injective: distinct identifiers always map to distinct
/// directories, which is what enforces per-user isolation structurally.
#[inline]
pub fn partition_key(user_id: &str) -> String {
    let mut key = String::with_capacity(user_id.len());
    for byte in user_id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => key.push(char::from(byte)),
            _ => {
                let _ = write!(key, "%{byte:02x}");
            }
        }
    }
    key
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
