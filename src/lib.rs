use thiserror::Error;

pub type Result<T> = std::result::Result<T, DocQaError>;

#[derive(Error, Debug)]
pub enum DocQaError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("No documents indexed for user: {0}")]
    NoIndex(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(#[source] Box<DocQaError>),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod answer;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod document;
pub mod embeddings;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod retrieval;
