use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::DocQaError;
use crate::config::{Config, get_config_dir};
use crate::embeddings::HttpEmbeddingClient;
use crate::generation::GeminiClient;
use crate::pipeline::QaEngine;

fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Ok(Config::load(config_dir)?)
}

fn build_engine() -> Result<QaEngine<HttpEmbeddingClient, GeminiClient>> {
    let config = load_config()?;
    let embedder = HttpEmbeddingClient::new(&config.embedding)?;
    let generator = GeminiClient::new(&config.generation)?;
    Ok(QaEngine::new(config, embedder, generator))
}

/// Ingest a PDF file into the given user's index
#[inline]
pub fn ingest_file(path: &Path, user_id: &str) -> Result<()> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("invalid filename: {}", path.display()))?;

    info!("ingesting {} for user {user_id}", path.display());

    let engine = build_engine()?;
    let added = engine.ingest(&bytes, filename, user_id)?;

    println!("Indexed {added} chunks from {filename} for {user_id}");
    Ok(())
}

/// Answer a question against the given user's indexed documents
#[inline]
pub fn ask(question: &str, user_id: &str, top_k: Option<usize>) -> Result<()> {
    let engine = build_engine()?;
    let answer = match top_k {
        Some(k) => engine.answer_with_top_k(user_id, question, &[], k),
        None => engine.answer(user_id, question, &[]),
    }?;

    println!("{answer}");
    Ok(())
}

/// List the documents indexed for the given user
#[inline]
pub fn list_documents(user_id: &str) -> Result<()> {
    let engine = build_engine()?;
    match engine.list_documents(user_id) {
        Ok(documents) => {
            println!("Documents indexed for {user_id} ({} total):", documents.len());
            for document in documents {
                println!("  {document}");
            }
            Ok(())
        }
        Err(DocQaError::NoIndex(_)) => {
            println!("No documents indexed for {user_id} yet.");
            println!("Use 'docqa ingest <file> --user {user_id}' to index one.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Show the active configuration
#[inline]
pub fn show_config() -> Result<()> {
    let config = load_config()?;

    println!("Configuration ({})", config.config_file_path().display());
    println!();
    println!("Embedding service:");
    println!(
        "  URL: {}://{}:{}",
        config.embedding.protocol, config.embedding.host, config.embedding.port
    );
    println!("  Model: {}", config.embedding.model);
    println!("  Batch size: {}", config.embedding.batch_size);
    println!();
    println!("Generation service:");
    println!("  URL: {}", config.generation.base_url);
    println!("  Model: {}", config.generation.model);
    println!("  API key env: {}", config.generation.api_key_env);
    println!();
    println!("Chunking:");
    println!("  Chunk size: {}", config.chunking.chunk_size);
    println!("  Overlap: {}", config.chunking.overlap);
    println!();
    println!("Retrieval:");
    println!("  Top-k: {}", config.retrieval.top_k);
    println!();
    println!("Storage root: {}", config.storage_root().display());

    Ok(())
}

/// Write a default configuration file if none exists yet
#[inline]
pub fn init_config() -> Result<()> {
    let config = load_config()?;
    let config_path = config.config_file_path();

    if config_path.exists() {
        println!("Configuration already exists at {}", config_path.display());
        return Ok(());
    }

    config.save()?;
    println!("Wrote default configuration to {}", config_path.display());
    println!("Edit it to point at your embedding and generation services.");
    Ok(())
}

/// Report connectivity to the external services and storage state
#[inline]
pub fn show_status() -> Result<()> {
    let config = load_config()?;

    println!("docqa status");
    println!();

    println!("Embedding service:");
    match HttpEmbeddingClient::new(&config.embedding) {
        Ok(client) => match client.ping() {
            Ok(()) => println!(
                "  reachable at {}://{}:{}",
                config.embedding.protocol, config.embedding.host, config.embedding.port
            ),
            Err(e) => println!("  unreachable: {e}"),
        },
        Err(e) => println!("  misconfigured: {e}"),
    }

    println!("Generation service:");
    match config.generation.resolve_api_key() {
        Ok(_) => println!(
            "  configured for {} at {}",
            config.generation.model, config.generation.base_url
        ),
        Err(e) => println!("  {e}"),
    }

    println!("Storage:");
    let storage_root = config.storage_root();
    if storage_root.exists() {
        let partitions = fs::read_dir(&storage_root)
            .map_or(0, |entries| entries.filter_map(std::result::Result::ok).count());
        println!(
            "  {} user partition(s) under {}",
            partitions,
            storage_root.display()
        );
    } else {
        println!("  no indexes yet under {}", storage_root.display());
    }

    Ok(())
}
