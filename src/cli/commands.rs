// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::RetrievalConfig;
use crate::embeddings::{EmbeddingManager, EncoderKind, OnnxBackend};
use crate::retrieval::{Retriever, SearchRequest};
use crate::vector::{CollectionKind, VectorRecord, VectorStoreClient};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Query,
    Context,
}

impl From<EmbedKind> for EncoderKind {
    fn from(kind: EmbedKind) -> Self {
        match kind {
            EmbedKind::Query => EncoderKind::Query,
            EmbedKind::Context => EncoderKind::Context,
        }
    }
}

/// Arguments for the embed command
#[derive(Args, Debug)]
pub struct EmbedArgs {
    /// Text to embed
    pub text: String,

    /// Encoder to use
    #[arg(long, value_enum, default_value = "query")]
    pub kind: EmbedKind,
}

/// Arguments for the ingest command
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Target collection (chat/screen)
    #[arg(long, default_value = "chat")]
    pub collection: CollectionKind,

    /// JSON Lines file, one record per line. Chat records without a vector
    /// are embedded with the context encoder; screen records must carry one.
    pub file: PathBuf,
}

/// Arguments for the search command
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Query text, embedded with the query encoder for the chat collection
    pub text: String,

    /// JSON file holding a screen query vector
    #[arg(long)]
    pub screen_vector: Option<PathBuf>,

    /// Drop records from this session (session 0 is always kept)
    #[arg(long)]
    pub exclude_session: Option<i64>,

    #[arg(long)]
    pub chat_top_k: Option<usize>,

    #[arg(long)]
    pub screen_top_k: Option<usize>,

    /// Chat records to ingest before searching
    #[arg(long)]
    pub chat_corpus: Option<PathBuf>,

    /// Screen records to ingest before searching
    #[arg(long)]
    pub screen_corpus: Option<PathBuf>,
}

async fn load_manager(config: &RetrievalConfig) -> Result<EmbeddingManager> {
    let backend = Arc::new(OnnxBackend::new(config.encoders.max_sequence_length));
    let manager = EmbeddingManager::new(backend);
    manager
        .initialize(&config.encoder_paths())
        .await
        .context("Failed to load encoders")?;
    Ok(manager)
}

/// Parse a JSON Lines file of records, skipping blank lines
pub fn read_records(path: &Path) -> Result<Vec<VectorRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<VectorRecord>(line)
                .with_context(|| format!("{}:{}: invalid record", path.display(), i + 1))
        })
        .collect()
}

/// Screen vectors come from an external encoder, so only chat records may
/// omit theirs
fn check_embeddable(collection: CollectionKind, records: &[VectorRecord]) -> Result<()> {
    if collection != CollectionKind::Screen {
        return Ok(());
    }
    let missing = records.iter().filter(|r| r.vector.is_empty()).count();
    if missing > 0 {
        return Err(anyhow!(
            "{} screen record(s) have no vector; screen vectors cannot be derived from text",
            missing
        ));
    }
    Ok(())
}

/// Fill in missing vectors with context embeddings
async fn embed_missing(manager: &EmbeddingManager, records: &mut [VectorRecord]) -> Result<()> {
    let missing: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.vector.is_empty())
        .map(|(i, _)| i)
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let texts: Vec<String> = missing.iter().map(|&i| records[i].content.clone()).collect();
    let vectors = manager.embed_contexts(&texts).await?;
    for (i, vector) in missing.into_iter().zip(vectors) {
        records[i].vector = vector;
    }
    info!("Embedded {} records", texts.len());
    Ok(())
}

async fn ingest_records(
    retriever: &Retriever,
    manager: Option<&EmbeddingManager>,
    collection: CollectionKind,
    mut records: Vec<VectorRecord>,
) -> Result<usize> {
    check_embeddable(collection, &records)?;
    if records.iter().any(|r| r.vector.is_empty()) {
        let manager = manager.ok_or_else(|| anyhow!("Records without vectors need the encoders"))?;
        embed_missing(manager, &mut records).await?;
    }

    let summary = match collection {
        CollectionKind::Chat => retriever.insert_chat_data(&records).await?,
        CollectionKind::Screen => retriever.insert_screen_data(&records).await?,
    };
    info!(collection = %collection, count = summary.inserted_count, "Ingested records");
    Ok(summary.inserted_count)
}

pub async fn embed(args: EmbedArgs, config: &RetrievalConfig) -> Result<()> {
    let manager = load_manager(config).await?;
    let vector = manager.embed(args.kind.into(), &args.text).await?;
    println!("{}", serde_json::to_string(&vector)?);
    manager.cleanup().await;
    Ok(())
}

pub async fn ingest(args: IngestArgs, config: &RetrievalConfig) -> Result<()> {
    let client = Arc::new(config.build_client()?);
    let retriever = Retriever::with_options(client.clone(), config.retrieval);

    let records = read_records(&args.file)?;
    check_embeddable(args.collection, &records)?;
    let manager = if records.iter().any(|r| r.vector.is_empty()) {
        Some(load_manager(config).await?)
    } else {
        None
    };

    let result = ingest_records(&retriever, manager.as_ref(), args.collection, records).await;
    finish(&client, manager.as_ref()).await;

    let count = result?;
    println!(
        "{}",
        serde_json::json!({ "collection": args.collection, "inserted_count": count })
    );
    Ok(())
}

pub async fn search(args: SearchArgs, config: &RetrievalConfig) -> Result<()> {
    let manager = load_manager(config).await?;
    let client = Arc::new(config.build_client()?);
    let retriever = Retriever::with_options(client.clone(), config.retrieval);

    let result = run_search(&args, &retriever, &manager).await;
    finish(&client, Some(&manager)).await;

    let records = result?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn run_search(
    args: &SearchArgs,
    retriever: &Retriever,
    manager: &EmbeddingManager,
) -> Result<Vec<VectorRecord>> {
    if let Some(path) = &args.chat_corpus {
        ingest_records(retriever, Some(manager), CollectionKind::Chat, read_records(path)?).await?;
    }
    if let Some(path) = &args.screen_corpus {
        ingest_records(retriever, Some(manager), CollectionKind::Screen, read_records(path)?).await?;
    }

    let mut request = SearchRequest::chat(manager.embed_query(&args.text).await?);
    if let Some(path) = &args.screen_vector {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let vector: Vec<f32> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a JSON array of numbers", path.display()))?;
        request = request.with_screen(vector);
    }
    if let Some(k) = args.chat_top_k {
        request = request.with_chat_top_k(k);
    }
    if let Some(k) = args.screen_top_k {
        request = request.with_screen_top_k(k);
    }
    if let Some(session_id) = args.exclude_session {
        request = request.excluding_session(session_id);
    }

    Ok(retriever.search_and_query(&request).await?)
}

async fn finish(client: &VectorStoreClient, manager: Option<&EmbeddingManager>) {
    client.terminate().await;
    if let Some(manager) = manager {
        manager.cleanup().await;
    }
}
