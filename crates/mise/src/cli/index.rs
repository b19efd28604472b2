use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use serde::Deserialize;
use tracing::info;

use crate::context::AppContext;
use crate::embedding::Embedder;
use crate::error::{MiseError, Result};
use crate::storage::{ChunkIndex, IndexedChunk};

use super::output::OutputFormat;

/// Propositions embedded per blocking task
const LOAD_BATCH_SIZE: usize = 256;

#[derive(Parser)]
pub struct IndexCommand {
    #[clap(subcommand)]
    pub command: IndexSubcommand,
}

#[derive(Subcommand)]
pub enum IndexSubcommand {
    #[clap(about = "Embed and load chunk records from a JSONL file")]
    Load(LoadArgs),

    #[clap(about = "Show chunk index statistics")]
    Stats,
}

#[derive(Parser)]
pub struct LoadArgs {
    #[clap(help = "JSONL file with one {chunk_id, raw_content, proposition} object per line")]
    pub path: PathBuf,
}

/// One line of the ingestion output
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub raw_content: String,
    pub proposition: String,
}

/// Parse JSONL chunk records, skipping blank lines
pub fn parse_records(content: &str) -> Result<Vec<ChunkRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| {
                MiseError::Serialization(format!("Invalid chunk record on line {}: {e}", i + 1))
            })
        })
        .collect()
}

/// Embed propositions and write the chunks, then refresh the indices
pub async fn load_records(
    index: &ChunkIndex,
    embedder: Arc<dyn Embedder>,
    records: Vec<ChunkRecord>,
) -> Result<usize> {
    let mut loaded = 0;
    for batch in records.chunks(LOAD_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|r| r.proposition.clone()).collect();
        let embedder = embedder.clone();
        let embeddings = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .map_err(|e| MiseError::Embedding(format!("Embedding task failed: {e}")))??;

        let chunks: Vec<IndexedChunk> = batch
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(record, embedding)| IndexedChunk {
                chunk_id: record.chunk_id,
                raw_content: record.raw_content,
                proposition: record.proposition,
                embedding,
            })
            .collect();

        index.load(&chunks).await?;
        loaded += chunks.len();
        info!("Loaded {loaded}/{} chunks", records.len());
    }

    index.create_indices().await?;
    Ok(loaded)
}

impl IndexCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        match &self.command {
            IndexSubcommand::Load(args) => Self::load(ctx, &args.path, format).await,
            IndexSubcommand::Stats => Self::stats(ctx, format).await,
        }
    }

    async fn load(ctx: &AppContext, path: &Path, format: OutputFormat) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MiseError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let records = parse_records(&content)?;

        let index = ctx.chunk_index().await?;
        let embedder = ctx.embedder()?;
        let loaded = load_records(&index, embedder, records).await?;
        let total = index.count().await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "loaded": loaded, "total": total });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                println!("Loaded {loaded} chunks ({total} total)");
            }
        }
        Ok(())
    }

    async fn stats(ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let index = ctx.chunk_index().await?;
        let rows = index.count().await?;
        let config = &ctx.config().index;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "table": &config.table,
                    "rows": rows,
                    "dimension": index.dimension(),
                    "top_k": config.top_k,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Property", "Value"]);

                table.add_row(["Table", config.table.as_str()]);
                table.add_row(["Rows", &rows.to_string()]);
                table.add_row(["Dimension", &index.dimension().to_string()]);
                table.add_row(["Top k", &config.top_k.to_string()]);

                println!("{table}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::connect;
    use crate::testing::MockEmbeddingModel;
    use tempfile::TempDir;

    #[test]
    fn test_parse_records_skips_blank_lines() {
        let content = r#"{"chunk_id": "1", "raw_content": "Dal. Lentils, spices.", "proposition": "Dal is a lentil dish"}

{"chunk_id": "2", "raw_content": "Ragu.", "proposition": "Ragu is a meat sauce", "source": "book"}
"#;
        let records = parse_records(content).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].chunk_id, "1");
        assert_eq!(records[1].proposition, "Ragu is a meat sauce");
    }

    #[test]
    fn test_parse_records_reports_line() {
        let content = "{\"chunk_id\": \"1\", \"raw_content\": \"a\", \"proposition\": \"b\"}\nnot json\n";
        match parse_records(content) {
            Err(MiseError::Serialization(msg)) => assert!(msg.contains("line 2")),
            other => panic!("expected serialization error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_load_records_embeds_and_counts() {
        let dir = TempDir::new().unwrap();
        let connection = connect(dir.path()).await.unwrap();
        let mut index = ChunkIndex::new(connection, "chunks", 32);
        index.open_or_create().await.unwrap();

        let records = vec![
            ChunkRecord {
                chunk_id: "1".into(),
                raw_content: "Chana masala".into(),
                proposition: "Chana masala is a vegetarian chickpea curry".into(),
            },
            ChunkRecord {
                chunk_id: "2".into(),
                raw_content: "Beef bourguignon".into(),
                proposition: "Beef bourguignon is a beef stew braised in wine".into(),
            },
        ];

        let embedder = Arc::new(MockEmbeddingModel::with_dimension(32));
        let loaded = load_records(&index, embedder, records).await.unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(index.count().await.unwrap(), 2);
    }
}
