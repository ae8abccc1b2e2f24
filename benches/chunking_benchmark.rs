/// Benchmarks for token chunking and reconciliation throughput
use async_trait::async_trait;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rag_sync::embedding::EmbeddingProvider;
use rag_sync::indexer::{LocalFileReader, TiktokenTokenizer, TokenChunker};
use rag_sync::types::RepoIdentity;
use rag_sync::vector_db::MemoryStore;
use rag_sync::{ChangeSet, Reconciler};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

/// Embedder that derives a tiny vector from the text length
struct LengthEmbedder;

#[async_trait]
impl EmbeddingProvider for LengthEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> rag_sync::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
    }

    fn model_name(&self) -> &str {
        "length"
    }
}

fn sample_source(functions: usize) -> String {
    (0..functions)
        .map(|i| {
            format!(
                "def transform_{i}(rows):\n    \"\"\"Normalise batch {i}.\"\"\"\n    return [r * {i} for r in rows if r]\n\n"
            )
        })
        .collect()
}

fn benchmark_chunking(c: &mut Criterion) {
    let tokenizer = Arc::new(TiktokenTokenizer::cl100k().unwrap());
    let chunker = TokenChunker::new(tokenizer, 200, 50).unwrap();
    let mut group = c.benchmark_group("chunking");

    for functions in [10, 100, 1000].iter() {
        let text = sample_source(*functions);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_functions", functions)),
            &text,
            |b, text| {
                b.iter(|| chunker.chunk(black_box(text)).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_reconcile(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("reconcile");

    for file_count in [10, 50, 100].iter() {
        let repo_dir = TempDir::new().unwrap();
        let mut changes = ChangeSet::default();
        for i in 0..*file_count {
            let path = format!("jobs/job_{}.py", i);
            std::fs::create_dir_all(repo_dir.path().join("jobs")).unwrap();
            std::fs::write(repo_dir.path().join(&path), sample_source(20)).unwrap();
            changes.modified.insert(path);
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_files", file_count)),
            &changes,
            |b, changes| {
                b.iter(|| {
                    rt.block_on(async {
                        let reconciler = Reconciler::new(
                            RepoIdentity::new("bench", "repo"),
                            Arc::new(LocalFileReader::new(repo_dir.path(), 1_048_576)),
                            Arc::new(LengthEmbedder),
                            Arc::new(MemoryStore::new()),
                        )
                        .with_concurrency(8);
                        reconciler.reconcile(black_box(changes)).await
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_chunking, benchmark_reconcile);
criterion_main!(benches);
