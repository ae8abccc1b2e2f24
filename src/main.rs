use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rag_sync::client::{chunk_text, plan_reindex, transcribe_file};
use rag_sync::error::ValidationError;
use rag_sync::github::GitHubClient;
use rag_sync::llm::WhisperClient;
use rag_sync::{Config, RagClient, RagError, ReindexRequest};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug)]
#[command(
    name = "rag-sync",
    version,
    long_version = LONG_VERSION,
    about = "Keep a vector index in sync with a git repository and answer questions over it"
)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "RAG_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile the index with the changes between two revisions
    Reindex {
        /// Any directory inside the repository
        #[arg(long, default_value = ".")]
        repo: PathBuf,

        /// Base revision (defaults to the cached revision, then HEAD~1)
        #[arg(long)]
        base: Option<String>,

        /// Target revision
        #[arg(long)]
        head: Option<String>,

        /// Read `git diff --name-status` output from FILE, or stdin for `-`
        #[arg(long, value_name = "FILE")]
        diff_file: Option<PathBuf>,

        /// Print the plan without calling any service
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Answer a question from the indexed content
    Ask {
        question: String,

        /// Number of context entries to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Embed and store an arbitrary text
    Upsert {
        text: String,

        /// Record id (defaults to the SHA-256 of the text)
        #[arg(long)]
        id: Option<String>,

        /// Extra metadata as key=value, repeatable
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },

    /// Print the token windows of a file as JSON
    Chunk {
        file: PathBuf,

        #[arg(long)]
        chunk_size: Option<usize>,

        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Transcribe an audio or video file
    Transcribe {
        file: PathBuf,

        /// Store overlapping windows of the transcript in the index
        #[arg(long, default_value_t = false)]
        index: bool,

        #[arg(long, default_value_t = 50, requires = "index")]
        chunk_size: usize,

        #[arg(long, default_value_t = 25, requires = "index")]
        overlap: usize,

        /// Extra metadata for every stored window as key=value, repeatable
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val, requires = "index")]
        meta: Vec<(String, String)>,
    },

    /// List the repositories of an organization
    ListRepos { org: String },

    /// Print the effective configuration as TOML
    Config,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_diff(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read diff from stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read diff file {}", path.display()))
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Exit status for a failed command: 2 for invalid input or configuration, 1 otherwise
fn exit_status(err: &anyhow::Error) -> u8 {
    let user_error = err.chain().any(|cause| {
        cause
            .downcast_ref::<RagError>()
            .is_some_and(RagError::is_user_error)
    });
    if user_error { 2 } else { 1 }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(exit_status(&err))
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Reindex {
            repo,
            base,
            head,
            diff_file,
            dry_run,
        } => {
            let mut request = ReindexRequest::new(repo);
            request.base = base;
            request.head = head;
            request.dry_run = dry_run;
            if let Some(path) = diff_file {
                request.diff_text = Some(read_diff(&path)?);
            }

            // A dry run only diffs and plans, so it needs no credentials
            let summary = if dry_run {
                plan_reindex(&config, &request).await?
            } else {
                RagClient::from_config(config)?.reindex(request).await?
            };
            print_json(&summary)?;
        }
        Command::Ask { question, top_k } => {
            let client = RagClient::from_config(config)?;
            let response = client.ask(&question, top_k).await?;
            print_json(&response)?;
        }
        Command::Upsert { text, id, meta } => {
            let client = RagClient::from_config(config)?;
            let meta: BTreeMap<String, String> = meta.into_iter().collect();
            let id = client.upsert_text(&text, meta, id).await?;
            println!("{}", id);
        }
        Command::Chunk {
            file,
            chunk_size,
            overlap,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let chunks = chunk_text(
                &config.openai.embedding_model,
                &text,
                chunk_size.unwrap_or(config.indexing.chunk_size),
                overlap.unwrap_or(config.indexing.overlap),
            )?;
            print_json(&chunks)?;
        }
        Command::Transcribe {
            file,
            index: true,
            chunk_size,
            overlap,
            meta,
        } => {
            let client = RagClient::from_config(config)?;
            let meta: BTreeMap<String, String> = meta.into_iter().collect();
            let ids = client.index_transcript(&file, chunk_size, overlap, meta).await?;
            print_json(&ids)?;
        }
        Command::Transcribe { file, .. } => {
            let speech = WhisperClient::from_config(&config.openai)?;
            let transcript = transcribe_file(&speech, &file).await?;
            println!("{}", transcript);
        }
        Command::ListRepos { org } => {
            if org.trim().is_empty() {
                return Err(RagError::from(ValidationError::Empty("organization".to_string())).into());
            }
            let repos = GitHubClient::from_config(&config.github)?
                .list_org_repos(&org)
                .await?;
            for name in repos {
                println!("{}", name);
            }
        }
        Command::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("source=slack").unwrap(),
            ("source".to_string(), "slack".to_string())
        );
        assert_eq!(
            parse_key_val("q=a=b").unwrap(),
            ("q".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_reindex_args() {
        let cli = Cli::parse_from([
            "rag-sync",
            "-vv",
            "reindex",
            "--repo",
            "/tmp/repo",
            "--base",
            "abc123",
            "--diff-file",
            "-",
            "--dry-run",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Reindex {
                repo,
                base,
                head,
                diff_file,
                dry_run,
            } => {
                assert_eq!(repo, PathBuf::from("/tmp/repo"));
                assert_eq!(base.as_deref(), Some("abc123"));
                assert!(head.is_none());
                assert_eq!(diff_file, Some(PathBuf::from("-")));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_transcribe_index_args() {
        let cli = Cli::parse_from([
            "rag-sync",
            "transcribe",
            "videos/five_transformations.mp4",
            "--index",
            "--meta",
            "category=Memes",
        ]);
        match cli.command {
            Command::Transcribe {
                file,
                index,
                chunk_size,
                overlap,
                meta,
            } => {
                assert_eq!(file, PathBuf::from("videos/five_transformations.mp4"));
                assert!(index);
                assert_eq!((chunk_size, overlap), (50, 25));
                assert_eq!(meta, vec![("category".to_string(), "Memes".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        // Window options only make sense when indexing
        assert!(Cli::try_parse_from(["rag-sync", "transcribe", "a.mp3", "--chunk-size", "10"]).is_err());
    }

    #[test]
    fn test_exit_status() {
        let user: anyhow::Error = RagError::from(ValidationError::Empty("question".to_string())).into();
        assert_eq!(exit_status(&user), 2);

        let wrapped = anyhow::Error::from(RagError::from(ValidationError::Empty("text".to_string())))
            .context("Failed to upsert");
        assert_eq!(exit_status(&wrapped), 2);

        let system: anyhow::Error = RagError::Io(std::io::Error::other("disk full")).into();
        assert_eq!(exit_status(&system), 1);
    }

    #[test]
    fn test_upsert_meta_repeats() {
        let cli = Cli::parse_from([
            "rag-sync", "upsert", "hello", "--meta", "a=1", "--meta", "b=2",
        ]);
        match cli.command {
            Command::Upsert { text, id, meta } => {
                assert_eq!(text, "hello");
                assert!(id.is_none());
                assert_eq!(meta.len(), 2);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
