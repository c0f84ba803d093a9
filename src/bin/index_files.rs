use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use clap::Parser;
use rustyrag::{
    config::Config,
    logging::{FileLogging, init_tracing},
    processing::{DocumentKind, IndexingService, QueryRequest, TaskStatus},
};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "rustyrag-index",
    about = "Index PDF and DOCX files from disk into the configured vector store"
)]
struct Cli {
    /// Files or directories to index; directories are searched recursively.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
    /// Override `INDEX_NAME`.
    #[arg(long)]
    index_name: Option<String>,
    /// Override `INDEXING_WORKERS`.
    #[arg(long)]
    workers: Option<usize>,
    /// Progress polling interval.
    #[arg(long, default_value_t = 500)]
    poll_interval_ms: u64,
    /// Append logs to this file instead of `logs/rustyrag.log`.
    #[arg(long, conflicts_with = "no_log_file")]
    log_file: Option<PathBuf>,
    /// Log to stdout only.
    #[arg(long)]
    no_log_file: bool,
    /// Run a text query against the fresh index once indexing completes.
    #[arg(long)]
    query: Option<String>,
    /// Matches to print for `--query`.
    #[arg(long, default_value_t = 5)]
    top_k: usize,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let file_logging = match (&cli.log_file, cli.no_log_file) {
        (_, true) => FileLogging::Disabled,
        (Some(path), false) => FileLogging::Path(path.clone()),
        (None, false) => FileLogging::from_env(),
    };
    init_tracing(file_logging);

    let mut config = Config::from_env().context("failed to load configuration")?;
    if let Some(name) = cli.index_name {
        config.index_name = name;
    }
    if let Some(workers) = cli.workers {
        config.indexing_workers = workers;
    }
    config.validate().context("invalid configuration")?;

    let files = collect_documents(&cli.paths)?;
    if files.is_empty() {
        bail!("no .pdf or .docx files found");
    }
    println!("Indexing {} file(s) into '{}'", files.len(), config.index_name);

    let service = IndexingService::from_config(&config)
        .context("failed to initialize indexing service")?;
    let (handle, join) = service.index_paths(files)?;
    let task_id = handle.task_id;

    let mut interval = tokio::time::interval(Duration::from_millis(cli.poll_interval_ms.max(10)));
    let mut last = None;
    let outcome = loop {
        interval.tick().await;
        let progress = service.progress(task_id.as_str())?;
        if last != Some(progress.progress) {
            println!("[{task_id}] {}%", progress.progress);
            last = Some(progress.progress);
        }
        if progress.status != TaskStatus::InProgress {
            break progress;
        }
    };
    join.await.context("indexing task panicked")?;

    if outcome.status == TaskStatus::Failed {
        bail!("indexing task {task_id} failed; see logs for details");
    }
    println!(
        "Indexed {} chunk(s) into '{}'",
        outcome.total_chunks.unwrap_or_default(),
        config.index_name
    );

    if let Some(text) = cli.query {
        let matches = service
            .query(QueryRequest {
                vector: None,
                text: Some(text),
                top_k: Some(cli.top_k),
            })
            .await?;
        for hit in matches {
            println!(
                "{:.4}  {}#{}  {}",
                hit.score,
                hit.source().unwrap_or("?"),
                hit.chunk_index().unwrap_or_default(),
                preview(hit.text().unwrap_or_default())
            );
        }
    }
    Ok(())
}

/// Expand directories into their supported documents, keeping explicit file arguments as given.
fn collect_documents(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file() && is_supported(e.path()))
            {
                files.push(entry.into_path());
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("{} does not exist", path.display());
        }
    }
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    DocumentKind::from_path(path).is_some()
}

fn preview(text: &str) -> String {
    let flat: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    match flat.char_indices().nth(80) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directories_expand_to_supported_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(dir.path().join("b.pdf"), b"").expect("write");
        std::fs::write(dir.path().join("a.txt"), b"").expect("write");
        std::fs::write(nested.join("c.DOCX"), b"").expect("write");

        let files = collect_documents(&[dir.path().to_path_buf()]).expect("files");
        assert_eq!(files, vec![dir.path().join("b.pdf"), nested.join("c.DOCX")]);
    }

    #[test]
    fn missing_paths_are_errors() {
        assert!(collect_documents(&[PathBuf::from("/definitely/not/here")]).is_err());
    }

    #[test]
    fn preview_flattens_and_truncates() {
        assert_eq!(preview("a\n b"), "a b");
        assert_eq!(preview(&"x".repeat(100)), format!("{}...", "x".repeat(80)));
    }
}
