#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use rustyrag::{
    embedding::EmbeddingClient,
    processing::{IndexingService, IndexingSettings, ProgressRegistry, batching::whitespace_token_counter},
    store::{DistanceMetric, IndexSpec, MemoryStore},
};

pub const INDEX: &str = "test-index";
pub const DIMENSION: usize = 16;

/// Minimal DOCX archive with one paragraph per entry.
pub fn docx_bytes(paragraphs: &[String]) -> Vec<u8> {
    let body: String = paragraphs
        .iter()
        .map(|text| format!("<w:p><w:r><w:t xml:space=\"preserve\">{text}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
        .expect("start entry");
    writer.write_all(xml.as_bytes()).expect("write entry");
    writer.finish().expect("finish archive").into_inner()
}

/// Write a DOCX whose extracted text is exactly `chars` characters long.
///
/// Extraction appends one newline per paragraph, so the paragraph holds `chars - 1` characters.
pub fn write_docx_of_len(dir: &Path, name: &str, chars: usize) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, docx_bytes(&["x".repeat(chars - 1)])).expect("write fixture");
    path
}

pub fn settings(
    upload_dir: &Path,
    chunk_size: usize,
    overlap: usize,
    chunks_per_batch: usize,
    workers: usize,
) -> IndexingSettings {
    IndexingSettings {
        index: IndexSpec {
            name: INDEX.into(),
            dimension: DIMENSION,
            metric: DistanceMetric::Cosine,
        },
        chunk_size,
        chunk_overlap: overlap,
        max_input_tokens: chunk_size * chunks_per_batch,
        workers,
        upload_dir: upload_dir.to_path_buf(),
        tokenizer_model: "cl100k_base".into(),
    }
}

pub fn service(
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<MemoryStore>,
    settings: IndexingSettings,
) -> IndexingService {
    IndexingService::new(
        embedder,
        store,
        Arc::new(ProgressRegistry::default()),
        settings,
    )
    .with_token_counter(whitespace_token_counter())
}
