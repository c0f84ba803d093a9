//! Plain-text extraction for PDF and DOCX documents.
//!
//! PDF text comes from `pdf-extract`; DOCX text is read from `word/document.xml` with
//! `quick-xml`, keeping run text and paragraph breaks in document order. Image-only pages carry
//! no text layer and yield empty output.

use super::types::{DocumentKind, ExtractionError, SourceDocument};
use quick_xml::{Reader, events::Event};
use std::io::{Cursor, Read};
use std::path::Path;

/// Upper bound on the decompressed size of `word/document.xml`.
const MAX_DOCUMENT_XML_BYTES: u64 = 64 * 1024 * 1024;

/// Read `path` and extract its text on the blocking pool.
pub async fn extract_document(path: &Path) -> Result<SourceDocument, ExtractionError> {
    let kind = DocumentKind::from_path(path)
        .ok_or_else(|| ExtractionError::UnsupportedFormat(path.to_path_buf()))?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let text = tokio::task::spawn_blocking(move || extract_text(&bytes, kind))
        .await
        .map_err(|err| ExtractionError::Join(err.to_string()))??;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    if text.trim().is_empty() {
        tracing::warn!(file = %filename, "Document has no extractable text layer");
    }
    tracing::debug!(file = %filename, chars = text.chars().count(), "Extracted document text");

    Ok(SourceDocument {
        path: path.to_path_buf(),
        filename,
        text,
    })
}

/// Extract text from in-memory document bytes.
pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String, ExtractionError> {
    match kind {
        DocumentKind::Pdf => {
            pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Pdf(e.to_string()))
        }
        DocumentKind::Docx => extract_docx(bytes),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractionError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractionError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractionError::Docx(format!("word/document.xml: {e}")))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_DOCUMENT_XML_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| ExtractionError::Docx(e.to_string()))?;
    if xml.len() as u64 >= MAX_DOCUMENT_XML_BYTES {
        return Err(ExtractionError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    document_xml_text(&xml)
}

/// Walk WordprocessingML, emitting `w:t` run text, tabs, breaks, and one newline per paragraph.
fn document_xml_text(xml: &[u8]) -> Result<String, ExtractionError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;
    // `w:tab` inside `w:tabs` declares tab stops, not tab characters.
    let mut in_tab_stops = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:t" => in_text = true,
                b"w:tabs" => in_tab_stops = true,
                _ => {}
            },
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:tabs" => in_tab_stops = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:tab" if !in_tab_stops => out.push('\t'),
                b"w:br" | b"w:cr" => out.push('\n'),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text => {
                let text = text
                    .unescape()
                    .map_err(|e| ExtractionError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractionError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
