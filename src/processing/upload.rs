//! Upload validation and staging on disk.
//!
//! Validation runs before a task id exists, so a rejected request leaves nothing behind.
//! Accepted files are written to `<upload_dir>/<task_id>/`, which the run removes when it ends.

use super::types::{DocumentKind, TaskId, UploadedFile, ValidationError};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// An upload that passed validation, with its on-disk name resolved.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    /// Safe filename within the task directory.
    pub filename: String,
    /// Document kind resolved from the declared type or filename.
    pub kind: DocumentKind,
    /// Raw bytes.
    pub content: Vec<u8>,
}

/// Check every file is a PDF or DOCX and give each a unique, safe filename.
///
/// The declared type wins; an empty or generic declared type (`application/octet-stream`)
/// falls back to the filename's extension.
pub fn validate_uploads(files: Vec<UploadedFile>) -> Result<Vec<ValidatedUpload>, ValidationError> {
    if files.is_empty() {
        return Err(ValidationError::EmptyFileSet);
    }

    let mut taken = HashSet::new();
    let mut validated = Vec::with_capacity(files.len());
    for file in files {
        let kind = resolve_kind(&file).ok_or_else(|| ValidationError::UnsupportedType {
            filename: file.filename.clone(),
        })?;
        let filename = sanitize_filename(&file.filename, kind, &mut taken)?;
        validated.push(ValidatedUpload {
            filename,
            kind,
            content: file.content,
        });
    }
    Ok(validated)
}

fn resolve_kind(file: &UploadedFile) -> Option<DocumentKind> {
    let declared = file.declared_type.trim();
    let generic = declared.is_empty() || declared.eq_ignore_ascii_case("application/octet-stream");
    if generic {
        DocumentKind::from_path(Path::new(&file.filename))
    } else {
        DocumentKind::from_declared(declared)
    }
}

/// Reduce a client filename to a unique basename carrying the kind's extension.
pub fn sanitize_filename(
    raw: &str,
    kind: DocumentKind,
    taken: &mut HashSet<String>,
) -> Result<String, ValidationError> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    let base: String = base.chars().filter(|c| !c.is_control()).collect();
    if base.is_empty() || base == "." || base == ".." {
        return Err(ValidationError::InvalidFilename(raw.to_string()));
    }

    let extension = kind.extension();
    let base = if DocumentKind::from_path(Path::new(&base)) == Some(kind) {
        base
    } else {
        format!("{base}.{extension}")
    };

    if taken.insert(base.to_ascii_lowercase()) {
        return Ok(base);
    }
    let stem = &base[..base.len() - extension.len() - 1];
    let mut counter = 1;
    loop {
        let candidate = format!("{stem}-{counter}.{extension}");
        if taken.insert(candidate.to_ascii_lowercase()) {
            return Ok(candidate);
        }
        counter += 1;
    }
}

/// Directory holding one task's uploads.
pub fn task_upload_dir(upload_root: &Path, task_id: &TaskId) -> PathBuf {
    upload_root.join(task_id.as_str())
}

/// Write validated uploads under `<upload_root>/<task_id>/`, returning paths in input order.
pub async fn persist_uploads(
    upload_root: &Path,
    task_id: &TaskId,
    uploads: Vec<ValidatedUpload>,
) -> std::io::Result<Vec<PathBuf>> {
    let dir = task_upload_dir(upload_root, task_id);
    tokio::fs::create_dir_all(&dir).await?;

    let mut paths = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let path = dir.join(&upload.filename);
        if let Err(err) = tokio::fs::write(&path, &upload.content).await {
            remove_task_dir(&dir).await;
            return Err(err);
        }
        paths.push(path);
    }
    tracing::debug!(task_id = %task_id, files = paths.len(), dir = %dir.display(), "Uploads persisted");
    Ok(paths)
}

/// Best-effort removal of a task's upload directory.
pub async fn remove_task_dir(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "Failed to remove upload directory");
        }
    }
}

/// Empty the upload root, recreating it. Run once at startup; in-flight uploads do not survive
/// a restart.
pub async fn purge_upload_dir(upload_root: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(upload_root).await {
        Ok(()) => tracing::info!(dir = %upload_root.display(), "Purged upload directory"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    tokio::fs::create_dir_all(upload_root).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: &str, declared: &str) -> UploadedFile {
        UploadedFile {
            filename: filename.into(),
            content: b"bytes".to_vec(),
            declared_type: declared.into(),
        }
    }

    #[test]
    fn empty_file_set_is_rejected() {
        assert_eq!(
            validate_uploads(Vec::new()).unwrap_err(),
            ValidationError::EmptyFileSet
        );
    }

    #[test]
    fn text_files_are_rejected() {
        let error = validate_uploads(vec![
            upload("report.pdf", "pdf"),
            upload("notes.txt", "text/plain"),
        ])
        .unwrap_err();
        assert_eq!(
            error,
            ValidationError::UnsupportedType {
                filename: "notes.txt".into()
            }
        );
    }

    #[test]
    fn explicit_declared_type_overrides_extension() {
        let validated = validate_uploads(vec![upload("notes.txt", "application/pdf")])
            .expect("declared pdf is accepted");
        assert_eq!(validated[0].kind, DocumentKind::Pdf);
        assert_eq!(validated[0].filename, "notes.txt.pdf");

        let error = validate_uploads(vec![upload("report.pdf", "text/plain")]).unwrap_err();
        assert_eq!(
            error,
            ValidationError::UnsupportedType {
                filename: "report.pdf".into()
            }
        );
    }

    #[test]
    fn generic_declared_type_falls_back_to_extension() {
        let validated = validate_uploads(vec![
            upload("report.PDF", "application/octet-stream"),
            upload("memo.docx", ""),
        ])
        .expect("valid");
        assert_eq!(validated[0].kind, DocumentKind::Pdf);
        assert_eq!(validated[1].kind, DocumentKind::Docx);
    }

    #[test]
    fn filenames_lose_directories_and_gain_extensions() {
        let mut taken = HashSet::new();
        assert_eq!(
            sanitize_filename("../../etc/passwd", DocumentKind::Pdf, &mut taken).expect("name"),
            "passwd.pdf"
        );
        assert_eq!(
            sanitize_filename("C:\\docs\\plan.docx", DocumentKind::Docx, &mut taken)
                .expect("name"),
            "plan.docx"
        );
        assert!(matches!(
            sanitize_filename("uploads/..", DocumentKind::Pdf, &mut taken),
            Err(ValidationError::InvalidFilename(_))
        ));
        assert!(matches!(
            sanitize_filename("", DocumentKind::Pdf, &mut taken),
            Err(ValidationError::InvalidFilename(_))
        ));
    }

    #[test]
    fn duplicate_filenames_are_suffixed() {
        let validated = validate_uploads(vec![
            upload("a.pdf", "pdf"),
            upload("A.pdf", "pdf"),
            upload("dir/a.pdf", "pdf"),
        ])
        .expect("valid");
        let names: Vec<&str> = validated.iter().map(|u| u.filename.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "A-1.pdf", "a-2.pdf"]);
    }

    #[tokio::test]
    async fn persisted_uploads_land_in_task_dir() {
        let root = tempfile::tempdir().expect("tempdir");
        let task_id = TaskId::generate();
        let uploads = validate_uploads(vec![upload("a.pdf", "pdf")]).expect("valid");

        let paths = persist_uploads(root.path(), &task_id, uploads)
            .await
            .expect("persist");
        assert_eq!(paths, vec![root.path().join(task_id.as_str()).join("a.pdf")]);
        assert_eq!(std::fs::read(&paths[0]).expect("read"), b"bytes");

        remove_task_dir(&task_upload_dir(root.path(), &task_id)).await;
        assert!(!root.path().join(task_id.as_str()).exists());
    }

    #[tokio::test]
    async fn purge_recreates_empty_root() {
        let root = tempfile::tempdir().expect("tempdir");
        let uploads = root.path().join("uploads");
        std::fs::create_dir_all(uploads.join("stale")).expect("mkdir");

        purge_upload_dir(&uploads).await.expect("purge");
        assert!(uploads.exists());
        assert_eq!(std::fs::read_dir(&uploads).expect("read_dir").count(), 0);
    }
}
