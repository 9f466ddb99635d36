//! Multipart file fields spooled to disk.

use std::path::{Path, PathBuf};

use anyhow::Context;
use axum::extract::Multipart;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// An uploaded file living in a temp file that is removed on drop unless
/// it is persisted.
#[derive(Debug)]
pub struct Upload {
    pub file: NamedTempFile,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: u64,
}

impl Upload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Move the file to `dir/<prefix>-<uuid>.<ext>` and return the new file name.
    pub fn persist_into(self, dir: &Path, prefix: &str, ext: &str) -> anyhow::Result<String> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let name = format!("{prefix}-{}.{ext}", Uuid::new_v4());
        let target: PathBuf = dir.join(&name);
        self.file
            .persist(&target)
            .map_err(|e| e.error)
            .with_context(|| format!("persist upload to {}", target.display()))?;
        Ok(name)
    }
}

/// Stream the first field called `name` into a temp file under `dir`.
/// Other fields are skipped. `None` when the field is absent.
pub async fn spool_field(mp: &mut Multipart, name: &str, dir: &Path) -> AppResult<Option<Upload>> {
    while let Some(mut field) = mp.next_field().await? {
        if field.name() != Some(name) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let (file, out) = create_temp(dir)
            .map_err(|e| AppError::internal("Could not store upload", e))?;
        let mut out = tokio::fs::File::from_std(out);
        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            out.write_all(&chunk)
                .await
                .map_err(|e| AppError::internal("Could not store upload", e))?;
        }
        out.flush()
            .await
            .map_err(|e| AppError::internal("Could not store upload", e))?;

        debug!(field = name, size, path = %file.path().display(), "upload spooled");
        return Ok(Some(Upload {
            file,
            file_name,
            content_type,
            size,
        }));
    }
    Ok(None)
}

fn create_temp(dir: &Path) -> anyhow::Result<(NamedTempFile, std::fs::File)> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let file = tempfile::Builder::new()
        .prefix("upload-")
        .tempfile_in(dir)
        .context("create temp file")?;
    let handle = file.reopen().context("reopen temp file")?;
    Ok((file, handle))
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// CSV uploads are recognized by content type or, failing that, by a
/// `.csv` file name.
pub fn looks_like_csv(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    let by_type = matches!(
        content_type,
        Some("text/csv" | "application/csv" | "application/vnd.ms-excel" | "application/octet-stream")
    );
    let by_name = file_name
        .map(|n| n.to_ascii_lowercase().ends_with(".csv"))
        .unwrap_or(false);
    by_type || by_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_detection() {
        assert!(looks_like_csv(Some("text/csv"), None));
        assert!(looks_like_csv(None, Some("Questions.CSV")));
        assert!(looks_like_csv(Some("text/plain"), Some("q.csv")));
        assert!(!looks_like_csv(Some("image/png"), Some("q.png")));
        assert!(!looks_like_csv(None, None));
    }

    #[test]
    fn image_extensions() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("application/pdf"), None);
    }

    #[test]
    fn temp_file_is_removed_on_drop_and_kept_when_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let (file, mut handle) = create_temp(dir.path()).unwrap();
        handle.write_all(b"abc").unwrap();
        let temp_path = file.path().to_path_buf();
        drop(file);
        assert!(!temp_path.exists());

        let (file, mut handle) = create_temp(dir.path()).unwrap();
        handle.write_all(b"png").unwrap();
        let upload = Upload {
            file,
            file_name: Some("me.png".into()),
            content_type: Some("image/png".into()),
            size: 3,
        };
        let target = dir.path().join("kept");
        let name = upload.persist_into(&target, "avatar", "png").unwrap();
        assert!(name.starts_with("avatar-") && name.ends_with(".png"));
        assert_eq!(std::fs::read(target.join(name)).unwrap(), b"png");
    }
}
