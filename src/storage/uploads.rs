use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::errors::RankError;

const FALLBACK_NAME: &str = "dataset.csv";

/// Reduce an uploaded file name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .trim()
        .chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Content-addressed identifier: first 16 hex chars of the SHA-256 of the
/// bytes, then the sanitized original name.
pub fn content_file_id(bytes: &[u8], original_name: &str) -> String {
    let digest = hex::encode(Sha256::digest(bytes));
    format!("{}-{}", &digest[..16], sanitize_filename(original_name))
}

pub fn is_valid_file_id(file_id: &str) -> bool {
    !file_id.is_empty()
        && !file_id.contains("..")
        && !file_id.contains(['/', '\\'])
        && sanitize_filename(file_id) == file_id
}

/// Directory holding uploaded datasets, one file per `file_id`.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `bytes` under their content-addressed id. Identical uploads map
    /// to the same file.
    pub async fn store(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<(String, PathBuf), RankError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let file_id = content_file_id(bytes, original_name);
        let path = self.root.join(&file_id);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            RankError::Persistence(format!("Failed to store upload {}: {}", file_id, e))
        })?;
        tracing::info!("Stored upload '{}' as {}", original_name, file_id);
        Ok((file_id, path))
    }

    /// Map a client-supplied id back to a path inside the upload directory.
    pub fn resolve(&self, file_id: &str) -> Result<PathBuf, RankError> {
        if !is_valid_file_id(file_id) {
            return Err(RankError::Validation(format!(
                "Invalid file id '{}'",
                file_id
            )));
        }
        Ok(self.root.join(file_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("keywords.csv"), "keywords.csv");
        assert_eq!(sanitize_filename("my keywords.csv"), "my_keywords.csv");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\list.csv"), "list.csv");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
        assert_eq!(sanitize_filename(""), "dataset.csv");
    }

    #[test]
    fn test_content_file_id_is_stable() {
        let a = content_file_id(b"Keyword\nrust\n", "kw.csv");
        let b = content_file_id(b"Keyword\nrust\n", "kw.csv");
        let c = content_file_id(b"Keyword\ngo\n", "kw.csv");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.ends_with("-kw.csv"));
        assert_eq!(a.len(), 16 + 1 + "kw.csv".len());
    }

    #[test]
    fn test_file_id_validation() {
        assert!(is_valid_file_id("0123456789abcdef-kw.csv"));
        assert!(!is_valid_file_id("../secret"));
        assert!(!is_valid_file_id("a/b.csv"));
        assert!(!is_valid_file_id("a\\b.csv"));
        assert!(!is_valid_file_id(""));
    }

    #[tokio::test]
    async fn test_store_and_resolve() {
        let tmp = TempDir::new().expect("temp dir");
        let uploads = UploadDir::new(tmp.path().join("uploads"));

        let (file_id, path) = uploads
            .store("kw.csv", b"Keyword\nrust\n")
            .await
            .expect("store");
        assert!(path.exists());
        assert_eq!(uploads.resolve(&file_id).unwrap(), path);

        let contents = tokio::fs::read(&path).await.unwrap();
        assert_eq!(contents, b"Keyword\nrust\n");
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let uploads = UploadDir::new("/tmp/uploads");
        assert!(matches!(
            uploads.resolve("../jobs.json"),
            Err(RankError::Validation(_))
        ));
    }
}
