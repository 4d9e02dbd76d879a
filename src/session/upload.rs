//! Workspace snapshots: collection, archiving and upload

use super::types::SessionStateConfig;
use crate::error::{ServerErrorCode, SessionError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::io::{self, Cursor, Write};
use std::path::{Component, Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A file read from disk, addressed relative to the collection root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub content: Vec<u8>,
}

/// A zipped snapshot ready for upload
#[derive(Debug, Clone)]
pub struct RepoData {
    pub zip_file_buffer: Vec<u8>,
    /// Base64-encoded SHA-256 of `zip_file_buffer`
    pub zip_file_checksum: String,
    pub total_bytes: u64,
    pub file_count: usize,
}

/// Read every regular file under `root`
///
/// Hidden files are skipped. With `respect_gitignore`, `.gitignore` and
/// `.ignore` rules apply even outside a git repository.
///
/// # Errors
///
/// Any walk or read failure.
pub fn collect_files(root: &Path, respect_gitignore: bool) -> io::Result<Vec<CollectedFile>> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(respect_gitignore)
        .git_exclude(respect_gitignore)
        .git_global(false)
        .ignore(respect_gitignore)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        let Some(relative_path) = relative_slash_path(root, path) else {
            continue;
        };
        files.push(CollectedFile {
            relative_path,
            absolute_path: path.to_path_buf(),
            content: std::fs::read(path)?,
        });
    }
    Ok(files)
}

/// `path` relative to `root`, always with `/` separators
fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Zip the workspace and checksum the archive
///
/// # Errors
///
/// `ContentLength` above `max_size_bytes`, `PrepareRepoFailed` when the
/// workspace cannot be read or zipped.
pub fn prepare_repo_data(root: &Path, max_size_bytes: u64) -> Result<RepoData, SessionError> {
    let files = collect_files(root, true).map_err(SessionError::PrepareRepoFailed)?;

    let total_bytes: u64 = files.iter().map(|f| f.content.len() as u64).sum();
    if total_bytes > max_size_bytes {
        return Err(SessionError::ContentLength {
            size: total_bytes,
            limit: max_size_bytes,
        });
    }

    let zip_file_buffer = zip_files(&files).map_err(SessionError::PrepareRepoFailed)?;
    let zip_file_checksum = BASE64.encode(Sha256::digest(&zip_file_buffer));

    Ok(RepoData {
        zip_file_buffer,
        zip_file_checksum,
        total_bytes,
        file_count: files.len(),
    })
}

fn zip_files(files: &[CollectedFile]) -> io::Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        zip.start_file(file.relative_path.as_str(), options)
            .map_err(io::Error::other)?;
        zip.write_all(&file.content)?;
    }

    let cursor = zip.finish().map_err(io::Error::other)?;
    Ok(cursor.into_inner())
}

/// Snapshot the workspace, upload it and return the new upload id
///
/// # Errors
///
/// Errors of [`prepare_repo_data`], a server-side `Upload` error when no
/// upload slot is granted, and `UploadCode` when the transfer fails.
pub async fn upload_workspace(config: &SessionStateConfig) -> Result<String, SessionError> {
    let root = config.workspace_root.clone();
    let max_size = config.max_repo_size_bytes;
    let repo = tokio::task::spawn_blocking(move || prepare_repo_data(&root, max_size))
        .await
        .map_err(|e| SessionError::PrepareRepoFailed(io::Error::other(e)))??;

    tracing::info!(
        conv_id = %config.conversation_id,
        files = repo.file_count,
        repository_size = repo.total_bytes,
        archive_size = repo.zip_file_buffer.len(),
        "Prepared workspace snapshot"
    );

    let slot = config
        .client
        .create_upload_url(&config.conversation_id, &repo.zip_file_checksum)
        .await
        .map_err(|e| SessionError::server_side(ServerErrorCode::Upload, e))?;

    config
        .uploader
        .upload(
            &slot.upload_url,
            repo.zip_file_buffer,
            &repo.zip_file_checksum,
            slot.kms_key_arn.as_deref(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to upload workspace snapshot");
            SessionError::UploadCode(e)
        })?;

    tracing::info!(conv_id = %config.conversation_id, upload_id = %slot.upload_id, "Uploaded workspace");
    Ok(slot.upload_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{state_config, MockJobClient, MockUploader, RemoteCall};
    use std::io::Read;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        std::fs::write(dir.path().join("README.md"), "# demo").unwrap();
        dir
    }

    #[test]
    fn test_collect_files_relative_paths_sorted() {
        let dir = workspace();
        let files = collect_files(dir.path(), true).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["README.md", "src/main.rs"]);
        assert_eq!(files[1].content, b"fn main() {}");
    }

    #[test]
    fn test_collect_files_respects_gitignore() {
        let dir = workspace();
        std::fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/out.bin"), "xx").unwrap();

        let files = collect_files(dir.path(), true).unwrap();
        assert!(files.iter().all(|f| !f.relative_path.starts_with("target/")));
        // Hidden files are never part of a snapshot
        assert!(files.iter().all(|f| f.relative_path != ".gitignore"));

        let unfiltered = collect_files(dir.path(), false).unwrap();
        assert!(unfiltered.iter().any(|f| f.relative_path == "target/out.bin"));
    }

    #[test]
    fn test_prepare_repo_data_produces_readable_zip() {
        let dir = workspace();
        let repo = prepare_repo_data(dir.path(), u64::MAX).unwrap();

        assert_eq!(repo.file_count, 2);
        assert_eq!(repo.total_bytes, 18);
        assert_eq!(
            repo.zip_file_checksum,
            BASE64.encode(Sha256::digest(&repo.zip_file_buffer))
        );

        let mut archive = zip::ZipArchive::new(Cursor::new(repo.zip_file_buffer)).unwrap();
        let mut content = String::new();
        archive
            .by_name("src/main.rs")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "fn main() {}");
    }

    #[test]
    fn test_prepare_repo_data_enforces_size_limit() {
        let dir = workspace();
        let err = prepare_repo_data(dir.path(), 10).unwrap_err();
        assert!(matches!(err, SessionError::ContentLength { size: 18, limit: 10 }));
    }

    #[tokio::test]
    async fn test_upload_workspace_returns_new_upload_id() {
        let dir = workspace();
        let client = Arc::new(MockJobClient::new().with_upload_id("up-42"));
        let uploader = Arc::new(MockUploader::new());
        let config = state_config(client.clone(), uploader.clone(), dir.path());

        let upload_id = upload_workspace(&config).await.unwrap();

        assert_eq!(upload_id, "up-42");
        assert_eq!(client.calls(), vec![RemoteCall::CreateUploadUrl]);
        let uploads = uploader.recorded_uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].url, "https://upload.test/up-42");
        assert_eq!(uploads[0].kms_key_arn, None);
    }

    #[tokio::test]
    async fn test_upload_sends_checksum_of_archive_and_kms_key() {
        let dir = workspace();
        let client = Arc::new(MockJobClient::new().with_kms_key("arn:aws:kms:us-east-1:1:key/k"));
        let uploader = Arc::new(MockUploader::new());
        let config = state_config(client, uploader.clone(), dir.path());

        upload_workspace(&config).await.unwrap();

        let upload = &uploader.recorded_uploads()[0];
        assert_eq!(upload.kms_key_arn.as_deref(), Some("arn:aws:kms:us-east-1:1:key/k"));
        assert_eq!(upload.checksum, BASE64.encode(Sha256::digest(&upload.content)));
        assert_eq!(BASE64.decode(&upload.checksum).unwrap().len(), 32);
        assert!(zip::ZipArchive::new(Cursor::new(upload.content.clone())).is_ok());
    }

    #[tokio::test]
    async fn test_upload_failure_maps_to_upload_code_error() {
        let dir = workspace();
        let client = Arc::new(MockJobClient::new());
        let uploader = Arc::new(MockUploader::failing());
        let config = state_config(client, uploader, dir.path());

        let err = upload_workspace(&config).await.unwrap_err();
        assert!(matches!(err, SessionError::UploadCode(_)));
    }
}
