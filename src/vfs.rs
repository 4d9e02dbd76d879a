//! Virtual filesystem for staging generated files
//!
//! Files are namespaced by upload id so that every generation round gets its
//! own tree and later rounds never clobber earlier ones.

use crate::remote::GeneratedFile;
use crate::traits::VirtualFileSystem;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// URI scheme under which staged files are exposed
pub const VIRTUAL_SCHEME: &str = "weaverbird";

/// Location of a staged file: `weaverbird:<uploadId>/<filePath>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct VirtualUri {
    path: String,
}

impl VirtualUri {
    #[must_use]
    pub fn new(upload_id: &str, file_path: &str) -> Self {
        Self {
            path: format!("{}/{}", upload_id, file_path.trim_start_matches('/')),
        }
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for VirtualUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{VIRTUAL_SCHEME}:{}", self.path)
    }
}

/// A generated file that has been staged in the virtual filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFileInfo {
    pub file_path: String,
    pub file_content: String,
    pub virtual_uri: VirtualUri,
}

/// Stage every file under `<upload_id>/<file_path>` and describe what was staged
#[must_use]
pub fn register_new_files(
    fs: &dyn VirtualFileSystem,
    files: &[GeneratedFile],
    upload_id: &str,
) -> Vec<NewFileInfo> {
    files
        .iter()
        .map(|file| {
            let uri = VirtualUri::new(upload_id, &file.file_path);
            fs.register_provider(&uri, file.file_content.as_bytes().to_vec());
            NewFileInfo {
                file_path: file.file_path.clone(),
                file_content: file.file_content.clone(),
                virtual_uri: uri,
            }
        })
        .collect()
}

/// Process-local `VirtualFileSystem`
#[derive(Debug, Default)]
pub struct InMemoryFileSystem {
    files: RwLock<HashMap<VirtualUri, Vec<u8>>>,
}

impl InMemoryFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths of every staged file, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(|uri| uri.path().to_string())
            .collect();
        paths.sort();
        paths
    }
}

impl VirtualFileSystem for InMemoryFileSystem {
    fn register_provider(&self, uri: &VirtualUri, content: Vec<u8>) {
        tracing::trace!(uri = %uri, bytes = content.len(), "Registering virtual file");
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uri.clone(), content);
    }

    fn read(&self, uri: &VirtualUri) -> Option<Vec<u8>> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(uri)
            .cloned()
    }
}
