//! Host-side workspace filesystem proxy.
//!
//! Every sandbox mounts one host directory at `/workspace`. `WorkspaceFs`
//! gives callers file access to that directory through relative paths,
//! rejecting anything that would resolve outside it before touching the
//! filesystem.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use helios_core::{fs_policy, Error, Result};

/// Metadata for one workspace entry. Constructed by listing/inspection
/// operations, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub name: String,
    /// Absolute host path.
    pub path: PathBuf,
    pub is_dir: bool,
    pub size: u64,
    pub mod_time: SystemTime,
    /// Unix permission bits as an octal triplet, e.g. "644".
    pub permissions: String,
}

impl FileInfo {
    async fn from_path(path: &Path) -> Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            name,
            path: path.to_path_buf(),
            is_dir: meta.is_dir(),
            size: meta.len(),
            mod_time: meta.modified()?,
            permissions: format_permissions(&meta),
        })
    }
}

#[cfg(unix)]
fn format_permissions(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:03o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn format_permissions(meta: &std::fs::Metadata) -> String {
    if meta.permissions().readonly() {
        "444".to_string()
    } else {
        "644".to_string()
    }
}

/// Path-contained proxy between logical relative paths and one host
/// directory.
pub struct WorkspaceFs {
    root: PathBuf,
}

impl WorkspaceFs {
    /// Create a workspace proxy rooted at `root`. The directory is created
    /// if absent and canonicalized so the containment check cannot be
    /// defeated through symlinked roots.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        tokio::fs::create_dir_all(root.as_ref()).await?;
        let root = tokio::fs::canonicalize(root.as_ref()).await?;
        Ok(Self { root })
    }

    /// The canonical host root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a caller-supplied relative path against the root.
    ///
    /// Fails with `Error::PathEscape` before any filesystem access if the
    /// result would land outside the root.
    pub fn resolve(&self, rel_path: &str) -> Result<PathBuf> {
        let rel = fs_policy::clean_workspace_rel(rel_path)?;
        let full = self.root.join(rel);
        // clean_workspace_rel already guarantees containment; this guards
        // against future changes to the join semantics.
        if !full.starts_with(&self.root) {
            return Err(Error::path_escape(format!(
                "{} resolves outside the workspace",
                rel_path
            )));
        }
        Ok(full)
    }

    /// Write `content` to the file at `rel_path`, creating parent
    /// directories and overwriting any existing file.
    pub async fn upload(&self, rel_path: &str, content: &[u8]) -> Result<()> {
        let path = self.resolve(rel_path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "Workspace upload");
        Ok(())
    }

    /// Read the file at `rel_path`.
    pub async fn download(&self, rel_path: &str) -> Result<Vec<u8>> {
        let path = self.resolve(rel_path)?;
        Ok(tokio::fs::read(&path).await?)
    }

    /// List the direct children of the directory at `rel_path`.
    pub async fn list(&self, rel_path: &str) -> Result<Vec<FileInfo>> {
        let path = self.resolve(rel_path)?;
        let mut entries = tokio::fs::read_dir(&path).await?;
        let mut result = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            result.push(FileInfo::from_path(&entry.path()).await?);
        }
        Ok(result)
    }

    /// Return metadata for the entry at `rel_path`.
    pub async fn info(&self, rel_path: &str) -> Result<FileInfo> {
        let path = self.resolve(rel_path)?;
        FileInfo::from_path(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (tempfile::TempDir, WorkspaceFs) {
        let dir = tempfile::tempdir().unwrap();
        let fs = WorkspaceFs::new(dir.path()).await.unwrap();
        (dir, fs)
    }

    #[tokio::test]
    async fn resolve_strips_workspace_prefix() {
        let (_dir, fs) = fixture().await;
        let resolved = fs.resolve("workspace/sub/file.txt").unwrap();
        assert_eq!(resolved, fs.root().join("sub/file.txt"));
    }

    #[tokio::test]
    async fn resolve_rejects_traversal() {
        let (_dir, fs) = fixture().await;
        let err = fs.resolve("../../etc/passwd").unwrap_err();
        assert!(matches!(err, Error::PathEscape(_)));
    }

    #[tokio::test]
    async fn upload_creates_parents_and_download_round_trips() {
        let (_dir, fs) = fixture().await;
        fs.upload("data/pdfs/doc.txt", b"contents").await.unwrap();
        let read = fs.download("data/pdfs/doc.txt").await.unwrap();
        assert_eq!(read, b"contents");

        // Overwrite in place
        fs.upload("data/pdfs/doc.txt", b"v2").await.unwrap();
        assert_eq!(fs.download("data/pdfs/doc.txt").await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn list_returns_direct_children_only() {
        let (_dir, fs) = fixture().await;
        fs.upload("a.txt", b"a").await.unwrap();
        fs.upload("sub/b.txt", b"b").await.unwrap();

        let entries = fs.list("").await.unwrap();
        let mut names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "sub"]);

        let sub = entries.iter().find(|e| e.name == "sub").unwrap();
        assert!(sub.is_dir);
    }

    #[tokio::test]
    async fn info_reports_size_and_permissions() {
        let (_dir, fs) = fixture().await;
        fs.upload("notes.txt", b"12345").await.unwrap();
        let info = fs.info("notes.txt").await.unwrap();
        assert_eq!(info.name, "notes.txt");
        assert_eq!(info.size, 5);
        assert!(!info.is_dir);
        assert_eq!(info.permissions.len(), 3);
    }

    #[tokio::test]
    async fn download_missing_file_is_io_error() {
        let (_dir, fs) = fixture().await;
        assert!(fs.download("missing.txt").await.is_err());
    }
}
