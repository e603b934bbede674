//! Store handle, error type and file helpers.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;

/// Store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed record {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Laborer index {index} outside 1..={count}")]
    InvalidLaborer { index: usize, count: usize },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// File-backed queue and report store rooted at a workspace directory.
///
/// Every record write is atomic (temp file + rename). The queue and the
/// shared document are each guarded by their own lock so concurrent
/// read-modify-write cycles do not lose updates.
#[derive(Debug)]
pub struct Store {
    root: PathBuf,
    laborer_count: usize,
    pub(super) queue_lock: Mutex<()>,
    pub(super) document_lock: Mutex<()>,
}

impl Store {
    pub fn new(root: impl Into<PathBuf>, laborer_count: usize) -> Self {
        Self {
            root: root.into(),
            laborer_count,
            queue_lock: Mutex::new(()),
            document_lock: Mutex::new(()),
        }
    }

    pub fn workspace_root(&self) -> &Path {
        &self.root
    }

    pub const fn laborer_count(&self) -> usize {
        self.laborer_count
    }

    // =========================================================================
    // Layout
    // =========================================================================

    pub fn queue_path(&self) -> PathBuf {
        self.root.join("queue").join("commands.yaml")
    }

    pub fn task_path(&self, laborer: usize) -> PathBuf {
        self.root
            .join("queue")
            .join("tasks")
            .join(format!("laborer_{laborer}.yaml"))
    }

    pub fn report_path(&self, laborer: usize) -> PathBuf {
        self.root
            .join("queue")
            .join("reports")
            .join(format!("laborer_{laborer}_report.yaml"))
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join("status").join("master_status.yaml")
    }

    pub fn document_path(&self) -> PathBuf {
        self.root.join("dashboard.md")
    }

    pub fn projects_path(&self) -> PathBuf {
        self.root.join("config").join("projects.yaml")
    }

    /// Create missing directories, an empty queue and the dashboard
    /// template. Existing files are left untouched.
    pub async fn init_layout(&self) -> Result<(), StoreError> {
        for dir in [
            self.root.join("queue").join("tasks"),
            self.root.join("queue").join("reports"),
            self.root.join("status"),
            self.root.join("config"),
            self.root.join("instructions"),
            self.root.join("memory"),
        ] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| StoreError::io(&dir, e))?;
        }

        let queue = self.queue_path();
        if !exists(&queue).await {
            write_atomic(&queue, "queue: []\n").await?;
        }
        let document = self.document_path();
        if !exists(&document).await {
            write_atomic(&document, shogun_core::dashboard::DEFAULT_TEMPLATE).await?;
        }
        debug!(root = %self.root.display(), "Workspace layout ready");
        Ok(())
    }

    pub(super) fn check_laborer(&self, index: usize) -> Result<(), StoreError> {
        if (1..=self.laborer_count).contains(&index) {
            Ok(())
        } else {
            Err(StoreError::InvalidLaborer {
                index,
                count: self.laborer_count,
            })
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Read a file, treating a missing file as `None`.
pub(super) async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Read and decode a YAML record. Missing or blank files read as `None`.
pub(super) async fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let Some(text) = read_optional(path).await? else {
        return Ok(None);
    };
    if text.trim().is_empty() {
        return Ok(None);
    }
    serde_yaml::from_str(&text)
        .map(Some)
        .map_err(|e| StoreError::Malformed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

pub(super) async fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let text = serde_yaml::to_string(value).map_err(|e| StoreError::Serialize(e.to_string()))?;
    write_atomic(path, &text).await
}

/// Write `contents` to a sibling temp file and rename it over `path`.
pub(super) async fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map_or_else(|| "record".to_string(), |n| n.to_string_lossy().into_owned());
    let tmp = path.with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4()));

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, e));
    }
    Ok(())
}
