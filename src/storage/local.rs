//! Local disk backend.
//!
//! Blobs live at `root/{shard}/{shard}/{cid}` where the shards are the first
//! two digest bytes in hex. Writes stream into a temp file in the target
//! directory, are fsynced, and only then renamed into place. A temp file is
//! removed when its write is abandoned, and leftovers from a crashed process
//! are swept when the directory is opened.

use super::{BackendError, BlobBackend, StorageBackend};
use crate::hashing::ContentId;
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Open (creating if needed) a blob directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        let swept = sweep_temp_files(&root).await?;
        if swept > 0 {
            warn!(path = %root.display(), swept, "removed abandoned temp files");
        }
        info!(path = %root.display(), "initialized local blob directory");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Two-level shard directories for an identifier.
    fn shards(id: &ContentId) -> (String, String) {
        let digest = id.digest();
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    pub fn blob_path(&self, id: &ContentId) -> PathBuf {
        let (shard_a, shard_b) = Self::shards(id);
        let mut path = self.root.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(id.to_string());
        path
    }
}

#[async_trait]
impl BlobBackend for LocalBackend {
    fn kind(&self) -> StorageBackend {
        StorageBackend::Local
    }

    async fn write(&self, id: &ContentId, data: Bytes) -> Result<(), BackendError> {
        let file_path = self.blob_path(id);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            io::Error::new(ErrorKind::Other, "blob path missing parent directory")
        })?;
        fs::create_dir_all(&parent).await?;

        // Cleaned up on every early exit, including a dropped future.
        let mut tmp = TempFile::new(parent.join(format!("{TEMP_PREFIX}{}", Uuid::new_v4())));
        write_durably(&tmp.path, &data).await?;
        fs::rename(&tmp.path, &file_path).await?;
        tmp.disarm();

        debug!(cid = %id, size = data.len(), path = %file_path.display(), "wrote blob");
        Ok(())
    }

    async fn read(&self, id: &ContentId) -> Result<Option<Bytes>, BackendError> {
        match fs::read(self.blob_path(id)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn contains(&self, id: &ContentId) -> Result<bool, BackendError> {
        match fs::metadata(self.blob_path(id)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Write, read back and remove a scratch file under the root.
    async fn check_ready(&self) -> Result<(), BackendError> {
        let tmp_path = self.root.join(format!(".ready-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"ready").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        if read_back? != b"ready" {
            return Err(BackendError::Unavailable(
                "readiness file content mismatch".into(),
            ));
        }
        Ok(())
    }
}

const TEMP_PREFIX: &str = ".tmp-";

/// Temp file path removed on drop unless it was renamed into place.
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Remove temp files left in the root or its two shard levels.
async fn sweep_temp_files(root: &Path) -> io::Result<usize> {
    let mut removed = 0;
    let mut pending = vec![(root.to_path_buf(), 0u8)];
    while let Some((dir, depth)) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() && depth < 2 {
                pending.push((entry.path(), depth + 1));
            } else if file_type.is_file()
                && entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX)
            {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}

async fn write_durably(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await
}
