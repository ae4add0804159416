//! Durable byte storage for state that outlives the process

use anyhow::{anyhow, Result};
use std::path::PathBuf;

#[serenity::async_trait]
pub trait BlobStore: Send + Sync {
    /// Human-facing location, used in log lines
    fn describe(&self) -> String;
    /// `Ok(None)` if nothing has been saved yet
    async fn load(&self) -> Result<Option<Vec<u8>>>;
    async fn save(&self, bytes: &[u8]) -> Result<()>;
}

/// A single file on disk.  Saves go through a temporary sibling file so a crash mid-write never
/// leaves a truncated blob behind.
pub struct FileBlobStore {
    path: PathBuf,
}

impl FileBlobStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[serenity::async_trait]
impl BlobStore for FileBlobStore {
    fn describe(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow!(
                "Could not read `{}`: {}",
                self.path.to_string_lossy(),
                e
            )),
        }
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                anyhow!(
                    "Could not create directory `{}`: {}",
                    parent.to_string_lossy(),
                    e
                )
            })?;
        }

        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".new");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, bytes).await.map_err(|e| {
            anyhow!(
                "Could not write temporary file `{}`: {}",
                tmp_path.to_string_lossy(),
                e
            )
        })?;

        // Atomically rename the temporary file over the target file.
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            anyhow!(
                "Could not rename temporary file `{}` to `{}`: {}",
                tmp_path.to_string_lossy(),
                self.path.to_string_lossy(),
                e
            )
        })?;

        Ok(())
    }
}

/// In-memory blob for tests.  `fail_saves` makes every save return an error.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryBlobStore {
    pub bytes: std::sync::Mutex<Option<Vec<u8>>>,
    pub fail_saves: bool,
}

#[cfg(test)]
impl MemoryBlobStore {
    pub fn with_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: std::sync::Mutex::new(Some(bytes.into())),
            fail_saves: false,
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.bytes.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[serenity::async_trait]
impl BlobStore for MemoryBlobStore {
    fn describe(&self) -> String {
        "<memory>".to_owned()
    }

    async fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.contents())
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        if self.fail_saves {
            return Err(anyhow!("disk full"));
        }
        *self.bytes.lock().unwrap() = Some(bytes.to_vec());
        Ok(())
    }
}
