//! File-backed checkpoint storage. One file per storage key, placed in a
//! directory that is created on first write.
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::{JsonSerializer, PayloadSerializer, QueueError, Storage};

pub struct FileStorage<P, S = JsonSerializer>
where
    S: PayloadSerializer,
{
    directory: PathBuf,
    path: PathBuf,
    _marker: PhantomData<(P, S)>,
}

impl<P, S> FileStorage<P, S>
where
    S: PayloadSerializer,
{
    /// Storage for `<directory>/<key>.json`.
    pub fn new(key: &str, directory: impl AsRef<Path>) -> Self {
        let directory = directory.as_ref().to_path_buf();
        let path = directory.join(format!("{key}.json"));
        Self {
            directory,
            path,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool, QueueError> {
        Ok(tokio::fs::try_exists(&self.path).await?)
    }
}

#[async_trait]
impl<P, S> Storage<P> for FileStorage<P, S>
where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: PayloadSerializer + 'static,
{
    async fn read(&self) -> Result<Vec<P>, QueueError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => S::deserialize_payloads(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no checkpoint written yet");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, payloads: &[P]) -> Result<(), QueueError> {
        let bytes = S::serialize_payloads(payloads)?;
        tokio::fs::create_dir_all(&self.directory).await?;
        tokio::fs::write(&self.path, bytes).await?;
        debug!(path = %self.path.display(), items = payloads.len(), "checkpoint written");
        Ok(())
    }

    async fn clear(&self) -> Result<(), QueueError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl<P, S> std::fmt::Debug for FileStorage<P, S>
where
    S: PayloadSerializer,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .finish()
    }
}
