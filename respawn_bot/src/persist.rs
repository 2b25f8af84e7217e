//! JSON files on disk, written atomically, plus a background writer that
//! keeps callers from ever waiting on the filesystem.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, io::AsyncWriteExt, sync::watch};
use tracing::{debug, error, warn};

use crate::error::PersistenceError;

/// A single JSON document at `path`.
#[derive(Debug)]
pub struct JsonFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonFile<T> {
    fn clone(&self) -> Self {
        Self::new(self.path.clone())
    }
}

impl<T> JsonFile<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl<T: Serialize + DeserializeOwned> JsonFile<T> {
    /// `Ok(None)` when the file does not exist yet.
    pub async fn read(&self) -> Result<Option<T>, PersistenceError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Json {
                path: self.path.clone(),
                source,
            })
    }

    /// Read the document, treating a missing, unreadable or corrupt file as
    /// "no prior state".
    pub async fn read_or_default(&self) -> T
    where
        T: Default,
    {
        match self.read().await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(path = %self.path.display(), "no saved state, starting empty");
                T::default()
            }
            Err(e) => {
                warn!(error = %e, "ignoring unreadable saved state");
                T::default()
            }
        }
    }

    /// Replace the file contents. Writes a sibling temp file, syncs it and
    /// renames it over the target so readers never observe a partial file.
    pub async fn write(&self, value: &T) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistenceError::Json {
            path: self.path.clone(),
            source,
        })?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await.map_err(|e| self.io_err(e))?;
        }

        let tmp = self.temp_path();
        let result = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp).await;
            return Err(self.io_err(e));
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Pending<T> {
    version: u64,
    value: Option<T>,
}

/// Background writer for a [`JsonFile`].
///
/// [`submit`](Self::submit) never blocks: it replaces the pending snapshot
/// and wakes the writer task, which always writes the newest one. Bursts of
/// submissions collapse into a single write.
#[derive(Debug)]
pub struct Autosave<T> {
    pending: watch::Sender<Pending<T>>,
    written: watch::Receiver<u64>,
}

impl<T> Autosave<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Spawn the writer task on the current runtime.
    pub fn spawn(file: JsonFile<T>) -> Self {
        let (pending, mut rx) = watch::channel(Pending {
            version: 0,
            value: None,
        });
        let (written_tx, written) = watch::channel(0u64);

        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let (version, value) = {
                    let snapshot = rx.borrow_and_update();
                    (snapshot.version, snapshot.value.clone())
                };
                if let Some(value) = value {
                    match file.write(&value).await {
                        Ok(()) => debug!(path = %file.path().display(), version, "state saved"),
                        Err(e) => error!(error = %e, "failed to save state"),
                    }
                }
                written_tx.send_replace(version);
            }
        });

        Self { pending, written }
    }

    pub fn submit(&self, value: T) {
        self.pending.send_modify(|p| {
            p.version += 1;
            p.value = Some(value);
        });
    }

    /// Wait until everything submitted so far has been written (or the write
    /// attempt failed and was logged).
    pub async fn flush(&self) {
        let target = self.pending.borrow().version;
        let mut written = self.written.clone();
        let _ = written.wait_for(|v| *v >= target).await;
    }
}
