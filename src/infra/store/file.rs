//! File-backed store: one JSON document per key under a directory.

use std::fs::{self, create_dir_all};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::DurableStore;
use crate::core::StoreError;

/// Durable store writing `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling and are renamed into place, so readers
/// see either the old document or the new one, never a torn write. All file
/// access runs on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

async fn run_blocking<F, R>(op: F) -> Result<R, StoreError>
where
    F: FnOnce() -> Result<R, StoreError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
}

fn read_document(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn replace_document(path: &Path, value: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.file_path(key)?;
        run_blocking(move || read_document(&path)).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.file_path(key)?;
        let value = value.to_owned();
        run_blocking(move || replace_document(&path, &value)).await
    }
}
