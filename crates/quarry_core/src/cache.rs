use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;
use quarry_filesystem::FileSystemRef;
use thiserror::Error;

pub type ContentStoreRef = Arc<dyn ContentStore + Sync + Send>;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("No blob stored for key {0}")]
  NotFound(String),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

/// Key to blob storage for build artifacts
///
/// Keys are derived by callers from the content and configuration that produced the blob, so a
/// hit implies the stored blob is the one the caller would compute. Writing an existing key is a
/// no-op.
#[mockall::automock]
pub trait ContentStore: std::fmt::Debug {
  fn put(&self, key: &str, blob: &[u8]) -> Result<(), StoreError>;

  fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

  fn has(&self, key: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
  blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryContentStore {
  pub fn len(&self) -> usize {
    self.blobs.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.blobs.read().is_empty()
  }
}

impl ContentStore for InMemoryContentStore {
  fn put(&self, key: &str, blob: &[u8]) -> Result<(), StoreError> {
    self
      .blobs
      .write()
      .entry(key.to_string())
      .or_insert_with(|| blob.to_vec());
    Ok(())
  }

  fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
    self
      .blobs
      .read()
      .get(key)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(key.to_string()))
  }

  fn has(&self, key: &str) -> bool {
    self.blobs.read().contains_key(key)
  }
}

/// Convert a store key to a path under the store directory.
///
/// Keys are sharded by their first two characters and anything outside `[A-Za-z0-9_-]` is
/// replaced, so keys can never escape the directory.
pub fn get_file_key(store_dir: &Path, key: &str) -> PathBuf {
  let clean_key = key
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
        c
      } else {
        '_'
      }
    })
    .collect::<String>();

  let shard = clean_key.get(..2).unwrap_or("__");
  store_dir.join(shard).join(clean_key)
}

/// A content store writing one file per key
///
/// Blobs are written to a temporary file and renamed into place, so concurrent writers of the
/// same key never expose a partial blob.
#[derive(Debug)]
pub struct FsContentStore {
  fs: FileSystemRef,
  store_dir: PathBuf,
  temp_counter: AtomicU64,
}

impl FsContentStore {
  pub fn new(fs: FileSystemRef, store_dir: PathBuf) -> Self {
    Self {
      fs,
      store_dir,
      temp_counter: AtomicU64::new(0),
    }
  }
}

impl ContentStore for FsContentStore {
  fn put(&self, key: &str, blob: &[u8]) -> Result<(), StoreError> {
    let file_path = get_file_key(&self.store_dir, key);
    if self.fs.is_file(&file_path) {
      tracing::trace!(key, "Blob already stored");
      return Ok(());
    }

    if let Some(parent) = file_path.parent() {
      self.fs.create_dir_all(parent)?;
    }

    let temp_path = file_path.with_extension(format!(
      "{}-{}.tmp",
      std::process::id(),
      self.temp_counter.fetch_add(1, Ordering::Relaxed)
    ));

    self.fs.write(&temp_path, blob)?;
    self.fs.rename(&temp_path, &file_path)?;

    Ok(())
  }

  fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
    let file_path = get_file_key(&self.store_dir, key);
    self.fs.read(&file_path).map_err(|error| {
      if error.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
      } else {
        StoreError::Io(error)
      }
    })
  }

  fn has(&self, key: &str) -> bool {
    self.fs.is_file(&get_file_key(&self.store_dir, key))
  }
}
