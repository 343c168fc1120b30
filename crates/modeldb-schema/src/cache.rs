//! Persistence of discovered metadata.
//!
//! The cache artifact is shared by every process using the same
//! configuration. Readers take a shared lock without blocking; if the lock is
//! busy they treat the artifact as empty and rediscover. Writers take an
//! exclusive lock, re-read what is persisted, merge their delta over it and
//! write the result back, so processes discovering different classes never
//! drop each other's entries.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use modeldb_core::{Error, ModelDbConfig, Result};
use serde::{Deserialize, Serialize};

use crate::metadata::SchemaMetadata;

/// Metadata keyed by class name.
pub type CacheSnapshot = BTreeMap<String, SchemaMetadata>;

const CACHE_FORMAT_VERSION: u32 = 1;

/// Pluggable store for the schema cache.
pub trait CacheStore: Send + Sync {
    /// False once the artifact has been removed externally.
    fn exists(&self) -> bool;

    /// Everything currently persisted. Never fails: unreadable, missing or
    /// locked artifacts read as empty.
    fn load(&self) -> CacheSnapshot;

    /// Merge `delta` over the persisted state (delta wins per class) and
    /// persist the result.
    fn merge_and_save(&self, delta: &CacheSnapshot) -> Result<()>;
}

/// Process-local store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<CacheSnapshot>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn exists(&self) -> bool {
        true
    }

    fn load(&self) -> CacheSnapshot {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn merge_and_save(&self, delta: &CacheSnapshot) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    classes: CacheSnapshot,
}

/// JSON file guarded by advisory file locks.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    path: PathBuf,
}

impl FileCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &ModelDbConfig) -> Self {
        Self::new(&config.cache_path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(&self, text: &str) -> CacheSnapshot {
        if text.trim().is_empty() {
            return CacheSnapshot::new();
        }
        match serde_json::from_str::<CacheFile>(text) {
            Ok(file) if file.version == CACHE_FORMAT_VERSION => file.classes,
            Ok(file) => {
                tracing::warn!(
                    path = %self.path.display(),
                    version = file.version,
                    "schema cache has a different format version, ignoring it"
                );
                CacheSnapshot::new()
            }
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "corrupt schema cache, ignoring it");
                CacheSnapshot::new()
            }
        }
    }

    fn read_shared(&self) -> io::Result<Option<String>> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        match file.try_lock_shared() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                tracing::debug!(path = %self.path.display(), "schema cache is being written, treating as miss");
                return Ok(None);
            }
            Err(TryLockError::Error(err)) => return Err(err),
        }
        let mut text = String::new();
        let read = file.read_to_string(&mut text);
        file.unlock()?;
        read?;
        Ok(Some(text))
    }

    fn write_exclusive(&self, delta: &CacheSnapshot) -> io::Result<usize> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock()?;
        let result = self.merge_locked(&mut file, delta);
        file.unlock()?;
        result
    }

    fn merge_locked(&self, file: &mut File, delta: &CacheSnapshot) -> io::Result<usize> {
        let mut current = String::new();
        file.read_to_string(&mut current)?;
        let mut classes = self.decode(&current);
        classes.extend(delta.iter().map(|(k, v)| (k.clone(), v.clone())));

        let encoded = serde_json::to_vec(&CacheFile {
            version: CACHE_FORMAT_VERSION,
            classes,
        })
        .map_err(io::Error::other)?;

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encoded)?;
        file.flush()?;
        Ok(encoded.len())
    }

    #[cfg(unix)]
    fn share_with_group(&self) {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o664)) {
            tracing::debug!(path = %self.path.display(), error = %err, "could not relax cache permissions");
        }
    }

    #[cfg(not(unix))]
    fn share_with_group(&self) {}
}

impl CacheStore for FileCacheStore {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn load(&self) -> CacheSnapshot {
        match self.read_shared() {
            Ok(Some(text)) => self.decode(&text),
            Ok(None) => CacheSnapshot::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "unreadable schema cache, ignoring it");
                CacheSnapshot::new()
            }
        }
    }

    fn merge_and_save(&self, delta: &CacheSnapshot) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let bytes = self
            .write_exclusive(delta)
            .map_err(|err| Error::Cache(format!("{}: {err}", self.path.display())))?;
        self.share_with_group();
        tracing::info!(
            path = %self.path.display(),
            classes = delta.len(),
            bytes,
            "schema cache written"
        );
        Ok(())
    }
}
