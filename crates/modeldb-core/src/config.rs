//! Runtime configuration.
//!
//! Holds the locations of the shared schema cache artifact and the upload tree,
//! plus the optional DSN handed to the driver.

use std::env;
use std::path::PathBuf;

use crate::files::LocalFileStore;

/// Default file name of the schema cache artifact.
pub const DEFAULT_CACHE_FILE: &str = "model_table_infos.json";
/// Default upload directory below the public root.
pub const DEFAULT_UPLOAD_DIR: &str = "upload";
/// Alias of the main table in generated SQL.
pub const DEFAULT_ALIAS: &str = "m";

/// modeldb configuration.
#[derive(Debug, Clone)]
pub struct ModelDbConfig {
    /// Path of the schema cache artifact shared between processes.
    pub cache_path: PathBuf,
    /// Upload directory, relative to `public_path`.
    pub upload_dir: String,
    /// Filesystem root that is served publicly.
    pub public_path: PathBuf,
    /// URL under which `public_path` is served.
    pub base_url: String,
    /// Connection string for [`crate::Driver::connect`].
    pub dsn: Option<String>,
}

impl Default for ModelDbConfig {
    fn default() -> Self {
        Self {
            cache_path: env::temp_dir().join(DEFAULT_CACHE_FILE),
            upload_dir: DEFAULT_UPLOAD_DIR.to_string(),
            public_path: PathBuf::from("."),
            base_url: String::new(),
            dsn: None,
        }
    }
}

impl ModelDbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overlaid with `MODELDB_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(path) = lookup("MODELDB_CACHE_PATH") {
            config.cache_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("MODELDB_UPLOAD_DIR") {
            config.upload_dir = dir;
        }
        if let Some(path) = lookup("MODELDB_PUBLIC_PATH") {
            config.public_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("MODELDB_BASE_URL") {
            config.base_url = url;
        }
        config.dsn = lookup("MODELDB_DSN").or(config.dsn);
        config
    }

    #[must_use]
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    #[must_use]
    pub fn upload_dir(mut self, dir: impl Into<String>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    #[must_use]
    pub fn public_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_path = path.into();
        self
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn dsn(mut self, dsn: impl Into<String>) -> Self {
        self.dsn = Some(dsn.into());
        self
    }

    /// File store rooted at `public_path/upload_dir`.
    pub fn file_store(&self) -> LocalFileStore {
        LocalFileStore::new(&self.public_path, &self.upload_dir, &self.base_url)
    }
}
