//! Upload directory resolution for file-typed properties.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A location inside the public upload tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathUrl {
    pub absolute_path: PathBuf,
    /// Path relative to the public root, always `/` separated.
    pub relative_path: String,
    pub absolute_url: String,
}

impl PathUrl {
    /// Join a file name onto this directory.
    pub fn join(&self, file_name: &str) -> PathUrl {
        let relative_path = if self.relative_path.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", self.relative_path, file_name)
        };
        PathUrl {
            absolute_path: self.absolute_path.join(file_name),
            absolute_url: format!("{}/{}", self.absolute_url.trim_end_matches('/'), file_name),
            relative_path,
        }
    }
}

/// Storage for files referenced by file-typed properties.
pub trait FileStore: Send + Sync {
    /// Resolve (and create if needed) the upload directory for `subpath`.
    fn resolve_upload_directory(&self, subpath: &str) -> io::Result<PathUrl>;

    /// Remove a stored file. Missing files are not an error.
    fn delete(&self, absolute_path: &Path) -> io::Result<()>;
}

/// Files below `public_path/upload_dir`, served under `base_url`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    public_path: PathBuf,
    upload_dir: String,
    base_url: String,
}

impl LocalFileStore {
    pub fn new(
        public_path: impl Into<PathBuf>,
        upload_dir: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            public_path: public_path.into(),
            upload_dir: upload_dir.into(),
            base_url: base_url.into(),
        }
    }
}

impl FileStore for LocalFileStore {
    fn resolve_upload_directory(&self, subpath: &str) -> io::Result<PathUrl> {
        let mut relative = self.upload_dir.trim_matches('/').to_string();
        let subpath = subpath.trim_matches('/');
        if !subpath.is_empty() {
            if !relative.is_empty() {
                relative.push('/');
            }
            relative.push_str(subpath);
        }
        let absolute_path = self.public_path.join(&relative);
        fs::create_dir_all(&absolute_path)?;
        Ok(PathUrl {
            absolute_url: format!("{}/{}", self.base_url.trim_end_matches('/'), relative),
            absolute_path,
            relative_path: relative,
        })
    }

    fn delete(&self, absolute_path: &Path) -> io::Result<()> {
        match fs::remove_file(absolute_path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}
