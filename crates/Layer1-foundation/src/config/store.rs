//! Config directories
//!
//! A `ConfigStore` is one directory holding livemeta's JSON settings files.
//! There are two of them: the user's (`<config dir>/livemeta/`) and the
//! project's (`<root>/.livemeta/`).

use crate::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// User-level settings
    pub fn global() -> Result<Self> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join("livemeta")))
            .ok_or_else(|| Error::Config("no user config directory on this platform".to_string()))
    }

    /// Project settings under `root`
    pub fn project(root: impl AsRef<Path>) -> Self {
        Self::new(root.as_ref().join(".livemeta"))
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("no current directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Raw JSON of `file`, `None` when it does not exist. Unreadable or
    /// malformed files are errors.
    pub fn read(&self, file: &str) -> Result<Option<Value>> {
        let path = self.dir.join(file);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Config(format!("{}: {}", path.display(), e))),
        };

        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Write `data` as pretty JSON, creating the directory if needed
    pub fn write<T: Serialize>(&self, file: &str, data: &T) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Config(format!("{}: {}", self.dir.display(), e)))?;

        let path = self.dir.join(file);
        let text = serde_json::to_string_pretty(data)?;
        std::fs::write(&path, text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}
