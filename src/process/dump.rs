//! Persistent registry of supervised programs
//!
//! The registry is a JSON object keyed by program name. It is loaded once at
//! boot and the full snapshot is rewritten after every mutation, through a
//! temporary file renamed into place so a crash never leaves a half-written
//! file behind.
//!
//! ```json
//! {
//!   "12345_bot.py": {
//!     "path": "/home/panel/.botpanel/uploaded_bots/12345_bot.py",
//!     "pid": 4242,
//!     "log": "/home/panel/.botpanel/bot_logs/12345_bot.py.log",
//!     "err": "/home/panel/.botpanel/bot_logs/12345_bot.py.err"
//!   }
//! }
//! ```
//!
//! An unreadable or unparsable file never fails boot. The registry comes up
//! empty and the unparsable file is kept aside as `<file>.corrupted.<timestamp>`.

use crate::{file, log};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry {} is corrupt: {source}", path.display())]
    Corrupt { path: PathBuf, source: serde_json::Error },
    #[error("cannot read registry {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("cannot write registry {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot encode registry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Tracking data for one supervised program.
///
/// `process_id` is whatever the last launch returned. Nothing probes it
/// afterwards, so it may name a process that has exited or, after pid reuse,
/// an unrelated one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRecord {
    #[serde(default)]
    pub path: PathBuf,
    #[serde(rename = "pid", default, skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(rename = "log", default)]
    pub stdout_log_path: PathBuf,
    #[serde(rename = "err", default)]
    pub stderr_log_path: PathBuf,
}

#[derive(Debug)]
pub struct Registry {
    path: PathBuf,
    records: BTreeMap<String, ProgramRecord>,
}

impl Registry {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
        }
    }

    /// Load the snapshot at `path`, degrading to an empty registry when the
    /// file is absent, unreadable or corrupt.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        match Self::peek(&path) {
            Ok(registry) => registry,
            Err(err @ RegistryError::Corrupt { .. }) => {
                log!("[registry] starting empty", "error" => err);
                preserve_corrupted(&path);
                Self::empty(path)
            }
            Err(err) => {
                log!("[registry] starting empty", "error" => err);
                Self::empty(path)
            }
        }
    }

    /// Read the snapshot without any recovery side effects. A missing file
    /// is an empty registry.
    pub fn peek(path: &Path) -> Result<Self, RegistryError> {
        if !file::Exists::check(path).file() {
            return Ok(Self::empty(path));
        }

        let raw = fs::read(path).map_err(|source| RegistryError::Read { path: path.to_path_buf(), source })?;
        let records = serde_json::from_slice(&raw).map_err(|source| RegistryError::Corrupt { path: path.to_path_buf(), source })?;

        Ok(Self { path: path.to_path_buf(), records })
    }

    pub fn encode(&self) -> Result<String, RegistryError> {
        let mut encoded = serde_json::to_string_pretty(&self.records)?;
        encoded.push('\n');
        Ok(encoded)
    }

    /// Write the full snapshot, replacing the previous file atomically
    pub fn save(&self) -> Result<(), RegistryError> {
        let encoded = self.encode()?;
        file::write_atomic(&self.path, encoded.as_bytes()).map_err(|source| RegistryError::Write { path: self.path.clone(), source })?;
        ::log::debug!("[registry] saved {} records to {}", self.records.len(), self.path.display());
        Ok(())
    }

    /// Insert or replace the record for `name`, returning the one it replaced
    pub fn upsert(&mut self, name: impl Into<String>, record: ProgramRecord) -> Option<ProgramRecord> { self.records.insert(name.into(), record) }

    pub fn remove(&mut self, name: &str) -> Option<ProgramRecord> { self.records.remove(name) }

    /// Remove every record, returning them in name order
    pub fn clear(&mut self) -> Vec<(String, ProgramRecord)> { std::mem::take(&mut self.records).into_iter().collect() }

    pub fn get(&self, name: &str) -> Option<&ProgramRecord> { self.records.get(name) }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProgramRecord> { self.records.get_mut(name) }

    pub fn all(&self) -> impl Iterator<Item = (&String, &ProgramRecord)> { self.records.iter() }

    pub fn names(&self) -> Vec<String> { self.records.keys().cloned().collect() }

    pub fn len(&self) -> usize { self.records.len() }

    pub fn is_empty(&self) -> bool { self.records.is_empty() }

    pub fn path(&self) -> &Path { &self.path }
}

fn preserve_corrupted(path: &Path) {
    let mut name = path.file_name().map(|name| name.to_os_string()).unwrap_or_default();
    name.push(format!(".corrupted.{}", Utc::now().format("%Y%m%d_%H%M%S")));
    let backup = path.with_file_name(name);

    match fs::copy(path, &backup) {
        Ok(_) => log!("[registry] corrupted file preserved", "backup" => backup.display()),
        Err(err) => log!("[registry] failed to preserve corrupted file", "error" => err),
    }
}
