//! Append-only progress log backing the completion set.
//!
//! The log is read whole at startup and then only ever appended to, one
//! line per completed unit. A crash can lose at most the in-flight unit's
//! line; earlier lines are never rewritten.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::CampaignError;
use crate::index::WorkUnit;

/// Completion set plus the file it is persisted in.
#[derive(Debug)]
pub struct ProgressLog {
    path: PathBuf,
    completed: HashSet<String>,
}

impl ProgressLog {
    /// Load the log at `path`, creating an empty one if it does not exist.
    pub fn load(path: &Path) -> Result<Self, CampaignError> {
        let write_err = |source| CampaignError::ProgressWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        if !path.exists() {
            fs::File::create(path).map_err(write_err)?;
        }

        let contents = fs::read_to_string(path).map_err(|source| CampaignError::ProgressRead {
            path: path.to_path_buf(),
            source,
        })?;
        if terminate_last_line(path).map_err(write_err)? {
            tracing::warn!("{} ended mid-line; terminated it before appending", path.display());
        }

        let completed: HashSet<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        tracing::info!(
            "Loaded {} completed units from {}",
            completed.len(),
            path.display()
        );

        Ok(Self {
            path: path.to_path_buf(),
            completed,
        })
    }

    /// Whether `unit` is already in the completion set.
    pub fn contains(&self, unit: &WorkUnit) -> bool {
        self.completed.contains(unit.id())
    }

    /// Number of distinct completed units.
    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `unit` to the log and the in-memory set.
    ///
    /// One `write_all` of the whole line on an append-mode handle, then
    /// `sync_data`.
    pub fn record_completion(&mut self, unit: &WorkUnit) -> Result<(), CampaignError> {
        let write_err = |source| CampaignError::ProgressWrite {
            path: self.path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(format!("{}\n", unit.id()).as_bytes())
            .map_err(write_err)?;
        file.sync_data().map_err(write_err)?;

        self.completed.insert(unit.id().to_string());
        Ok(())
    }
}

/// Append a `\n` if the non-empty file at `path` does not end with one.
///
/// A torn final line (crash mid-write, hand edit) would otherwise be glued
/// to the next appended line. Returns whether a newline was written.
pub(crate) fn terminate_last_line(path: &Path) -> io::Result<bool> {
    let mut file = match OpenOptions::new().read(true).append(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(false);
    }

    file.write_all(b"\n")?;
    file.sync_data()?;
    Ok(true)
}
