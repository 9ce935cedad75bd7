//! Retention of rotated files by count and age

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A retired backing file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotatedFile {
    pub path: PathBuf,
    /// When the file was retired (or its mtime, for files found at startup)
    pub rotated_at: DateTime<Local>,
}

/// Ordered record of rotated files, oldest first
#[derive(Debug, Default)]
pub struct RetentionManager {
    files: VecDeque<RotatedFile>,
    max_files: Option<usize>,
    max_age: Option<Duration>,
}

impl RetentionManager {
    pub fn new(max_files: Option<usize>, max_age: Option<Duration>) -> Self {
        Self {
            files: VecDeque::new(),
            max_files,
            max_age,
        }
    }

    /// Nothing is tracked unless a count or age limit is set
    pub fn is_enabled(&self) -> bool {
        self.max_files.is_some() || self.max_age.is_some()
    }

    /// Add files discovered at startup, already sorted oldest first
    pub fn seed(&mut self, files: Vec<RotatedFile>) {
        if self.is_enabled() {
            self.files.extend(files);
        }
    }

    /// Stop tracking a path (the file that is about to become current)
    pub fn forget(&mut self, path: &Path) {
        self.files.retain(|f| f.path != path);
    }

    /// Record a retired file and return the paths that now violate retention
    pub fn record(&mut self, path: PathBuf, rotated_at: DateTime<Local>) -> Vec<PathBuf> {
        if !self.is_enabled() {
            return Vec::new();
        }

        self.files.push_back(RotatedFile { path, rotated_at });
        self.enforce(rotated_at)
    }

    /// Apply both policies at `now`, evicting from the front only
    pub fn enforce(&mut self, now: DateTime<Local>) -> Vec<PathBuf> {
        let mut evicted = Vec::new();

        if let Some(max_files) = self.max_files {
            while self.files.len() > max_files {
                if let Some(oldest) = self.files.pop_front() {
                    evicted.push(oldest.path);
                }
            }
        }

        if let Some(max_age) = self.max_age {
            while let Some(oldest) = self.files.front() {
                let age = (now - oldest.rotated_at).to_std().unwrap_or_default();
                if age <= max_age {
                    break;
                }
                if let Some(oldest) = self.files.pop_front() {
                    evicted.push(oldest.path);
                }
            }
        }

        evicted
    }

    pub fn files(&self) -> impl Iterator<Item = &RotatedFile> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Find this sink's existing files under `dir`, sorted by modification time.
///
/// Matching goes beyond the extension: a regular file must also have a name
/// starting with `base_name`, so other writers sharing the directory keep
/// their files. Unreadable entries are skipped.
pub fn inventory(dir: &Path, base_name: &str, file_ext: &str) -> Vec<RotatedFile> {
    let wanted_ext = file_ext.trim_start_matches('.');
    let mut files: Vec<RotatedFile> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry during inventory: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            let name = entry.file_name().to_string_lossy();
            ext == wanted_ext && name.starts_with(base_name)
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            Some(RotatedFile {
                path: entry.into_path(),
                rotated_at: DateTime::<Local>::from(modified),
            })
        })
        .collect();

    files.sort_by(|a, b| {
        a.rotated_at
            .cmp(&b.rotated_at)
            .then_with(|| a.path.cmp(&b.path))
    });

    debug!("Inventoried {} existing files in {}", files.len(), dir.display());
    files
}

/// Delete evicted files on a detached thread; failures are logged and dropped
pub fn schedule_deletion(paths: Vec<PathBuf>) {
    if paths.is_empty() {
        return;
    }

    let spawned = std::thread::Builder::new()
        .name("rotalog-reaper".to_string())
        .spawn(move || {
            for path in paths {
                match std::fs::remove_file(&path) {
                    Ok(()) => debug!("Removed expired log file: {}", path.display()),
                    Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
                }
            }
        });

    if let Err(e) = spawned {
        warn!("Failed to spawn deletion thread: {}", e);
    }
}
