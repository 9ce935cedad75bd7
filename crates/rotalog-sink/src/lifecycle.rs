//! Opening and closing of backing files

use chrono::{DateTime, Local};
use rotalog_core::{Error, Result, TimeTemplate, ValidatedConfig};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The file currently receiving writes
#[derive(Debug)]
pub struct ActiveFile {
    file: File,
    path: PathBuf,
    opened_at: DateTime<Local>,
    size: u64,
}

impl ActiveFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn opened_at(&self) -> DateTime<Local> {
        self.opened_at
    }

    /// Bytes in the file: its size when opened plus everything written since
    pub fn size(&self) -> u64 {
        self.size
    }

    pub(crate) fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.file.write_all(buf)?;
        self.size += buf.len() as u64;
        Ok(())
    }

    pub(crate) fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    /// Close the handle and hand back the path
    pub(crate) fn close(self) -> PathBuf {
        drop(self.file);
        self.path
    }
}

/// Computes file paths from the templates and opens them
#[derive(Debug, Clone)]
pub struct FileLifecycle {
    base_dir: PathBuf,
    base_name: String,
    subdir: TimeTemplate,
    suffix: TimeTemplate,
    file_ext: String,
}

impl FileLifecycle {
    pub fn new(config: &ValidatedConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            base_name: config.base_name.clone(),
            subdir: config.subdir.clone(),
            suffix: config.suffix.clone(),
            file_ext: config.file_ext.clone(),
        }
    }

    /// `base/subdir(now)/base_name + suffix(now) + ext`
    pub fn resolve_path(&self, now: &DateTime<Local>) -> PathBuf {
        let mut path = self.base_dir.clone();
        let subdir = self.subdir.render(now);
        if !subdir.is_empty() {
            path.push(subdir);
        }
        path.push(format!(
            "{}{}{}",
            self.base_name,
            self.suffix.render(now),
            self.file_ext
        ));
        path
    }

    /// Open (or create) the file for `now` in append mode
    pub fn open_new(&self, now: DateTime<Local>) -> Result<ActiveFile> {
        let path = self.resolve_path(&now);
        self.open_at(path, now)
    }

    pub(crate) fn open_at(&self, path: PathBuf, now: DateTime<Local>) -> Result<ActiveFile> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| Error::FileOpen {
                path: path.clone(),
                source,
            })?;

        let size = file
            .metadata()
            .map_err(|source| Error::FileOpen {
                path: path.clone(),
                source,
            })?
            .len();

        Ok(ActiveFile {
            file,
            path,
            opened_at: now,
            size,
        })
    }
}
