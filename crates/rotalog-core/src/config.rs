//! Sink configuration and config file parsing
//!
//! Supports multiple configuration file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::*;
use crate::error::{Error, Result};
use crate::template::{normalize_extension, split_extension, TimeTemplate};

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

fn default_suffix_template() -> String {
    DEFAULT_SUFFIX_TEMPLATE.to_string()
}

/// Rotating sink configuration, as written in a config file or built in code.
///
/// Zero disables a knob: `rotation_interval_secs = 0` turns off time
/// rotation, `max_size_bytes = 0` turns off size rotation, and so on.
/// `buffer_depth = 0` selects synchronous writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory that must already exist; all files live below it
    pub base_dir: PathBuf,
    /// Prefix of every file name
    pub base_name: String,
    /// Subdirectory template, e.g. "%Y%m%d" (empty = files directly in base_dir)
    #[serde(default)]
    pub subdir_template: String,
    /// File name suffix template, must encode a full timestamp
    #[serde(default = "default_suffix_template")]
    pub suffix_template: String,
    /// Explicit extension; otherwise taken from the suffix template or ".log"
    #[serde(default)]
    pub file_ext: Option<String>,
    /// Bounded queue depth of the background writer
    #[serde(default)]
    pub buffer_depth: usize,
    #[serde(default)]
    pub rotation_interval_secs: u64,
    #[serde(default)]
    pub max_size_bytes: u64,
    /// Maximum number of rotated files to keep
    #[serde(default)]
    pub max_files: usize,
    #[serde(default)]
    pub max_age_secs: u64,
}

impl SinkConfig {
    pub fn new(base_dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            base_name: base_name.into(),
            subdir_template: String::new(),
            suffix_template: default_suffix_template(),
            file_ext: None,
            buffer_depth: 0,
            rotation_interval_secs: 0,
            max_size_bytes: 0,
            max_files: 0,
            max_age_secs: 0,
        }
    }

    pub fn with_subdir_template(mut self, template: impl Into<String>) -> Self {
        self.subdir_template = template.into();
        self
    }

    pub fn with_suffix_template(mut self, template: impl Into<String>) -> Self {
        self.suffix_template = template.into();
        self
    }

    pub fn with_file_ext(mut self, ext: impl Into<String>) -> Self {
        self.file_ext = Some(ext.into());
        self
    }

    /// Route writes through a background writer with a queue of this depth
    pub fn with_buffer_depth(mut self, depth: usize) -> Self {
        self.buffer_depth = depth;
        self
    }

    /// Sub-second parts round up, so a non-zero interval never reads as disabled
    pub fn with_rotation_interval(mut self, interval: Duration) -> Self {
        self.rotation_interval_secs = whole_secs(interval);
        self
    }

    pub fn with_max_size(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    /// Rounded up to whole seconds like [`Self::with_rotation_interval`]
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age_secs = whole_secs(age);
        self
    }

    /// Check every construction-time rule and resolve templates
    pub fn validate(&self) -> Result<ValidatedConfig> {
        if !self.base_dir.is_dir() {
            return Err(Error::config(format!(
                "Base directory not found or not a directory: {}",
                self.base_dir.display()
            )));
        }

        let (suffix_raw, template_ext) = split_extension(&self.suffix_template);
        let suffix = TimeTemplate::parse(suffix_raw)?;
        suffix.require_full_timestamp()?;

        let subdir = TimeTemplate::parse(&self.subdir_template)?;

        let file_ext = match (&self.file_ext, template_ext) {
            (Some(ext), _) => normalize_extension(ext),
            (None, Some(ext)) => ext.to_string(),
            (None, None) => DEFAULT_FILE_EXT.to_string(),
        };

        let rotation_interval = match self.rotation_interval_secs {
            0 => None,
            secs => {
                let interval = Duration::from_secs(secs);
                if interval < MIN_ROTATION_INTERVAL {
                    return Err(Error::config(format!(
                        "Rotation interval {}s is below the minimum of {}s",
                        secs,
                        MIN_ROTATION_INTERVAL.as_secs()
                    )));
                }
                Some(interval)
            }
        };

        let max_age = match self.max_age_secs {
            0 => None,
            secs => {
                let age = Duration::from_secs(secs);
                if age < MIN_MAX_AGE {
                    return Err(Error::config(format!(
                        "Max age {}s is below the minimum of {}s",
                        secs,
                        MIN_MAX_AGE.as_secs()
                    )));
                }
                Some(age)
            }
        };

        Ok(ValidatedConfig {
            base_dir: self.base_dir.clone(),
            base_name: self.base_name.clone(),
            subdir,
            suffix,
            file_ext,
            buffer_depth: self.buffer_depth,
            rotation_interval,
            max_size: (self.max_size_bytes > 0).then_some(self.max_size_bytes),
            max_files: (self.max_files > 0).then_some(self.max_files),
            max_age,
        })
    }

    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config: SinkConfig = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Find and load the first known config file in a directory
    pub fn find_and_load(dir: &Path) -> Result<(Self, PathBuf)> {
        for name in CONFIG_FILES {
            let path = dir.join(name);
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok((config, path));
            }
        }
        Err(Error::ConfigError(format!(
            "No config file found in {}. Expected one of: {:?}",
            dir.display(),
            CONFIG_FILES
        )))
    }
}

/// Configuration that passed [`SinkConfig::validate`]; the only input a sink accepts
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ValidatedConfig {
    pub base_dir: PathBuf,
    pub base_name: String,
    pub subdir: TimeTemplate,
    pub suffix: TimeTemplate,
    /// Extension including its leading dot
    pub file_ext: String,
    pub buffer_depth: usize,
    pub rotation_interval: Option<Duration>,
    pub max_size: Option<u64>,
    pub max_files: Option<usize>,
    pub max_age: Option<Duration>,
}

fn whole_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

impl ValidatedConfig {
    /// Whether any retention policy is enabled
    pub fn has_retention(&self) -> bool {
        self.max_files.is_some() || self.max_age.is_some()
    }

    /// Whether writes go through the background writer
    pub fn is_buffered(&self) -> bool {
        self.buffer_depth > 0
    }
}
