//! CLI argument definitions

use anyhow::{bail, Result};
use clap::Parser;
use rotalog_core::SinkConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "rotalog")]
#[command(version, about = "Copy standard input into rotating log files")]
pub struct Cli {
    /// Directory that receives the log files (must exist)
    pub base_dir: Option<PathBuf>,

    /// File name prefix
    pub base_name: Option<String>,

    /// Config file (.toml, .yaml, .yml or .json)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Subdirectory template, e.g. "%Y%m%d"
    #[arg(long)]
    pub subdir: Option<String>,

    /// File name suffix template; must include year through second
    #[arg(long)]
    pub suffix: Option<String>,

    /// File extension
    #[arg(long)]
    pub ext: Option<String>,

    /// Rotation interval in seconds (0 disables, minimum 300)
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Rotate once a file reaches this many bytes (0 disables)
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,

    /// Keep at most this many rotated files (0 disables)
    #[arg(long)]
    pub max_files: Option<usize>,

    /// Delete rotated files older than this many seconds (0 disables, minimum 3600)
    #[arg(long, value_name = "SECS")]
    pub max_age: Option<u64>,

    /// Queue depth for background writes (0 writes on the reading thread)
    #[arg(long, value_name = "DEPTH")]
    pub buffer: Option<usize>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Build the sink configuration: config file first, then command-line overrides.
    ///
    /// Without `--config` or positional arguments, the first known config file
    /// in `cwd` is used.
    pub fn resolve_config(&self, cwd: &Path) -> Result<SinkConfig> {
        let mut config = match (&self.config, &self.base_dir) {
            (Some(path), _) => SinkConfig::load(path)?,
            (None, Some(base_dir)) => {
                let Some(base_name) = &self.base_name else {
                    bail!("BASE_NAME is required when BASE_DIR is given without --config");
                };
                SinkConfig::new(base_dir, base_name)
            }
            (None, None) => SinkConfig::find_and_load(cwd)?.0,
        };

        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(base_name) = &self.base_name {
            config.base_name = base_name.clone();
        }
        if let Some(subdir) = &self.subdir {
            config = config.with_subdir_template(subdir);
        }
        if let Some(suffix) = &self.suffix {
            config = config.with_suffix_template(suffix);
        }
        if let Some(ext) = &self.ext {
            config = config.with_file_ext(ext);
        }
        if let Some(secs) = self.interval {
            config = config.with_rotation_interval(Duration::from_secs(secs));
        }
        if let Some(bytes) = self.max_size {
            config = config.with_max_size(bytes);
        }
        if let Some(count) = self.max_files {
            config = config.with_max_files(count);
        }
        if let Some(secs) = self.max_age {
            config = config.with_max_age(Duration::from_secs(secs));
        }
        if let Some(depth) = self.buffer {
            config = config.with_buffer_depth(depth);
        }

        Ok(config)
    }
}
