//! Rotation decisions and the single active file

use chrono::{DateTime, Local, NaiveTime};
use rotalog_core::{Clock, Error, Result, ValidatedConfig};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::lifecycle::{ActiveFile, FileLifecycle};
use crate::retention::{inventory, schedule_deletion, RetentionManager, RotatedFile};

/// Next interval boundary strictly after `now`, counted from local midnight
pub fn next_rotation_deadline(now: DateTime<Local>, interval: Duration) -> DateTime<Local> {
    let step_ms = (interval.as_millis() as i64).max(1);
    let naive = now.naive_local();
    let midnight = naive.date().and_time(NaiveTime::MIN);
    let elapsed_ms = (naive - midnight).num_milliseconds();
    let boundary = midnight + chrono::Duration::milliseconds((elapsed_ms / step_ms + 1) * step_ms);

    // A boundary inside a DST gap has no local time; fall back to one step ahead
    boundary
        .and_local_timezone(Local)
        .earliest()
        .unwrap_or_else(|| now + chrono::Duration::milliseconds(step_ms))
}

/// Owns the active file and decides when to replace it.
///
/// Every write runs check -> raw write -> size accounting while the caller
/// holds the engine, so a write never lands on a handle being swapped out.
pub struct RotationEngine {
    lifecycle: FileLifecycle,
    retention: RetentionManager,
    clock: Arc<dyn Clock>,
    rotation_interval: Option<Duration>,
    max_size: Option<u64>,
    active: Option<ActiveFile>,
    next_rotation: Option<DateTime<Local>>,
}

impl RotationEngine {
    /// Inventory existing files, open the first file and arm the deadline
    pub fn start(config: &ValidatedConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let now = clock.now();
        let lifecycle = FileLifecycle::new(config);
        let mut retention = RetentionManager::new(config.max_files, config.max_age);

        if config.has_retention() {
            retention.seed(inventory(
                &config.base_dir,
                &config.base_name,
                &config.file_ext,
            ));
        }

        let active = lifecycle.open_new(now)?;
        retention.forget(active.path());
        schedule_deletion(retention.enforce(now));

        let next_rotation = config
            .rotation_interval
            .map(|interval| next_rotation_deadline(now, interval));

        info!("Writing to {}", active.path().display());
        if let Some(deadline) = next_rotation {
            debug!("Next rotation at {}", deadline.format("%Y-%m-%d %H:%M:%S"));
        }

        Ok(Self {
            lifecycle,
            retention,
            clock,
            rotation_interval: config.rotation_interval,
            max_size: config.max_size,
            active: Some(active),
            next_rotation,
        })
    }

    /// Rotate if the deadline passed or the current file is full.
    ///
    /// The size check only runs when the time check did not rotate.
    pub fn check_and_rotate(&mut self) -> Result<bool> {
        let now = self.clock.now();

        if let (Some(interval), Some(deadline)) = (self.rotation_interval, self.next_rotation) {
            if now >= deadline {
                // Advance first so a failing rotation is not retried on every write
                self.next_rotation = Some(next_rotation_deadline(now, interval));
                return self.rotate(now);
            }
        }

        if let Some(max_size) = self.max_size {
            let full = self.active.as_ref().map_or(false, |a| a.size() >= max_size);
            if full {
                return self.rotate(now);
            }
        }

        Ok(false)
    }

    /// Replace the active file. Returns false if the new path is the current one.
    fn rotate(&mut self, now: DateTime<Local>) -> Result<bool> {
        let Some(current) = self.active.as_mut() else {
            return Err(Error::Closed);
        };

        let path = self.lifecycle.resolve_path(&now);
        if path == current.path() {
            debug!("Rotation resolved to the current file, keeping {}", path.display());
            return Ok(false);
        }

        // The new path may be a retired file still tracked, e.g. after the clock stepped back
        self.retention.forget(&path);

        let next = self.lifecycle.open_at(path, now)?;
        let previous = std::mem::replace(current, next);
        let lifetime = (now - previous.opened_at()).num_seconds();
        let retired = previous.close();
        debug!(
            "Rotated {} after {}s -> {}",
            retired.display(),
            lifetime,
            current.path().display()
        );

        let evicted = self.retention.record(retired, now);
        schedule_deletion(evicted);
        Ok(true)
    }

    /// Rotate if needed, append `buf` to whichever file is current, account for it.
    ///
    /// If rotation fails the bytes still go to the previous file and the
    /// rotation error is returned. An error from the write itself takes
    /// precedence.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.active.is_none() {
            return Err(Error::Closed);
        }

        let rotated = self.check_and_rotate();
        if let Err(e) = &rotated {
            warn!("Log rotation failed, continuing with current file: {}", e);
        }

        let active = self.active.as_mut().ok_or(Error::Closed)?;
        active.write_all(buf)?;
        rotated?;
        Ok(buf.len())
    }

    /// Flush the current file to storage
    pub fn sync(&self) -> Result<()> {
        let active = self.active.as_ref().ok_or(Error::Closed)?;
        active.sync()?;
        Ok(())
    }

    /// Sync and close the current file. Later writes fail with `Error::Closed`.
    pub fn close(&mut self) -> Result<()> {
        if let Some(active) = self.active.take() {
            let synced = active.sync();
            let path = active.close();
            debug!("Closed {}", path.display());
            synced?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.active.is_none()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path())
    }

    pub fn current_size(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.size())
    }

    pub fn next_rotation(&self) -> Option<DateTime<Local>> {
        self.next_rotation
    }

    pub fn retained_files(&self) -> Vec<RotatedFile> {
        self.retention.files().cloned().collect()
    }
}
