//! Public sink: write, flush, close

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use rotalog_core::{Clock, Error, Result, SystemClock, ValidatedConfig, FLUSH_TIMEOUT};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::fmt::MakeWriter;

use crate::retention::RotatedFile;
use crate::rotation::RotationEngine;
use crate::writer::BufferedWriter;

/// A writable destination that rolls over to new files by time or size and
/// prunes old ones.
///
/// With a buffer depth of zero every write runs on the caller's thread.
/// Otherwise writes are queued and applied by one background thread; see
/// [`RotatingSink::flush`] for the ordering guarantee.
///
/// ```no_run
/// use rotalog_core::SinkConfig;
/// use rotalog_sink::RotatingSink;
/// use std::io::Write;
/// use std::time::Duration;
///
/// let config = SinkConfig::new("/var/log/myapp", "myapp")
///     .with_subdir_template("%Y%m%d")
///     .with_rotation_interval(Duration::from_secs(3600))
///     .with_max_files(48)
///     .validate()?;
///
/// let mut sink = RotatingSink::open(config)?;
/// sink.write_all(b"hello\n")?;
/// sink.close()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct RotatingSink {
    engine: Arc<Mutex<RotationEngine>>,
    writer: Option<BufferedWriter>,
    closed: AtomicBool,
}

impl RotatingSink {
    /// Open a sink on the system clock
    pub fn open(config: ValidatedConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Open a sink reading time from `clock`
    pub fn open_with_clock(config: ValidatedConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let engine = Arc::new(Mutex::new(RotationEngine::start(&config, clock)?));

        let writer = if config.is_buffered() {
            debug!("Starting buffered writer with depth {}", config.buffer_depth);
            Some(BufferedWriter::spawn(
                engine.clone(),
                config.buffer_depth,
                FLUSH_TIMEOUT,
            )?)
        } else {
            None
        };

        Ok(Self {
            engine,
            writer,
            closed: AtomicBool::new(false),
        })
    }

    /// Write a payload. In buffered mode the count is what was queued.
    pub fn write_bytes(&self, buf: &[u8]) -> Result<usize> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        match &self.writer {
            Some(writer) => writer.write(buf.to_vec()),
            None => self.engine.lock().write(buf),
        }
    }

    /// Apply every write issued before this call, then sync the current file.
    ///
    /// In buffered mode the wait for queued writes is bounded by
    /// [`FLUSH_TIMEOUT`]. If that bound is hit the flush still returns `Ok`,
    /// the queued writes stay pending, and completion is not guaranteed.
    pub fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        if let Some(writer) = &self.writer {
            if !writer.flush()? {
                debug!("Flush returned before queued writes were applied");
            }
        }

        self.engine.lock().sync()
    }

    /// Drain the background writer, then close the current file.
    ///
    /// Further writes and flushes fail with [`Error::Closed`]. Closing again is
    /// a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let drained = match &self.writer {
            Some(writer) => writer.close(),
            None => Ok(()),
        };
        let closed = self.engine.lock().close();

        drained.and(closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Path of the file currently receiving writes
    pub fn current_path(&self) -> Option<PathBuf> {
        self.engine.lock().current_path().map(|p| p.to_path_buf())
    }

    /// Bytes accounted against the current file
    pub fn current_size(&self) -> Option<u64> {
        self.engine.lock().current_size()
    }

    pub fn next_rotation(&self) -> Option<DateTime<Local>> {
        self.engine.lock().next_rotation()
    }

    /// Rotated files still referenced by the retention policy, oldest first
    pub fn retained_files(&self) -> Vec<RotatedFile> {
        self.engine.lock().retained_files()
    }
}

impl Drop for RotatingSink {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close log sink: {}", e);
        }
    }
}

impl io::Write for &RotatingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(RotatingSink::flush(self)?)
    }
}

impl io::Write for RotatingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(RotatingSink::flush(self)?)
    }
}

impl<'a> MakeWriter<'a> for RotatingSink {
    type Writer = &'a RotatingSink;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rotalog_core::{ManualClock, SinkConfig};
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
    }

    fn open(config: SinkConfig, clock: &Arc<ManualClock>) -> RotatingSink {
        RotatingSink::open_with_clock(config.validate().unwrap(), clock.clone()).unwrap()
    }

    fn log_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_open_rejects_unwritable_base() {
        let dir = TempDir::new().unwrap();
        let config = SinkConfig::new(dir.path(), "app")
            .with_subdir_template("%Y")
            .validate()
            .unwrap();
        let year = Local::now().format("%Y").to_string();
        fs::write(dir.path().join(year), b"file in the way").unwrap();

        let result = RotatingSink::open(config);
        assert!(matches!(result, Err(Error::CreateDir { .. })));
    }

    #[test]
    fn test_direct_write_and_flush() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let sink = open(SinkConfig::new(dir.path(), "app"), &clock);

        assert_eq!(sink.write_bytes(b"hello\n").unwrap(), 6);
        sink.flush().unwrap();

        let path = sink.current_path().unwrap();
        assert_eq!(path, dir.path().join("app_20240517_090000.log"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        sink.close().unwrap();
    }

    #[test]
    fn test_direct_write_reports_failed_rotation() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(12, 0, 0)));
        let sink = open(
            SinkConfig::new(dir.path(), "app")
                .with_subdir_template("%H%M%S")
                .with_max_size(1),
            &clock,
        );
        let first = sink.current_path().unwrap();
        sink.write_bytes(b"a").unwrap();

        fs::write(dir.path().join("120001"), b"blocker").unwrap();
        clock.advance(Duration::from_secs(1));

        let err = sink.write_bytes(b"b").unwrap_err();
        assert!(matches!(err, Error::CreateDir { .. }));
        assert_eq!(sink.current_path().unwrap(), first);
        assert_eq!(fs::read_to_string(&first).unwrap(), "ab");

        // io::Write surfaces it too
        assert!((&sink).write(b"c").is_err());
        assert_eq!(fs::read_to_string(&first).unwrap(), "abc");
    }

    #[test]
    fn test_buffered_write_survives_failed_rotation() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(12, 0, 0)));
        let sink = open(
            SinkConfig::new(dir.path(), "app")
                .with_subdir_template("%H%M%S")
                .with_max_size(1)
                .with_buffer_depth(4),
            &clock,
        );
        let first = sink.current_path().unwrap();
        sink.write_bytes(b"a").unwrap();
        sink.flush().unwrap();

        fs::write(dir.path().join("120001"), b"blocker").unwrap();
        clock.advance(Duration::from_secs(1));

        assert_eq!(sink.write_bytes(b"b").unwrap(), 1);
        sink.flush().unwrap();
        assert_eq!(fs::read_to_string(&first).unwrap(), "ab");
        sink.close().unwrap();
    }

    #[test]
    fn test_buffered_flush_barrier() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let sink = open(SinkConfig::new(dir.path(), "app").with_buffer_depth(4), &clock);

        for i in 0..200 {
            sink.write_bytes(format!("{}\n", i).as_bytes()).unwrap();
        }
        sink.flush().unwrap();

        let content = fs::read_to_string(sink.current_path().unwrap()).unwrap();
        assert_eq!(content.lines().count(), 200);
        assert_eq!(content.lines().last(), Some("199"));
        sink.close().unwrap();
    }

    #[test]
    fn test_close_then_write_errors() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));

        for depth in [0, 8] {
            let sink = open(SinkConfig::new(dir.path(), "app").with_buffer_depth(depth), &clock);
            sink.write_bytes(b"x").unwrap();
            sink.close().unwrap();

            assert!(sink.is_closed());
            assert!(matches!(sink.write_bytes(b"y"), Err(Error::Closed)));
            assert!(matches!(sink.flush(), Err(Error::Closed)));
            assert!(sink.close().is_ok());
        }
    }

    #[test]
    fn test_io_write_after_close_is_broken_pipe() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let mut sink = open(SinkConfig::new(dir.path(), "app"), &clock);
        sink.close().unwrap();

        let err = sink.write_all(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_size_rotation_preserves_every_byte() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let sink = open(
            SinkConfig::new(dir.path(), "app")
                .with_max_size(64)
                .with_buffer_depth(2),
            &clock,
        );

        let payload = b"0123456789abcdef\n";
        let mut submitted = 0u64;
        for _ in 0..40 {
            sink.write_bytes(payload).unwrap();
            submitted += payload.len() as u64;
            sink.flush().unwrap();
            clock.advance(Duration::from_secs(1));
        }
        sink.close().unwrap();

        let files = log_files(dir.path());
        assert!(files.len() > 1);
        let total: u64 = files.iter().map(|f| fs::metadata(f).unwrap().len()).sum();
        assert_eq!(total, submitted);
        for f in &files {
            // never more than one payload past the threshold
            assert!(fs::metadata(f).unwrap().len() < 64 + payload.len() as u64);
        }
    }

    #[test]
    fn test_time_rotation_through_sink() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 3, 0)));
        let sink = open(
            SinkConfig::new(dir.path(), "app")
                .with_subdir_template("%Y%m%d")
                .with_rotation_interval(Duration::from_secs(300)),
            &clock,
        );
        let before = sink.next_rotation().unwrap();

        sink.write_bytes(b"one\n").unwrap();
        clock.set(at(9, 5, 0));
        sink.write_bytes(b"two\n").unwrap();

        assert!(sink.next_rotation().unwrap() > before);
        let files = log_files(&dir.path().join("20240517"));
        assert_eq!(
            files,
            vec![
                dir.path().join("20240517").join("app_20240517_090300.log"),
                dir.path().join("20240517").join("app_20240517_090500.log"),
            ]
        );
        sink.close().unwrap();
    }

    #[test]
    fn test_retention_through_sink() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let sink = open(
            SinkConfig::new(dir.path(), "app")
                .with_max_size(1)
                .with_max_files(3)
                .with_buffer_depth(4),
            &clock,
        );

        for _ in 0..10 {
            sink.write_bytes(b"z").unwrap();
            sink.flush().unwrap();
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(sink.retained_files().len(), 3);

        let deadline = Instant::now() + Duration::from_secs(5);
        while log_files(dir.path()).len() > 4 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        // 3 retained + current
        assert_eq!(log_files(dir.path()).len(), 4);
        sink.close().unwrap();
    }

    #[test]
    fn test_shared_between_threads() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let sink = Arc::new(open(SinkConfig::new(dir.path(), "app"), &clock));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        (&*sink).write_all(b"0123456789\n").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        sink.flush().unwrap();

        let content = fs::read_to_string(sink.current_path().unwrap()).unwrap();
        assert_eq!(content.lines().count(), 400);
        assert!(content.lines().all(|l| l == "0123456789"));
    }

    #[test]
    fn test_drop_closes_buffered_sink() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let path = {
            let sink = open(SinkConfig::new(dir.path(), "app").with_buffer_depth(16), &clock);
            for _ in 0..50 {
                sink.write_bytes(b"abc\n").unwrap();
            }
            sink.current_path().unwrap()
        };
        assert_eq!(fs::metadata(path).unwrap().len(), 200);
    }

    #[test]
    fn test_tracing_make_writer() {
        use tracing_subscriber::fmt;

        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new(at(9, 0, 0)));
        let sink = open(SinkConfig::new(dir.path(), "app"), &clock);
        let path = sink.current_path().unwrap();

        let subscriber = fmt()
            .with_writer(sink)
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("routed through the sink");
        });

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("routed through the sink"));
    }
}
