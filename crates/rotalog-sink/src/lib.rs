//! rotalog Sink - Rotating log files, retention, and buffered writes

mod lifecycle;
mod retention;
mod rotation;
mod sink;
mod writer;

pub use lifecycle::{ActiveFile, FileLifecycle};
pub use retention::{inventory, schedule_deletion, RetentionManager, RotatedFile};
pub use rotation::{next_rotation_deadline, RotationEngine};
pub use sink::RotatingSink;
pub use writer::{BufferedWriter, WriterState};

pub use rotalog_core::{Clock, Error, ManualClock, Result, SinkConfig, SystemClock, ValidatedConfig};
