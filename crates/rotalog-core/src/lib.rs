//! rotalog Core - Shared configuration, time templates, clock and error handling

pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod template;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use constants::*;
pub use error::{Error, Result};
pub use template::TimeTemplate;
