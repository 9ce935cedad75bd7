//! Constants and default values for rotalog

use std::time::Duration;

/// Smallest accepted rotation interval (0 disables time rotation)
pub const MIN_ROTATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Smallest accepted max age (0 disables age retention)
pub const MIN_MAX_AGE: Duration = Duration::from_secs(60 * 60);

/// Extension used when neither the config nor the suffix template carry one
pub const DEFAULT_FILE_EXT: &str = ".log";

/// Default file name suffix template (strftime syntax)
pub const DEFAULT_SUFFIX_TEMPLATE: &str = "_%Y%m%d_%H%M%S";

/// Upper bound on how long a flush waits for the background writer
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(15);

/// Default config file names to search for (in priority order)
pub const CONFIG_FILES: &[&str] = &[
    // TOML formats
    "rotalog.toml",
    "rotalog.config.toml",
    // YAML formats
    "rotalog.yaml",
    "rotalog.yml",
    // JSON formats
    "rotalog.json",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimums() {
        assert_eq!(MIN_ROTATION_INTERVAL.as_secs(), 300);
        assert_eq!(MIN_MAX_AGE.as_secs(), 3600);
        assert!(FLUSH_TIMEOUT > Duration::ZERO);
    }

    #[test]
    fn test_default_ext_has_dot() {
        assert!(DEFAULT_FILE_EXT.starts_with('.'));
    }
}
