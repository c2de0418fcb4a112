//! Shared configuration paths for Timebot.
//!
//! # Storage Structure
//!
//! All local data is stored under `~/.timebot/`:
//!
//! ```text
//! ~/.timebot/
//! ├── config/       # .env.local with secrets
//! └── state/
//!     ├── data.json # local data store (development backend)
//!     └── sessions/ # one JSON blob per conversation
//! ```
//!
//! # Environment Variables
//!
//! - `TIMEBOT_STATE_DIR`: Override the base state directory
//! - `TIMEBOT_DATA_FILE`: Override the data store file

use std::path::PathBuf;
use std::sync::OnceLock;

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "TIMEBOT_STATE_DIR";

/// Environment variable for custom data file.
pub const DATA_FILE_ENV: &str = "TIMEBOT_DATA_FILE";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".timebot";

const CONFIG_SUBDIR: &str = "config";
const STATE_SUBDIR: &str = "state";

static STATE_DIR_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Get the Timebot state directory.
///
/// The state directory is determined by:
/// 1. `TIMEBOT_STATE_DIR` environment variable if set
/// 2. `~/.timebot` if home directory is available
/// 3. `.timebot` in current directory as fallback
pub fn state_dir() -> PathBuf {
    STATE_DIR_CACHE
        .get_or_init(|| {
            std::env::var(STATE_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    dirs::home_dir()
                        .map(|h| h.join(DEFAULT_STATE_DIR))
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
                })
        })
        .clone()
}

/// Get the user config directory.
pub fn config_dir() -> PathBuf {
    state_dir().join(CONFIG_SUBDIR)
}

/// Get the runtime state directory.
pub fn runtime_state_dir() -> PathBuf {
    state_dir().join(STATE_SUBDIR)
}

/// Get the conversation sessions directory.
pub fn sessions_dir() -> PathBuf {
    runtime_state_dir().join("sessions")
}

/// Get the local data store file.
///
/// Defaults to `~/.timebot/state/data.json` or `TIMEBOT_DATA_FILE`.
pub fn data_file() -> PathBuf {
    std::env::var(DATA_FILE_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| runtime_state_dir().join("data.json"))
}

/// Get the .env.local file path.
pub fn env_file() -> PathBuf {
    config_dir().join(".env.local")
}

/// Ensure the state directory and all subdirectories exist.
///
/// # Errors
/// Returns an error if any directory cannot be created.
pub fn ensure_all_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(config_dir())?;
    std::fs::create_dir_all(runtime_state_dir())?;
    std::fs::create_dir_all(sessions_dir())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_dir_uses_env() {
        let dir = state_dir();
        assert!(dir.is_absolute() || dir.ends_with(".timebot"));
    }

    #[test]
    fn test_sessions_dir_name() {
        assert!(sessions_dir().ends_with("sessions"));
    }

    #[test]
    fn test_env_file_name() {
        assert!(env_file().ends_with(".env.local"));
    }

    #[test]
    fn test_runtime_state_dir_name() {
        assert!(runtime_state_dir().ends_with("state"));
    }
}
