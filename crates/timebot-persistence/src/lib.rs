//! Persistence layer for Timebot.
//!
//! Two stores live here:
//!
//! - [`SessionStore`]: opaque conversation blobs keyed by
//!   `(bot, chat, user)` with a time-to-live, in memory or one file per key.
//! - [`DataStore`]: users, projects and time entries, with every lookup
//!   scoped to the acting user.
//!
//! File writes go through [`atomic`] (write to temp file, then rename).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use timebot_persistence::{FileSessionStore, SessionStore};
//!
//! # async fn demo() -> timebot_persistence::Result<()> {
//! let sessions = FileSessionStore::new("/home/user/.timebot/state/sessions");
//! sessions
//!     .put("timebot:42:7", "{}".to_string(), Duration::from_secs(60))
//!     .await?;
//! let blob = sessions.get("timebot:42:7").await?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod data_store;
pub mod error;
pub mod session_store;

pub use data_store::{DataStore, DbStore, MembershipOutcome, StoreStats, UpdateOutcome};
pub use error::{PersistenceError, Result};
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore};
