//! SQLite connection source for sqlexec
//!
//! - [`SqliteConnection`]: a `rusqlite::Connection` with transaction control
//! - [`SqliteSource`]: a `deadpool` pool over one database file, capped at
//!   `max_active` checked out and `max_idle` kept open for reuse
//! - [`SqliteSourceFactory`]: validates a [`SourceConfig`] and builds the source
//!
//! ```text
//! use sqlexec_core::{SourceConfig, SourceRegistry};
//! use sqlexec_sqlite::SqliteSourceFactory;
//!
//! let registry = SourceRegistry::new(SqliteSourceFactory);
//! let source = registry.get_or_create(&SourceConfig::new("sqlite:/var/lib/app/app.db"))?;
//! ```
//!
//! [`SourceConfig`]: sqlexec_core::SourceConfig

#![warn(missing_docs)]
#![warn(clippy::all)]

mod connection;
mod factory;
mod source;

pub use connection::SqliteConnection;
pub use factory::{parse_url, SqliteSourceFactory, BUSY_TIMEOUT_PROPERTY};
pub use source::SqliteSource;
