//! Core types and traits for sqlexec
//!
//! This crate defines the seam between the executor and whatever supplies
//! database connections:
//! - Connection: transaction control on a live connection
//! - ConnectionSource: acquire/release of connections, safe across threads
//! - SourceFactory: builds a source from an explicit SourceConfig
//! - SourceConfig: value-equality source configuration
//! - SourceRegistry: one source per configuration, with explicit shutdown
//! - Error: SourceError, ConnectionError, RegistryError

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod registry;
pub mod traits;

pub use config::{SourceConfig, DEFAULT_MAX_ACTIVE, DEFAULT_MAX_IDLE};
pub use error::{BoxError, ConnectionError, RegistryError, SourceError, SourceResult, TxnOp};
pub use registry::SourceRegistry;
pub use traits::{Connection, ConnectionSource, SourceFactory};
