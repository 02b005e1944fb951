//! Source factory and URL validation

use sqlexec_core::{SourceConfig, SourceError, SourceFactory, SourceResult};
use std::path::PathBuf;
use std::time::Duration;

use crate::source::SqliteSource;

/// Property naming the busy timeout, in milliseconds, applied to every
/// connection the source opens.
pub const BUSY_TIMEOUT_PROPERTY: &str = "busy_timeout_ms";

/// Builds [`SqliteSource`]s. Use with
/// [`SourceRegistry`](sqlexec_core::SourceRegistry) to share one source per
/// configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteSourceFactory;

impl SourceFactory for SqliteSourceFactory {
    type Source = SqliteSource;

    fn create(&self, config: &SourceConfig) -> SourceResult<SqliteSource> {
        SqliteSource::from_config(config)
    }
}

/// Resolve a source URL to a database file path.
///
/// Accepted forms:
/// - `sqlite:///abs/path.db` and `sqlite://rel/path.db`
/// - `sqlite:/abs/path.db` and `sqlite:rel/path.db`
/// - a plain filesystem path
///
/// # Errors
///
/// Returns [`SourceError::InvalidConfig`] for another driver's URL, an empty
/// path, or an in-memory database (each connection would see a different
/// database).
pub fn parse_url(url: &str) -> SourceResult<PathBuf> {
    let url = url.trim();
    let path = match url.strip_prefix("sqlite:") {
        Some(rest) => rest.strip_prefix("//").unwrap_or(rest),
        None => {
            if url.contains("://") || url.starts_with("jdbc:") {
                return Err(SourceError::invalid_config(format!(
                    "unsupported URL '{}': expected a sqlite: URL or a file path",
                    url
                )));
            }
            url
        }
    };

    if path.is_empty() {
        return Err(SourceError::invalid_config("database path is empty"));
    }
    if path == ":memory:" || path.starts_with("file::memory:") {
        return Err(SourceError::invalid_config(
            "in-memory databases cannot be shared between connections",
        ));
    }
    Ok(PathBuf::from(path))
}

pub(crate) fn busy_timeout(config: &SourceConfig) -> SourceResult<Option<Duration>> {
    config
        .property(BUSY_TIMEOUT_PROPERTY)
        .map(|raw| {
            raw.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| {
                SourceError::invalid_config(format!(
                    "{} must be a whole number of milliseconds, got '{}'",
                    BUSY_TIMEOUT_PROPERTY, raw
                ))
            })
        })
        .transpose()
}
