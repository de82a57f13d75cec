//! Format handlers and extension dispatch.
//!
//! A [`Handler`] turns one file into [`Metrics`] or a [`HandlerError`]. Handlers
//! are file-local and single-pass; all concurrency, retry and timeout policy
//! lives in [`crate::batch`].

pub mod error;
pub mod logs;
pub mod sales;
pub mod users;

pub use error::HandlerError;
pub use logs::{LogHandler, LogLevel, LogMetrics, MalformedLine};
pub use sales::{SalesHandler, SalesMetrics};
pub use users::{UserMetrics, UsersHandler};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// The kinds of file the batch knows how to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Sales records in CSV.
    Sales,
    /// User accounts in JSON.
    Users,
    /// Plain-text system log.
    Log,
}

impl HandlerKind {
    /// Resolve a kind from the file extension, case-insensitively.
    pub fn from_path(path: &Path) -> Result<Self, HandlerError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(HandlerKind::Sales),
            "json" => Ok(HandlerKind::Users),
            "log" => Ok(HandlerKind::Log),
            "" => Err(HandlerError::UnsupportedType(format!(
                "{} has no extension",
                path.display()
            ))),
            other => Err(HandlerError::UnsupportedType(format!(".{}", other))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandlerKind::Sales => "sales",
            HandlerKind::Users => "users",
            HandlerKind::Log => "log",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific metrics extracted from one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metrics {
    Sales(SalesMetrics),
    Users(UserMetrics),
    Log(LogMetrics),
}

impl Metrics {
    /// One-line `key=value` rendering for text reports.
    pub fn summary(&self) -> String {
        match self {
            Metrics::Sales(m) => format!(
                "valid_records={} invalid_records={} unique_products={} total_sales={:.2}",
                m.valid_records, m.invalid_records, m.unique_products, m.total_sales
            ),
            Metrics::Users(m) => format!(
                "total_users={} active_users={} total_sessions={} invalid_records={}",
                m.total_users, m.active_users, m.total_sessions, m.invalid_records
            ),
            Metrics::Log(m) => {
                let levels = m
                    .levels
                    .iter()
                    .map(|(level, count)| format!("{}={}", level, count))
                    .collect::<Vec<_>>()
                    .join(",");
                format!(
                    "total_lines={} levels=[{}] malformed_lines={}",
                    m.total_lines,
                    levels,
                    m.malformed.len()
                )
            }
        }
    }
}

/// A format-specific file processor.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Process one file.
    async fn process(&self, path: &Path) -> Result<Metrics, HandlerError>;
}

/// Read a whole file, mapping I/O failures onto handler errors.
pub(crate) async fn read_input(path: &Path) -> Result<String, HandlerError> {
    tokio::fs::read_to_string(path).await.map_err(|e| HandlerError::from_io(path, &e))
}

/// Run a parse on the blocking pool so the attempt future stays pending while it works.
///
/// A panic inside `parse` resumes on the calling task.
pub(crate) async fn parse_blocking<F>(content: String, parse: F) -> Result<Metrics, HandlerError>
where
    F: FnOnce(&str) -> Result<Metrics, HandlerError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || parse(&content)).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(err) => Err(HandlerError::Parse(format!("parse task failed: {}", err))),
    }
}

/// Maps handler kinds to handler implementations.
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerKind, Arc<dyn Handler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::empty()
            .with_handler(HandlerKind::Sales, Arc::new(SalesHandler))
            .with_handler(HandlerKind::Users, Arc::new(UsersHandler))
            .with_handler(HandlerKind::Log, Arc::new(LogHandler))
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("HandlerRegistry").field("kinds", &kinds).finish()
    }
}

impl HandlerRegistry {
    /// A registry with no handlers; every file resolves to `UnsupportedType`.
    pub fn empty() -> Self {
        Self { handlers: HashMap::new() }
    }

    /// Register (or replace) the handler for a kind.
    #[must_use]
    pub fn with_handler(mut self, kind: HandlerKind, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    /// Select the handler for a path by its extension.
    pub fn resolve(&self, path: &Path) -> Result<(HandlerKind, Arc<dyn Handler>), HandlerError> {
        let kind = HandlerKind::from_path(path)?;
        self.handlers
            .get(&kind)
            .map(|handler| (kind, Arc::clone(handler)))
            .ok_or_else(|| {
                HandlerError::UnsupportedType(format!("no handler registered for {}", kind))
            })
    }
}
