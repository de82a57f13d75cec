//! Shared fixtures for Tally Core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tally_core::{Handler, HandlerError, Metrics};
use tempfile::TempDir;

pub const SALES_CSV: &str = "date,product,quantity,price\n\
                             2024-01-01,Widget,2,10.00\n\
                             2024-01-02,Gadget,1,5.00\n";

pub const MALFORMED_USERS_JSON: &str = r#"{"users": [{"id": 1, "name": "Ada",}"#;

pub const USERS_JSON: &str = r#"{"users": [
    {"id": 1, "active": true, "sessions": [{}, {}]},
    {"id": 2, "active": false}
]}"#;

pub const SYSTEM_LOG: &str = "2024-01-15 10:30:00 INFO Service started\n\
                              this line is not a log entry\n\
                              2024-01-15 10:31:00 ERROR Connection refused\n";

/// Write `(name, contents)` pairs into a fresh temp directory.
pub fn write_fixtures(files: &[(&str, &str)]) -> (TempDir, Vec<PathBuf>) {
    let dir = TempDir::new().expect("create temp dir");
    let paths = files
        .iter()
        .map(|(name, contents)| {
            let path = dir.path().join(name);
            fs::write(&path, contents).expect("write fixture");
            path
        })
        .collect();
    (dir, paths)
}

/// The three-file batch: valid sales, malformed users, partially valid log.
pub fn scenario_batch() -> (TempDir, Vec<PathBuf>) {
    write_fixtures(&[
        ("sales.csv", SALES_CSV),
        ("users.json", MALFORMED_USERS_JSON),
        ("system.log", SYSTEM_LOG),
    ])
}

/// Handler that always fails with a parse error and counts its calls.
#[derive(Default)]
pub struct AlwaysFails {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Handler for AlwaysFails {
    async fn process(&self, _path: &Path) -> Result<Metrics, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(HandlerError::Parse("synthetic failure".to_string()))
    }
}

/// Handler that never finishes within any reasonable timeout.
pub struct Hangs(pub Duration);

#[async_trait]
impl Handler for Hangs {
    async fn process(&self, _path: &Path) -> Result<Metrics, HandlerError> {
        tokio::time::sleep(self.0).await;
        Err(HandlerError::Parse("woke up".to_string()))
    }
}

/// Handler that panics.
pub struct Crashes;

#[async_trait]
impl Handler for Crashes {
    async fn process(&self, path: &Path) -> Result<Metrics, HandlerError> {
        panic!("cannot handle {}", path.display());
    }
}
