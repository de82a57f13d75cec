//! Aggregation of per-file envelopes into batch-level counts.

use crate::batch::error::ErrorKind;
use crate::batch::types::ResultEnvelope;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label used for files whose extension matched no handler.
pub const UNSUPPORTED_LABEL: &str = "unsupported";

/// Batch-level counts over a complete envelope set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub success_count: usize,
    pub error_count: usize,
    /// Failed files per handler kind.
    pub errors_by_handler: BTreeMap<String, usize>,
    /// Failed files per error kind.
    pub errors_by_kind: BTreeMap<ErrorKind, usize>,
    /// Success rate as a percentage (0.0 to 100.0).
    pub success_rate: f64,
    /// Failed envelopes, ordered by path.
    pub errors: Vec<ResultEnvelope>,
}

impl BatchSummary {
    /// Summarize envelopes. The result does not depend on their order.
    pub fn from_envelopes<'a, I>(envelopes: I) -> Self
    where
        I: IntoIterator<Item = &'a ResultEnvelope>,
    {
        let mut total = 0;
        let mut success_count = 0;
        let mut errors_by_handler = BTreeMap::new();
        let mut errors_by_kind = BTreeMap::new();
        let mut errors = Vec::new();

        for envelope in envelopes {
            total += 1;
            if envelope.is_success() {
                success_count += 1;
                continue;
            }

            let handler = envelope.kind.map_or(UNSUPPORTED_LABEL, |kind| kind.as_str());
            *errors_by_handler.entry(handler.to_string()).or_insert(0) += 1;
            if let Some(kind) = envelope.error_kind {
                *errors_by_kind.entry(kind).or_insert(0) += 1;
            }
            errors.push(envelope.clone());
        }

        errors.sort_by(|a, b| {
            a.path
                .cmp(&b.path)
                .then_with(|| a.error_kind.cmp(&b.error_kind))
                .then_with(|| a.message.cmp(&b.message))
        });

        let success_rate =
            if total > 0 { (success_count as f64 / total as f64) * 100.0 } else { 0.0 };

        Self {
            total,
            success_count,
            error_count: total - success_count,
            errors_by_handler,
            errors_by_kind,
            success_rate,
            errors,
        }
    }

    /// Check if all files were successful.
    pub fn is_complete_success(&self) -> bool {
        self.error_count == 0
    }
}
