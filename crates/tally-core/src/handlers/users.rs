//! User JSON handler.

use super::{Handler, HandlerError, Metrics, parse_blocking, read_input};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Metrics for a user JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetrics {
    /// Users with a valid `id`.
    pub total_users: usize,
    /// Valid users whose `active` flag is true (or absent).
    pub active_users: usize,
    /// Sessions summed over valid users.
    pub total_sessions: usize,
    /// Entries that were skipped.
    pub invalid_records: usize,
}

/// Handles `.json` files holding a user array or `{"users": [...]}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsersHandler;

#[async_trait]
impl Handler for UsersHandler {
    async fn process(&self, path: &Path) -> Result<Metrics, HandlerError> {
        let content = read_input(path).await?;
        parse_blocking(content, |content| parse_users(content).map(Metrics::Users)).await
    }
}

/// Parse user JSON content.
///
/// Expected format:
/// ```json
/// {"users": [
///   {"id": 1, "name": "Ada", "active": true, "sessions": [{"duration": 30}]},
///   {"id": "u-2", "sessions": []}
/// ]}
/// ```
/// A bare top-level array of users is accepted too.
pub fn parse_users(content: &str) -> Result<UserMetrics, HandlerError> {
    let json: Value = serde_json::from_str(content)
        .map_err(|e| HandlerError::Parse(format!("invalid JSON: {}", e)))?;

    let users = match &json {
        Value::Array(users) => users,
        Value::Object(root) => root
            .get("users")
            .and_then(Value::as_array)
            .ok_or_else(|| HandlerError::Malformed("missing \"users\" array".to_string()))?,
        _ => {
            return Err(HandlerError::Malformed(
                "JSON root must be an array or an object with a \"users\" array".to_string(),
            ));
        }
    };

    let mut metrics =
        UserMetrics { total_users: 0, active_users: 0, total_sessions: 0, invalid_records: 0 };

    for user in users {
        match inspect_user(user) {
            Some((active, sessions)) => {
                metrics.total_users += 1;
                metrics.total_sessions += sessions;
                if active {
                    metrics.active_users += 1;
                }
            }
            None => metrics.invalid_records += 1,
        }
    }

    Ok(metrics)
}

/// Returns `(active, session_count)` for a well-formed user entry.
fn inspect_user(user: &Value) -> Option<(bool, usize)> {
    let obj = user.as_object()?;

    match obj.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => {}
        Some(Value::Number(_)) => {}
        _ => return None,
    }

    let active = match obj.get("active") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(active)) => *active,
        Some(_) => return None,
    };

    let sessions = match obj.get("sessions") {
        None | Some(Value::Null) => 0,
        Some(Value::Array(sessions)) => sessions.len(),
        Some(_) => return None,
    };

    Some((active, sessions))
}
