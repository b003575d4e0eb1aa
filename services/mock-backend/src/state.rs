//! Shared state of the mock backend

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::{Mutex, RwLock};
use probe_core::UserDirectory;
use record_verifier::MemoryRecordSource;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// User id attached to requests made with the configured access token.
pub const SERVICE_USER_ID: u64 = 1;

#[derive(Debug)]
pub struct AppState {
    /// Tables, shared with verifiers that read them back.
    pub records: Arc<MemoryRecordSource>,
    users: UserDirectory,
    /// `Authorization` header value → user id.
    sessions: RwLock<HashMap<String, Value>>,
    next_id: AtomicU64,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

impl AppState {
    pub fn new(access_token: Option<String>, users: UserDirectory) -> Self {
        let mut sessions = HashMap::new();
        if let Some(token) = access_token {
            sessions.insert(token, Value::from(SERVICE_USER_ID));
        }
        Self {
            records: Arc::new(MemoryRecordSource::new()),
            users,
            sessions: RwLock::new(sessions),
            next_id: AtomicU64::new(1),
            last_timestamp: Mutex::new(None),
        }
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn user_for(&self, authorization: &str) -> Option<Value> {
        self.sessions.read().get(authorization).cloned()
    }

    /// Opens a session and returns the bare access token.
    pub fn open_session(&self, user_id: Value) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        self.sessions
            .write()
            .insert(format!("Bearer {}", token), user_id);
        token
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// RFC 3339 timestamp that is strictly later than any handed out before.
    pub fn timestamp(&self) -> String {
        let mut last = self.last_timestamp.lock();
        let mut now = Utc::now();
        if let Some(previous) = *last {
            if now <= previous {
                now = previous + Duration::milliseconds(1);
            }
        }
        *last = Some(now);
        now.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_strictly_increase() {
        let state = AppState::new(None, UserDirectory::default());
        let first = state.timestamp();
        let second = state.timestamp();
        assert!(second > first, "{} should sort after {}", second, first);
    }

    #[test]
    fn test_sessions() {
        let state = AppState::new(Some("static-token".into()), UserDirectory::default());
        assert_eq!(state.user_for("static-token"), Some(Value::from(SERVICE_USER_ID)));

        let token = state.open_session(Value::from(42));
        assert_eq!(state.user_for(&format!("Bearer {}", token)), Some(Value::from(42)));
        assert_eq!(state.user_for(&token), None);
    }
}
