//! In-memory session registry.
//!
//! Tokens are opaque hex strings handed to the browser as a cookie value.
//! Expired entries are removed lazily when looked up; there is no sweeper.

use super::password::random_hex;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Default session lifetime: 1 hour.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Token byte length before hex encoding (16 bytes = 32 hex chars).
const TOKEN_BYTES: usize = 16;

/// An active session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// Token -> session map with a fixed TTL.
#[derive(Debug)]
pub struct SessionRegistry {
    ttl: TimeDelta,
    sessions: Mutex<HashMap<String, Session>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SESSION_TTL_SECS))
    }
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a session for `username`. Returns the token.
    pub fn create(&self, username: &str) -> String {
        let token = random_hex(TOKEN_BYTES);
        let expires_at = Utc::now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.sessions.lock().insert(
            token.clone(),
            Session {
                username: username.to_string(),
                expires_at,
            },
        );
        tracing::debug!(username, "Session created");
        token
    }

    /// Look up a live session. An expired entry is removed and reported as absent.
    pub fn validate(&self, token: &str) -> Option<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock();
        let session = sessions.get(token)?;
        if session.expires_at > now {
            return Some(session.clone());
        }
        sessions.remove(token);
        tracing::debug!("Expired session evicted");
        None
    }

    /// Drop a session. Returns whether one existed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.lock().remove(token).is_some()
    }

    /// Entries currently held, including expired ones not yet looked up.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
