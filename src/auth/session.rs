use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::auth::clock::Clock;

/// Default session lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
struct SessionEntry {
    user: String,
    expires_at: Instant,
}

/// Token-indexed session table with sliding expiry.
///
/// Tokens are random UUIDs; nothing about a user is derivable from one.
pub struct SessionStore {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a fresh token for `user`. A user may hold any number of live
    /// tokens at once.
    pub fn issue(&self, user: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let expires_at = self.clock.now() + self.ttl;
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(
                token.clone(),
                SessionEntry {
                    user: user.to_string(),
                    expires_at,
                },
            );
        }
        token
    }

    /// Check a token, sliding its expiry forward when it is close to
    /// lapsing. An expired token is removed on the spot and stays invalid
    /// from then on.
    pub fn validate(&self, token: &str) -> bool {
        if token.trim().is_empty() {
            return false;
        }
        let now = self.clock.now();
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(_) => return false,
        };
        match sessions.get_mut(token) {
            Some(entry) => {
                if entry.expires_at <= now {
                    sessions.remove(token);
                    return false;
                }
                // Renew only once less than half the lifetime remains, so
                // steady traffic does not rewrite the table on every call.
                if entry.expires_at - now < self.ttl / 2 {
                    entry.expires_at = now + self.ttl;
                }
                true
            }
            None => false,
        }
    }

    /// Look up the user behind a token without touching its expiry.
    pub fn user_for_token(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.lock().ok()?;
        sessions.get(token).map(|entry| entry.user.clone())
    }

    /// Drop a session immediately. Returns whether it existed.
    pub fn invalidate(&self, token: &str) -> bool {
        match self.sessions.lock() {
            Ok(mut sessions) => sessions.remove(token).is_some(),
            Err(_) => false,
        }
    }
}
