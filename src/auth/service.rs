use std::sync::Arc;
use std::time::Duration;

use crate::auth::clock::{Clock, SystemClock};
use crate::auth::credentials::CredentialStore;
use crate::auth::lockout::{LockoutPolicy, LockoutTracker};
use crate::auth::session::{SessionStore, DEFAULT_TOKEN_TTL};

/// Session and lockout tunables. [`Default`] gives the production values.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    pub token_ttl: Duration,
    pub lockout: LockoutPolicy,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            token_ttl: DEFAULT_TOKEN_TTL,
            lockout: LockoutPolicy::default(),
        }
    }
}

/// Credential checks, session issue/renewal and failure lockouts behind
/// one façade. Designed to be shared across connection handlers.
pub struct AuthService {
    credentials: CredentialStore,
    sessions: SessionStore,
    user_failures: LockoutTracker,
    ip_failures: LockoutTracker,
}

impl AuthService {
    /// Build a service on the system clock.
    pub fn new(credentials: CredentialStore, policy: AuthPolicy) -> Self {
        Self::with_clock(credentials, policy, Arc::new(SystemClock))
    }

    /// Build a service on an arbitrary clock. Tests pair this with
    /// [`crate::auth::ManualClock`] to step across windows and TTLs.
    pub fn with_clock(
        credentials: CredentialStore,
        policy: AuthPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            credentials,
            sessions: SessionStore::new(policy.token_ttl, Arc::clone(&clock)),
            user_failures: LockoutTracker::new(policy.lockout, Arc::clone(&clock)),
            ip_failures: LockoutTracker::new(policy.lockout, clock),
        }
    }

    /// One login attempt from `source_ip`.
    ///
    /// `None` covers every rejection the same way: an active lock on
    /// either key, an unknown user, or a wrong password. A success clears
    /// both failure counters and issues a fresh token; a failed check
    /// counts against both.
    pub fn login(&self, user: &str, password: &str, source_ip: &str) -> Option<String> {
        if self.ip_failures.is_locked(source_ip) || self.user_failures.is_locked(user) {
            return None;
        }
        if self.credentials.verify(user, password) {
            self.user_failures.clear(user);
            self.ip_failures.clear(source_ip);
            return Some(self.sessions.issue(user));
        }
        self.user_failures.record_failure(user);
        self.ip_failures.record_failure(source_ip);
        None
    }

    /// Check a session token, renewing it when it nears expiry.
    pub fn validate(&self, token: &str) -> bool {
        self.sessions.validate(token)
    }

    /// Resolve the user behind a token, for audit output. Does not touch
    /// the session's expiry.
    pub fn user_for_token(&self, token: &str) -> Option<String> {
        self.sessions.user_for_token(token)
    }

    /// Revoke a session outright.
    pub fn invalidate(&self, token: &str) -> bool {
        self.sessions.invalidate(token)
    }

    pub fn is_user_locked(&self, user: &str) -> bool {
        self.user_failures.is_locked(user)
    }

    pub fn is_ip_locked(&self, ip: &str) -> bool {
        self.ip_failures.is_locked(ip)
    }

    /// Remaining user lock, `None` when not locked. Read-only.
    pub fn user_locked_remaining(&self, user: &str) -> Option<Duration> {
        self.user_failures.locked_remaining(user)
    }

    /// Remaining source-address lock, `None` when not locked. Read-only.
    pub fn ip_locked_remaining(&self, ip: &str) -> Option<Duration> {
        self.ip_failures.locked_remaining(ip)
    }
}
