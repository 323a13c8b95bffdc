use std::fmt;

use chrono::{DateTime, Utc};
use tracing::info;

/// What happened, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    ConnOpen,
    ConnClose,
    ConnTimeout,
    ConnError,
    LoginSuccess,
    LoginFailure,
    LoginBlockedUser,
    LoginBlockedIp,
    AuthDenied,
    RequestOk,
    RequestError,
}

impl AuditKind {
    /// Stable snake_case name, the form that lands in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::ConnOpen => "conn_open",
            AuditKind::ConnClose => "conn_close",
            AuditKind::ConnTimeout => "conn_timeout",
            AuditKind::ConnError => "conn_error",
            AuditKind::LoginSuccess => "login_success",
            AuditKind::LoginFailure => "login_failure",
            AuditKind::LoginBlockedUser => "login_blocked_user",
            AuditKind::LoginBlockedIp => "login_blocked_ip",
            AuditKind::AuthDenied => "auth_denied",
            AuditKind::RequestOk => "request_ok",
            AuditKind::RequestError => "request_error",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete audit record: who did what from where, and how it ended.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub peer: String,
    pub user: String,
    pub action: String,
    pub message: String,
}

impl AuditEvent {
    /// Stamp an event with the current wall-clock time. Callers pass
    /// [`crate::messages::UNKNOWN_FIELD`] for fields they cannot name.
    pub fn new(
        kind: AuditKind,
        peer: impl Into<String>,
        user: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            peer: peer.into(),
            user: user.into(),
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Destination for audit events. The connection layer emits exactly one
/// event per gated outcome; storage and rotation are the sink's business.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Default sink: forwards every event to `tracing` at INFO.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAudit;

impl AuditSink for TracingAudit {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "wardline::audit",
            event = event.kind.as_str(),
            peer = %event.peer,
            user = %event.user,
            action = %event.action,
            "{}",
            event.message
        );
    }
}

/// Sink that discards everything, for embedders that bring their own
/// logging and for quiet tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn record(&self, _event: AuditEvent) {}
}
