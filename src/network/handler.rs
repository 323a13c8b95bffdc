use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error};

use crate::audit::{AuditEvent, AuditKind, AuditSink};
use crate::auth::AuthService;
use crate::dispatch::Dispatcher;
use crate::messages::wire::{LineCodec, WireError};
use crate::messages::{Request, Response, ACTION_LOGIN, UNKNOWN_FIELD};

/// Serves one accepted connection: a strict receive, gate, dispatch,
/// respond cycle until the peer hangs up, goes quiet, or breaks framing.
pub(crate) struct ConnectionHandler {
    peer: SocketAddr,
    auth: Arc<AuthService>,
    dispatcher: Arc<dyn Dispatcher>,
    audit: Arc<dyn AuditSink>,
    codec: LineCodec,
}

impl ConnectionHandler {
    pub fn new(
        peer: SocketAddr,
        auth: Arc<AuthService>,
        dispatcher: Arc<dyn Dispatcher>,
        audit: Arc<dyn AuditSink>,
        codec: LineCodec,
    ) -> Self {
        Self {
            peer,
            auth,
            dispatcher,
            audit,
            codec,
        }
    }

    /// Drive the connection until it ends. Never panics the task; every
    /// exit path is logged and the socket is shut down.
    pub async fn run(self, stream: TcpStream) {
        self.emit(
            AuditKind::ConnOpen,
            UNKNOWN_FIELD,
            UNKNOWN_FIELD,
            "connection opened",
        );
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = write_half;
        loop {
            let request: Request = match self.codec.read_frame_timed(&mut reader).await {
                Ok(request) => request,
                Err(WireError::ConnectionClosed) => {
                    self.emit(
                        AuditKind::ConnClose,
                        UNKNOWN_FIELD,
                        UNKNOWN_FIELD,
                        "peer closed the connection",
                    );
                    break;
                }
                Err(WireError::ReadTimeout { timeout }) => {
                    self.emit(
                        AuditKind::ConnTimeout,
                        UNKNOWN_FIELD,
                        UNKNOWN_FIELD,
                        format!("no request within {:?}, closing", timeout),
                    );
                    break;
                }
                Err(err) => {
                    self.emit(
                        AuditKind::ConnError,
                        UNKNOWN_FIELD,
                        UNKNOWN_FIELD,
                        format!("failed to read request: {}", err),
                    );
                    break;
                }
            };
            let response = self.handle_request(&request).await;
            if let Err(err) = self.codec.write_frame_timed(&mut writer, &response).await {
                self.emit(
                    AuditKind::ConnError,
                    UNKNOWN_FIELD,
                    request.action.as_str(),
                    format!("failed to write response: {}", err),
                );
                break;
            }
        }
        if let Err(err) = writer.shutdown().await {
            debug!("socket shutdown for {}: {}", self.peer, err);
        }
    }

    /// Gate and dispatch a single request. Always produces a response.
    async fn handle_request(&self, request: &Request) -> Response {
        if request.is_login() {
            return self.handle_login(request);
        }
        let action = request.action.as_str();
        // The liveness probe stays answerable no matter what: no token,
        // no lockout checks.
        if request.is_ping() {
            self.emit(AuditKind::RequestOk, self.user_hint(request), action, "pong");
            return Response::ok("pong");
        }
        let token = request.token.as_deref().unwrap_or("");
        if !self.auth.validate(token) {
            self.emit(
                AuditKind::AuthDenied,
                UNKNOWN_FIELD,
                action,
                "missing, unknown or expired token",
            );
            return Response::error("unauthorized or session expired, log in first");
        }
        let user = self
            .auth
            .user_for_token(token)
            .unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        match self.dispatcher.dispatch(request).await {
            Ok(response) => {
                self.emit(AuditKind::RequestOk, user.as_str(), action, "handled");
                response
            }
            Err(err) => {
                // Full detail stays on the server; the peer gets a
                // generic line.
                error!(
                    "dispatcher failed for {} from {}: {:#}",
                    action, self.peer, err
                );
                self.emit(
                    AuditKind::RequestError,
                    user.as_str(),
                    action,
                    format!("internal failure: {}", err),
                );
                Response::error("internal error")
            }
        }
    }

    /// Step one of the gate: lockout checks, then the credential check.
    /// The source address is consulted before the named user.
    fn handle_login(&self, request: &Request) -> Response {
        let peer_ip = self.peer.ip().to_string();
        let username = request.username.as_deref().unwrap_or("");
        if let Some(remaining) = self.auth.ip_locked_remaining(&peer_ip) {
            let message = format!(
                "source address is locked, retry in {} s",
                remaining.as_secs()
            );
            self.emit(
                AuditKind::LoginBlockedIp,
                UNKNOWN_FIELD,
                ACTION_LOGIN,
                message.as_str(),
            );
            return Response::error(message);
        }
        if let Some(remaining) = self.auth.user_locked_remaining(username) {
            let message = format!("user is locked, retry in {} s", remaining.as_secs());
            self.emit(
                AuditKind::LoginBlockedUser,
                username,
                ACTION_LOGIN,
                message.as_str(),
            );
            return Response::error(message);
        }
        let password = request.password.as_deref().unwrap_or("");
        match self.auth.login(username, password, &peer_ip) {
            Some(token) => {
                self.emit(
                    AuditKind::LoginSuccess,
                    username,
                    ACTION_LOGIN,
                    "login successful",
                );
                Response::ok("login successful").with_token(token)
            }
            None => {
                let audit_user = if username.is_empty() {
                    UNKNOWN_FIELD
                } else {
                    username
                };
                self.emit(
                    AuditKind::LoginFailure,
                    audit_user,
                    ACTION_LOGIN,
                    "invalid credentials or temporarily locked",
                );
                Response::error("invalid credentials or temporarily locked")
            }
        }
    }

    fn user_hint(&self, request: &Request) -> String {
        request
            .token
            .as_deref()
            .and_then(|token| self.auth.user_for_token(token))
            .unwrap_or_else(|| UNKNOWN_FIELD.to_string())
    }

    fn emit(
        &self,
        kind: AuditKind,
        user: impl Into<String>,
        action: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.audit.record(AuditEvent::new(
            kind,
            self.peer.ip().to_string(),
            user,
            action,
            message,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NullAudit;
    use crate::auth::{AuthPolicy, AuthService, CredentialStore, LockoutPolicy, ManualClock};
    use crate::dispatch::Dispatcher;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StaticDispatcher;

    #[async_trait]
    impl Dispatcher for StaticDispatcher {
        async fn dispatch(&self, request: &Request) -> anyhow::Result<Response> {
            Ok(Response::ok(format!("handled {}", request.action)))
        }
    }

    struct FailingDispatcher;

    #[async_trait]
    impl Dispatcher for FailingDispatcher {
        async fn dispatch(&self, _request: &Request) -> anyhow::Result<Response> {
            Err(anyhow::anyhow!("backend exploded: table missing"))
        }
    }

    #[derive(Default)]
    struct CapturingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl AuditSink for CapturingSink {
        fn record(&self, event: AuditEvent) {
            if let Ok(mut events) = self.events.lock() {
                events.push(event);
            }
        }
    }

    impl CapturingSink {
        fn kinds(&self) -> Vec<AuditKind> {
            self.events
                .lock()
                .map(|events| events.iter().map(|e| e.kind).collect())
                .unwrap_or_default()
        }
    }

    fn test_auth(clock: &ManualClock, max_failures: u32) -> Arc<AuthService> {
        let mut credentials = CredentialStore::new();
        credentials.insert("admin", "1234");
        let policy = AuthPolicy {
            token_ttl: Duration::from_secs(600),
            lockout: LockoutPolicy {
                max_failures,
                failure_window: Duration::from_secs(60),
                lock_duration: Duration::from_secs(120),
            },
        };
        Arc::new(AuthService::with_clock(
            credentials,
            policy,
            Arc::new(clock.clone()),
        ))
    }

    fn handler_with(
        auth: Arc<AuthService>,
        dispatcher: Arc<dyn Dispatcher>,
        audit: Arc<dyn AuditSink>,
    ) -> ConnectionHandler {
        ConnectionHandler::new(
            "203.0.113.20:49152".parse().unwrap(),
            auth,
            dispatcher,
            audit,
            LineCodec::default(),
        )
    }

    #[tokio::test]
    async fn test_ping_needs_no_token() {
        let clock = ManualClock::new();
        let handler = handler_with(
            test_auth(&clock, 3),
            Arc::new(StaticDispatcher),
            Arc::new(NullAudit),
        );

        let response = handler.handle_request(&Request::ping()).await;
        assert!(response.is_ok());
        assert_eq!(response.message.as_deref(), Some("pong"));
    }

    #[tokio::test]
    async fn test_other_actions_need_a_valid_token() {
        let clock = ManualClock::new();
        let handler = handler_with(
            test_auth(&clock, 3),
            Arc::new(StaticDispatcher),
            Arc::new(NullAudit),
        );

        let response = handler.handle_request(&Request::new("list_records")).await;
        assert!(!response.is_ok());
        assert!(response.message.unwrap().contains("unauthorized"));

        let response = handler
            .handle_request(&Request::new("list_records").with_token("bogus"))
            .await;
        assert!(!response.is_ok());
    }

    #[tokio::test]
    async fn test_login_then_dispatch() {
        let clock = ManualClock::new();
        let handler = handler_with(
            test_auth(&clock, 3),
            Arc::new(StaticDispatcher),
            Arc::new(NullAudit),
        );

        let login = handler
            .handle_request(&Request::login("admin", "1234"))
            .await;
        assert!(login.is_ok());
        let token = login.token.unwrap();

        let response = handler
            .handle_request(&Request::new("list_records").with_token(token))
            .await;
        assert!(response.is_ok());
        assert_eq!(response.message.as_deref(), Some("handled list_records"));
    }

    #[tokio::test]
    async fn test_wrong_credentials_get_the_generic_line() {
        let clock = ManualClock::new();
        let handler = handler_with(
            test_auth(&clock, 5),
            Arc::new(StaticDispatcher),
            Arc::new(NullAudit),
        );

        let wrong_pass = handler
            .handle_request(&Request::login("admin", "4321"))
            .await;
        let unknown_user = handler
            .handle_request(&Request::login("ghost", "1234"))
            .await;
        assert_eq!(wrong_pass.message, unknown_user.message);
        assert!(!wrong_pass.is_ok());
    }

    #[tokio::test]
    async fn test_lockout_reports_remaining_wait() {
        let clock = ManualClock::new();
        let handler = handler_with(
            test_auth(&clock, 2),
            Arc::new(StaticDispatcher),
            Arc::new(NullAudit),
        );

        for _ in 0..2 {
            handler
                .handle_request(&Request::login("admin", "wrong"))
                .await;
        }
        // Correct credentials now bounce off the address lock, with the
        // wait in whole seconds.
        let blocked = handler
            .handle_request(&Request::login("admin", "1234"))
            .await;
        assert!(!blocked.is_ok());
        let message = blocked.message.unwrap();
        assert!(message.contains("locked"));
        assert!(message.contains("120 s"));
    }

    #[tokio::test]
    async fn test_lock_order_checks_address_before_user() {
        let clock = ManualClock::new();
        let handler = handler_with(
            test_auth(&clock, 2),
            Arc::new(StaticDispatcher),
            Arc::new(NullAudit),
        );

        for _ in 0..2 {
            handler
                .handle_request(&Request::login("admin", "wrong"))
                .await;
        }
        // Both keys are locked; the message must name the address.
        let blocked = handler
            .handle_request(&Request::login("admin", "1234"))
            .await;
        assert!(blocked.message.unwrap().contains("source address"));
    }

    #[tokio::test]
    async fn test_ping_ignores_lockouts() {
        let clock = ManualClock::new();
        let handler = handler_with(
            test_auth(&clock, 2),
            Arc::new(StaticDispatcher),
            Arc::new(NullAudit),
        );

        for _ in 0..2 {
            handler
                .handle_request(&Request::login("admin", "wrong"))
                .await;
        }
        let response = handler.handle_request(&Request::ping()).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_dispatcher_errors_are_masked() {
        let clock = ManualClock::new();
        let auth = test_auth(&clock, 3);
        let sink = Arc::new(CapturingSink::default());
        let handler = handler_with(
            Arc::clone(&auth),
            Arc::new(FailingDispatcher),
            Arc::clone(&sink) as Arc<dyn AuditSink>,
        );

        let login = handler
            .handle_request(&Request::login("admin", "1234"))
            .await;
        let token = login.token.unwrap();
        let response = handler
            .handle_request(&Request::new("list_records").with_token(token))
            .await;

        assert!(!response.is_ok());
        assert_eq!(response.message.as_deref(), Some("internal error"));
        // The audit trail keeps the detail the peer never sees.
        let kinds = sink.kinds();
        assert_eq!(
            kinds,
            vec![AuditKind::LoginSuccess, AuditKind::RequestError]
        );
    }

    #[tokio::test]
    async fn test_one_audit_event_per_outcome() {
        let clock = ManualClock::new();
        let sink = Arc::new(CapturingSink::default());
        let handler = handler_with(
            test_auth(&clock, 3),
            Arc::new(StaticDispatcher),
            Arc::clone(&sink) as Arc<dyn AuditSink>,
        );

        handler.handle_request(&Request::ping()).await;
        handler
            .handle_request(&Request::login("admin", "wrong"))
            .await;
        handler.handle_request(&Request::new("list_records")).await;

        let kinds = sink.kinds();
        assert_eq!(
            kinds,
            vec![
                AuditKind::RequestOk,
                AuditKind::LoginFailure,
                AuditKind::AuthDenied
            ]
        );
    }
}
