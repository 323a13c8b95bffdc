use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Action handled by the connection core itself: credential exchange.
pub const ACTION_LOGIN: &str = "login";
/// Action handled by the connection core itself: liveness probe.
pub const ACTION_PING: &str = "ping";

/// Placeholder used in audit output when a field is unknown.
pub const UNKNOWN_FIELD: &str = "-";

/// Outcome marker carried by every response.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// One client request. Exactly one of these travels per wire line.
///
/// `action` is always present; the remaining fields are optional and are
/// omitted from the encoded line when unset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Request {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<u32>,
}

impl Request {
    /// Create a request carrying only an action name.
    pub fn new(action: impl Into<String>) -> Self {
        Request {
            action: action.into(),
            username: None,
            password: None,
            token: None,
            record: None,
            record_id: None,
        }
    }

    /// Create a login request for the given credentials.
    pub fn login(username: impl Into<String>, password: impl Into<String>) -> Self {
        let mut request = Request::new(ACTION_LOGIN);
        request.username = Some(username.into());
        request.password = Some(password.into());
        request
    }

    /// Create a liveness probe request.
    pub fn ping() -> Self {
        Request::new(ACTION_PING)
    }

    /// Attach a record payload.
    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    /// Attach a record id, for lookups and deletions.
    pub fn with_record_id(mut self, id: u32) -> Self {
        self.record_id = Some(id);
        self
    }

    /// Attach an explicit session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Check whether this is a login request. Action names are
    /// case-insensitive.
    pub fn is_login(&self) -> bool {
        self.action.eq_ignore_ascii_case(ACTION_LOGIN)
    }

    /// Check whether this is a liveness probe.
    pub fn is_ping(&self) -> bool {
        self.action.eq_ignore_ascii_case(ACTION_PING)
    }
}

/// One server response. Mirrors [`Request`]: a mandatory status plus
/// optional fields omitted from the line when unset.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Response {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Record>>,
}

impl Response {
    /// Create a success response with a human-readable message.
    pub fn ok(message: impl Into<String>) -> Self {
        Response {
            status: Status::Ok,
            message: Some(message.into()),
            token: None,
            record: None,
            records: None,
        }
    }

    /// Create an error response with a human-readable message.
    pub fn error(message: impl Into<String>) -> Self {
        Response {
            status: Status::Error,
            message: Some(message.into()),
            token: None,
            record: None,
            records: None,
        }
    }

    /// Attach a session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Attach a single record payload.
    pub fn with_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    /// Attach a list of records.
    pub fn with_records(mut self, records: Vec<Record>) -> Self {
        self.records = Some(records);
        self
    }

    /// Check whether the response reports success.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Business payload ferried between client and dispatcher. The connection
/// core never inspects it beyond decoding.
///
/// Calendar dates travel as `YYYY-MM-DD` text, which is what
/// [`NaiveDate`] serializes to by default.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    pub name: String,
    pub age: u32,
    pub birth_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance_plan: Option<String>,
}

impl Record {
    /// Create a record with the mandatory fields set and everything else
    /// empty.
    pub fn new(name: impl Into<String>, age: u32, birth_date: NaiveDate) -> Self {
        Record {
            id: None,
            name: name.into(),
            age,
            birth_date,
            id_number: None,
            phone: None,
            address: None,
            email: None,
            gender: None,
            medical_history: None,
            insurance_plan: None,
        }
    }
}
