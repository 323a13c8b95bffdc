use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::anyhow;
use async_trait::async_trait;

use crate::messages::{Record, Request, Response};

/// Business actions the bundled directory understands.
pub const ACTION_CREATE_RECORD: &str = "create_record";
pub const ACTION_GET_RECORD: &str = "get_record";
pub const ACTION_LIST_RECORDS: &str = "list_records";
pub const ACTION_UPDATE_RECORD: &str = "update_record";
pub const ACTION_DELETE_RECORD: &str = "delete_record";

/// Business-side collaborator invoked once a request has cleared the
/// auth gate.
///
/// A returned [`Response`] goes to the peer as-is, business errors
/// included. A returned `Err` is an internal failure: the connection
/// layer logs it in full and sends the peer a generic error instead.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, request: &Request) -> anyhow::Result<Response>;
}

/// In-memory record directory. Backs the bundled server binary and the
/// integration tests; real deployments supply their own [`Dispatcher`].
#[derive(Default)]
pub struct RecordDirectory {
    state: Mutex<DirectoryState>,
}

struct DirectoryState {
    next_id: u32,
    records: HashMap<u32, Record>,
}

impl Default for DirectoryState {
    fn default() -> Self {
        Self {
            next_id: 1,
            records: HashMap::new(),
        }
    }
}

impl RecordDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, DirectoryState>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("record directory lock poisoned"))
    }

    fn create(&self, request: &Request) -> anyhow::Result<Response> {
        let mut record = match &request.record {
            Some(record) => record.clone(),
            None => return Ok(Response::error("a record payload is required")),
        };
        let mut state = self.lock()?;
        let id = state.next_id;
        state.next_id += 1;
        record.id = Some(id);
        state.records.insert(id, record.clone());
        Ok(Response::ok(format!("record {} created", id)).with_record(record))
    }

    fn get(&self, request: &Request) -> anyhow::Result<Response> {
        let id = match request.record_id {
            Some(id) => id,
            None => return Ok(Response::error("a record id is required")),
        };
        let state = self.lock()?;
        Ok(match state.records.get(&id) {
            Some(record) => {
                Response::ok(format!("record {} found", id)).with_record(record.clone())
            }
            None => Response::error(format!("record {} not found", id)),
        })
    }

    fn list(&self) -> anyhow::Result<Response> {
        let state = self.lock()?;
        let mut records: Vec<Record> = state.records.values().cloned().collect();
        records.sort_by_key(|record| record.id);
        Ok(Response::ok(format!("{} records", records.len())).with_records(records))
    }

    fn update(&self, request: &Request) -> anyhow::Result<Response> {
        let record = match &request.record {
            Some(record) => record.clone(),
            None => return Ok(Response::error("a record payload is required")),
        };
        let id = match record.id {
            Some(id) => id,
            None => return Ok(Response::error("the record must carry its id")),
        };
        let mut state = self.lock()?;
        if !state.records.contains_key(&id) {
            return Ok(Response::error(format!("record {} not found", id)));
        }
        state.records.insert(id, record.clone());
        Ok(Response::ok(format!("record {} updated", id)).with_record(record))
    }

    fn delete(&self, request: &Request) -> anyhow::Result<Response> {
        let id = match request.record_id {
            Some(id) => id,
            None => return Ok(Response::error("a record id is required")),
        };
        let mut state = self.lock()?;
        Ok(match state.records.remove(&id) {
            Some(_) => Response::ok(format!("record {} deleted", id)),
            None => Response::error(format!("record {} not found", id)),
        })
    }
}

#[async_trait]
impl Dispatcher for RecordDirectory {
    async fn dispatch(&self, request: &Request) -> anyhow::Result<Response> {
        match request.action.as_str() {
            ACTION_CREATE_RECORD => self.create(request),
            ACTION_GET_RECORD => self.get(request),
            ACTION_LIST_RECORDS => self.list(),
            ACTION_UPDATE_RECORD => self.update(request),
            ACTION_DELETE_RECORD => self.delete(request),
            other => Ok(Response::error(format!("unrecognized action: {}", other))),
        }
    }
}
