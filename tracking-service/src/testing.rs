//! In-memory backend that replays queued replies and records every call.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::db::{Backend, Procedure, Record, SqlParam, StoreError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Execute(String, Vec<SqlParam>),
    FetchOne(String, Vec<SqlParam>),
    FetchAll(String, Vec<SqlParam>),
    Procedure(Procedure, Vec<SqlParam>),
}

impl Call {
    pub(crate) fn params(&self) -> &[SqlParam] {
        match self {
            Self::Execute(_, p) | Self::FetchOne(_, p) | Self::FetchAll(_, p) => p,
            Self::Procedure(_, p) => p,
        }
    }
}

/// Replies are consumed in order; once exhausted every call yields no rows.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<Vec<Record>, StoreError>>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn rows(self, rows: Vec<Value>) -> Self {
        let records = rows.into_iter().map(record).collect();
        self.replies.lock().unwrap().push_back(Ok(records));
        self
    }

    pub(crate) fn fails(self, err: StoreError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn reply(&self, call: Call) -> Result<Vec<Record>, StoreError> {
        self.calls.lock().unwrap().push(call);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub(crate) fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("test rows must be objects, got {}", other),
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn execute_statement(&self, sql: &str, params: Vec<SqlParam>) -> Result<usize, StoreError> {
        self.reply(Call::Execute(sql.to_string(), params)).map(|rows| rows.len())
    }

    async fn fetch_one(&self, sql: &str, params: Vec<SqlParam>) -> Result<Option<Record>, StoreError> {
        self.reply(Call::FetchOne(sql.to_string(), params))
            .map(|rows| rows.into_iter().next())
    }

    async fn fetch_all(&self, sql: &str, params: Vec<SqlParam>) -> Result<Vec<Record>, StoreError> {
        self.reply(Call::FetchAll(sql.to_string(), params))
    }

    async fn call_procedure(
        &self,
        procedure: Procedure,
        params: Vec<SqlParam>,
    ) -> Result<Vec<Record>, StoreError> {
        self.reply(Call::Procedure(procedure, params))
    }
}
