//! Fire-and-forget audit channel: every inbound request, outbound response and periodic
//! snapshot as a `(hostname, category, raw bytes)` record.
//!
//! Sinks are pluggable: zmq PUSH in production ([`crate::wire::transport::ZmqAuditSink`]),
//! in-memory for tests.

use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuditCategory {
    Request,
    Response,
    Snapshot,
}

impl AuditCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditCategory::Request => "req",
            AuditCategory::Response => "resp",
            AuditCategory::Snapshot => "snapshot",
        }
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditRecord {
    pub hostname: String,
    pub category: AuditCategory,
    pub payload: Vec<u8>,
}

impl AuditRecord {
    pub fn new(hostname: impl Into<String>, category: AuditCategory, payload: Vec<u8>) -> Self {
        Self {
            hostname: hostname.into(),
            category,
            payload,
        }
    }
}

/// Destination for audit records. Failures are the sink's to log; callers never wait on them.
pub trait AuditSink: Send + Sync {
    fn emit(&self, record: &AuditRecord);
}

/// In-memory sink that stores records for tests. Clone shares the same backing buffer.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn of_category(&self, category: AuditCategory) -> Vec<AuditRecord> {
        self.records().into_iter().filter(|r| r.category == category).collect()
    }

    pub fn clear(&self) {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, record: &AuditRecord) {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).push(record.clone());
    }
}
