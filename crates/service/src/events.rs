use std::{net::SocketAddr, time::SystemTime};

/// What a [`LogEntry`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// An authentication attempt ran to completion; `success` tells
    /// whether it was accepted.
    Authentication,
    /// A datagram arrived from a source with no device entry and no
    /// default secret.  No response was sent.
    UnknownNas,
    /// A datagram failed to parse and was discarded.
    MalformedPacket,
    /// An unexpected internal fault.
    Internal,
}

/// One structured event emitted by the authentication machinery.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub kind: EntryKind,
    pub success: bool,
    pub realm: String,
    pub account: String,
    /// The endpoint the triggering datagram arrived from.
    pub nas: SocketAddr,
    pub timestamp: SystemTime,
    pub detail: String,
}

impl LogEntry {
    pub fn new(kind: EntryKind, success: bool, nas: SocketAddr) -> Self {
        Self {
            kind,
            success,
            realm: String::new(),
            account: String::new(),
            nas,
            timestamp: SystemTime::now(),
            detail: String::new(),
        }
    }

    pub fn with_user(mut self, realm: &str, account: &str) -> Self {
        self.realm = realm.to_string();
        self.account = account.to_string();
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}
