//! Captured-request records.
//!
//! A [`NewCapturedRequest`] is built by the capture middleware from an
//! inbound HTTP request; the store assigns it an id and hands back a
//! [`CapturedRequest`].

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Column limits, in characters. Mirrored by `CHECK` constraints in the
/// SQLite schema.
pub const METHOD_MAX: usize = 10;
pub const PATH_MAX: usize = 500;
pub const HEADERS_MAX: usize = 4000;
pub const BODY_MAX: usize = 10_000;
pub const CLIENT_IP_MAX: usize = 45;
pub const TYPE_MAX: usize = 100;

/// Placeholder stored when the peer address is not known.
pub const UNKNOWN_CLIENT: &str = "Unknown";

/// A request that has been normalized but not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: String,
    pub body: String,
    pub timestamp: DateTime<Local>,
    pub client_ip: String,
    pub kind: String,
}

impl NewCapturedRequest {
    /// Attach the store-assigned id. The copied flag always starts false.
    pub fn with_id(self, id: i64) -> CapturedRequest {
        CapturedRequest {
            id,
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body,
            timestamp: self.timestamp,
            client_ip: self.client_ip,
            is_copied: false,
            kind: self.kind,
        }
    }
}

/// A persisted capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequest {
    pub id: i64,
    pub method: String,
    pub path: String,
    pub headers: String,
    pub body: String,
    pub timestamp: DateTime<Local>,
    pub client_ip: String,
    pub is_copied: bool,
    #[serde(rename = "type")]
    pub kind: String,
}

impl CapturedRequest {
    /// Set the copied flag. Returns `true` only on the false→true
    /// transition; the flag is never cleared.
    pub fn mark_copied(&mut self) -> bool {
        if self.is_copied {
            return false;
        }
        self.is_copied = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NewCapturedRequest {
        NewCapturedRequest {
            method: "POST".to_string(),
            path: "/scan?x=1".to_string(),
            headers: "Host: localhost".to_string(),
            body: "print(1)".to_string(),
            timestamp: Local::now(),
            client_ip: "10.0.0.2".to_string(),
            kind: String::new(),
        }
    }

    #[test]
    fn test_with_id_starts_uncopied() {
        let rec = sample().with_id(7);
        assert_eq!(rec.id, 7);
        assert!(!rec.is_copied);
        assert_eq!(rec.body, "print(1)");
    }

    #[test]
    fn test_mark_copied_transitions_once() {
        let mut rec = sample().with_id(1);
        assert!(rec.mark_copied());
        assert!(rec.is_copied);
        assert!(!rec.mark_copied());
        assert!(rec.is_copied);
    }

    #[test]
    fn test_serializes_kind_as_type() {
        let rec = sample().with_id(3);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "");
        assert_eq!(json["is_copied"], false);
    }
}
