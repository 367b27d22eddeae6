//! Request normalization.
//!
//! Turns the raw pieces of an inbound request into a [`NewCapturedRequest`]:
//! header joining, `code` field extraction from JSON bodies, and truncation
//! to the column limits. None of these steps can fail; malformed input
//! falls back to the raw text.

use chrono::{DateTime, Local};

use crate::models::{
    NewCapturedRequest, BODY_MAX, CLIENT_IP_MAX, HEADERS_MAX, METHOD_MAX, PATH_MAX,
    UNKNOWN_CLIENT,
};

/// Name of the JSON field whose value replaces the raw body.
pub const CODE_FIELD: &str = "code";

/// Raw request pieces as seen by the capture middleware.
#[derive(Debug, Clone)]
pub struct RawCapture<'a> {
    pub method: &'a str,
    /// Path plus query string, verbatim.
    pub path: &'a str,
    /// Header name/value pairs in wire order.
    pub headers: Vec<(&'a str, &'a str)>,
    pub body: &'a [u8],
    pub client_ip: Option<String>,
    pub timestamp: DateTime<Local>,
}

/// Build a store-ready record from raw request pieces.
pub fn build_record(raw: RawCapture<'_>) -> NewCapturedRequest {
    let body = String::from_utf8_lossy(raw.body);
    let client_ip = raw
        .client_ip
        .filter(|ip| !ip.is_empty())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());

    NewCapturedRequest {
        method: truncate_chars(raw.method, METHOD_MAX),
        path: truncate_chars(raw.path, PATH_MAX),
        headers: truncate_chars(&join_headers(raw.headers), HEADERS_MAX),
        body: truncate_chars(&extract_code(&body), BODY_MAX),
        timestamp: raw.timestamp,
        client_ip: truncate_chars(&client_ip, CLIENT_IP_MAX),
        kind: String::new(),
    }
}

/// Return the `code` field of a JSON object body, or the body unchanged.
///
/// String values are returned without quotes; other non-null values are
/// rendered as compact JSON. Anything that is not a JSON object with a
/// non-null `code` yields the raw body.
pub fn extract_code(body: &str) -> String {
    if body.trim().is_empty() {
        return body.to_string();
    }
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    match map.get(CODE_FIELD) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => body.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Join headers as `name: value` lines.
///
/// A name that appears more than once is emitted at its first position with
/// all of its values joined by `,`.
pub fn join_headers<'a, I>(headers: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for (name, value) in headers {
        match grouped
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some((_, values)) => values.push(value),
            None => grouped.push((name, vec![value])),
        }
    }
    grouped
        .iter()
        .map(|(name, values)| format!("{}: {}", name, values.join(",")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
