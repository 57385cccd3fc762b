// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP response value and wire serialization.

use super::util::{concat_bounded, is_header_name_byte};
use crate::error::{Error, Result};

/// Content type of SOAP 1.2 envelopes.
pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Outgoing HTTP response. Always sent with `Connection: close`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    /// Extra headers written after the fixed block.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Reason phrase for the status codes this server emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        100..=199 => "Informational",
        200..=299 => "Success",
        300..=399 => "Redirection",
        400..=499 => "Client Error",
        _ => "Internal Server Error",
    }
}

impl HttpResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// 200 with a SOAP envelope body.
    pub fn ok_soap(body: Vec<u8>) -> Self {
        Self::new(200, SOAP_CONTENT_TYPE, body)
    }

    pub fn bad_request() -> Self {
        Self::new(400, "text/plain", b"400 Bad Request".to_vec())
    }

    pub fn not_found() -> Self {
        Self::new(404, "text/plain", b"404 Not Found".to_vec())
    }

    pub fn method_not_allowed() -> Self {
        let mut resp = Self::new(405, "text/plain", b"405 Method Not Allowed".to_vec());
        resp.headers.push(("Allow".to_string(), "POST".to_string()));
        resp
    }

    pub fn payload_too_large() -> Self {
        Self::new(413, "text/plain", b"413 Payload Too Large".to_vec())
    }

    pub fn internal_error() -> Self {
        Self::new(500, "text/plain", b"500 Internal Server Error".to_vec())
    }

    /// Append a header. Names are restricted to `[A-Za-z0-9_-]`; values may
    /// not contain CR or LF.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.bytes().all(is_header_name_byte) {
            return Err(Error::invalid(format!("invalid header name '{}'", name)));
        }
        if value.bytes().any(|b| b == b'\r' || b == b'\n') {
            return Err(Error::invalid("header value contains CR/LF"));
        }
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn head(&self) -> String {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len()
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        head
    }

    /// Serialized length in bytes.
    pub fn wire_len(&self) -> usize {
        self.head().len() + self.body.len()
    }

    /// Serialize into a new buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let head = self.head();
        let mut out = Vec::with_capacity(head.len() + self.body.len());
        out.extend_from_slice(head.as_bytes());
        out.extend_from_slice(&self.body);
        out
    }

    /// Serialize into a caller-owned buffer. Fails with `BUFFER_TOO_SMALL`
    /// (writing nothing past `buf.len()`) when the response does not fit.
    pub fn write_into(&self, buf: &mut [u8]) -> Result<usize> {
        let used = concat_bounded(buf, 0, self.head().as_bytes())?;
        concat_bounded(buf, used, &self.body)
    }
}
