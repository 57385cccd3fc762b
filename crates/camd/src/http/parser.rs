// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Re-entrant HTTP/1.1 request parser.
//!
//! # State machine
//!
//! ```text
//! METHOD --' '--> PATH --' '--> VERSION --LF--> HEADERS --empty line--> BODY --len--> COMPLETE
//!                                                  |                                    ^
//!                                                  +------- Content-Length: 0 ----------+
//! ```
//!
//! Each [`HttpParser::feed`] call consumes the new bytes only and resumes in
//! the state the previous call stopped in, so a request split across any
//! number of reads parses identically to one contiguous read. Content-Length
//! is validated when its header line completes, before any body byte is
//! buffered. Nothing is exposed until the request is complete.

use super::util::is_header_name_byte;
use crate::config::{
    MAX_CONTENT_LENGTH, MAX_HEADERS, MAX_HEADER_FIELD_LEN, MAX_METHOD_LEN, MAX_PATH_LEN,
    MAX_VERSION_LEN,
};
use crate::error::{Error, Result};

/// Parser position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseState {
    Method,
    Path,
    Version,
    Headers,
    Body,
    Complete,
}

/// Fully received HTTP request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub version: String,
    /// Header block in arrival order; names keep their original case.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Declared Content-Length (0 when absent). Always equals `body.len()`.
    pub content_length: usize,
}

impl HttpRequest {
    /// Case-insensitive header lookup (first match).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// SOAPAction from the header or the `action` parameter of Content-Type.
    pub fn soap_action(&self) -> Option<&str> {
        if let Some(v) = self.header("SOAPAction") {
            return Some(v.trim_matches('"'));
        }
        self.content_type()?
            .split(';')
            .filter_map(|p| p.trim().strip_prefix("action="))
            .map(|v| v.trim_matches('"'))
            .next()
    }
}

/// Outcome of a [`HttpParser::feed`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseStatus {
    Complete(HttpRequest),
    NeedMore,
}

/// Incremental request parser. One instance per connection.
#[derive(Debug)]
pub struct HttpParser {
    state: ParseState,
    token: Vec<u8>,
    request: HttpRequest,
    content_length: Option<usize>,
    failed: Option<Error>,
}

impl Default for HttpParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::Method,
            token: Vec::with_capacity(64),
            request: HttpRequest::default(),
            content_length: None,
            failed: None,
        }
    }

    pub fn state(&self) -> ParseState {
        self.state
    }

    /// Forget all progress and start a new request.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Consume newly read bytes.
    ///
    /// Returns the request once the last body byte arrives. Bytes after a
    /// complete request are ignored (connections are not kept alive). After
    /// an error, every later call returns the same error until [`reset`].
    ///
    /// [`reset`]: HttpParser::reset
    pub fn feed(&mut self, data: &[u8]) -> Result<ParseStatus> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }
        if self.state == ParseState::Complete {
            return Err(Error::invalid("request already complete; reset parser"));
        }

        match self.consume(data) {
            Ok(true) => {
                self.state = ParseState::Complete;
                let mut request = std::mem::take(&mut self.request);
                request.content_length = self.content_length.unwrap_or(0);
                Ok(ParseStatus::Complete(request))
            }
            Ok(false) => Ok(ParseStatus::NeedMore),
            Err(e) => {
                log::debug!("[HTTP] parse error in state {:?}: {}", self.state, e);
                self.failed = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Returns `Ok(true)` once the request is complete.
    fn consume(&mut self, data: &[u8]) -> Result<bool> {
        let mut i = 0;
        while i < data.len() {
            if self.state == ParseState::Body {
                let want = self.content_length.unwrap_or(0) - self.request.body.len();
                let take = want.min(data.len() - i);
                self.request.body.extend_from_slice(&data[i..i + take]);
                i += take;
                if self.request.body.len() == self.content_length.unwrap_or(0) {
                    return Ok(true);
                }
                continue;
            }

            let b = data[i];
            i += 1;
            match self.state {
                ParseState::Method => self.on_method_byte(b)?,
                ParseState::Path => self.on_path_byte(b)?,
                ParseState::Version => self.on_version_byte(b)?,
                ParseState::Headers => {
                    if self.on_header_byte(b)? {
                        let declared = self.content_length.unwrap_or(0);
                        if declared == 0 {
                            return Ok(true);
                        }
                        self.request.body.reserve_exact(declared);
                        self.state = ParseState::Body;
                    }
                }
                // Body is drained above; Complete ends the loop by returning.
                ParseState::Body | ParseState::Complete => {}
            }
        }
        Ok(false)
    }

    fn on_method_byte(&mut self, b: u8) -> Result<()> {
        if b == b' ' {
            if self.token.is_empty() {
                return Err(Error::invalid("empty request method"));
            }
            self.request.method = take_token(&mut self.token);
            self.state = ParseState::Path;
            return Ok(());
        }
        if !b.is_ascii_alphabetic() {
            return Err(Error::invalid("invalid byte in request method"));
        }
        push_limited(&mut self.token, b, MAX_METHOD_LEN, "request method")
    }

    fn on_path_byte(&mut self, b: u8) -> Result<()> {
        if b == b' ' {
            if self.token.is_empty() {
                return Err(Error::invalid("empty request path"));
            }
            self.request.path = take_token(&mut self.token);
            self.state = ParseState::Version;
            return Ok(());
        }
        if b.is_ascii_control() {
            return Err(Error::invalid("control byte in request path"));
        }
        push_limited(&mut self.token, b, MAX_PATH_LEN, "request path")
    }

    fn on_version_byte(&mut self, b: u8) -> Result<()> {
        match b {
            b'\r' => Ok(()),
            b'\n' => {
                let version = take_token(&mut self.token);
                if !version.starts_with("HTTP/") {
                    return Err(Error::invalid(format!("unsupported version '{}'", version)));
                }
                self.request.version = version;
                self.state = ParseState::Headers;
                Ok(())
            }
            _ => push_limited(&mut self.token, b, MAX_VERSION_LEN, "HTTP version"),
        }
    }

    /// Returns `Ok(true)` on the blank line that ends the header block.
    fn on_header_byte(&mut self, b: u8) -> Result<bool> {
        match b {
            b'\r' => Ok(false),
            b'\n' => {
                if self.token.is_empty() {
                    return Ok(true);
                }
                let line = std::mem::take(&mut self.token);
                self.on_header_line(&line)?;
                Ok(false)
            }
            // name + ':' + space + value
            _ => push_limited(
                &mut self.token,
                b,
                2 * MAX_HEADER_FIELD_LEN + 2,
                "header line",
            )
            .map(|()| false),
        }
    }

    fn on_header_line(&mut self, line: &[u8]) -> Result<()> {
        let colon = line
            .iter()
            .position(|&c| c == b':')
            .ok_or_else(|| Error::invalid("header line without ':'"))?;
        let (name, value) = (&line[..colon], &line[colon + 1..]);

        if name.is_empty() || name.len() > MAX_HEADER_FIELD_LEN {
            return Err(Error::invalid("header name length out of range"));
        }
        if !name.iter().all(|b| is_header_name_byte(*b)) {
            return Err(Error::invalid("invalid character in header name"));
        }
        let value = std::str::from_utf8(value)
            .map_err(|_| Error::invalid("header value is not UTF-8"))?
            .trim();
        if value.len() > MAX_HEADER_FIELD_LEN {
            return Err(Error::invalid("header value too long"));
        }
        if self.request.headers.len() >= MAX_HEADERS {
            return Err(Error::invalid("too many headers"));
        }

        // Name bytes are ASCII by construction.
        let name = String::from_utf8_lossy(name).into_owned();
        if name.eq_ignore_ascii_case("Content-Length") {
            let declared: usize = value
                .parse()
                .map_err(|_| Error::invalid(format!("bad Content-Length '{}'", value)))?;
            if declared > MAX_CONTENT_LENGTH {
                return Err(Error::invalid(format!(
                    "Content-Length {} exceeds limit {}",
                    declared, MAX_CONTENT_LENGTH
                )));
            }
            if matches!(self.content_length, Some(prev) if prev != declared) {
                return Err(Error::invalid("conflicting Content-Length headers"));
            }
            self.content_length = Some(declared);
        }
        self.request.headers.push((name, value.to_string()));
        Ok(())
    }
}

fn push_limited(token: &mut Vec<u8>, b: u8, limit: usize, what: &str) -> Result<()> {
    if token.len() + 1 >= limit {
        return Err(Error::invalid(format!("{} too long", what)));
    }
    token.push(b);
    Ok(())
}

fn take_token(token: &mut Vec<u8>) -> String {
    let s = String::from_utf8_lossy(token).into_owned();
    token.clear();
    s
}

/// Parse a request that is expected to be fully buffered.
pub fn parse_request(data: &[u8]) -> Result<ParseStatus> {
    HttpParser::new().feed(data)
}
