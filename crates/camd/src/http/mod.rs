// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP/1.1 request parsing and response serialization.

pub mod auth;
pub mod parser;
pub mod response;
pub mod util;

pub use auth::{BasicAuth, Credentials, DEFAULT_REALM};
pub use parser::{parse_request, HttpParser, HttpRequest, ParseState, ParseStatus};
pub use response::{reason_phrase, HttpResponse, SOAP_CONTENT_TYPE};
