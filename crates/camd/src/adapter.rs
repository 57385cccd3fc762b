// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport <-> protocol conversion.
//!
//! The protocol core only sees [`ProtocolRequest`] / [`ProtocolResponse`].
//! Each transport implements [`TransportAdapter`] to get in and out of that
//! shape; [`HttpAdapter`] is the one shipped here.

use crate::http::{HttpRequest, HttpResponse, SOAP_CONTENT_TYPE};
use crate::soap::SoapRequest;
use std::net::SocketAddr;

/// Non-owning handle back to the transport object a request arrived on.
///
/// Only identifies the connection so a reply can be routed; it never keeps
/// the connection alive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportRef {
    pub connection_id: u64,
    pub peer: Option<SocketAddr>,
}

/// Transport-independent request.
#[derive(Debug, Clone, Default)]
pub struct ProtocolRequest {
    pub path: String,
    /// SOAP action hint from the transport, if it carried one.
    pub action: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Decoded envelope, filled in by the server context before dispatch.
    pub envelope: Option<SoapRequest>,
    pub transport: TransportRef,
}

impl ProtocolRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport-independent response. Unset fields get defaults on the way out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolResponse {
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub transport: TransportRef,
}

impl ProtocolResponse {
    /// Empty response bound to the request's transport.
    pub fn for_request(request: &ProtocolRequest) -> Self {
        Self {
            transport: request.transport,
            ..Self::default()
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = Some(body);
    }

    pub fn status_or_default(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    pub fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or(SOAP_CONTENT_TYPE)
    }
}

/// Conversion between one transport's request/response and the protocol shape.
pub trait TransportAdapter {
    type Request;
    type Response;

    fn to_protocol(&self, request: &Self::Request, transport: TransportRef) -> ProtocolRequest;

    fn from_protocol(&self, response: ProtocolResponse) -> Self::Response;
}

/// HTTP/1.1 adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpAdapter;

impl TransportAdapter for HttpAdapter {
    type Request = HttpRequest;
    type Response = HttpResponse;

    fn to_protocol(&self, request: &HttpRequest, transport: TransportRef) -> ProtocolRequest {
        ProtocolRequest {
            path: request.path.clone(),
            action: request.soap_action().map(str::to_string),
            headers: request.headers.clone(),
            body: request.body.clone(),
            envelope: None,
            transport,
        }
    }

    fn from_protocol(&self, response: ProtocolResponse) -> HttpResponse {
        let status = response.status_or_default();
        let content_type = response.content_type_or_default().to_string();
        let mut out = HttpResponse::new(status, content_type, response.body.unwrap_or_default());
        for (name, value) in response.headers {
            if let Err(e) = out.add_header(&name, &value) {
                log::warn!("[HTTP] dropping header '{}': {}", name.escape_debug(), e);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> HttpRequest {
        HttpRequest {
            method: "POST".into(),
            path: "/onvif/device_service".into(),
            version: "HTTP/1.1".into(),
            headers: vec![
                ("Host".into(), "cam".into()),
                ("SOAPAction".into(), "\"http://www.onvif.org/ver10/device/wsdl/GetHostname\"".into()),
            ],
            body: b"<x/>".to_vec(),
            content_length: 4,
        }
    }

    #[test]
    fn test_to_protocol_copies_fields() {
        let transport = TransportRef {
            connection_id: 9,
            peer: "10.0.0.2:5000".parse().ok(),
        };
        let req = HttpAdapter.to_protocol(&sample_request(), transport);
        assert_eq!(req.path, "/onvif/device_service");
        assert_eq!(req.body, b"<x/>");
        assert_eq!(req.header("host"), Some("cam"));
        assert!(req.action.as_deref().is_some_and(|a| a.ends_with("GetHostname")));
        assert_eq!(req.transport, transport);
        assert!(req.envelope.is_none());
    }

    #[test]
    fn test_from_protocol_applies_defaults() {
        let req = HttpAdapter.to_protocol(&sample_request(), TransportRef::default());
        let mut resp = ProtocolResponse::for_request(&req);
        resp.set_body(b"<ok/>".to_vec());
        let http = HttpAdapter.from_protocol(resp);
        assert_eq!(http.status, 200);
        assert_eq!(http.content_type, SOAP_CONTENT_TYPE);
        assert_eq!(http.body, b"<ok/>");
    }

    #[test]
    fn test_from_protocol_keeps_explicit_values() {
        let resp = ProtocolResponse {
            status: Some(500),
            content_type: Some("text/plain".into()),
            headers: vec![("X-Fault".into(), "1".into())],
            body: None,
            transport: TransportRef::default(),
        };
        let http = HttpAdapter.from_protocol(resp);
        assert_eq!(http.status, 500);
        assert_eq!(http.content_type, "text/plain");
        assert!(http.body.is_empty());
        assert_eq!(http.header("x-fault"), Some("1"));
    }

    #[test]
    fn test_from_protocol_drops_unsafe_headers() {
        let resp = ProtocolResponse {
            status: Some(200),
            content_type: None,
            headers: vec![
                ("X-Split".into(), "a\r\nSet-Cookie: evil=1".into()),
                ("Bad Name".into(), "v".into()),
                ("X-Kept".into(), "yes".into()),
            ],
            body: Some(b"<ok/>".to_vec()),
            transport: TransportRef::default(),
        };
        let http = HttpAdapter.from_protocol(resp);
        assert_eq!(http.headers.len(), 1);
        assert_eq!(http.header("x-kept"), Some("yes"));
        assert!(http.header("x-split").is_none());
        let wire = String::from_utf8(http.to_bytes()).expect("ascii");
        assert!(!wire.contains("Set-Cookie"));
    }
}
