// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SOAP 1.2 envelope binding.
//!
//! Inbound: envelope bytes -> operation name + flat parameter list.
//! Outbound: [`XmlElement`] tree -> envelope bytes, and fault envelopes.
//!
//! Parameters are the leaf elements below the operation element (local name
//! -> trimmed text) followed by every attribute below it, in document order.
//! Each value is also stored under its dotted path below the operation, so
//! `Position.PanTilt.x` and `Speed.PanTilt.x` stay distinguishable while
//! plain lookups by local name keep returning the first occurrence.

use crate::error::{Error, FaultCode, Result};
use roxmltree::{Document, Node};
use std::borrow::Cow;
use std::fmt::Write as _;

pub const SOAP_ENV_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const DEVICE_NS: &str = "http://www.onvif.org/ver10/device/wsdl";
pub const MEDIA_NS: &str = "http://www.onvif.org/ver10/media/wsdl";
pub const PTZ_NS: &str = "http://www.onvif.org/ver20/ptz/wsdl";
pub const IMAGING_NS: &str = "http://www.onvif.org/ver20/imaging/wsdl";
pub const SCHEMA_NS: &str = "http://www.onvif.org/ver10/schema";

/// Prefixes declared on every outbound envelope.
const ENVELOPE_NAMESPACES: &[(&str, &str)] = &[
    ("s", SOAP_ENV_NS),
    ("tds", DEVICE_NS),
    ("trt", MEDIA_NS),
    ("tptz", PTZ_NS),
    ("timg", IMAGING_NS),
    ("tt", SCHEMA_NS),
];

/// Decoded request envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SoapRequest {
    /// Local name of the first element inside `Body`.
    pub operation: String,
    /// Namespace URI of the operation element, if any.
    pub namespace: Option<String>,
    pub params: Vec<(String, String)>,
}

impl SoapRequest {
    /// First parameter with this local name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`param`](Self::param) but missing values are an INVALID error.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.param(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::invalid(format!("missing required parameter '{}'", name)))
    }

    pub fn param_f32(&self, name: &str) -> Result<Option<f32>> {
        self.param(name)
            .map(|v| {
                v.parse::<f32>()
                    .map_err(|_| Error::invalid(format!("parameter '{}' is not a number", name)))
            })
            .transpose()
    }

    pub fn param_i64(&self, name: &str) -> Result<Option<i64>> {
        self.param(name)
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| Error::invalid(format!("parameter '{}' is not an integer", name)))
            })
            .transpose()
    }
}

/// Decode a SOAP envelope.
pub fn decode_envelope(body: &[u8]) -> Result<SoapRequest> {
    let text =
        std::str::from_utf8(body).map_err(|_| Error::invalid("envelope is not valid UTF-8"))?;
    let doc = Document::parse(text).map_err(|e| Error::invalid(format!("malformed XML: {}", e)))?;

    let root = doc.root_element();
    if root.tag_name().name() != "Envelope" {
        return Err(Error::invalid("root element is not an Envelope"));
    }
    let body = root
        .children()
        .find(|n| n.is_element() && n.tag_name().name() == "Body")
        .ok_or_else(|| Error::invalid("envelope has no Body"))?;
    let op = body
        .children()
        .find(Node::is_element)
        .ok_or_else(|| Error::invalid("envelope Body is empty"))?;

    let mut params = Vec::new();
    for node in op.descendants().skip(1).filter(Node::is_element) {
        let is_leaf = !node.children().any(|c| c.is_element());
        if is_leaf {
            let value = node.text().unwrap_or("").trim();
            push_param(&mut params, node.tag_name().name(), &element_path(node, op), value);
        }
    }
    for node in op.descendants().filter(Node::is_element) {
        let base = element_path(node, op);
        for attr in node.attributes() {
            let path = if base.is_empty() {
                attr.name().to_string()
            } else {
                format!("{}.{}", base, attr.name())
            };
            push_param(&mut params, attr.name(), &path, attr.value());
        }
    }

    Ok(SoapRequest {
        operation: op.tag_name().name().to_string(),
        namespace: op.tag_name().namespace().map(str::to_string),
        params,
    })
}

/// Dotted local-name path from just below `op` down to `node` (empty for `op`).
fn element_path<'a, 'input>(node: Node<'a, 'input>, op: Node<'a, 'input>) -> String {
    let mut names: Vec<&str> = node
        .ancestors()
        .take_while(|n| *n != op)
        .filter(Node::is_element)
        .map(|n| n.tag_name().name())
        .collect();
    names.reverse();
    names.join(".")
}

fn push_param(params: &mut Vec<(String, String)>, name: &str, path: &str, value: &str) {
    params.push((name.to_string(), value.to_string()));
    if path != name && !path.is_empty() {
        params.push((path.to_string(), value.to_string()));
    }
}

/// Escape text for element content and attribute values.
pub fn escape_xml(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Minimal element tree used for response data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Qualified name, e.g. `tds:Manufacturer`.
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            text: None,
            children: Vec::new(),
        }
    }

    /// Leaf element with text content.
    pub fn leaf(name: impl Into<String>, text: impl ToString) -> Self {
        let mut el = Self::new(name);
        el.text = Some(text.to_string());
        el
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.attrs.push((name.into(), value.to_string()));
        self
    }

    pub fn child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    /// Text of the first direct child with this qualified name.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.children
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.text.as_deref())
    }

    pub fn write_to(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            let _ = write!(out, " {}=\"{}\"", k, escape_xml(v));
        }
        if self.text.is_none() && self.children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if let Some(text) = &self.text {
            out.push_str(&escape_xml(text));
        }
        for child in &self.children {
            child.write_to(out);
        }
        let _ = write!(out, "</{}>", self.name);
    }
}

/// Per-service binding context: the service's own prefix and namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoapContext {
    pub prefix: &'static str,
    pub namespace: &'static str,
}

impl SoapContext {
    pub const fn new(prefix: &'static str, namespace: &'static str) -> Self {
        Self { prefix, namespace }
    }

    /// `<prefix>:<operation>Response`, the default empty reply element.
    pub fn response_element(&self, operation: &str) -> XmlElement {
        XmlElement::new(format!("{}:{}Response", self.prefix, operation))
    }

    /// Wrap `body` in a SOAP envelope.
    pub fn serialize(&self, body: &XmlElement) -> String {
        let mut out = envelope_open();
        body.write_to(&mut out);
        out.push_str("</s:Body></s:Envelope>");
        out
    }
}

fn envelope_open() -> String {
    let mut out = String::with_capacity(1024);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?><s:Envelope");
    for (prefix, ns) in ENVELOPE_NAMESPACES {
        let _ = write!(out, " xmlns:{}=\"{}\"", prefix, ns);
    }
    out.push_str("><s:Body>");
    out
}

/// SOAP 1.2 fault envelope.
pub fn fault_envelope(code: FaultCode, reason: &str, subcode: Option<&str>) -> String {
    let mut out = envelope_open();
    let _ = write!(
        out,
        "<s:Fault><s:Code><s:Value>{}</s:Value>",
        code.qname()
    );
    if let Some(sub) = subcode {
        let _ = write!(
            out,
            "<s:Subcode><s:Value>{}</s:Value></s:Subcode>",
            escape_xml(sub)
        );
    }
    let _ = write!(
        out,
        "</s:Code><s:Reason><s:Text xml:lang=\"en\">{}</s:Text></s:Reason></s:Fault>",
        escape_xml(reason)
    );
    out.push_str("</s:Body></s:Envelope>");
    out
}

/// Fault envelope for a crate error; subcode carries the error kind.
pub fn fault_for_error(err: &Error) -> String {
    fault_envelope(err.fault_code(), err.message(), Some(err.kind().as_str()))
}
