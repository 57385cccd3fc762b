// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery envelopes: Hello, Bye, Probe, ProbeMatch.

use crate::soap::{escape_xml, XmlElement, SOAP_ENV_NS};
use roxmltree::Document;
use std::fmt::Write as _;

pub const WSD_NS: &str = "http://schemas.xmlsoap.org/ws/2005/04/discovery";
pub const WSA_NS: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing";
pub const TDN_NS: &str = "http://www.onvif.org/ver10/network/wsdl";

/// `To` of multicast messages.
pub const DISCOVERY_TO: &str = "urn:schemas-xmlsoap-org:ws:2005:04:discovery";
/// `To` of unicast replies.
pub const ANONYMOUS_TO: &str = "http://schemas.xmlsoap.org/ws/2004/08/addressing/role/anonymous";

pub const DEVICE_TYPE: &str = "tdn:NetworkVideoTransmitter";
pub const SCOPES: &[&str] = &[
    "onvif://www.onvif.org/type/video_encoder",
    "onvif://www.onvif.org/type/audio_encoder",
    "onvif://www.onvif.org/type/ptz",
    "onvif://www.onvif.org/Profile/Streaming",
];
pub const METADATA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Hello,
    Bye,
    Probe,
    ProbeMatches,
}

impl MessageKind {
    pub fn action(self) -> String {
        format!("{}/{}", WSD_NS, self.element())
    }

    fn element(self) -> &'static str {
        match self {
            MessageKind::Hello => "Hello",
            MessageKind::Bye => "Bye",
            MessageKind::Probe => "Probe",
            MessageKind::ProbeMatches => "ProbeMatches",
        }
    }
}

/// DJB2 over the bytes of `s`.
pub fn djb2(s: &str) -> u32 {
    s.bytes()
        .fold(5381u32, |h, b| h.wrapping_mul(33).wrapping_add(u32::from(b)))
}

/// Locally administered pseudo-MAC derived from the host name.
pub fn pseudo_mac(hostname: &str) -> [u8; 6] {
    let h = djb2(hostname);
    [
        0x02,
        (h >> 24) as u8,
        (h >> 16) as u8,
        (h >> 8) as u8,
        h as u8,
        ((h >> 5) & 0xFF) as u8,
    ]
}

/// Stable `urn:uuid:` endpoint address for a host.
///
/// The same host name always yields the same address.
pub fn endpoint_address(hostname: &str) -> String {
    let m = pseudo_mac(hostname);
    let hex = |bytes: &[u8]| {
        bytes.iter().fold(String::new(), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        })
    };
    format!(
        "urn:uuid:{}-{}-{}-{}-{}",
        hex(&m[0..4]),
        hex(&m[4..6]),
        hex(&m[0..2]),
        hex(&m[2..4]),
        hex(&[m[4], m[5], m[0], m[1], m[2], m[3]]),
    )
}

/// Fresh message identifier.
pub fn new_message_id() -> String {
    format!("urn:uuid:{}", uuid::Uuid::new_v4())
}

/// `AppSequence` header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppSequence {
    pub instance_id: u64,
    pub message_number: u64,
}

/// What this device advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub endpoint: String,
    /// Device service address.
    pub xaddr: String,
}

fn header(kind: MessageKind, message_id: &str, relates_to: Option<&str>, seq: AppSequence) -> XmlElement {
    let mut header = XmlElement::new("soap:Header")
        .child(XmlElement::leaf("wsa:MessageID", message_id));
    if let Some(rel) = relates_to {
        header.push(XmlElement::leaf("wsa:RelatesTo", rel));
    }
    let to = if relates_to.is_some() {
        ANONYMOUS_TO
    } else {
        DISCOVERY_TO
    };
    header
        .child(XmlElement::leaf("wsa:To", to))
        .child(XmlElement::leaf("wsa:Action", kind.action()))
        .child(
            XmlElement::new("wsd:AppSequence")
                .attr("InstanceId", seq.instance_id)
                .attr("MessageNumber", seq.message_number),
        )
}

fn endpoint_reference(endpoint: &str) -> XmlElement {
    XmlElement::new("wsa:EndpointReference").child(XmlElement::leaf("wsa:Address", endpoint))
}

fn description(name: &str, ad: &Advertisement) -> XmlElement {
    XmlElement::new(name)
        .child(endpoint_reference(&ad.endpoint))
        .child(XmlElement::leaf("wsd:Types", DEVICE_TYPE))
        .child(XmlElement::leaf("wsd:Scopes", SCOPES.join(" ")))
        .child(XmlElement::leaf("wsd:XAddrs", &ad.xaddr))
        .child(XmlElement::leaf("wsd:MetadataVersion", METADATA_VERSION))
}

fn envelope(header: XmlElement, body: XmlElement) -> String {
    let mut out = String::with_capacity(1536);
    let _ = write!(
        out,
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><soap:Envelope xmlns:soap=\"{}\" \
         xmlns:wsa=\"{}\" xmlns:wsd=\"{}\" xmlns:tdn=\"{}\">",
        SOAP_ENV_NS, WSA_NS, WSD_NS, TDN_NS
    );
    header.write_to(&mut out);
    out.push_str("<soap:Body>");
    body.write_to(&mut out);
    out.push_str("</soap:Body></soap:Envelope>");
    out
}

pub fn hello(ad: &Advertisement, message_id: &str, seq: AppSequence) -> String {
    envelope(
        header(MessageKind::Hello, message_id, None, seq),
        description("wsd:Hello", ad),
    )
}

/// Bye carries only the endpoint reference.
pub fn bye(ad: &Advertisement, message_id: &str, seq: AppSequence) -> String {
    envelope(
        header(MessageKind::Bye, message_id, None, seq),
        XmlElement::new("wsd:Bye").child(endpoint_reference(&ad.endpoint)),
    )
}

pub fn probe_match(ad: &Advertisement, message_id: &str, relates_to: &str, seq: AppSequence) -> String {
    envelope(
        header(MessageKind::ProbeMatches, message_id, Some(relates_to), seq),
        XmlElement::new("wsd:ProbeMatches").child(description("wsd:ProbeMatch", ad)),
    )
}

/// Probe for network video transmitters, as sent by clients.
pub fn probe(message_id: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?><soap:Envelope xmlns:soap=\"{}\" \
         xmlns:wsa=\"{}\" xmlns:wsd=\"{}\" xmlns:tdn=\"{}\"><soap:Header>\
         <wsa:MessageID>{}</wsa:MessageID><wsa:To>{}</wsa:To><wsa:Action>{}</wsa:Action>\
         </soap:Header><soap:Body><wsd:Probe><wsd:Types>{}</wsd:Types></wsd:Probe>\
         </soap:Body></soap:Envelope>",
        SOAP_ENV_NS,
        WSA_NS,
        WSD_NS,
        TDN_NS,
        escape_xml(message_id),
        DISCOVERY_TO,
        MessageKind::Probe.action(),
        DEVICE_TYPE
    )
}

/// A recognized Probe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeRequest {
    /// MessageID of the probe, used as RelatesTo in the reply.
    pub message_id: Option<String>,
}

fn local_text<'a>(doc: &'a Document<'_>, name: &str) -> Option<&'a str> {
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == name)
        .and_then(|n| n.text())
        .map(str::trim)
}

/// Recognize a Probe by its `Probe` element or its Probe action.
///
/// Payloads that do not parse as XML fall back to a substring test.
pub fn parse_probe(datagram: &[u8]) -> Option<ProbeRequest> {
    let text = std::str::from_utf8(datagram).ok()?;
    let action = MessageKind::Probe.action();

    match Document::parse(text) {
        Ok(doc) => {
            let has_element = doc
                .descendants()
                .any(|n| n.is_element() && n.tag_name().name() == "Probe");
            let has_action = local_text(&doc, "Action") == Some(action.as_str());
            (has_element || has_action).then(|| ProbeRequest {
                message_id: local_text(&doc, "MessageID").map(str::to_string),
            })
        }
        Err(_) => {
            let matches = text.contains(":Probe>") || text.contains("<Probe") || text.contains(&action);
            matches.then(ProbeRequest::default)
        }
    }
}

/// Fields of a received ProbeMatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeMatchInfo {
    pub endpoint: String,
    pub xaddrs: Vec<String>,
    pub types: String,
    pub scopes: Vec<String>,
    pub relates_to: Option<String>,
}

/// Parse a ProbeMatches envelope; `None` for anything else.
pub fn parse_probe_match(datagram: &[u8]) -> Option<ProbeMatchInfo> {
    let text = std::str::from_utf8(datagram).ok()?;
    let doc = Document::parse(text).ok()?;
    doc.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == "ProbeMatch")?;

    let split = |s: Option<&str>| -> Vec<String> {
        s.map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    };
    Some(ProbeMatchInfo {
        endpoint: local_text(&doc, "Address")?.to_string(),
        xaddrs: split(local_text(&doc, "XAddrs")),
        types: local_text(&doc, "Types").unwrap_or("").to_string(),
        scopes: split(local_text(&doc, "Scopes")),
        relates_to: local_text(&doc, "RelatesTo").map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad() -> Advertisement {
        Advertisement {
            endpoint: endpoint_address("camera-lab"),
            xaddr: "http://10.0.0.7:8080/onvif/device_service".into(),
        }
    }

    const SEQ: AppSequence = AppSequence {
        instance_id: 7,
        message_number: 3,
    };

    #[test]
    fn test_djb2_known_values() {
        assert_eq!(djb2(""), 5381);
        assert_eq!(djb2("a"), 5381 * 33 + 97);
    }

    #[test]
    fn test_endpoint_address_layout() {
        let m = pseudo_mac("anyka");
        assert_eq!(m[0], 0x02);
        let addr = endpoint_address("anyka");
        assert_eq!(addr, endpoint_address("anyka"));
        assert_ne!(addr, endpoint_address("other-host"));

        let uuid = addr.strip_prefix("urn:uuid:").expect("urn prefix");
        let groups: Vec<&str> = uuid.split('-').collect();
        assert_eq!(
            groups.iter().map(|g| g.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        assert!(uuid.starts_with("02"));
        assert_eq!(&groups[2][..2], "02");
        assert!(uuid::Uuid::parse_str(uuid).is_ok());
    }

    #[test]
    fn test_message_ids_are_fresh() {
        assert_ne!(new_message_id(), new_message_id());
        assert!(new_message_id().starts_with("urn:uuid:"));
    }

    #[test]
    fn test_hello_content() {
        let xml = hello(&ad(), "urn:uuid:m1", SEQ);
        let doc = Document::parse(&xml).expect("well formed");
        assert_eq!(local_text(&doc, "Address"), Some(ad().endpoint.as_str()));
        assert_eq!(local_text(&doc, "Types"), Some(DEVICE_TYPE));
        assert_eq!(local_text(&doc, "To"), Some(DISCOVERY_TO));
        assert!(xml.contains("InstanceId=\"7\" MessageNumber=\"3\""));
        assert!(xml.contains("onvif://www.onvif.org/type/ptz"));
        assert!(parse_probe(xml.as_bytes()).is_none());
    }

    #[test]
    fn test_bye_is_minimal() {
        let xml = bye(&ad(), "urn:uuid:m2", SEQ);
        assert!(xml.contains("<wsd:Bye>"));
        assert!(xml.contains(&ad().endpoint));
        assert!(!xml.contains("XAddrs"));
    }

    #[test]
    fn test_probe_detection() {
        let req = parse_probe(probe("urn:uuid:p1").as_bytes()).expect("probe");
        assert_eq!(req.message_id.as_deref(), Some("urn:uuid:p1"));

        let bare = "<Envelope><Body><Probe/></Body></Envelope>";
        assert_eq!(
            parse_probe(bare.as_bytes()),
            Some(ProbeRequest { message_id: None })
        );
        assert!(parse_probe(b"<d:Probe>truncated").is_some());
        assert!(parse_probe(b"hello world").is_none());
        assert!(parse_probe(&[0xff, 0xfe]).is_none());
    }

    #[test]
    fn test_probe_match_round_trip() {
        let xml = probe_match(&ad(), "urn:uuid:m3", "urn:uuid:p1", SEQ);
        let info = parse_probe_match(xml.as_bytes()).expect("probe match");
        assert_eq!(info.endpoint, ad().endpoint);
        assert_eq!(info.xaddrs, vec![ad().xaddr]);
        assert_eq!(info.relates_to.as_deref(), Some("urn:uuid:p1"));
        assert_eq!(info.scopes.len(), SCOPES.len());
        assert!(xml.contains(ANONYMOUS_TO));
        assert!(parse_probe_match(hello(&ad(), "x", SEQ).as_bytes()).is_none());
    }
}
