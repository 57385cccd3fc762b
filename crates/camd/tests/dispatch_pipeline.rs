// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::too_many_lines)] // Test code
#![allow(clippy::redundant_closure_for_method_calls)] // Test code clarity

//! End-to-end request pipeline tests.
//!
//! Raw HTTP bytes go through `ServerContext::handle_http`; the registry is
//! also exercised directly to check that dispatching through it is the same
//! as calling the service handler.

use camd::adapter::{ProtocolRequest, ProtocolResponse};
use camd::service::device::{DEFAULT_MANUFACTURER, DEFAULT_MODEL, DEFAULT_SERIAL_NUMBER};
use camd::service::{ServiceOperationHandler, ServiceRegistration, ServiceType};
use camd::soap::decode_envelope;
use camd::{DeviceConfig, ErrorKind, ServerContext, ServerOptions};
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn context_with(config: DeviceConfig) -> ServerContext {
    let options = ServerOptions {
        host_ip: Some(Ipv4Addr::new(192, 168, 7, 20)),
        pool_buffers: 8,
        ..ServerOptions::default()
    };
    ServerContext::new(options, Arc::new(config)).expect("context")
}

fn envelope(inner: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><s:Envelope xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\" \
         xmlns:tds=\"http://www.onvif.org/ver10/device/wsdl\" \
         xmlns:trt=\"http://www.onvif.org/ver10/media/wsdl\"><s:Body>{}</s:Body></s:Envelope>",
        inner
    )
}

fn post(path: &str, body: &str) -> Vec<u8> {
    format!(
        "POST {} HTTP/1.1\r\nHost: camera\r\nContent-Type: application/soap+xml\r\n\
         Content-Length: {}\r\n\r\n{}",
        path,
        body.len(),
        body
    )
    .into_bytes()
}

fn split_response(raw: &[u8]) -> (u16, String) {
    let text = String::from_utf8(raw.to_vec()).expect("utf8 response");
    let status = text
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status code");
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .expect("header terminator");
    (status, body)
}

#[test]
fn test_device_information_defaults() {
    let ctx = context_with(DeviceConfig::new());
    let raw = ctx.handle_http(&post(
        "/onvif/device_service",
        &envelope("<tds:GetDeviceInformation/>"),
    ));
    let (status, body) = split_response(&raw);

    assert_eq!(status, 200);
    assert!(body.contains(&format!("<tds:Manufacturer>{}</tds:Manufacturer>", DEFAULT_MANUFACTURER)));
    assert!(body.contains(&format!("<tds:Model>{}</tds:Model>", DEFAULT_MODEL)));
    assert!(body.contains(&format!(
        "<tds:SerialNumber>{}</tds:SerialNumber>",
        DEFAULT_SERIAL_NUMBER
    )));

    let text = String::from_utf8_lossy(&raw);
    assert!(text.contains("Content-Type: application/soap+xml"));
    assert!(text.contains("Connection: close"));
    assert!(text.contains(&format!("Content-Length: {}", body.len())));
}

#[test]
fn test_device_information_from_config() {
    let mut config = DeviceConfig::new();
    config.set("device", "manufacturer", "Lab & Co");
    config.set("device", "serial_number", "SN-42");
    let ctx = context_with(config);

    let raw = ctx.handle_http(&post(
        "/onvif/device_service",
        &envelope("<tds:GetDeviceInformation/>"),
    ));
    let (status, body) = split_response(&raw);
    assert_eq!(status, 200);
    assert!(body.contains("<tds:Manufacturer>Lab &amp; Co</tds:Manufacturer>"));
    assert!(body.contains("<tds:SerialNumber>SN-42</tds:SerialNumber>"));
    assert!(body.contains(&format!("<tds:Model>{}</tds:Model>", DEFAULT_MODEL)));
}

#[test]
fn test_capabilities_advertise_host_address() {
    let ctx = context_with(DeviceConfig::new());
    let raw = ctx.handle_http(&post(
        "/onvif/device_service",
        &envelope("<tds:GetCapabilities/>"),
    ));
    let (status, body) = split_response(&raw);
    assert_eq!(status, 200);
    for service in ServiceType::ALL {
        let xaddr = format!("http://192.168.7.20:8080{}", service.path());
        assert!(body.contains(&xaddr), "missing {}", xaddr);
    }
}

#[test]
fn test_unknown_action_counts_one_error() {
    let ctx = context_with(DeviceConfig::new());
    let before = ctx.errors().stats().count(ErrorKind::NotFound);

    let raw = ctx.handle_http(&post(
        "/onvif/device_service",
        &envelope("<tds:DoesNotExist/>"),
    ));
    let (status, body) = split_response(&raw);

    assert_eq!(status, 400);
    assert!(body.contains("s:Sender"));
    assert!(body.contains("Unsupported action: DoesNotExist"));
    assert_eq!(ctx.errors().stats().count(ErrorKind::NotFound), before + 1);
    assert_eq!(ctx.errors().last_error(), ErrorKind::NotFound);
}

#[test]
fn test_media_token_required() {
    let ctx = context_with(DeviceConfig::new());

    let raw = ctx.handle_http(&post(
        "/onvif/media_service",
        &envelope("<trt:GetStreamUri/>"),
    ));
    let (status, body) = split_response(&raw);
    assert_eq!(status, 400);
    assert!(body.contains("ProfileToken"));

    let raw = ctx.handle_http(&post(
        "/onvif/media_service",
        &envelope("<trt:GetStreamUri><trt:ProfileToken>SubProfile</trt:ProfileToken></trt:GetStreamUri>"),
    ));
    let (status, body) = split_response(&raw);
    assert_eq!(status, 200);
    assert!(body.contains("rtsp://192.168.7.20:554/vs1"));
}

#[test]
fn test_dispatch_matches_direct_handler_call() {
    let ctx = Arc::new(context_with(DeviceConfig::new()));
    let body = envelope("<tds:GetHostname/>");
    let request = ProtocolRequest {
        path: ServiceType::Device.path().to_string(),
        body: body.clone().into_bytes(),
        envelope: Some(decode_envelope(body.as_bytes()).expect("envelope")),
        ..ProtocolRequest::default()
    };

    let direct = ctx
        .dispatcher()
        .dispatch("device", "GetHostname", &request)
        .expect("dispatch");

    // A second registry whose handler forwards to the first sees the same
    // operation and request, and yields the same response.
    let seen = Arc::new(AtomicUsize::new(0));
    let registry = camd::ServiceDispatcher::new(Arc::clone(ctx.errors()));
    let forward = {
        let seen = Arc::clone(&seen);
        let ctx = Arc::clone(&ctx);
        move |op: &str, req: &ProtocolRequest| {
            seen.fetch_add(1, Ordering::SeqCst);
            assert_eq!(op, "GetHostname");
            ctx.dispatcher().dispatch("device", op, req)
        }
    };
    registry
        .register(ServiceRegistration::new(
            "forward",
            "urn:test",
            Arc::new(forward) as Arc<dyn ServiceOperationHandler>,
        ))
        .expect("register");

    let forwarded = registry
        .dispatch("forward", "GetHostname", &request)
        .expect("dispatch through forward");
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(forwarded.status, direct.status);
    assert_eq!(forwarded.content_type, direct.content_type);
    assert_eq!(forwarded.body, direct.body);
}

#[test]
fn test_registry_duplicate_and_unregister() {
    let ctx = context_with(DeviceConfig::new());
    let registry = camd::ServiceDispatcher::new(Arc::clone(ctx.errors()));
    let cleanups = Arc::new(AtomicUsize::new(0));

    let noop = |_: &str, req: &ProtocolRequest| -> camd::Result<ProtocolResponse> {
        Ok(ProtocolResponse::for_request(req))
    };
    let make = |name: &str| {
        let cleanups = Arc::clone(&cleanups);
        ServiceRegistration::new(name, "urn:test", Arc::new(noop) as Arc<dyn ServiceOperationHandler>)
            .with_cleanup(move || {
                cleanups.fetch_add(1, Ordering::SeqCst);
            })
    };

    registry.register(make("alpha")).expect("first register");
    let err = registry.register(make("alpha")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert_eq!(registry.len(), 1);

    registry.unregister("alpha").expect("unregister");
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert!(!registry.is_registered("alpha"));

    let err = registry.unregister("alpha").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = registry
        .dispatch("alpha", "Anything", &ProtocolRequest::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    registry.register(make("alpha")).expect("register after unregister");
    assert!(registry.is_registered("alpha"));
}

#[test]
fn test_service_stats_follow_requests() {
    let ctx = context_with(DeviceConfig::new());
    for _ in 0..3 {
        ctx.handle_http(&post(
            "/onvif/device_service",
            &envelope("<tds:GetSystemDateAndTime/>"),
        ));
    }
    ctx.handle_http(&post("/onvif/device_service", &envelope("<tds:Nope/>")));

    let stats = ctx.service_stats(ServiceType::Device).expect("stats");
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.total_success, 3);
    assert_eq!(stats.total_errors, 1);
    assert_eq!(
        stats
            .action("GetSystemDateAndTime")
            .expect("action stats")
            .call_count,
        3
    );
}
