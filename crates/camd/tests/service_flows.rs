// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::float_cmp)] // Positions are exact after degree rounding

//! PTZ and imaging operations driven through SOAP requests, with the
//! in-memory drivers standing in for the motors and the video processor.

use camd::service::imaging::{DayNightMode, Effect, InMemoryImagingDriver, IrLedMode};
use camd::service::ptz::{DegreePosition, InMemoryPtzDriver, PtzDriver, MAX_PRESETS};
use camd::{DeviceConfig, Drivers, ServerContext, ServerOptions};
use std::net::Ipv4Addr;
use std::sync::Arc;

struct Rig {
    ctx: ServerContext,
    motors: Arc<InMemoryPtzDriver>,
    sensor: Arc<InMemoryImagingDriver>,
}

fn rig(config: DeviceConfig) -> Rig {
    let motors = Arc::new(InMemoryPtzDriver::new());
    let sensor = Arc::new(InMemoryImagingDriver::new());
    let drivers = Drivers {
        ptz: motors.clone(),
        imaging: sensor.clone(),
    };
    let options = ServerOptions {
        host_ip: Some(Ipv4Addr::new(10, 9, 8, 7)),
        pool_buffers: 4,
        ..ServerOptions::default()
    };
    let ctx = ServerContext::with_drivers(options, Arc::new(config), drivers).expect("context");
    Rig { ctx, motors, sensor }
}

fn call(ctx: &ServerContext, path: &str, inner: &str) -> (u16, String) {
    let body = format!(
        "<s:Envelope xmlns:s=\"http://www.w3.org/2003/05/soap-envelope\" \
         xmlns:tptz=\"http://www.onvif.org/ver20/ptz/wsdl\" \
         xmlns:timg=\"http://www.onvif.org/ver20/imaging/wsdl\" \
         xmlns:tt=\"http://www.onvif.org/ver10/schema\"><s:Body>{}</s:Body></s:Envelope>",
        inner
    );
    let raw = format!(
        "POST {} HTTP/1.1\r\nContent-Length: {}\r\n\r\n{}",
        path,
        body.len(),
        body
    );
    let response = String::from_utf8(ctx.handle_http(raw.as_bytes())).expect("utf8");
    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("status");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, body)
}

fn ptz(ctx: &ServerContext, inner: &str) -> (u16, String) {
    call(ctx, "/onvif/ptz_service", inner)
}

fn imaging(ctx: &ServerContext, inner: &str) -> (u16, String) {
    call(ctx, "/onvif/imaging_service", inner)
}

#[test]
fn test_absolute_move_and_status() {
    let r = rig(DeviceConfig::new());
    let (status, _) = ptz(
        &r.ctx,
        "<tptz:AbsoluteMove><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:Position><tt:PanTilt x=\"0.5\" y=\"-1\"/></tptz:Position></tptz:AbsoluteMove>",
    );
    assert_eq!(status, 200);
    assert_eq!(
        r.motors.position().expect("position"),
        DegreePosition { pan: 90, tilt: -90 }
    );

    let (status, body) = ptz(
        &r.ctx,
        "<tptz:GetStatus><tptz:ProfileToken>MainProfile</tptz:ProfileToken></tptz:GetStatus>",
    );
    assert_eq!(status, 200);
    assert!(body.contains("x=\"0.5\""));
    assert!(body.contains("y=\"-1\""));
    assert!(body.contains("<tt:PanTilt>IDLE</tt:PanTilt>"));
}

#[test]
fn test_move_outside_range_is_sender_fault() {
    let r = rig(DeviceConfig::new());
    let (status, body) = ptz(
        &r.ctx,
        "<tptz:AbsoluteMove><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:Position><tt:PanTilt x=\"1.5\" y=\"0\"/></tptz:Position></tptz:AbsoluteMove>",
    );
    assert_eq!(status, 400);
    assert!(body.contains("s:Sender"));
    assert_eq!(
        r.motors.position().expect("position"),
        DegreePosition::default()
    );

    let (status, _) = ptz(
        &r.ctx,
        "<tptz:AbsoluteMove><tptz:Position><tt:PanTilt x=\"0\" y=\"0\"/></tptz:Position>\
         </tptz:AbsoluteMove>",
    );
    assert_eq!(status, 400, "ProfileToken is required");
}

#[test]
fn test_continuous_move_then_stop() {
    let r = rig(DeviceConfig::new());
    let (status, _) = ptz(
        &r.ctx,
        "<tptz:ContinuousMove><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:Velocity><tt:PanTilt x=\"0.3\" y=\"0\"/></tptz:Velocity>\
         <tptz:Timeout>PT5S</tptz:Timeout></tptz:ContinuousMove>",
    );
    assert_eq!(status, 200);
    assert!(r.motors.is_moving());

    let (status, _) = ptz(
        &r.ctx,
        "<tptz:Stop><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:PanTilt>true</tptz:PanTilt></tptz:Stop>",
    );
    assert_eq!(status, 200);
    assert!(!r.motors.is_moving());

    let (status, _) = ptz(
        &r.ctx,
        "<tptz:ContinuousMove><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:Velocity><tt:PanTilt x=\"0.3\" y=\"0\"/></tptz:Velocity>\
         <tptz:Timeout>soon</tptz:Timeout></tptz:ContinuousMove>",
    );
    assert_eq!(status, 400);
}

#[test]
fn test_continuous_move_with_huge_timeout_is_sender_fault() {
    let r = rig(DeviceConfig::new());
    let (status, body) = ptz(
        &r.ctx,
        "<tptz:ContinuousMove><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:Velocity><tt:PanTilt x=\"0.3\" y=\"0\"/></tptz:Velocity>\
         <tptz:Timeout>PT99999999999999999999S</tptz:Timeout></tptz:ContinuousMove>",
    );
    assert_eq!(status, 400);
    assert!(body.contains("s:Sender"));
    assert!(!r.motors.is_moving());
}

#[test]
fn test_preset_lifecycle() {
    let r = rig(DeviceConfig::new());
    let set = |name: &str| {
        ptz(
            &r.ctx,
            &format!(
                "<tptz:SetPreset><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
                 <tptz:PresetName>{}</tptz:PresetName></tptz:SetPreset>",
                name
            ),
        )
    };

    r.motors
        .move_absolute(DegreePosition { pan: 45, tilt: 9 }, 50)
        .expect("move");
    let (status, body) = set("door");
    assert_eq!(status, 200);
    assert!(body.contains("<tptz:PresetToken>Preset1</tptz:PresetToken>"));

    let (status, _) = set("door");
    assert_eq!(status, 400, "duplicate preset name");

    r.motors
        .move_absolute(DegreePosition::default(), 50)
        .expect("move");
    let (status, _) = ptz(
        &r.ctx,
        "<tptz:GotoPreset><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:PresetToken>Preset1</tptz:PresetToken></tptz:GotoPreset>",
    );
    assert_eq!(status, 200);
    assert_eq!(
        r.motors.position().expect("position"),
        DegreePosition { pan: 45, tilt: 9 }
    );

    for n in 2..=MAX_PRESETS {
        let (status, _) = set(&format!("spot{}", n));
        assert_eq!(status, 200);
    }
    let (status, _) = set("one-too-many");
    assert_eq!(status, 400);

    let (status, _) = ptz(
        &r.ctx,
        "<tptz:RemovePreset><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:PresetToken>Preset1</tptz:PresetToken></tptz:RemovePreset>",
    );
    assert_eq!(status, 200);
    let (_, body) = ptz(
        &r.ctx,
        "<tptz:GetPresets><tptz:ProfileToken>MainProfile</tptz:ProfileToken></tptz:GetPresets>",
    );
    assert!(!body.contains("token=\"Preset1\""));
    assert!(body.contains("token=\"Preset2\""));

    // The freed token is reused first.
    let (_, body) = set("again");
    assert!(body.contains("<tptz:PresetToken>Preset1</tptz:PresetToken>"));

    let (status, _) = ptz(
        &r.ctx,
        "<tptz:GotoPreset><tptz:ProfileToken>MainProfile</tptz:ProfileToken>\
         <tptz:PresetToken>Preset99</tptz:PresetToken></tptz:GotoPreset>",
    );
    assert_eq!(status, 400);
}

#[test]
fn test_home_position() {
    let r = rig(DeviceConfig::new());
    r.motors
        .move_absolute(DegreePosition { pan: -36, tilt: 18 }, 50)
        .expect("move");
    let (status, _) = ptz(
        &r.ctx,
        "<tptz:SetHomePosition><tptz:ProfileToken>MainProfile</tptz:ProfileToken></tptz:SetHomePosition>",
    );
    assert_eq!(status, 200);

    r.motors
        .move_absolute(DegreePosition { pan: 100, tilt: 0 }, 50)
        .expect("move");
    let (status, _) = ptz(
        &r.ctx,
        "<tptz:GotoHomePosition><tptz:ProfileToken>MainProfile</tptz:ProfileToken></tptz:GotoHomePosition>",
    );
    assert_eq!(status, 200);
    assert_eq!(
        r.motors.position().expect("position"),
        DegreePosition { pan: -36, tilt: 18 }
    );
}

#[test]
fn test_imaging_settings_reach_driver() {
    let r = rig(DeviceConfig::new());
    let (status, _) = imaging(
        &r.ctx,
        "<timg:SetImagingSettings><timg:VideoSourceToken>VideoSource0</timg:VideoSourceToken>\
         <timg:ImagingSettings><tt:Brightness>40</tt:Brightness><tt:Hue>-90</tt:Hue>\
         <tt:IrCutFilter>OFF</tt:IrCutFilter></timg:ImagingSettings></timg:SetImagingSettings>",
    );
    assert_eq!(status, 200);

    let state = r.sensor.state();
    assert!(state.effects.contains(&(Effect::Brightness, 20)));
    assert!(state.effects.contains(&(Effect::Hue, -25)));
    assert_eq!(state.day_night, Some(DayNightMode::Night));

    let (status, body) = imaging(
        &r.ctx,
        "<timg:GetImagingSettings><timg:VideoSourceToken>VideoSource0</timg:VideoSourceToken>\
         </timg:GetImagingSettings>",
    );
    assert_eq!(status, 200);
    assert!(body.contains("<tt:Brightness>40</tt:Brightness>"));
    assert!(body.contains("<tt:Hue>-90</tt:Hue>"));
    assert!(body.contains("<tt:IrCutFilter>OFF</tt:IrCutFilter>"));
}

#[test]
fn test_imaging_rejects_out_of_range_without_partial_apply() {
    let r = rig(DeviceConfig::new());
    let before = r.ctx.imaging().settings();
    let (status, body) = imaging(
        &r.ctx,
        "<timg:SetImagingSettings><timg:VideoSourceToken>VideoSource0</timg:VideoSourceToken>\
         <timg:ImagingSettings><tt:Brightness>10</tt:Brightness><tt:Contrast>101</tt:Contrast>\
         </timg:ImagingSettings></timg:SetImagingSettings>",
    );
    assert_eq!(status, 400);
    assert!(body.contains("Contrast"));
    assert_eq!(r.ctx.imaging().settings(), before);
}

#[test]
fn test_imaging_rejects_non_finite_levels() {
    let r = rig(DeviceConfig::new());
    let before = r.ctx.imaging().settings();
    for value in ["NaN", "inf", "-infinity"] {
        let (status, body) = imaging(
            &r.ctx,
            &format!(
                "<timg:SetImagingSettings><timg:VideoSourceToken>VideoSource0</timg:VideoSourceToken>\
                 <timg:ImagingSettings><tt:Brightness>{}</tt:Brightness></timg:ImagingSettings>\
                 </timg:SetImagingSettings>",
                value
            ),
        );
        assert_eq!(status, 400, "Brightness {}", value);
        assert!(body.contains("s:Sender"));
    }
    assert_eq!(r.ctx.imaging().settings(), before);
}

#[test]
fn test_day_night_config_from_file_section() {
    let mut config = DeviceConfig::new();
    config.set("imaging", "day_to_night_threshold", "25");
    config.set("imaging", "ir_led_mode", "on");
    config.set("imaging", "ir_led_level", "80");
    let r = rig(config);

    // Registration pushed the configured state to the hardware.
    let state = r.sensor.state();
    assert_eq!(state.ir_led, Some((IrLedMode::On, 80)));
    assert_eq!(state.effects.len(), 5);

    let (status, body) = imaging(&r.ctx, "<timg:GetAutoDayNightConfig/>");
    assert_eq!(status, 200);
    assert!(body.contains("<tt:DayToNightThreshold>25</tt:DayToNightThreshold>"));
    assert!(body.contains("<tt:NightToDayThreshold>70</tt:NightToDayThreshold>"));

    let (status, _) = imaging(
        &r.ctx,
        "<timg:SetAutoDayNightConfig><tt:DayToNightThreshold>80</tt:DayToNightThreshold>\
         </timg:SetAutoDayNightConfig>",
    );
    assert_eq!(status, 400, "day->night must stay below night->day");

    let (status, _) = imaging(
        &r.ctx,
        "<timg:SetAutoDayNightConfig><tt:Mode>DAY</tt:Mode><tt:IrLedMode>OFF</tt:IrLedMode>\
         </timg:SetAutoDayNightConfig>",
    );
    assert_eq!(status, 200);
    assert_eq!(r.sensor.state().day_night, Some(DayNightMode::Day));
    assert_eq!(r.ctx.imaging().day_night().ir_led_mode, IrLedMode::Off);
}
