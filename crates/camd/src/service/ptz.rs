// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! PTZ service.
//!
//! Positions on the wire are normalized (`[-1, 1]` on both axes); the motor
//! driver works in degrees (pan `[-180, 180]`, tilt `[-90, 90]`) with a
//! speed in `[15, 100]`.

use super::handler::{ActionContext, ActionDefinition};
use crate::adapter::ProtocolResponse;
use crate::error::{Error, Result};
use crate::soap::XmlElement;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub const NODE_TOKEN: &str = "PTZNode0";
pub const MAX_PRESETS: usize = 10;
/// Driver speed used when a request carries no speed.
pub const DEFAULT_DRIVER_SPEED: u8 = 50;
/// Default continuous-move timeout.
pub const DEFAULT_MOVE_TIMEOUT: Duration = Duration::from_secs(10);

const POSITION_SPACE: &str = "http://www.onvif.org/ver10/tptz/PanTiltSpaces/PositionGenericSpace";
const TRANSLATION_SPACE: &str =
    "http://www.onvif.org/ver10/tptz/PanTiltSpaces/TranslationGenericSpace";
const VELOCITY_SPACE: &str = "http://www.onvif.org/ver10/tptz/PanTiltSpaces/VelocityGenericSpace";

/// Driver-level position in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DegreePosition {
    pub pan: i32,
    pub tilt: i32,
}

/// Normalized pan/tilt vector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PanTilt {
    pub x: f32,
    pub y: f32,
}

impl PanTilt {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn to_degrees(self) -> DegreePosition {
        DegreePosition {
            pan: (self.x * 180.0) as i32,
            tilt: (self.y * 90.0) as i32,
        }
    }

    fn from_degrees(pos: DegreePosition) -> Self {
        Self {
            x: pos.pan as f32 / 180.0,
            y: pos.tilt as f32 / 90.0,
        }
    }
}

/// Normalized velocity magnitude -> driver speed.
pub fn driver_speed(velocity: f32) -> u8 {
    (15.0 + velocity.abs().min(1.0) * 85.0) as u8
}

/// Motor hardware. Implementations serialize their own access.
pub trait PtzDriver: Send + Sync {
    fn position(&self) -> Result<DegreePosition>;
    fn is_moving(&self) -> bool;
    fn move_absolute(&self, target: DegreePosition, speed: u8) -> Result<()>;
    fn move_relative(&self, delta: DegreePosition, speed: u8) -> Result<()>;
    /// Signed per-axis speeds; zero leaves that axis alone.
    fn move_continuous(&self, pan_speed: i32, tilt_speed: i32, timeout: Duration) -> Result<()>;
    fn stop(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MotorState {
    position: DegreePosition,
    moving: bool,
}

/// Driver that only tracks state; used on hosts without motors and in tests.
#[derive(Debug, Default)]
pub struct InMemoryPtzDriver {
    state: Mutex<MotorState>,
}

impl InMemoryPtzDriver {
    /// Mechanical limits of the reference pan/tilt unit.
    pub const PAN_LIMIT: i32 = 350;
    pub const TILT_LIMIT: i32 = 130;

    pub fn new() -> Self {
        Self::default()
    }

    fn clamp(pos: DegreePosition) -> DegreePosition {
        DegreePosition {
            pan: pos.pan.clamp(-Self::PAN_LIMIT, Self::PAN_LIMIT),
            tilt: pos.tilt.clamp(-Self::TILT_LIMIT, Self::TILT_LIMIT),
        }
    }
}

impl PtzDriver for InMemoryPtzDriver {
    fn position(&self) -> Result<DegreePosition> {
        Ok(self.state.lock().position)
    }

    fn is_moving(&self) -> bool {
        self.state.lock().moving
    }

    fn move_absolute(&self, target: DegreePosition, _speed: u8) -> Result<()> {
        let mut state = self.state.lock();
        state.position = Self::clamp(target);
        state.moving = false;
        Ok(())
    }

    fn move_relative(&self, delta: DegreePosition, _speed: u8) -> Result<()> {
        let mut state = self.state.lock();
        let target = DegreePosition {
            pan: state.position.pan.saturating_add(delta.pan),
            tilt: state.position.tilt.saturating_add(delta.tilt),
        };
        state.position = Self::clamp(target);
        state.moving = false;
        Ok(())
    }

    fn move_continuous(&self, pan_speed: i32, tilt_speed: i32, _timeout: Duration) -> Result<()> {
        self.state.lock().moving = pan_speed != 0 || tilt_speed != 0;
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        self.state.lock().moving = false;
        Ok(())
    }
}

/// Stored preset.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub token: String,
    pub name: String,
    pub position: PanTilt,
}

/// PTZ state shared by every PTZ action.
pub struct PtzService {
    driver: Arc<dyn PtzDriver>,
    presets: Mutex<Vec<Preset>>,
    home: Mutex<PanTilt>,
}

impl PtzService {
    pub fn new(driver: Arc<dyn PtzDriver>) -> Self {
        Self {
            driver,
            presets: Mutex::new(Vec::with_capacity(MAX_PRESETS)),
            home: Mutex::new(PanTilt::default()),
        }
    }

    pub fn position(&self) -> Result<PanTilt> {
        self.driver.position().map(PanTilt::from_degrees)
    }

    pub fn absolute_move(&self, target: PanTilt, speed: Option<PanTilt>) -> Result<()> {
        self.driver
            .move_absolute(target.to_degrees(), speed_of(speed))
    }

    pub fn relative_move(&self, translation: PanTilt, speed: Option<PanTilt>) -> Result<()> {
        self.driver
            .move_relative(translation.to_degrees(), speed_of(speed))
    }

    pub fn continuous_move(&self, velocity: PanTilt, timeout: Option<Duration>) -> Result<()> {
        let signed = |v: f32| {
            if v == 0.0 {
                0
            } else {
                let s = i32::from(driver_speed(v));
                if v < 0.0 {
                    -s
                } else {
                    s
                }
            }
        };
        let timeout = timeout
            .filter(|t| !t.is_zero())
            .unwrap_or(DEFAULT_MOVE_TIMEOUT);
        self.driver
            .move_continuous(signed(velocity.x), signed(velocity.y), timeout)
    }

    /// Zoom is not motorized, so only the pan/tilt flag matters.
    pub fn stop(&self, pan_tilt: bool) -> Result<()> {
        if pan_tilt {
            self.driver.stop()
        } else {
            Ok(())
        }
    }

    pub fn home(&self) -> PanTilt {
        *self.home.lock()
    }

    pub fn goto_home(&self, speed: Option<PanTilt>) -> Result<()> {
        let home = self.home();
        self.absolute_move(home, speed)
    }

    /// Current position becomes the home position.
    pub fn set_home(&self) -> Result<()> {
        let pos = self.position()?;
        *self.home.lock() = pos;
        Ok(())
    }

    pub fn presets(&self) -> Vec<Preset> {
        self.presets.lock().clone()
    }

    /// Store the current position.
    ///
    /// With `token` naming an existing preset its position (and name, if
    /// given) is updated; otherwise a new preset `Preset<n>` is created with
    /// the lowest free `n`.
    pub fn set_preset(&self, name: Option<&str>, token: Option<&str>) -> Result<String> {
        let position = self.position()?;
        let mut presets = self.presets.lock();

        if let Some(token) = token {
            let existing = presets
                .iter_mut()
                .find(|p| p.token == token)
                .ok_or_else(|| Error::not_found(format!("no preset with token '{}'", token)))?;
            existing.position = position;
            if let Some(name) = name {
                existing.name = name.to_string();
            }
            return Ok(existing.token.clone());
        }

        if presets.len() >= MAX_PRESETS {
            return Err(Error::invalid(format!(
                "maximum number of presets ({}) reached",
                MAX_PRESETS
            )));
        }
        if let Some(name) = name {
            if presets.iter().any(|p| p.name == name) {
                return Err(Error::duplicate(format!("preset name '{}' in use", name)));
            }
        }

        let token = (1..=MAX_PRESETS)
            .map(|n| format!("Preset{}", n))
            .find(|t| presets.iter().all(|p| &p.token != t))
            .ok_or_else(|| Error::generic("no free preset token"))?;
        presets.push(Preset {
            token: token.clone(),
            name: name.unwrap_or(&token).to_string(),
            position,
        });
        Ok(token)
    }

    /// Remaining presets keep their order.
    pub fn remove_preset(&self, token: &str) -> Result<()> {
        let mut presets = self.presets.lock();
        let idx = presets
            .iter()
            .position(|p| p.token == token)
            .ok_or_else(|| Error::not_found(format!("no preset with token '{}'", token)))?;
        presets.remove(idx);
        Ok(())
    }

    pub fn goto_preset(&self, token: &str, speed: Option<PanTilt>) -> Result<()> {
        let target = self
            .presets
            .lock()
            .iter()
            .find(|p| p.token == token)
            .map(|p| p.position)
            .ok_or_else(|| Error::not_found(format!("no preset with token '{}'", token)))?;
        self.absolute_move(target, speed)
    }

    pub fn is_moving(&self) -> bool {
        self.driver.is_moving()
    }
}

fn speed_of(speed: Option<PanTilt>) -> u8 {
    speed.map_or(DEFAULT_DRIVER_SPEED, |s| driver_speed(s.x.abs().max(s.y.abs())))
}

/// Parse the subset of ISO 8601 durations used for timeouts (`PT1H2M3.5S`).
pub fn parse_duration(text: &str) -> Result<Duration> {
    let invalid = || Error::invalid(format!("invalid duration '{}'", text));
    let rest = text.trim().strip_prefix("PT").ok_or_else(invalid)?;
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total = 0.0f64;
    let mut number = String::new();
    for c in rest.chars() {
        match c {
            '0'..='9' | '.' => number.push(c),
            'H' | 'M' | 'S' => {
                let value: f64 = number.parse().map_err(|_| invalid())?;
                total += value
                    * match c {
                        'H' => 3600.0,
                        'M' => 60.0,
                        _ => 1.0,
                    };
                number.clear();
            }
            _ => return Err(invalid()),
        }
    }
    if !number.is_empty() || !total.is_finite() {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(total).map_err(|_| invalid())
}

fn vector(ctx: &ActionContext<'_>, prefix: &str) -> Result<Option<PanTilt>> {
    let x = ctx.params.param_f32(&format!("{}.PanTilt.x", prefix))?;
    let y = ctx.params.param_f32(&format!("{}.PanTilt.y", prefix))?;
    match (x, y) {
        (None, None) => Ok(None),
        (x, y) => Ok(Some(PanTilt::new(x.unwrap_or(0.0), y.unwrap_or(0.0)))),
    }
}

fn required_vector(ctx: &ActionContext<'_>, prefix: &str) -> Result<PanTilt> {
    let v = vector(ctx, prefix)?
        .ok_or_else(|| Error::invalid(format!("missing {}/PanTilt", prefix)))?;
    if !(-1.0..=1.0).contains(&v.x) || !(-1.0..=1.0).contains(&v.y) {
        return Err(Error::invalid(format!(
            "{} ({}, {}) outside [-1, 1]",
            prefix, v.x, v.y
        )));
    }
    Ok(v)
}

fn pan_tilt_xml(name: &str, v: PanTilt, space: &str) -> XmlElement {
    XmlElement::new(name)
        .attr("x", v.x)
        .attr("y", v.y)
        .attr("space", space)
}

fn space_xml(name: &str, uri: &str, x: (f32, f32), y: (f32, f32)) -> XmlElement {
    let range = |name: &str, (min, max): (f32, f32)| {
        XmlElement::new(name)
            .child(XmlElement::leaf("tt:Min", min))
            .child(XmlElement::leaf("tt:Max", max))
    };
    XmlElement::new(name)
        .child(XmlElement::leaf("tt:URI", uri))
        .child(range("tt:XRange", x))
        .child(range("tt:YRange", y))
}

fn nodes_xml() -> XmlElement {
    XmlElement::new("tptz:GetNodesResponse").child(
        XmlElement::new("tptz:PTZNode")
            .attr("token", NODE_TOKEN)
            .child(XmlElement::leaf("tt:Name", "PTZ Node"))
            .child(
                XmlElement::new("tt:SupportedPTZSpaces")
                    .child(space_xml(
                        "tt:AbsolutePanTiltPositionSpace",
                        POSITION_SPACE,
                        (-1.0, 1.0),
                        (-1.0, 1.0),
                    ))
                    .child(space_xml(
                        "tt:RelativePanTiltTranslationSpace",
                        TRANSLATION_SPACE,
                        (-1.0, 1.0),
                        (-1.0, 1.0),
                    ))
                    .child(space_xml(
                        "tt:ContinuousPanTiltVelocitySpace",
                        VELOCITY_SPACE,
                        (-1.0, 1.0),
                        (-1.0, 1.0),
                    )),
            )
            .child(XmlElement::leaf("tt:MaximumNumberOfPresets", MAX_PRESETS))
            .child(XmlElement::leaf("tt:HomeSupported", "true")),
    )
}

fn utc_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn ok(element: &str) -> Result<Option<XmlElement>> {
    Ok(Some(XmlElement::new(element)))
}

type PtzAction =
    fn(&PtzService, &ActionContext<'_>, &mut ProtocolResponse) -> Result<Option<XmlElement>>;

fn bind(name: &str, ptz: &Arc<PtzService>, f: PtzAction) -> ActionDefinition {
    let ptz = Arc::clone(ptz);
    ActionDefinition::from_fn(name, move |ctx, resp| f(&ptz, ctx, resp))
}

/// Action table of the PTZ service.
pub fn actions(ptz: &Arc<PtzService>) -> Vec<ActionDefinition> {
    vec![
        bind("GetNodes", ptz, |_, _, _| Ok(Some(nodes_xml()))),
        bind("GetStatus", ptz, |ptz, _ctx, _| {
            let pos = ptz.position()?;
            let moving = if ptz.is_moving() { "MOVING" } else { "IDLE" };
            Ok(Some(
                XmlElement::new("tptz:GetStatusResponse").child(
                    XmlElement::new("tptz:PTZStatus")
                        .child(
                            XmlElement::new("tt:Position")
                                .child(pan_tilt_xml("tt:PanTilt", pos, POSITION_SPACE)),
                        )
                        .child(
                            XmlElement::new("tt:MoveStatus")
                                .child(XmlElement::leaf("tt:PanTilt", moving))
                                .child(XmlElement::leaf("tt:Zoom", "IDLE")),
                        )
                        .child(XmlElement::leaf("tt:UtcTime", utc_now())),
                ),
            ))
        })
        .require_params(&["ProfileToken"]),
        bind("AbsoluteMove", ptz, |ptz, ctx, _| {
            let target = required_vector(ctx, "Position")?;
            ptz.absolute_move(target, vector(ctx, "Speed")?)?;
            ok("tptz:AbsoluteMoveResponse")
        })
        .require_params(&["ProfileToken"]),
        bind("RelativeMove", ptz, |ptz, ctx, _| {
            let translation = required_vector(ctx, "Translation")?;
            ptz.relative_move(translation, vector(ctx, "Speed")?)?;
            ok("tptz:RelativeMoveResponse")
        })
        .require_params(&["ProfileToken"]),
        bind("ContinuousMove", ptz, |ptz, ctx, _| {
            let velocity = required_vector(ctx, "Velocity")?;
            let timeout = ctx.params.param("Timeout").map(parse_duration).transpose()?;
            ptz.continuous_move(velocity, timeout)?;
            ok("tptz:ContinuousMoveResponse")
        })
        .require_params(&["ProfileToken"]),
        bind("Stop", ptz, |ptz, ctx, _| {
            let pan_tilt = ctx.params.param("PanTilt").map_or(true, |v| v != "false");
            ptz.stop(pan_tilt)?;
            ok("tptz:StopResponse")
        })
        .require_params(&["ProfileToken"]),
        bind("GotoHomePosition", ptz, |ptz, ctx, _| {
            ptz.goto_home(vector(ctx, "Speed")?)?;
            ok("tptz:GotoHomePositionResponse")
        })
        .require_params(&["ProfileToken"]),
        bind("SetHomePosition", ptz, |ptz, _, _| {
            ptz.set_home()?;
            ok("tptz:SetHomePositionResponse")
        })
        .require_params(&["ProfileToken"]),
        bind("GetPresets", ptz, |ptz, _, _| {
            let mut resp = XmlElement::new("tptz:GetPresetsResponse");
            for preset in ptz.presets() {
                resp.push(
                    XmlElement::new("tptz:Preset")
                        .attr("token", &preset.token)
                        .child(XmlElement::leaf("tt:Name", &preset.name))
                        .child(
                            XmlElement::new("tt:PTZPosition").child(pan_tilt_xml(
                                "tt:PanTilt",
                                preset.position,
                                POSITION_SPACE,
                            )),
                        ),
                );
            }
            Ok(Some(resp))
        })
        .require_params(&["ProfileToken"]),
        bind("SetPreset", ptz, |ptz, ctx, _| {
            let token = ptz.set_preset(
                ctx.params.param("PresetName").filter(|n| !n.is_empty()),
                ctx.params.param("PresetToken").filter(|t| !t.is_empty()),
            )?;
            ctx.log.info(&format!("stored {}", token));
            Ok(Some(
                XmlElement::new("tptz:SetPresetResponse")
                    .child(XmlElement::leaf("tptz:PresetToken", token)),
            ))
        })
        .require_params(&["ProfileToken"]),
        bind("RemovePreset", ptz, |ptz, ctx, _| {
            ptz.remove_preset(ctx.params.require("PresetToken")?)?;
            ok("tptz:RemovePresetResponse")
        })
        .require_params(&["ProfileToken", "PresetToken"]),
        bind("GotoPreset", ptz, |ptz, ctx, _| {
            ptz.goto_preset(ctx.params.require("PresetToken")?, vector(ctx, "Speed")?)?;
            ok("tptz:GotoPresetResponse")
        })
        .require_params(&["ProfileToken", "PresetToken"]),
    ]
}

/// Capability values answered through the dispatcher.
pub fn capability(name: &str) -> Option<String> {
    match name {
        "MaximumNumberOfPresets" => Some(MAX_PRESETS.to_string()),
        "HomeSupported" => Some("true".to_string()),
        "NodeToken" => Some(NODE_TOKEN.to_string()),
        _ => None,
    }
}
