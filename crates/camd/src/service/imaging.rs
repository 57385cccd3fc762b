// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Imaging service: picture settings and automatic day/night switching.

use super::handler::{ActionContext, ActionDefinition};
use crate::adapter::ProtocolResponse;
use crate::config::ConfigProvider;
use crate::error::{Error, Result};
use crate::soap::XmlElement;
use parking_lot::Mutex;
use std::ops::RangeInclusive;
use std::sync::Arc;

const CONFIG_SECTION: &str = "imaging";

pub const LEVEL_RANGE: RangeInclusive<i32> = -100..=100;
pub const HUE_RANGE: RangeInclusive<i32> = -180..=180;
pub const THRESHOLD_RANGE: RangeInclusive<i32> = 0..=100;

/// Picture effect adjustable on the video processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Brightness,
    Contrast,
    Saturation,
    Sharpness,
    Hue,
}

impl Effect {
    /// Map a user-facing value onto the processor's native scale
    /// (`-50..=50` for every effect).
    pub fn scale(self, value: i32) -> i32 {
        match self {
            Effect::Hue => value * 50 / 180,
            _ => value / 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayNightMode {
    Auto,
    Day,
    Night,
}

impl DayNightMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DayNightMode::Auto => "AUTO",
            DayNightMode::Day => "DAY",
            DayNightMode::Night => "NIGHT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AUTO" => Some(DayNightMode::Auto),
            "DAY" => Some(DayNightMode::Day),
            "NIGHT" => Some(DayNightMode::Night),
            _ => None,
        }
    }

    /// IR cut filter ON keeps infrared out, which is day operation.
    fn from_ir_cut_filter(s: &str) -> Option<Self> {
        match s {
            "ON" => Some(DayNightMode::Day),
            "OFF" => Some(DayNightMode::Night),
            "AUTO" => Some(DayNightMode::Auto),
            _ => None,
        }
    }

    fn ir_cut_filter(self) -> &'static str {
        match self {
            DayNightMode::Auto => "AUTO",
            DayNightMode::Day => "ON",
            DayNightMode::Night => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrLedMode {
    Auto,
    On,
    Off,
}

impl IrLedMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IrLedMode::Auto => "AUTO",
            IrLedMode::On => "ON",
            IrLedMode::Off => "OFF",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AUTO" => Some(IrLedMode::Auto),
            "ON" => Some(IrLedMode::On),
            "OFF" => Some(IrLedMode::Off),
            _ => None,
        }
    }
}

/// Sensor, video processor and IR illumination.
pub trait ImagingDriver: Send + Sync {
    /// `value` is already on the processor scale.
    fn apply_effect(&self, effect: Effect, value: i32) -> Result<()>;
    fn set_day_night(&self, mode: DayNightMode) -> Result<()>;
    fn set_ir_led(&self, mode: IrLedMode, level: i32) -> Result<()>;
}

/// Last values pushed to an [`InMemoryImagingDriver`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverState {
    pub effects: Vec<(Effect, i32)>,
    pub day_night: Option<DayNightMode>,
    pub ir_led: Option<(IrLedMode, i32)>,
}

/// Records what it is asked to do.
#[derive(Debug, Default)]
pub struct InMemoryImagingDriver {
    state: Mutex<DriverState>,
}

impl InMemoryImagingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DriverState {
        self.state.lock().clone()
    }
}

impl ImagingDriver for InMemoryImagingDriver {
    fn apply_effect(&self, effect: Effect, value: i32) -> Result<()> {
        let mut state = self.state.lock();
        state.effects.retain(|(e, _)| *e != effect);
        state.effects.push((effect, value));
        Ok(())
    }

    fn set_day_night(&self, mode: DayNightMode) -> Result<()> {
        self.state.lock().day_night = Some(mode);
        Ok(())
    }

    fn set_ir_led(&self, mode: IrLedMode, level: i32) -> Result<()> {
        self.state.lock().ir_led = Some((mode, level));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImagingSettings {
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub sharpness: i32,
    pub hue: i32,
}

fn config_i32(config: &dyn ConfigProvider, key: &str, fallback: i32) -> i32 {
    let v = config.get_int(CONFIG_SECTION, key, i64::from(fallback));
    i32::try_from(v).unwrap_or(fallback)
}

impl ImagingSettings {
    /// Defaults are neutral (all zero).
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        Self {
            brightness: config_i32(config, "brightness", 0),
            contrast: config_i32(config, "contrast", 0),
            saturation: config_i32(config, "saturation", 0),
            sharpness: config_i32(config, "sharpness", 0),
            hue: config_i32(config, "hue", 0),
        }
    }

    fn effects(&self) -> [(Effect, i32); 5] {
        [
            (Effect::Brightness, self.brightness),
            (Effect::Contrast, self.contrast),
            (Effect::Saturation, self.saturation),
            (Effect::Sharpness, self.sharpness),
            (Effect::Hue, self.hue),
        ]
    }
}

/// Partial settings update; `None` fields are left unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub brightness: Option<i32>,
    pub contrast: Option<i32>,
    pub saturation: Option<i32>,
    pub sharpness: Option<i32>,
    pub hue: Option<i32>,
    pub mode: Option<DayNightMode>,
}

impl SettingsUpdate {
    fn validate(&self) -> Result<()> {
        let levels = [
            ("Brightness", self.brightness),
            ("Contrast", self.contrast),
            ("Saturation", self.saturation),
            ("Sharpness", self.sharpness),
        ];
        for (name, value) in levels {
            check_range(name, value, &LEVEL_RANGE)?;
        }
        check_range("Hue", self.hue, &HUE_RANGE)
    }
}

fn check_range(name: &str, value: Option<i32>, range: &RangeInclusive<i32>) -> Result<()> {
    match value {
        Some(v) if !range.contains(&v) => Err(Error::invalid(format!(
            "{} {} outside [{}, {}]",
            name,
            v,
            range.start(),
            range.end()
        ))),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayNightConfig {
    pub mode: DayNightMode,
    /// Luminance percentage below which the camera switches to night.
    pub day_to_night_threshold: i32,
    /// Luminance percentage above which the camera switches back to day.
    pub night_to_day_threshold: i32,
    /// Minimum seconds between two switches.
    pub lock_time_secs: i32,
    pub ir_led_mode: IrLedMode,
    pub ir_led_level: i32,
    pub enable_auto_switching: bool,
}

impl Default for DayNightConfig {
    fn default() -> Self {
        Self {
            mode: DayNightMode::Auto,
            day_to_night_threshold: 30,
            night_to_day_threshold: 70,
            lock_time_secs: 10,
            ir_led_mode: IrLedMode::Auto,
            ir_led_level: 1,
            enable_auto_switching: true,
        }
    }
}

impl DayNightConfig {
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        let d = Self::default();
        let mode = config
            .get(CONFIG_SECTION, "day_night_mode")
            .and_then(|m| DayNightMode::parse(&m))
            .unwrap_or(d.mode);
        let ir_led_mode = config
            .get(CONFIG_SECTION, "ir_led_mode")
            .and_then(|m| IrLedMode::parse(&m))
            .unwrap_or(d.ir_led_mode);
        Self {
            mode,
            day_to_night_threshold: config_i32(
                config,
                "day_to_night_threshold",
                d.day_to_night_threshold,
            ),
            night_to_day_threshold: config_i32(
                config,
                "night_to_day_threshold",
                d.night_to_day_threshold,
            ),
            lock_time_secs: config_i32(config, "lock_time", d.lock_time_secs),
            ir_led_mode,
            ir_led_level: config_i32(config, "ir_led_level", d.ir_led_level),
            enable_auto_switching: config_i32(
                config,
                "enable_auto_switching",
                i32::from(d.enable_auto_switching),
            ) != 0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_range(
            "DayToNightThreshold",
            Some(self.day_to_night_threshold),
            &THRESHOLD_RANGE,
        )?;
        check_range(
            "NightToDayThreshold",
            Some(self.night_to_day_threshold),
            &THRESHOLD_RANGE,
        )?;
        if self.day_to_night_threshold >= self.night_to_day_threshold {
            return Err(Error::invalid(
                "DayToNightThreshold must be below NightToDayThreshold",
            ));
        }
        if self.lock_time_secs < 0 {
            return Err(Error::invalid("LockTime must not be negative"));
        }
        check_range("IrLedLevel", Some(self.ir_led_level), &THRESHOLD_RANGE)
    }
}

/// Imaging state shared by every imaging action.
pub struct ImagingService {
    driver: Arc<dyn ImagingDriver>,
    settings: Mutex<ImagingSettings>,
    day_night: Mutex<DayNightConfig>,
}

impl ImagingService {
    pub fn new(driver: Arc<dyn ImagingDriver>, config: &dyn ConfigProvider) -> Self {
        Self {
            driver,
            settings: Mutex::new(ImagingSettings::from_config(config)),
            day_night: Mutex::new(DayNightConfig::from_config(config)),
        }
    }

    /// Push the current state to the hardware.
    pub fn apply_all(&self) -> Result<()> {
        let settings = self.settings();
        for (effect, value) in settings.effects() {
            self.driver.apply_effect(effect, effect.scale(value))?;
        }
        let dn = self.day_night();
        self.driver.set_day_night(dn.mode)?;
        self.driver.set_ir_led(dn.ir_led_mode, dn.ir_led_level)
    }

    pub fn settings(&self) -> ImagingSettings {
        *self.settings.lock()
    }

    pub fn day_night(&self) -> DayNightConfig {
        *self.day_night.lock()
    }

    /// Validate the whole update, then apply only the fields it carries.
    pub fn update_settings(&self, update: SettingsUpdate) -> Result<ImagingSettings> {
        update.validate()?;

        let mut guard = self.settings.lock();
        let settings = &mut *guard;
        let changes = [
            (Effect::Brightness, update.brightness, &mut settings.brightness),
            (Effect::Contrast, update.contrast, &mut settings.contrast),
            (Effect::Saturation, update.saturation, &mut settings.saturation),
            (Effect::Sharpness, update.sharpness, &mut settings.sharpness),
            (Effect::Hue, update.hue, &mut settings.hue),
        ];
        for (effect, value, slot) in changes {
            if let Some(v) = value {
                self.driver.apply_effect(effect, effect.scale(v))?;
                *slot = v;
            }
        }
        let result = *guard;
        drop(guard);

        if let Some(mode) = update.mode {
            self.driver.set_day_night(mode)?;
            self.day_night.lock().mode = mode;
        }
        Ok(result)
    }

    pub fn set_day_night(&self, config: DayNightConfig) -> Result<()> {
        config.validate()?;
        self.driver.set_day_night(config.mode)?;
        self.driver
            .set_ir_led(config.ir_led_mode, config.ir_led_level)?;
        *self.day_night.lock() = config;
        Ok(())
    }
}

fn level_param(ctx: &ActionContext<'_>, names: &[&str]) -> Result<Option<i32>> {
    for name in names {
        if let Some(v) = ctx.params.param_f32(name)? {
            if !v.is_finite() {
                return Err(Error::invalid(format!("parameter '{}' is not finite", name)));
            }
            return Ok(Some(v.round() as i32));
        }
    }
    Ok(None)
}

fn settings_update(ctx: &ActionContext<'_>) -> Result<SettingsUpdate> {
    let mode = ctx
        .params
        .param("IrCutFilter")
        .map(|v| {
            DayNightMode::from_ir_cut_filter(v)
                .ok_or_else(|| Error::invalid(format!("unknown IrCutFilter mode '{}'", v)))
        })
        .transpose()?;
    Ok(SettingsUpdate {
        brightness: level_param(ctx, &["Brightness"])?,
        contrast: level_param(ctx, &["Contrast"])?,
        saturation: level_param(ctx, &["ColorSaturation", "Saturation"])?,
        sharpness: level_param(ctx, &["Sharpness"])?,
        hue: level_param(ctx, &["Hue"])?,
        mode,
    })
}

fn day_night_update(ctx: &ActionContext<'_>, current: DayNightConfig) -> Result<DayNightConfig> {
    let int = |name: &str, fallback: i32| -> Result<i32> {
        ctx.params
            .param_i64(name)?
            .map_or(Ok(fallback), i32::try_from)
            .map_err(|_| Error::invalid(format!("{} out of range", name)))
    };
    let mode = match ctx.params.param("Mode") {
        Some(m) => DayNightMode::parse(m)
            .ok_or_else(|| Error::invalid(format!("unknown day/night mode '{}'", m)))?,
        None => current.mode,
    };
    let ir_led_mode = match ctx.params.param("IrLedMode") {
        Some(m) => {
            IrLedMode::parse(m).ok_or_else(|| Error::invalid(format!("unknown IR LED mode '{}'", m)))?
        }
        None => current.ir_led_mode,
    };
    let enable_auto_switching = match ctx.params.param("EnableAutoSwitching") {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        Some(other) => {
            return Err(Error::invalid(format!(
                "EnableAutoSwitching '{}' is not a boolean",
                other
            )))
        }
        None => current.enable_auto_switching,
    };

    Ok(DayNightConfig {
        mode,
        day_to_night_threshold: int("DayToNightThreshold", current.day_to_night_threshold)?,
        night_to_day_threshold: int("NightToDayThreshold", current.night_to_day_threshold)?,
        lock_time_secs: int("LockTime", current.lock_time_secs)?,
        ir_led_mode,
        ir_led_level: int("IrLedLevel", current.ir_led_level)?,
        enable_auto_switching,
    })
}

fn range_xml(name: &str, range: &RangeInclusive<i32>) -> XmlElement {
    XmlElement::new(name)
        .child(XmlElement::leaf("tt:Min", range.start()))
        .child(XmlElement::leaf("tt:Max", range.end()))
}

fn settings_xml(settings: &ImagingSettings, mode: DayNightMode) -> XmlElement {
    XmlElement::new("timg:ImagingSettings")
        .child(XmlElement::leaf("tt:Brightness", settings.brightness))
        .child(XmlElement::leaf("tt:ColorSaturation", settings.saturation))
        .child(XmlElement::leaf("tt:Contrast", settings.contrast))
        .child(XmlElement::leaf("tt:IrCutFilter", mode.ir_cut_filter()))
        .child(XmlElement::leaf("tt:Sharpness", settings.sharpness))
        .child(XmlElement::leaf("tt:Hue", settings.hue))
}

fn day_night_xml(config: &DayNightConfig) -> XmlElement {
    XmlElement::new("timg:DayNightConfig")
        .child(XmlElement::leaf("tt:Mode", config.mode.as_str()))
        .child(XmlElement::leaf(
            "tt:DayToNightThreshold",
            config.day_to_night_threshold,
        ))
        .child(XmlElement::leaf(
            "tt:NightToDayThreshold",
            config.night_to_day_threshold,
        ))
        .child(XmlElement::leaf("tt:LockTime", config.lock_time_secs))
        .child(XmlElement::leaf("tt:IrLedMode", config.ir_led_mode.as_str()))
        .child(XmlElement::leaf("tt:IrLedLevel", config.ir_led_level))
        .child(XmlElement::leaf(
            "tt:EnableAutoSwitching",
            config.enable_auto_switching,
        ))
}

type ImagingAction =
    fn(&ImagingService, &ActionContext<'_>, &mut ProtocolResponse) -> Result<Option<XmlElement>>;

fn bind(name: &str, svc: &Arc<ImagingService>, f: ImagingAction) -> ActionDefinition {
    let svc = Arc::clone(svc);
    ActionDefinition::from_fn(name, move |ctx, resp| f(&svc, ctx, resp))
}

/// Action table of the imaging service.
pub fn actions(svc: &Arc<ImagingService>) -> Vec<ActionDefinition> {
    vec![
        bind("GetImagingSettings", svc, |svc, _, _| {
            Ok(Some(
                XmlElement::new("timg:GetImagingSettingsResponse")
                    .child(settings_xml(&svc.settings(), svc.day_night().mode)),
            ))
        })
        .require_params(&["VideoSourceToken"]),
        bind("SetImagingSettings", svc, |svc, ctx, _| {
            let applied = svc.update_settings(settings_update(ctx)?)?;
            ctx.log.debug(&format!("applied {:?}", applied));
            Ok(Some(XmlElement::new("timg:SetImagingSettingsResponse")))
        })
        .require_params(&["VideoSourceToken"]),
        bind("GetOptions", svc, |_, _, _| {
            Ok(Some(
                XmlElement::new("timg:GetOptionsResponse").child(
                    XmlElement::new("timg:ImagingOptions")
                        .child(range_xml("tt:Brightness", &LEVEL_RANGE))
                        .child(range_xml("tt:ColorSaturation", &LEVEL_RANGE))
                        .child(range_xml("tt:Contrast", &LEVEL_RANGE))
                        .child(XmlElement::leaf("tt:IrCutFilterModes", "ON"))
                        .child(XmlElement::leaf("tt:IrCutFilterModes", "OFF"))
                        .child(XmlElement::leaf("tt:IrCutFilterModes", "AUTO"))
                        .child(range_xml("tt:Sharpness", &LEVEL_RANGE))
                        .child(range_xml("tt:Hue", &HUE_RANGE)),
                ),
            ))
        })
        .require_params(&["VideoSourceToken"]),
        bind("GetAutoDayNightConfig", svc, |svc, _, _| {
            Ok(Some(
                XmlElement::new("timg:GetAutoDayNightConfigResponse")
                    .child(day_night_xml(&svc.day_night())),
            ))
        }),
        bind("SetAutoDayNightConfig", svc, |svc, ctx, _| {
            let config = day_night_update(ctx, svc.day_night())?;
            svc.set_day_night(config)?;
            ctx.log.info(&format!(
                "day/night {} ({}..{})",
                config.mode.as_str(),
                config.day_to_night_threshold,
                config.night_to_day_threshold
            ));
            Ok(Some(XmlElement::new("timg:SetAutoDayNightConfigResponse")))
        }),
    ]
}
