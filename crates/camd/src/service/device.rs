// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Device service: identity, capabilities, clock, hostname, service list.

use super::handler::{ActionContext, ActionDefinition, ServiceType};
use super::ServiceEnv;
use crate::adapter::ProtocolResponse;
use crate::config::{ConfigProvider, FALLBACK_HOSTNAME};
use crate::error::Result;
use crate::soap::XmlElement;
use chrono::{Datelike, Timelike, Utc};

pub const DEFAULT_MANUFACTURER: &str = "Anyka";
pub const DEFAULT_MODEL: &str = "AK3918 Camera";
pub const DEFAULT_FIRMWARE_VERSION: &str = "1.0.0";
pub const DEFAULT_SERIAL_NUMBER: &str = "AK3918-001";
pub const DEFAULT_HARDWARE_ID: &str = "1.0";

const CONFIG_SECTION: &str = "device";
const SERVICE_VERSION: (u32, u32) = (2, 5);

/// Identity reported by GetDeviceInformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub hardware_id: String,
}

impl DeviceInfo {
    /// Compiled-in defaults, overridden by the `device` config section.
    pub fn from_config(config: &dyn ConfigProvider) -> Self {
        Self {
            manufacturer: config.get_string(CONFIG_SECTION, "manufacturer", DEFAULT_MANUFACTURER),
            model: config.get_string(CONFIG_SECTION, "model", DEFAULT_MODEL),
            firmware_version: config.get_string(
                CONFIG_SECTION,
                "firmware_version",
                DEFAULT_FIRMWARE_VERSION,
            ),
            serial_number: config.get_string(
                CONFIG_SECTION,
                "serial_number",
                DEFAULT_SERIAL_NUMBER,
            ),
            hardware_id: config.get_string(CONFIG_SECTION, "hardware_id", DEFAULT_HARDWARE_ID),
        }
    }

    fn to_xml(&self) -> XmlElement {
        XmlElement::new("tds:GetDeviceInformationResponse")
            .child(XmlElement::leaf("tds:Manufacturer", &self.manufacturer))
            .child(XmlElement::leaf("tds:Model", &self.model))
            .child(XmlElement::leaf("tds:FirmwareVersion", &self.firmware_version))
            .child(XmlElement::leaf("tds:SerialNumber", &self.serial_number))
            .child(XmlElement::leaf("tds:HardwareId", &self.hardware_id))
    }
}

/// Host name of this machine, or the fallback when it cannot be read.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| FALLBACK_HOSTNAME.to_string())
}

/// Action table of the device service.
pub fn actions(env: ServiceEnv) -> Vec<ActionDefinition> {
    vec![
        ActionDefinition::from_fn("GetDeviceInformation", |ctx, _resp| {
            Ok(Some(DeviceInfo::from_config(ctx.config).to_xml()))
        }),
        ActionDefinition::from_fn("GetCapabilities", move |_ctx, _resp| {
            Ok(Some(capabilities(&env)))
        }),
        ActionDefinition::from_fn("GetSystemDateAndTime", |_ctx, _resp| {
            Ok(Some(system_date_and_time()))
        }),
        ActionDefinition::from_fn("GetHostname", |_ctx, _resp| {
            Ok(Some(
                XmlElement::new("tds:GetHostnameResponse").child(
                    XmlElement::new("tds:HostnameInformation")
                        .child(XmlElement::leaf("tt:FromDHCP", "false"))
                        .child(XmlElement::leaf("tt:Name", local_hostname())),
                ),
            ))
        }),
        ActionDefinition::from_fn("GetServices", move |_ctx, _resp| Ok(Some(services(&env)))),
        ActionDefinition::from_fn("SystemReboot", system_reboot),
    ]
}

fn system_reboot(ctx: &ActionContext<'_>, _resp: &mut ProtocolResponse) -> Result<Option<XmlElement>> {
    // Reboot itself belongs to the platform layer; the request is acknowledged.
    ctx.log.info("reboot requested");
    Ok(Some(
        XmlElement::new("tds:SystemRebootResponse")
            .child(XmlElement::leaf("tds:Message", "Rebooting")),
    ))
}

fn capabilities(env: &ServiceEnv) -> XmlElement {
    let xaddr = |svc: ServiceType| XmlElement::leaf("tt:XAddr", env.xaddr(svc.path()));
    XmlElement::new("tds:GetCapabilitiesResponse").child(
        XmlElement::new("tds:Capabilities")
            .child(
                XmlElement::new("tt:Device")
                    .child(xaddr(ServiceType::Device))
                    .child(
                        XmlElement::new("tt:System")
                            .child(XmlElement::leaf("tt:DiscoveryResolve", "false"))
                            .child(XmlElement::leaf("tt:DiscoveryBye", "true"))
                            .child(XmlElement::leaf("tt:RemoteDiscovery", "false")),
                    ),
            )
            .child(XmlElement::new("tt:Imaging").child(xaddr(ServiceType::Imaging)))
            .child(
                XmlElement::new("tt:Media").child(xaddr(ServiceType::Media)).child(
                    XmlElement::new("tt:StreamingCapabilities")
                        .child(XmlElement::leaf("tt:RTPMulticast", "false"))
                        .child(XmlElement::leaf("tt:RTP_TCP", "true"))
                        .child(XmlElement::leaf("tt:RTP_RTSP_TCP", "true")),
                ),
            )
            .child(XmlElement::new("tt:PTZ").child(xaddr(ServiceType::Ptz))),
    )
}

fn services(env: &ServiceEnv) -> XmlElement {
    let mut resp = XmlElement::new("tds:GetServicesResponse");
    for svc in ServiceType::ALL {
        resp.push(
            XmlElement::new("tds:Service")
                .child(XmlElement::leaf("tds:Namespace", svc.namespace()))
                .child(XmlElement::leaf("tds:XAddr", env.xaddr(svc.path())))
                .child(
                    XmlElement::new("tds:Version")
                        .child(XmlElement::leaf("tt:Major", SERVICE_VERSION.0))
                        .child(XmlElement::leaf("tt:Minor", SERVICE_VERSION.1)),
                ),
        );
    }
    resp
}

fn system_date_and_time() -> XmlElement {
    let now = Utc::now();
    let stamp = |name: &str| {
        XmlElement::new(name)
            .child(
                XmlElement::new("tt:Time")
                    .child(XmlElement::leaf("tt:Hour", now.hour()))
                    .child(XmlElement::leaf("tt:Minute", now.minute()))
                    .child(XmlElement::leaf("tt:Second", now.second())),
            )
            .child(
                XmlElement::new("tt:Date")
                    .child(XmlElement::leaf("tt:Year", now.year()))
                    .child(XmlElement::leaf("tt:Month", now.month()))
                    .child(XmlElement::leaf("tt:Day", now.day())),
            )
    };

    XmlElement::new("tds:GetSystemDateAndTimeResponse").child(
        XmlElement::new("tds:SystemDateAndTime")
            .child(XmlElement::leaf("tt:DateTimeType", "Manual"))
            .child(XmlElement::leaf("tt:DaylightSavings", "false"))
            .child(XmlElement::new("tt:TimeZone").child(XmlElement::leaf("tt:TZ", "UTC")))
            .child(stamp("tt:UTCDateTime"))
            .child(stamp("tt:LocalDateTime")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use std::net::Ipv4Addr;

    #[test]
    fn test_device_info_defaults() {
        let info = DeviceInfo::from_config(&DeviceConfig::new());
        assert_eq!(info.manufacturer, "Anyka");
        assert_eq!(info.model, "AK3918 Camera");
        assert_eq!(info.firmware_version, "1.0.0");
        assert_eq!(info.serial_number, "AK3918-001");
        assert_eq!(info.hardware_id, "1.0");
    }

    #[test]
    fn test_device_info_overrides() {
        let mut cfg = DeviceConfig::new();
        cfg.set("device", "manufacturer", "Acme");
        cfg.set("device", "serial_number", "SN-42");
        let info = DeviceInfo::from_config(&cfg);
        assert_eq!(info.manufacturer, "Acme");
        assert_eq!(info.serial_number, "SN-42");
        assert_eq!(info.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_capabilities_carry_xaddrs() {
        let env = ServiceEnv::new(Ipv4Addr::new(192, 168, 1, 20), 8080);
        let mut xml = String::new();
        capabilities(&env).write_to(&mut xml);
        assert!(xml.contains("http://192.168.1.20:8080/onvif/device_service"));
        assert!(xml.contains("http://192.168.1.20:8080/onvif/ptz_service"));
        assert!(xml.contains("<tt:RTP_RTSP_TCP>true</tt:RTP_RTSP_TCP>"));
    }

    #[test]
    fn test_services_lists_every_service() {
        let env = ServiceEnv::new(Ipv4Addr::LOCALHOST, 80);
        let list = services(&env);
        assert_eq!(list.children.len(), ServiceType::ALL.len());
        assert_eq!(
            list.children[1].child_text("tds:Namespace"),
            Some(ServiceType::Media.namespace())
        );
    }

    #[test]
    fn test_hostname_never_empty() {
        assert!(!local_hostname().is_empty());
    }

    #[test]
    fn test_action_names() {
        let env = ServiceEnv::new(Ipv4Addr::LOCALHOST, 80);
        let names: Vec<String> = actions(env).iter().map(|a| a.name().to_string()).collect();
        assert!(names.iter().any(|n| n == "GetDeviceInformation"));
        assert!(names.iter().any(|n| n == "SystemReboot"));
    }
}
