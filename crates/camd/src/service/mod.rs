// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Services: the dispatcher, the generic handler framework, and the
//! business logic of the device, media, PTZ and imaging services.

pub mod device;
pub mod dispatcher;
pub mod handler;
pub mod imaging;
pub mod media;
pub mod ptz;

pub use dispatcher::{ServiceDispatcher, ServiceInfo, ServiceOperationHandler, ServiceRegistration};
pub use handler::{
    ActionContext, ActionDefinition, ActionStats, BusinessLogic, LogContext, PostProcess,
    RequiredParams, ServiceConfig, ServiceHandler, ServiceStats, ServiceType, StandardPostProcess,
    Validator,
};

use std::net::Ipv4Addr;

/// Where this device is reachable; used to build service addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceEnv {
    pub host_ip: Ipv4Addr,
    pub http_port: u16,
}

impl ServiceEnv {
    pub fn new(host_ip: Ipv4Addr, http_port: u16) -> Self {
        Self { host_ip, http_port }
    }

    /// `http://<ip>:<port><path>`
    pub fn xaddr(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host_ip, self.http_port, path)
    }

    /// `<scheme>://<ip>:<port><path>`
    pub fn url(&self, scheme: &str, port: u16, path: &str) -> String {
        format!("{}://{}:{}{}", scheme, self.host_ip, port, path)
    }
}
