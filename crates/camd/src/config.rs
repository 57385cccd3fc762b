// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration: compile-time constants and the device key/value store.
//!
//! # Architecture
//!
//! - **Level 1 (Static)**: protocol constants (ports, paths, limits, pool
//!   geometry, discovery timing). **Never hardcode these elsewhere.**
//! - **Level 2 (Dynamic)**: [`DeviceConfig`], sectioned key/value settings
//!   read through the narrow [`ConfigProvider`] interface with fallbacks.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

// =======================================================================
// HTTP / service endpoints
// =======================================================================

/// Default HTTP port of the device-management service.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

pub const DEVICE_SERVICE_PATH: &str = "/onvif/device_service";
pub const MEDIA_SERVICE_PATH: &str = "/onvif/media_service";
pub const PTZ_SERVICE_PATH: &str = "/onvif/ptz_service";
pub const IMAGING_SERVICE_PATH: &str = "/onvif/imaging_service";

/// RTSP port advertised in stream URIs.
pub const RTSP_PORT: u16 = 554;

// =======================================================================
// HTTP parser limits
// =======================================================================

/// Largest request body accepted (256 KiB). Checked before buffering.
pub const MAX_CONTENT_LENGTH: usize = 262_144;
/// Method token must be shorter than this.
pub const MAX_METHOD_LEN: usize = 16;
/// Request path must be shorter than this.
pub const MAX_PATH_LEN: usize = 256;
/// Version token must be shorter than this.
pub const MAX_VERSION_LEN: usize = 16;
/// Header name/value limit.
pub const MAX_HEADER_FIELD_LEN: usize = 8192;
pub const MAX_HEADERS: usize = 64;

// =======================================================================
// Buffer pool / response builder
// =======================================================================

/// Number of pooled response buffers.
pub const BUFFER_POOL_SIZE: usize = 50;
/// Size of each pooled buffer (32 KiB).
pub const BUFFER_SIZE: usize = 32_768;
/// Utilization (percent) above which a warning is logged.
pub const POOL_UTILIZATION_WARN_PERCENT: u32 = 80;
/// Responses up to this size go through the pool; larger ones are allocated directly.
pub const POOL_THRESHOLD: usize = 32_768;

// =======================================================================
// Dispatcher / handler framework
// =======================================================================

/// Registry capacity of the service dispatcher.
pub const MAX_REGISTERED_SERVICES: usize = 16;
/// Action table capacity per service handler.
pub const MAX_ACTIONS: usize = 32;

// =======================================================================
// Discovery
// =======================================================================

pub const DISCOVERY_MULTICAST_ADDR: [u8; 4] = [239, 255, 255, 250];
pub const DISCOVERY_PORT: u16 = 3702;
/// Hello re-announce interval with no intervening traffic.
pub const HELLO_INTERVAL_SECS: u64 = 300;
/// Receive timeout; bounds how long the loop sleeps between cancel checks.
pub const DISCOVERY_RECV_TIMEOUT_MS: u64 = 500;
/// Upper bound on `stop()` waiting for the responder thread.
pub const DISCOVERY_JOIN_TIMEOUT_MS: u64 = 2_000;
/// Datagrams larger than this are dropped.
pub const DISCOVERY_MAX_MESSAGE_SIZE: usize = 4096;
/// Address advertised when no usable interface is found.
pub const FALLBACK_IPV4: [u8; 4] = [192, 168, 1, 100];
/// Host identity used when the hostname cannot be read.
pub const FALLBACK_HOSTNAME: &str = "anyka";

// =======================================================================
// Dynamic configuration
// =======================================================================

/// Narrow configuration interface consumed by services.
///
/// Backends (INI loaders, flash storage) live outside this crate; they only
/// need to answer string and integer lookups.
pub trait ConfigProvider: Send + Sync {
    /// Raw string value, if present.
    fn get(&self, section: &str, key: &str) -> Option<String>;

    fn get_string(&self, section: &str, key: &str, fallback: &str) -> String {
        self.get(section, key)
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Integer value; missing or unparsable values yield `fallback`.
    fn get_int(&self, section: &str, key: &str, fallback: i64) -> i64 {
        self.get(section, key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(fallback)
    }
}

/// In-memory sectioned key/value store.
///
/// Loaded from a JSON object of objects:
///
/// ```json
/// { "device": { "manufacturer": "Acme" }, "imaging": { "brightness": 10 } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    sections: BTreeMap<String, BTreeMap<String, String>>,
}

impl DeviceConfig {
    /// Empty configuration; every lookup falls back to compiled-in defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(BTreeMap::is_empty)
    }

    /// Build from a JSON value. Scalars are stored as strings; nested
    /// objects and arrays below the key level are rejected.
    pub fn from_json(value: &Value) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| Error::invalid("device config must be a JSON object"))?;

        let mut config = Self::new();
        for (section, entries) in root {
            let entries: &Map<String, Value> = entries.as_object().ok_or_else(|| {
                Error::invalid(format!("config section '{}' must be an object", section))
            })?;
            for (key, v) in entries {
                let text = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null => continue,
                    _ => {
                        return Err(Error::invalid(format!(
                            "config value {}.{} must be a scalar",
                            section, key
                        )))
                    }
                };
                config.set(section, key, text);
            }
        }
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|e| Error::invalid(format!("Parse error: {}", e)))?;
        Self::from_json(&value)
    }

    /// Serialize back to the JSON shape accepted by [`DeviceConfig::from_json`].
    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        for (section, entries) in &self.sections {
            let obj: Map<String, Value> = entries
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            root.insert(section.clone(), Value::Object(obj));
        }
        Value::Object(root)
    }
}

impl ConfigProvider for DeviceConfig {
    fn get(&self, section: &str, key: &str) -> Option<String> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .cloned()
    }
}
