// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Camera server configuration.

use camd::config::{
    BUFFER_POOL_SIZE, BUFFER_SIZE, DEFAULT_HTTP_PORT, HELLO_INTERVAL_SECS, MAX_CONTENT_LENGTH,
};
use camd::http::DEFAULT_REALM;
use camd::{BasicAuth, Credentials, DeviceConfig, DiscoveryConfig, ServerOptions};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Camera server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// HTTP port of the SOAP services (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address advertised in service URIs and discovery (auto-detected when unset)
    #[serde(default)]
    pub advertise_address: Option<Ipv4Addr>,

    /// Answer WS-Discovery probes and announce Hello/Bye
    #[serde(default = "default_true")]
    pub discovery_enabled: bool,

    /// Interval between unsolicited Hello announcements (seconds)
    #[serde(default = "default_hello_interval")]
    pub hello_interval_secs: u64,

    /// Per-read timeout on client connections (seconds)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Maximum bytes accepted for one request, headers included
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,

    /// Number of pooled response buffers
    #[serde(default = "default_pool_buffers")]
    pub pool_buffers: usize,

    /// Size of each pooled buffer (bytes)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Device configuration file (JSON object of sections)
    #[serde(default)]
    pub device_config_path: Option<PathBuf>,

    /// HTTP Basic username; authentication is off when unset
    #[serde(default)]
    pub username: Option<String>,

    /// HTTP Basic password (plain text)
    #[serde(default)]
    pub password: Option<String>,

    /// Realm announced in the 401 challenge
    #[serde(default = "default_realm")]
    pub auth_realm: String,
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_true() -> bool {
    true
}

fn default_hello_interval() -> u64 {
    HELLO_INTERVAL_SECS
}

fn default_read_timeout() -> u64 {
    10
}

fn default_max_request_size() -> usize {
    MAX_CONTENT_LENGTH + 16 * 1024 // body limit + headers
}

fn default_pool_buffers() -> usize {
    BUFFER_POOL_SIZE
}

fn default_buffer_size() -> usize {
    BUFFER_SIZE
}

fn default_realm() -> String {
    DEFAULT_REALM.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            advertise_address: None,
            discovery_enabled: true,
            hello_interval_secs: default_hello_interval(),
            read_timeout_secs: default_read_timeout(),
            max_request_size: default_max_request_size(),
            pool_buffers: default_pool_buffers(),
            buffer_size: default_buffer_size(),
            device_config_path: None,
            username: None,
            password: None,
            auth_realm: default_realm(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    pub fn hello_interval(&self) -> Duration {
        Duration::from_secs(self.hello_interval_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("port cannot be 0".into()));
        }
        if self.hello_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "hello_interval_secs cannot be 0".into(),
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "read_timeout_secs cannot be 0".into(),
            ));
        }
        if self.max_request_size < 1024 {
            return Err(ConfigError::InvalidValue(
                "max_request_size must be at least 1024".into(),
            ));
        }
        if self.pool_buffers == 0 || self.buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "pool_buffers and buffer_size cannot be 0".into(),
            ));
        }
        self.basic_auth()?;
        Ok(())
    }

    /// Basic authentication settings, `None` when no username is configured.
    pub fn basic_auth(&self) -> Result<Option<BasicAuth>, ConfigError> {
        match (&self.username, &self.password) {
            (None, None) => Ok(None),
            (Some(user), Some(pass)) => {
                BasicAuth::new(Credentials::new(user.clone(), pass.clone()), self.auth_realm.clone())
                    .map(Some)
                    .map_err(|e| ConfigError::InvalidValue(e.message().to_string()))
            }
            _ => Err(ConfigError::InvalidValue(
                "username and password must be set together".into(),
            )),
        }
    }

    /// Device sections from `device_config_path`, or an empty store.
    pub fn load_device_config(&self) -> Result<DeviceConfig, ConfigError> {
        match &self.device_config_path {
            Some(path) => {
                DeviceConfig::from_file(path).map_err(|e| ConfigError::ParseError(e.to_string()))
            }
            None => Ok(DeviceConfig::new()),
        }
    }

    /// Library-level options derived from this configuration.
    pub fn server_options(&self) -> Result<ServerOptions, ConfigError> {
        Ok(ServerOptions {
            http_port: self.port,
            host_ip: self.advertise_address,
            pool_buffers: self.pool_buffers,
            buffer_size: self.buffer_size,
            discovery: DiscoveryConfig {
                hello_interval: self.hello_interval(),
                advertise_ip: self.advertise_address,
                ..DiscoveryConfig::default()
            },
            auth: self.basic_auth()?,
        })
    }
}

/// Configuration error types.
#[derive(Debug, Clone)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(s) => write!(f, "I/O error: {}", s),
            Self::ParseError(s) => write!(f, "Parse error: {}", s),
            Self::SerializeError(s) => write!(f, "Serialize error: {}", s),
            Self::InvalidValue(s) => write!(f, "Invalid value: {}", s),
        }
    }
}

impl std::error::Error for ConfigError {}
