// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # camd - network camera control plane
//!
//! SOAP-over-HTTP control services (device, media, PTZ, imaging) and a
//! WS-Discovery responder for embedded IP cameras.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use camd::{DeviceConfig, ServerContext, ServerOptions};
//! use std::sync::Arc;
//!
//! fn main() -> camd::Result<()> {
//!     let ctx = ServerContext::new(ServerOptions::default(), Arc::new(DeviceConfig::new()))?;
//!     ctx.start_discovery()?;
//!
//!     let raw = b"POST /onvif/device_service HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
//!     let response = ctx.handle_http(raw);
//!     println!("{}", String::from_utf8_lossy(&response));
//!
//!     ctx.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! TCP bytes -> http::HttpParser -> adapter::HttpAdapter -> ServerContext::route
//!           -> service::ServiceDispatcher -> service::ServiceHandler
//!              (validate -> business logic -> post-process)
//!           -> response_builder::SmartResponseBuilder -> http::HttpResponse
//!
//! discovery::DiscoveryState: Hello / ProbeMatch / Bye on 239.255.255.250:3702
//! ```
//!
//! The transport layer (sockets, accept loop) lives in the embedding binary;
//! this crate only turns request bytes into response bytes and runs the
//! discovery thread.

pub mod adapter;
pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod http;
pub mod pool;
pub mod response_builder;
pub mod service;
pub mod soap;

pub use config::{ConfigProvider, DeviceConfig};
pub use context::{Drivers, ServerContext, ServerOptions};
pub use discovery::{DiscoveryConfig, DiscoveryState, DiscoveryStats, DiscoveryStatus};
pub use error::{Error, ErrorCore, ErrorKind, FaultCode, Result};
pub use http::{BasicAuth, Credentials, HttpParser, HttpRequest, HttpResponse, ParseStatus};
pub use pool::{BufferLease, BufferPool, PoolStats};
pub use response_builder::SmartResponseBuilder;
pub use service::{ServiceDispatcher, ServiceRegistration, ServiceType};
