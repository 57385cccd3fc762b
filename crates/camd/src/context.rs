// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server context: every shared component, built once at startup.
//!
//! ```text
//! bytes -> HttpParser -> HttpAdapter -> path routing -> ServiceDispatcher
//!       -> ServiceHandler pipeline -> SmartResponseBuilder -> HttpResponse
//! ```

use crate::adapter::{HttpAdapter, TransportAdapter, TransportRef};
use crate::config::{ConfigProvider, BUFFER_POOL_SIZE, BUFFER_SIZE, DEFAULT_HTTP_PORT, FALLBACK_IPV4};
use crate::discovery::{multicast, DiscoveryConfig, DiscoveryState};
use crate::error::{Error, ErrorCore, FaultCode, Result};
use crate::http::{
    parse_request, BasicAuth, HttpRequest, HttpResponse, ParseStatus, SOAP_CONTENT_TYPE,
};
use crate::pool::BufferPool;
use crate::response_builder::SmartResponseBuilder;
use crate::service::imaging::{self, ImagingDriver, ImagingService, InMemoryImagingDriver};
use crate::service::ptz::{self, InMemoryPtzDriver, PtzDriver, PtzService};
use crate::service::{
    device, media, ServiceConfig, ServiceDispatcher, ServiceEnv, ServiceHandler,
    ServiceRegistration, ServiceStats, ServiceType,
};
use crate::soap::{decode_envelope, fault_for_error};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Startup settings of a [`ServerContext`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub http_port: u16,
    /// Address used in service and stream URIs; auto-detected when `None`.
    pub host_ip: Option<Ipv4Addr>,
    pub pool_buffers: usize,
    pub buffer_size: usize,
    pub discovery: DiscoveryConfig,
    /// Basic authentication required on every service request when set.
    pub auth: Option<BasicAuth>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            host_ip: None,
            pool_buffers: BUFFER_POOL_SIZE,
            buffer_size: BUFFER_SIZE,
            discovery: DiscoveryConfig::default(),
            auth: None,
        }
    }
}

/// Hardware collaborators consumed by the PTZ and imaging services.
pub struct Drivers {
    pub ptz: Arc<dyn PtzDriver>,
    pub imaging: Arc<dyn ImagingDriver>,
}

impl Default for Drivers {
    fn default() -> Self {
        Self {
            ptz: Arc::new(InMemoryPtzDriver::new()),
            imaging: Arc::new(InMemoryImagingDriver::new()),
        }
    }
}

/// Owner of the error core, buffer pool, dispatcher, configuration and
/// discovery state.
pub struct ServerContext {
    options: ServerOptions,
    env: ServiceEnv,
    errors: Arc<ErrorCore>,
    pool: Arc<BufferPool>,
    builder: Arc<SmartResponseBuilder>,
    dispatcher: ServiceDispatcher,
    config: Arc<dyn ConfigProvider>,
    handlers: Vec<(ServiceType, Arc<ServiceHandler>)>,
    ptz: Arc<PtzService>,
    imaging: Arc<ImagingService>,
    discovery: DiscoveryState,
    adapter: HttpAdapter,
    next_connection: AtomicU64,
}

impl ServerContext {
    /// Context with in-memory hardware drivers.
    pub fn new(options: ServerOptions, config: Arc<dyn ConfigProvider>) -> Result<Self> {
        Self::with_drivers(options, config, Drivers::default())
    }

    /// Build every component and register the four services.
    pub fn with_drivers(
        options: ServerOptions,
        config: Arc<dyn ConfigProvider>,
        drivers: Drivers,
    ) -> Result<Self> {
        let errors = Arc::new(ErrorCore::new());
        let pool = Arc::new(BufferPool::new(options.pool_buffers, options.buffer_size)?);
        let builder = Arc::new(SmartResponseBuilder::new(Arc::clone(&pool)));
        let dispatcher = ServiceDispatcher::new(Arc::clone(&errors));

        let host_ip = options
            .host_ip
            .unwrap_or_else(|| multicast::get_primary_interface_ip(Ipv4Addr::from(FALLBACK_IPV4)));
        let env = ServiceEnv::new(host_ip, options.http_port);

        let mut discovery_config = options.discovery.clone();
        discovery_config.advertise_ip.get_or_insert(host_ip);

        let mut ctx = Self {
            env,
            errors,
            pool,
            builder,
            dispatcher,
            ptz: Arc::new(PtzService::new(drivers.ptz)),
            imaging: Arc::new(ImagingService::new(drivers.imaging, config.as_ref())),
            config,
            handlers: Vec::with_capacity(ServiceType::ALL.len()),
            discovery: DiscoveryState::new(discovery_config),
            adapter: HttpAdapter,
            next_connection: AtomicU64::new(1),
            options,
        };
        ctx.register_default_services()?;
        log::info!(
            "[CTX] ready: {} services, advertising {}",
            ctx.dispatcher.len(),
            ctx.env.xaddr(ServiceType::Device.path())
        );
        Ok(ctx)
    }

    fn handler_for(&self, service: ServiceType) -> Result<ServiceHandler> {
        let actions = match service {
            ServiceType::Device => device::actions(self.env),
            ServiceType::Media => media::actions(self.env),
            ServiceType::Ptz => ptz::actions(&self.ptz),
            ServiceType::Imaging => imaging::actions(&self.imaging),
        };
        ServiceHandler::new(
            ServiceConfig::new(service, Arc::clone(&self.config)),
            actions,
            Arc::clone(&self.errors),
            Arc::clone(&self.builder),
        )
    }

    fn register_default_services(&mut self) -> Result<()> {
        for service in ServiceType::ALL {
            let handler = Arc::new(self.handler_for(service)?);
            let name = service.name();

            let mut registration =
                ServiceRegistration::new(name, service.namespace(), handler.clone())
                    .with_cleanup(move || log::debug!("[CTX] service '{}' cleaned up", name));
            registration = match service {
                ServiceType::Device => registration,
                ServiceType::Media => registration.with_capabilities(|cap| match cap {
                    "MaximumNumberOfProfiles" => Some(media::PROFILES.len().to_string()),
                    _ => None,
                }),
                ServiceType::Ptz => registration.with_capabilities(ptz::capability),
                ServiceType::Imaging => {
                    let imaging = Arc::clone(&self.imaging);
                    registration.with_init(move || imaging.apply_all())
                }
            };

            self.dispatcher.register(registration)?;
            self.handlers.push((service, handler));
        }
        Ok(())
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn env(&self) -> ServiceEnv {
        self.env
    }

    pub fn errors(&self) -> &Arc<ErrorCore> {
        &self.errors
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn builder(&self) -> &Arc<SmartResponseBuilder> {
        &self.builder
    }

    pub fn dispatcher(&self) -> &ServiceDispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &dyn ConfigProvider {
        self.config.as_ref()
    }

    pub fn discovery(&self) -> &DiscoveryState {
        &self.discovery
    }

    pub fn ptz(&self) -> &Arc<PtzService> {
        &self.ptz
    }

    pub fn imaging(&self) -> &Arc<ImagingService> {
        &self.imaging
    }

    pub fn service_stats(&self, service: ServiceType) -> Option<ServiceStats> {
        self.handlers
            .iter()
            .find(|(s, _)| *s == service)
            .map(|(_, h)| h.stats())
    }

    /// `/onvif/<name>_service` -> service.
    pub fn route(path: &str) -> Option<ServiceType> {
        let path = path.split('?').next().unwrap_or(path);
        ServiceType::ALL.into_iter().find(|s| s.path() == path)
    }

    /// Announce the device. Call once the HTTP listener is bound.
    pub fn start_discovery(&self) -> Result<()> {
        self.discovery.start(self.env.http_port)
    }

    /// Send Bye and stop the responder. Call before closing the listener.
    pub fn stop_discovery(&self) {
        self.discovery.stop();
    }

    /// Stop discovery, run service cleanup hooks and clear error state.
    pub fn shutdown(&self) {
        self.stop_discovery();
        self.dispatcher.cleanup_all();
        let stats = self.errors.stats();
        if stats.total() > 0 {
            log::info!("[CTX] errors during run: {:?}", stats.non_zero());
        }
        self.errors.reset();
    }

    /// Record a request rejected before dispatch and return its response.
    fn reject(&self, err: &Error, response: HttpResponse) -> HttpResponse {
        crate::error_context!(self.errors, "ServerContext::handle");
        self.errors.record(err);
        response
    }

    /// Serve one parsed HTTP request.
    pub fn handle(&self, request: &HttpRequest, peer: Option<SocketAddr>) -> HttpResponse {
        if request.method != "POST" {
            log::debug!("[CTX] {} {} rejected", request.method, request.path);
            let err = Error::not_supported(format!("method {} not allowed", request.method));
            return self.reject(&err, HttpResponse::method_not_allowed());
        }
        let Some(service) = Self::route(&request.path) else {
            log::debug!("[CTX] no service at {}", request.path);
            let err = Error::not_found(format!("no service at {}", request.path));
            return self.reject(&err, HttpResponse::not_found());
        };
        if let Some(auth) = &self.options.auth {
            if let Err(e) = auth.verify(request.header("Authorization")) {
                log::warn!(
                    "[CTX] {} from {}: {}",
                    request.path,
                    peer.map_or_else(|| "<local>".to_string(), |p| p.to_string()),
                    e.message()
                );
                return self.reject(&e, auth.unauthorized());
            }
        }

        let transport = TransportRef {
            connection_id: self.next_connection.fetch_add(1, Ordering::Relaxed),
            peer,
        };
        let mut proto = self.adapter.to_protocol(request, transport);

        let envelope = match decode_envelope(&proto.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                crate::error_context!(self.errors, "ServerContext::handle");
                self.errors.record(&e);
                return self.fault(&e, service, "<envelope>");
            }
        };
        let operation = envelope.operation.clone();
        proto.envelope = Some(envelope);

        match self.dispatcher.dispatch(service.name(), &operation, &proto) {
            Ok(response) => self.adapter.from_protocol(response),
            Err(e) => self.fault(&e, service, &operation),
        }
    }

    fn fault(&self, err: &Error, service: ServiceType, operation: &str) -> HttpResponse {
        let code = err.fault_code();
        match code {
            FaultCode::Sender => log::warn!(
                "[CTX] {}/{} rejected ({}): {}",
                service.name(),
                operation,
                err.kind(),
                err.message()
            ),
            FaultCode::Receiver => log::error!(
                "[CTX] {}/{} failed ({}): {} at {}",
                service.name(),
                operation,
                err.kind(),
                err.message(),
                self.errors.context_string()
            ),
        }
        HttpResponse::new(
            code.http_status(),
            SOAP_CONTENT_TYPE,
            fault_for_error(err).into_bytes(),
        )
    }

    /// Parse, route, dispatch and serialize. Always yields a complete HTTP
    /// response; malformed or truncated requests get 400.
    pub fn handle_http(&self, bytes: &[u8]) -> Vec<u8> {
        let response = match parse_request(bytes) {
            Ok(ParseStatus::Complete(request)) => self.handle(&request, None),
            Ok(ParseStatus::NeedMore) => {
                log::debug!("[CTX] truncated request ({} bytes)", bytes.len());
                let err = Error::invalid(format!("truncated request ({} bytes)", bytes.len()));
                self.reject(&err, HttpResponse::bad_request())
            }
            Err(e) => {
                log::debug!("[CTX] malformed request: {}", e);
                self.reject(&e, HttpResponse::bad_request())
            }
        };
        response.to_bytes()
    }
}

impl Drop for ServerContext {
    fn drop(&mut self) {
        self.discovery.stop();
    }
}
