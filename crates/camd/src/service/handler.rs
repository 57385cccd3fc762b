// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Generic per-service request pipeline.
//!
//! Every call runs the same four steps:
//!
//! 1. validation (only when enabled on the service and required by the action)
//! 2. business logic
//! 3. serialization of the returned data, unless the logic already set a body
//! 4. post-processing (default status and content type)
//!
//! Actions live in a small table (at most [`MAX_ACTIONS`]) resolved by
//! linear scan.

use super::dispatcher::ServiceOperationHandler;
use crate::adapter::{ProtocolRequest, ProtocolResponse};
use crate::config::{
    ConfigProvider, DEVICE_SERVICE_PATH, IMAGING_SERVICE_PATH, MAX_ACTIONS, MEDIA_SERVICE_PATH,
    PTZ_SERVICE_PATH,
};
use crate::error::{Error, ErrorCore, ErrorPattern, Result};
use crate::http::SOAP_CONTENT_TYPE;
use crate::response_builder::SmartResponseBuilder;
use crate::soap::{SoapContext, SoapRequest, XmlElement, DEVICE_NS, IMAGING_NS, MEDIA_NS, PTZ_NS};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The services this control plane serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Device,
    Media,
    Ptz,
    Imaging,
}

impl ServiceType {
    pub const ALL: [ServiceType; 4] = [
        ServiceType::Device,
        ServiceType::Media,
        ServiceType::Ptz,
        ServiceType::Imaging,
    ];

    /// Registry key.
    pub fn name(self) -> &'static str {
        match self {
            ServiceType::Device => "device",
            ServiceType::Media => "media",
            ServiceType::Ptz => "ptz",
            ServiceType::Imaging => "imaging",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            ServiceType::Device => DEVICE_SERVICE_PATH,
            ServiceType::Media => MEDIA_SERVICE_PATH,
            ServiceType::Ptz => PTZ_SERVICE_PATH,
            ServiceType::Imaging => IMAGING_SERVICE_PATH,
        }
    }

    pub fn soap_context(self) -> SoapContext {
        match self {
            ServiceType::Device => SoapContext::new("tds", DEVICE_NS),
            ServiceType::Media => SoapContext::new("trt", MEDIA_NS),
            ServiceType::Ptz => SoapContext::new("tptz", PTZ_NS),
            ServiceType::Imaging => SoapContext::new("timg", IMAGING_NS),
        }
    }

    pub fn namespace(self) -> &'static str {
        self.soap_context().namespace
    }
}

/// Per-service settings.
#[derive(Clone)]
pub struct ServiceConfig {
    pub service_type: ServiceType,
    pub service_name: String,
    pub enable_validation: bool,
    pub enable_logging: bool,
    pub config: Arc<dyn ConfigProvider>,
}

impl ServiceConfig {
    /// Validation and logging enabled, name taken from the service type.
    pub fn new(service_type: ServiceType, config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            service_type,
            service_name: service_type.name().to_string(),
            enable_validation: true,
            enable_logging: true,
            config,
        }
    }
}

/// Logging handle given to business logic; prefixes the service and action.
#[derive(Debug, Clone, Copy)]
pub struct LogContext<'a> {
    service: &'a str,
    action: &'a str,
    enabled: bool,
}

impl<'a> LogContext<'a> {
    pub fn new(service: &'a str, action: &'a str, enabled: bool) -> Self {
        Self {
            service,
            action,
            enabled,
        }
    }

    pub fn debug(&self, message: &str) {
        if self.enabled {
            log::debug!("[{}] {}: {}", self.service, self.action, message);
        }
    }

    pub fn info(&self, message: &str) {
        if self.enabled {
            log::info!("[{}] {}: {}", self.service, self.action, message);
        }
    }

    /// Warnings are emitted even with logging disabled.
    pub fn warn(&self, message: &str) {
        log::warn!("[{}] {}: {}", self.service, self.action, message);
    }
}

/// Everything an action sees for one call.
pub struct ActionContext<'a> {
    pub request: &'a ProtocolRequest,
    pub params: &'a SoapRequest,
    pub log: LogContext<'a>,
    pub errors: &'a ErrorCore,
    pub config: &'a dyn ConfigProvider,
}

/// Parameter validation step.
pub trait Validator: Send + Sync {
    fn validate(&self, ctx: &ActionContext<'_>) -> Result<()>;
}

impl<F> Validator for F
where
    F: Fn(&ActionContext<'_>) -> Result<()> + Send + Sync,
{
    fn validate(&self, ctx: &ActionContext<'_>) -> Result<()> {
        self(ctx)
    }
}

/// Business logic of one action.
///
/// Either fills `response.body` itself or returns an element to serialize.
/// Returning `Ok(None)` without a body yields an empty `<op>Response`.
pub trait BusinessLogic: Send + Sync {
    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        response: &mut ProtocolResponse,
    ) -> Result<Option<XmlElement>>;
}

impl<F> BusinessLogic for F
where
    F: Fn(&ActionContext<'_>, &mut ProtocolResponse) -> Result<Option<XmlElement>> + Send + Sync,
{
    fn execute(
        &self,
        ctx: &ActionContext<'_>,
        response: &mut ProtocolResponse,
    ) -> Result<Option<XmlElement>> {
        self(ctx, response)
    }
}

/// Final step applied to every successful response.
pub trait PostProcess: Send + Sync {
    fn post_process(&self, response: &mut ProtocolResponse);
}

/// Fills in status 200 and the SOAP content type when unset.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPostProcess;

impl PostProcess for StandardPostProcess {
    fn post_process(&self, response: &mut ProtocolResponse) {
        response.status.get_or_insert(200);
        response
            .content_type
            .get_or_insert_with(|| SOAP_CONTENT_TYPE.to_string());
    }
}

/// Validator requiring a non-empty value for each named parameter.
#[derive(Debug, Clone, Copy)]
pub struct RequiredParams(pub &'static [&'static str]);

impl Validator for RequiredParams {
    fn validate(&self, ctx: &ActionContext<'_>) -> Result<()> {
        for name in self.0 {
            if ctx.params.param(name).map_or(true, str::is_empty) {
                let base = ErrorPattern::MissingParameter;
                return Err(Error::new(
                    base.kind(),
                    format!("{}: {}", base.message(), name),
                ));
            }
        }
        Ok(())
    }
}

/// One entry of the action table.
pub struct ActionDefinition {
    name: String,
    logic: Arc<dyn BusinessLogic>,
    requires_validation: bool,
    validator: Option<Arc<dyn Validator>>,
}

impl ActionDefinition {
    pub fn new(name: impl Into<String>, logic: impl BusinessLogic + 'static) -> Self {
        Self {
            name: name.into(),
            logic: Arc::new(logic),
            requires_validation: false,
            validator: None,
        }
    }

    /// Same as [`new`](Self::new), with the closure signature spelled out so
    /// closures infer the right lifetimes.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ActionContext<'_>, &mut ProtocolResponse) -> Result<Option<XmlElement>>
            + Send
            + Sync
            + 'static,
    {
        Self::new(name, f)
    }

    /// Attach a validator; the action then requires validation.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self.requires_validation = true;
        self
    }

    /// Shorthand for `with_validator(RequiredParams(names))`.
    pub fn require_params(self, names: &'static [&'static str]) -> Self {
        self.with_validator(RequiredParams(names))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn requires_validation(&self) -> bool {
        self.requires_validation
    }
}

/// Per-action counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionStats {
    pub name: String,
    pub call_count: u64,
    pub error_count: u64,
    avg_response_us: f64,
}

impl ActionStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Running average over every call, failed ones included.
    pub fn avg_response_time(&self) -> Duration {
        Duration::from_secs_f64(self.avg_response_us.max(0.0) / 1_000_000.0)
    }

    fn record(&mut self, elapsed: Duration, failed: bool) {
        self.call_count += 1;
        if failed {
            self.error_count += 1;
        }
        let sample = elapsed.as_secs_f64() * 1_000_000.0;
        self.avg_response_us += (sample - self.avg_response_us) / self.call_count as f64;
    }
}

/// Service-wide counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceStats {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_success: u64,
    pub actions: Vec<ActionStats>,
}

impl ServiceStats {
    pub fn action(&self, name: &str) -> Option<&ActionStats> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// One service: configuration, action table, binding context and stats.
pub struct ServiceHandler {
    config: ServiceConfig,
    soap: SoapContext,
    actions: RwLock<Vec<Arc<ActionDefinition>>>,
    post: Box<dyn PostProcess>,
    stats: Mutex<ServiceStats>,
    errors: Arc<ErrorCore>,
    builder: Arc<SmartResponseBuilder>,
}

impl ServiceHandler {
    /// Build a handler with an initial, non-empty action table.
    pub fn new(
        config: ServiceConfig,
        actions: Vec<ActionDefinition>,
        errors: Arc<ErrorCore>,
        builder: Arc<SmartResponseBuilder>,
    ) -> Result<Self> {
        if actions.is_empty() {
            return Err(Error::invalid(format!(
                "service '{}' has no actions",
                config.service_name
            )));
        }

        let handler = Self {
            soap: config.service_type.soap_context(),
            config,
            actions: RwLock::new(Vec::with_capacity(actions.len())),
            post: Box::new(StandardPostProcess),
            stats: Mutex::new(ServiceStats::default()),
            errors,
            builder,
        };
        for action in actions {
            handler.register_action(action)?;
        }

        log::debug!(
            "[SERVICE] '{}' ready with {} actions",
            handler.config.service_name,
            handler.action_count()
        );
        Ok(handler)
    }

    /// Replace the post-process step.
    pub fn with_post_process(mut self, post: impl PostProcess + 'static) -> Self {
        self.post = Box::new(post);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.service_name
    }

    pub fn action_count(&self) -> usize {
        self.actions.read().len()
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions
            .read()
            .iter()
            .map(|a| a.name.clone())
            .collect()
    }

    pub fn register_action(&self, action: ActionDefinition) -> Result<()> {
        if action.name.is_empty() {
            return Err(Error::invalid("action name is empty"));
        }

        let mut actions = self.actions.write();
        if actions.iter().any(|a| a.name == action.name) {
            return Err(Error::duplicate(format!(
                "action '{}' already registered on '{}'",
                action.name, self.config.service_name
            )));
        }
        if actions.len() >= MAX_ACTIONS {
            return Err(Error::registry_full(format!(
                "service '{}' action table full ({} entries)",
                self.config.service_name, MAX_ACTIONS
            )));
        }

        let mut stats = self.stats.lock();
        if stats.action(&action.name).is_none() {
            stats.actions.push(ActionStats::new(&action.name));
        }
        actions.push(Arc::new(action));
        Ok(())
    }

    /// Remove an action. The last remaining action cannot be removed.
    pub fn unregister_action(&self, name: &str) -> Result<()> {
        let mut actions = self.actions.write();
        let Some(index) = actions.iter().position(|a| a.name == name) else {
            return Err(Error::not_found(format!(
                "action '{}' not registered on '{}'",
                name, self.config.service_name
            )));
        };
        if actions.len() == 1 {
            return Err(Error::invalid(format!(
                "cannot remove the only action of '{}'",
                self.config.service_name
            )));
        }
        actions.remove(index);
        Ok(())
    }

    fn find(&self, name: &str) -> Option<Arc<ActionDefinition>> {
        self.actions.read().iter().find(|a| a.name == name).cloned()
    }

    /// Run the pipeline for `operation`.
    ///
    /// Unknown operations fail with NOT_FOUND and count as one error.
    pub fn handle(&self, operation: &str, request: &ProtocolRequest) -> Result<ProtocolResponse> {
        crate::error_context!(self.errors, "ServiceHandler::handle");
        let start = Instant::now();

        let Some(action) = self.find(operation) else {
            let err = Error::from_pattern(
                ErrorPattern::NotFound,
                Some(format!("Unsupported action: {}", operation).as_str()),
            );
            {
                let mut stats = self.stats.lock();
                stats.total_requests += 1;
                stats.total_errors += 1;
            }
            self.errors.record(&err);
            return Err(err);
        };

        let result = self.run(&action, operation, request);
        let elapsed = start.elapsed();

        {
            let mut stats = self.stats.lock();
            stats.total_requests += 1;
            if result.is_ok() {
                stats.total_success += 1;
            } else {
                stats.total_errors += 1;
            }
            if let Some(entry) = stats.actions.iter_mut().find(|a| a.name == action.name) {
                entry.record(elapsed, result.is_err());
            }
        }

        if let Err(e) = &result {
            self.errors.record(e);
        }
        result
    }

    fn run(
        &self,
        action: &ActionDefinition,
        operation: &str,
        request: &ProtocolRequest,
    ) -> Result<ProtocolResponse> {
        let fallback;
        let params = match &request.envelope {
            Some(envelope) => envelope,
            None => {
                fallback = SoapRequest {
                    operation: operation.to_string(),
                    ..SoapRequest::default()
                };
                &fallback
            }
        };

        let ctx = ActionContext {
            request,
            params,
            log: LogContext::new(
                &self.config.service_name,
                operation,
                self.config.enable_logging,
            ),
            errors: &self.errors,
            config: self.config.config.as_ref(),
        };

        if self.config.enable_validation && action.requires_validation {
            if let Some(validator) = &action.validator {
                validator.validate(&ctx)?;
            }
        }

        let mut response = ProtocolResponse::for_request(request);
        let data = action.logic.execute(&ctx, &mut response)?;

        if !response.has_body() {
            let element = data.unwrap_or_else(|| self.soap.response_element(operation));
            let xml = self.soap.serialize(&element);
            let built = self.builder.build_auto(xml.as_bytes())?;
            response.body = Some(built.body);
        }

        self.post.post_process(&mut response);
        ctx.log.debug("completed");
        Ok(response)
    }

    pub fn stats(&self) -> ServiceStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        let mut stats = self.stats.lock();
        stats.total_requests = 0;
        stats.total_errors = 0;
        stats.total_success = 0;
        for a in &mut stats.actions {
            let name = std::mem::take(&mut a.name);
            *a = ActionStats::new(&name);
        }
    }
}

impl ServiceOperationHandler for ServiceHandler {
    fn handle_operation(
        &self,
        operation: &str,
        request: &ProtocolRequest,
    ) -> Result<ProtocolResponse> {
        self.handle(operation, request)
    }
}
