// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Service registry and dispatch.
//!
//! Maps a service name to its registration record and forwards
//! `(service, operation, request)` to the registered operation handler.
//! Handler results, errors included, are returned unchanged.
//!
//! Lifecycle hooks and handlers always run with the registry lock released,
//! so a hook may itself query the dispatcher.

use crate::adapter::{ProtocolRequest, ProtocolResponse};
use crate::config::MAX_REGISTERED_SERVICES;
use crate::error::{Error, ErrorCore, Result};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Entry point of one service.
pub trait ServiceOperationHandler: Send + Sync {
    fn handle_operation(
        &self,
        operation: &str,
        request: &ProtocolRequest,
    ) -> Result<ProtocolResponse>;
}

impl<F> ServiceOperationHandler for F
where
    F: Fn(&str, &ProtocolRequest) -> Result<ProtocolResponse> + Send + Sync,
{
    fn handle_operation(
        &self,
        operation: &str,
        request: &ProtocolRequest,
    ) -> Result<ProtocolResponse> {
        self(operation, request)
    }
}

type InitHook = Box<dyn FnOnce() -> Result<()> + Send>;
type CleanupHook = Box<dyn FnOnce() + Send + Sync>;
type CapabilityHook = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Registration record.
pub struct ServiceRegistration {
    pub name: String,
    pub namespace: String,
    pub handler: Option<Arc<dyn ServiceOperationHandler>>,
    init: Option<InitHook>,
    cleanup: Option<CleanupHook>,
    capabilities: Option<CapabilityHook>,
}

impl fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("handler", &self.handler.is_some())
            .field("init", &self.init.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .field("capabilities", &self.capabilities.is_some())
            .finish()
    }
}

impl ServiceRegistration {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        handler: Arc<dyn ServiceOperationHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            handler: Some(handler),
            init: None,
            cleanup: None,
            capabilities: None,
        }
    }

    /// Runs once on successful registration; a failure aborts it.
    pub fn with_init(mut self, init: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        self.init = Some(Box::new(init));
        self
    }

    /// Runs once on unregister (or `cleanup_all`).
    pub fn with_cleanup(mut self, cleanup: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    /// Capability query: name -> value, `None` when unsupported.
    pub fn with_capabilities(
        mut self,
        query: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.capabilities = Some(Arc::new(query));
        self
    }
}

/// Public view of one registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub namespace: String,
}

struct Entry {
    name: String,
    namespace: String,
    handler: Arc<dyn ServiceOperationHandler>,
    cleanup: Option<CleanupHook>,
    capabilities: Option<CapabilityHook>,
    /// False while init is still running.
    ready: bool,
}

/// Fixed-capacity service registry.
pub struct ServiceDispatcher {
    entries: RwLock<Vec<Entry>>,
    capacity: usize,
    errors: Arc<ErrorCore>,
}

impl ServiceDispatcher {
    pub fn new(errors: Arc<ErrorCore>) -> Self {
        Self::with_capacity(MAX_REGISTERED_SERVICES, errors)
    }

    pub fn with_capacity(capacity: usize, errors: Arc<ErrorCore>) -> Self {
        Self {
            entries: RwLock::new(Vec::with_capacity(capacity)),
            capacity,
            errors,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().iter().filter(|e| e.ready).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a service.
    ///
    /// Fails with INVALID on missing fields, DUPLICATE if the name is taken,
    /// REGISTRY_FULL at capacity, or with the init hook's error.
    pub fn register(&self, registration: ServiceRegistration) -> Result<()> {
        crate::error_context!(self.errors, "ServiceDispatcher::register");
        let result = self.register_inner(registration);
        if let Err(e) = &result {
            self.errors.record(e);
        }
        result
    }

    fn register_inner(&self, registration: ServiceRegistration) -> Result<()> {
        let ServiceRegistration {
            name,
            namespace,
            handler,
            init,
            cleanup,
            capabilities,
        } = registration;

        if name.is_empty() {
            return Err(Error::invalid("service name is empty"));
        }
        if namespace.is_empty() {
            return Err(Error::invalid(format!("service '{}' has no namespace", name)));
        }
        let handler = handler
            .ok_or_else(|| Error::invalid(format!("service '{}' has no handler", name)))?;

        {
            let mut entries = self.entries.write();
            if entries.iter().any(|e| e.name == name) {
                return Err(Error::duplicate(format!(
                    "service '{}' already registered",
                    name
                )));
            }
            if entries.len() >= self.capacity {
                return Err(Error::registry_full(format!(
                    "service registry full ({} entries)",
                    self.capacity
                )));
            }
            // Reserve the slot so a concurrent register of the same name
            // sees it while init runs.
            entries.push(Entry {
                name: name.clone(),
                namespace: namespace.clone(),
                handler,
                cleanup,
                capabilities,
                ready: init.is_none(),
            });
        }

        if let Some(init) = init {
            if let Err(e) = init() {
                self.entries.write().retain(|entry| entry.name != name);
                log::warn!("[DISPATCH] init of '{}' failed: {}", name, e);
                return Err(e);
            }
            if let Some(entry) = self.entries.write().iter_mut().find(|e| e.name == name) {
                entry.ready = true;
            }
        }

        log::info!("[DISPATCH] registered service '{}' ({})", name, namespace);
        Ok(())
    }

    /// Remove a service and run its cleanup hook. NOT_FOUND if unknown.
    pub fn unregister(&self, name: &str) -> Result<()> {
        crate::error_context!(self.errors, "ServiceDispatcher::unregister");
        let removed = {
            let mut entries = self.entries.write();
            entries
                .iter()
                .position(|e| e.name == name && e.ready)
                .map(|idx| entries.remove(idx))
        };

        let Some(entry) = removed else {
            let err = Error::not_found(format!("service '{}' not registered", name));
            self.errors.record(&err);
            return Err(err);
        };

        if let Some(cleanup) = entry.cleanup {
            cleanup();
        }
        log::info!("[DISPATCH] unregistered service '{}'", name);
        Ok(())
    }

    /// Forward to the service's handler.
    pub fn dispatch(
        &self,
        service: &str,
        operation: &str,
        request: &ProtocolRequest,
    ) -> Result<ProtocolResponse> {
        let handler = self
            .entries
            .read()
            .iter()
            .find(|e| e.name == service && e.ready)
            .map(|e| Arc::clone(&e.handler));

        let Some(handler) = handler else {
            crate::error_context!(self.errors, "ServiceDispatcher::dispatch");
            let err = Error::not_found(format!("service '{}' not registered", service));
            self.errors.record(&err);
            return Err(err);
        };

        log::debug!("[DISPATCH] {}::{}", service, operation);
        handler.handle_operation(operation, request)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| e.name == name && e.ready)
    }

    /// Registered services in registration order.
    pub fn list(&self) -> Vec<ServiceInfo> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.ready)
            .map(|e| ServiceInfo {
                name: e.name.clone(),
                namespace: e.namespace.clone(),
            })
            .collect()
    }

    /// Query a capability of a registered service.
    ///
    /// NOT_FOUND for an unknown service, NOT_SUPPORTED when the service has
    /// no capability hook or does not know `capability`.
    pub fn capabilities(&self, service: &str, capability: &str) -> Result<String> {
        let hook = {
            let entries = self.entries.read();
            let entry = entries
                .iter()
                .find(|e| e.name == service && e.ready)
                .ok_or_else(|| Error::not_found(format!("service '{}' not registered", service)))?;
            entry.capabilities.clone()
        };

        let hook = hook.ok_or_else(|| {
            Error::not_supported(format!("service '{}' has no capability query", service))
        })?;
        hook(capability).ok_or_else(|| {
            Error::not_supported(format!(
                "service '{}' does not support capability '{}'",
                service, capability
            ))
        })
    }

    /// Unregister everything, running each cleanup hook once.
    pub fn cleanup_all(&self) {
        let drained: Vec<Entry> = std::mem::take(&mut *self.entries.write());
        let count = drained.len();
        for entry in drained {
            if let Some(cleanup) = entry.cleanup {
                cleanup();
            }
        }
        if count > 0 {
            log::info!("[DISPATCH] cleaned up {} services", count);
        }
    }
}

impl Drop for ServiceDispatcher {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo() -> Arc<dyn ServiceOperationHandler> {
        Arc::new(|op: &str, _req: &ProtocolRequest| -> Result<ProtocolResponse> {
            Ok(ProtocolResponse {
                body: Some(op.as_bytes().to_vec()),
                ..ProtocolResponse::default()
            })
        })
    }

    fn dispatcher() -> ServiceDispatcher {
        ServiceDispatcher::new(Arc::new(ErrorCore::new()))
    }

    #[test]
    fn test_register_and_dispatch() {
        let d = dispatcher();
        d.register(ServiceRegistration::new("device", "urn:device", echo()))
            .expect("register");
        assert!(d.is_registered("device"));
        let resp = d
            .dispatch("device", "GetHostname", &ProtocolRequest::default())
            .expect("dispatch");
        assert_eq!(resp.body.as_deref(), Some(&b"GetHostname"[..]));
    }

    #[test]
    fn test_missing_fields_are_invalid() {
        let d = dispatcher();
        let err = d
            .register(ServiceRegistration::new("", "urn:x", echo()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let mut reg = ServiceRegistration::new("media", "urn:media", echo());
        reg.handler = None;
        assert_eq!(d.register(reg).unwrap_err().kind(), ErrorKind::Invalid);
        assert!(d.is_empty());
    }

    #[test]
    fn test_capacity_limit() {
        let d = ServiceDispatcher::with_capacity(2, Arc::new(ErrorCore::new()));
        d.register(ServiceRegistration::new("a", "urn:a", echo())).expect("a");
        d.register(ServiceRegistration::new("b", "urn:b", echo())).expect("b");
        let err = d
            .register(ServiceRegistration::new("c", "urn:c", echo()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RegistryFull);
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_hooks_run_once_per_pair() {
        let d = dispatcher();
        let inits = Arc::new(AtomicUsize::new(0));
        let cleanups = Arc::new(AtomicUsize::new(0));
        let (i, c) = (Arc::clone(&inits), Arc::clone(&cleanups));
        d.register(
            ServiceRegistration::new("ptz", "urn:ptz", echo())
                .with_init(move || {
                    i.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .with_cleanup(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .expect("register");
        d.unregister("ptz").expect("unregister");
        assert_eq!(d.unregister("ptz").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_init_frees_slot() {
        let d = dispatcher();
        let err = d
            .register(
                ServiceRegistration::new("imaging", "urn:img", echo())
                    .with_init(|| Err(Error::generic("sensor offline"))),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Generic);
        assert!(!d.is_registered("imaging"));
        d.register(ServiceRegistration::new("imaging", "urn:img", echo()))
            .expect("slot was freed");
    }

    #[test]
    fn test_capability_query() {
        let d = dispatcher();
        d.register(
            ServiceRegistration::new("ptz", "urn:ptz", echo())
                .with_capabilities(|name| (name == "MaxPresets").then(|| "10".to_string())),
        )
        .expect("register");
        d.register(ServiceRegistration::new("device", "urn:device", echo()))
            .expect("register");

        assert_eq!(d.capabilities("ptz", "MaxPresets").expect("known"), "10");
        assert_eq!(
            d.capabilities("ptz", "Nope").unwrap_err().kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(
            d.capabilities("device", "X").unwrap_err().kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(
            d.capabilities("media", "X").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_cleanup_all_empties_registry() {
        let d = dispatcher();
        let cleanups = Arc::new(AtomicUsize::new(0));
        for name in ["a", "b", "c"] {
            let c = Arc::clone(&cleanups);
            d.register(
                ServiceRegistration::new(name, "urn:x", echo()).with_cleanup(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .expect("register");
        }
        d.cleanup_all();
        assert!(d.list().is_empty());
        assert_eq!(cleanups.load(Ordering::SeqCst), 3);
        drop(d);
        assert_eq!(cleanups.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_handler_errors_pass_through() {
        let errors = Arc::new(ErrorCore::new());
        let d = ServiceDispatcher::new(Arc::clone(&errors));
        let failing: Arc<dyn ServiceOperationHandler> =
            Arc::new(|_op: &str, _req: &ProtocolRequest| -> Result<ProtocolResponse> {
                Err(Error::not_supported("no motor"))
            });
        d.register(ServiceRegistration::new("ptz", "urn:ptz", failing))
            .expect("register");
        let err = d
            .dispatch("ptz", "ContinuousMove", &ProtocolRequest::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
        assert_eq!(err.message(), "no motor");
        assert_eq!(errors.stats().total(), 0);
    }
}
