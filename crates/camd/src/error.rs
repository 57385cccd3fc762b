// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error core: canonical error kinds, the crate `Error` type, and the
//! process-level error tracker (last error, context, callbacks, counters).
//!
//! Every fallible operation in the crate returns [`Result`]. Failures that
//! should be observable by a supervising layer are also recorded on the
//! [`ErrorCore`] owned by the server context, so failure rates can be read
//! without instrumenting individual call sites.
//!
//! # Example
//!
//! ```
//! use camd::error::{ErrorCore, ErrorKind};
//!
//! let core = ErrorCore::new();
//! camd::error_context!(core, "example");
//! core.log(ErrorKind::NotFound, "service 'ptz' not registered");
//!
//! assert_eq!(core.last_error(), ErrorKind::NotFound);
//! assert_eq!(core.stats().count(ErrorKind::NotFound), 1);
//! ```

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

const KIND_COUNT: usize = 11;

/// Canonical error kinds.
///
/// The numeric codes are stable and appear in fault details and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Success,
    Generic,
    Invalid,
    Memory,
    NotFound,
    NotSupported,
    Duplicate,
    AuthFailed,
    BufferTooSmall,
    Io,
    /// Fixed-capacity table (service registry, action table, presets) is full.
    RegistryFull,
}

impl ErrorKind {
    /// All kinds, in counter order.
    pub const ALL: [ErrorKind; KIND_COUNT] = [
        ErrorKind::Success,
        ErrorKind::Generic,
        ErrorKind::Invalid,
        ErrorKind::Memory,
        ErrorKind::NotFound,
        ErrorKind::NotSupported,
        ErrorKind::Duplicate,
        ErrorKind::AuthFailed,
        ErrorKind::BufferTooSmall,
        ErrorKind::Io,
        ErrorKind::RegistryFull,
    ];

    /// Stable numeric code.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Success => 0,
            ErrorKind::Generic => -1,
            ErrorKind::Invalid => -3,
            ErrorKind::Memory => -4,
            ErrorKind::Io => -5,
            ErrorKind::NotFound => -8,
            ErrorKind::Duplicate => -9,
            ErrorKind::NotSupported => -10,
            ErrorKind::AuthFailed => -16,
            ErrorKind::BufferTooSmall => -17,
            ErrorKind::RegistryFull => -18,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Success => "SUCCESS",
            ErrorKind::Generic => "GENERIC",
            ErrorKind::Invalid => "INVALID",
            ErrorKind::Memory => "MEMORY",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::NotSupported => "NOT_SUPPORTED",
            ErrorKind::Duplicate => "DUPLICATE",
            ErrorKind::AuthFailed => "AUTH_FAILED",
            ErrorKind::BufferTooSmall => "BUFFER_TOO_SMALL",
            ErrorKind::Io => "IO",
            ErrorKind::RegistryFull => "REGISTRY_FULL",
        }
    }

    /// Which side of the exchange is blamed when this kind reaches a client.
    pub fn fault_code(self) -> FaultCode {
        match self {
            ErrorKind::Invalid
            | ErrorKind::NotFound
            | ErrorKind::NotSupported
            | ErrorKind::Duplicate
            | ErrorKind::AuthFailed => FaultCode::Sender,
            _ => FaultCode::Receiver,
        }
    }

    fn index(self) -> usize {
        match self {
            ErrorKind::Success => 0,
            ErrorKind::Generic => 1,
            ErrorKind::Invalid => 2,
            ErrorKind::Memory => 3,
            ErrorKind::NotFound => 4,
            ErrorKind::NotSupported => 5,
            ErrorKind::Duplicate => 6,
            ErrorKind::AuthFailed => 7,
            ErrorKind::BufferTooSmall => 8,
            ErrorKind::Io => 9,
            ErrorKind::RegistryFull => 10,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SOAP 1.2 fault code: caller error vs. server error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    Sender,
    Receiver,
}

impl FaultCode {
    /// Qualified name as written in the envelope (`s` = SOAP 1.2 envelope ns).
    pub fn qname(self) -> &'static str {
        match self {
            FaultCode::Sender => "s:Sender",
            FaultCode::Receiver => "s:Receiver",
        }
    }

    /// HTTP status carried by a fault response.
    pub fn http_status(self) -> u16 {
        match self {
            FaultCode::Sender => 400,
            FaultCode::Receiver => 500,
        }
    }
}

/// Crate error: a canonical kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotSupported, message)
    }

    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, message)
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailed, message)
    }

    pub fn registry_full(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RegistryFull, message)
    }

    pub fn buffer_too_small(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BufferTooSmall, message)
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, message)
    }

    /// Build an error from a common pattern, optionally overriding its message.
    pub fn from_pattern(pattern: ErrorPattern, custom: Option<&str>) -> Self {
        Self::new(
            pattern.kind(),
            custom.map_or_else(|| pattern.message().to_string(), str::to_string),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn fault_code(&self) -> FaultCode {
        self.kind.fault_code()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, e.to_string())
    }
}

/// Convenient alias for results carrying the crate [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

/// Recurring failure shapes with a default message and classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPattern {
    ValidationFailed,
    NotFound,
    NotSupported,
    InternalError,
    InvalidParameter,
    MissingParameter,
    AuthenticationFailed,
}

impl ErrorPattern {
    pub fn message(self) -> &'static str {
        match self {
            ErrorPattern::ValidationFailed => "Request validation failed",
            ErrorPattern::NotFound => "Requested resource not found",
            ErrorPattern::NotSupported => "Operation not supported",
            ErrorPattern::InternalError => "Internal server error",
            ErrorPattern::InvalidParameter => "Invalid parameter value",
            ErrorPattern::MissingParameter => "Required parameter missing",
            ErrorPattern::AuthenticationFailed => "Authentication failed",
        }
    }

    pub fn kind(self) -> ErrorKind {
        match self {
            ErrorPattern::ValidationFailed
            | ErrorPattern::InvalidParameter
            | ErrorPattern::MissingParameter => ErrorKind::Invalid,
            ErrorPattern::NotFound => ErrorKind::NotFound,
            ErrorPattern::NotSupported => ErrorKind::NotSupported,
            ErrorPattern::InternalError => ErrorKind::Generic,
            ErrorPattern::AuthenticationFailed => ErrorKind::AuthFailed,
        }
    }

    pub fn fault_code(self) -> FaultCode {
        self.kind().fault_code()
    }
}

/// Source location of the operation that last set the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorContext {
    pub function: &'static str,
    pub file: &'static str,
    pub line: u32,
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}:{})", self.function, self.file, self.line)
    }
}

/// Event handed to registered callbacks.
#[derive(Debug, Clone, Copy)]
pub struct ErrorEvent<'a> {
    pub kind: ErrorKind,
    pub message: &'a str,
    pub context: Option<ErrorContext>,
}

/// Notification hook invoked on every [`ErrorCore::log`].
pub type ErrorCallback = Arc<dyn Fn(&ErrorEvent<'_>) + Send + Sync>;

/// Snapshot of per-kind occurrence counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorStats {
    counts: [u64; KIND_COUNT],
}

impl ErrorStats {
    pub fn count(&self, kind: ErrorKind) -> u64 {
        self.counts[kind.index()]
    }

    /// Total failures (SUCCESS is never counted).
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Non-zero counters, in canonical kind order.
    pub fn non_zero(&self) -> Vec<(ErrorKind, u64)> {
        ErrorKind::ALL
            .iter()
            .filter_map(|k| {
                let n = self.count(*k);
                (n > 0).then_some((*k, n))
            })
            .collect()
    }
}

struct CoreState {
    last_error: ErrorKind,
    last_message: String,
    context: Option<ErrorContext>,
    stats: ErrorStats,
}

impl CoreState {
    fn new() -> Self {
        Self {
            last_error: ErrorKind::Success,
            last_message: String::new(),
            context: None,
            stats: ErrorStats::default(),
        }
    }
}

/// Last-error, context, callback, and counter tracking.
///
/// One instance lives in the server context; components receive it by
/// reference. The state lock only guards counter and field updates, so
/// callbacks always run unlocked.
pub struct ErrorCore {
    state: Mutex<CoreState>,
    callbacks: RwLock<Vec<ErrorCallback>>,
}

impl Default for ErrorCore {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorCore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CoreState::new()),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    /// Record the location of the operation about to run.
    ///
    /// Prefer the [`error_context!`](crate::error_context) macro, which fills
    /// in file and line.
    pub fn set_context(&self, function: &'static str, file: &'static str, line: u32) {
        self.state.lock().context = Some(ErrorContext {
            function,
            file,
            line,
        });
    }

    pub fn context(&self) -> Option<ErrorContext> {
        self.state.lock().context
    }

    /// `function (file:line)` of the last context, or `"<none>"`.
    pub fn context_string(&self) -> String {
        self.context()
            .map_or_else(|| "<none>".to_string(), |c| c.to_string())
    }

    /// Record a failure: bump the kind counter, update the last error, emit a
    /// log line, and notify every registered callback.
    ///
    /// Logging `Success` only clears the last error.
    pub fn log(&self, kind: ErrorKind, message: &str) {
        if kind == ErrorKind::Success {
            self.clear_last_error();
            return;
        }

        let context = {
            let mut state = self.state.lock();
            state.stats.counts[kind.index()] += 1;
            state.last_error = kind;
            state.last_message.clear();
            state.last_message.push_str(message);
            state.context
        };

        match kind.fault_code() {
            FaultCode::Sender => log::debug!(
                "[ERROR] {} ({}) {} at {}",
                kind,
                kind.code(),
                message,
                context.map_or_else(|| "<none>".to_string(), |c| c.to_string())
            ),
            FaultCode::Receiver => log::error!(
                "[ERROR] {} ({}) {} at {}",
                kind,
                kind.code(),
                message,
                context.map_or_else(|| "<none>".to_string(), |c| c.to_string())
            ),
        }

        let callbacks = self.callbacks.read().clone();
        let event = ErrorEvent {
            kind,
            message,
            context,
        };
        for cb in &callbacks {
            cb(&event);
        }
    }

    /// Shorthand for logging an [`Error`] value.
    pub fn record(&self, err: &Error) {
        self.log(err.kind(), err.message());
    }

    pub fn last_error(&self) -> ErrorKind {
        self.state.lock().last_error
    }

    pub fn last_message(&self) -> String {
        self.state.lock().last_message.clone()
    }

    /// Overwrite the last error without counting or notifying.
    pub fn set_last_error(&self, kind: ErrorKind, message: &str) {
        let mut state = self.state.lock();
        state.last_error = kind;
        state.last_message.clear();
        state.last_message.push_str(message);
    }

    pub fn clear_last_error(&self) {
        let mut state = self.state.lock();
        state.last_error = ErrorKind::Success;
        state.last_message.clear();
    }

    /// Register a notification callback. Returns the number now registered.
    pub fn register_callback<F>(&self, callback: F) -> usize
    where
        F: Fn(&ErrorEvent<'_>) + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.write();
        callbacks.push(Arc::new(callback));
        callbacks.len()
    }

    pub fn stats(&self) -> ErrorStats {
        self.state.lock().stats.clone()
    }

    /// Zero the counters and clear last error and context. Callbacks stay.
    pub fn reset_stats(&self) {
        *self.state.lock() = CoreState::new();
    }

    /// Full reset used at shutdown: counters, last error, context, callbacks.
    pub fn reset(&self) {
        self.reset_stats();
        self.callbacks.write().clear();
    }
}

/// Record the current source location on an [`ErrorCore`].
#[macro_export]
macro_rules! error_context {
    ($core:expr, $function:expr) => {
        $core.set_context($function, file!(), line!())
    };
}
