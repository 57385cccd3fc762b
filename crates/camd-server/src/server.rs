// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! HTTP front end of the camera services.
//!
//! One task per connection feeds socket reads into an incremental parser,
//! hands the complete request to the shared [`ServerContext`], writes the
//! response and closes. Discovery comes up once the listener is bound and
//! says Bye before the listener goes away.

use crate::config::ServerConfig;
use camd::{Error, HttpParser, HttpResponse, ParseStatus, ServerContext};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 4096;
/// Unread input is drained this long after an early reply, so closing the
/// socket does not reset the connection before the client reads it.
const LINGER: Duration = Duration::from_millis(500);

/// Camera server: listener, connection tasks and the shared context.
#[derive(Clone)]
pub struct CameraServer {
    config: Arc<ServerConfig>,
    ctx: Arc<ServerContext>,
    shutdown: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl CameraServer {
    /// Validate the configuration and build the server context.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let device = config
            .load_device_config()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let options = config
            .server_options()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        let ctx = ServerContext::new(options, Arc::new(device))
            .map_err(|e| ServerError::Config(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            ctx: Arc::new(ctx),
            shutdown: Arc::new(Notify::new()),
            stopping: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind(format!("{}: {}", addr, e)))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }
        info!("Camera services listening on {}", listener.local_addr()?);

        if self.config.discovery_enabled {
            if let Err(e) = self.ctx.start_discovery() {
                warn!("Discovery unavailable, continuing without it: {}", e);
            }
        }

        loop {
            let notified = self.shutdown.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!("Connection from {}", peer);
                            let ctx = Arc::clone(&self.ctx);
                            let config = Arc::clone(&self.config);
                            let shutdown = Arc::clone(&self.shutdown);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer, &ctx, &config, &shutdown).await {
                                    debug!("Connection error from {}: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                () = &mut notified => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        // Bye goes out while the listener is still bound.
        let ctx = Arc::clone(&self.ctx);
        if tokio::task::spawn_blocking(move || ctx.stop_discovery())
            .await
            .is_err()
        {
            error!("Discovery shutdown task panicked");
        }
        drop(listener);

        self.ctx.shutdown();
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Ask the accept loop and every connection task to stop.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    ctx: &ServerContext,
    config: &ServerConfig,
    shutdown: &Notify,
) -> Result<(), ServerError> {
    let mut parser = HttpParser::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut total = 0usize;

    let response = loop {
        let read = tokio::select! {
            r = tokio::time::timeout(config.read_timeout(), stream.read(&mut buf)) => r,
            () = shutdown.notified() => return Ok(()),
        };
        let n = match read {
            Ok(result) => result?,
            Err(_) => {
                debug!("Read timeout from {}", peer);
                return Ok(());
            }
        };
        if n == 0 {
            debug!("{} closed before a complete request ({} bytes)", peer, total);
            return Ok(());
        }

        total += n;
        if total > config.max_request_size {
            warn!("Request from {} exceeds {} bytes", peer, config.max_request_size);
            ctx.errors().record(&Error::invalid(format!(
                "request exceeds {} bytes",
                config.max_request_size
            )));
            break HttpResponse::payload_too_large();
        }

        match parser.feed(&buf[..n]) {
            Ok(ParseStatus::Complete(request)) => break ctx.handle(&request, Some(peer)),
            Ok(ParseStatus::NeedMore) => {}
            Err(e) => {
                debug!("Malformed request from {}: {}", peer, e);
                ctx.errors().record(&e);
                break HttpResponse::bad_request();
            }
        }
    };

    let early = !matches!(parser.state(), camd::http::ParseState::Complete);
    stream.write_all(&response.to_bytes()).await?;
    stream.shutdown().await?;
    if early {
        drain(&mut stream, &mut buf).await;
    }
    Ok(())
}

/// Discard input until the peer closes or [`LINGER`] elapses.
async fn drain(stream: &mut TcpStream, buf: &mut [u8]) {
    let _ = tokio::time::timeout(LINGER, async {
        while matches!(stream.read(buf).await, Ok(n) if n > 0) {}
    })
    .await;
}

/// Server error types.
#[derive(Debug)]
pub enum ServerError {
    Config(String),
    Bind(String),
    AlreadyRunning,
    Io(String),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(s) => write!(f, "Configuration error: {}", s),
            Self::Bind(s) => write!(f, "Bind error: {}", s),
            Self::AlreadyRunning => write!(f, "Server already running"),
            Self::Io(s) => write!(f, "I/O error: {}", s),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
