// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery responder thread.
//!
//! ```text
//! start(port) -> bind + join group -> Hello -> spawn "camd-wsd"
//!                                               |
//!               recv_from (timeout) -> Probe? -> ProbeMatch (unicast)
//!               idle >= hello_interval -> Hello
//! stop() -> running=false -> shutdown(Read) -> bounded join -> Bye
//! ```
//!
//! `start` and `stop` are serialized by a lifecycle lock the worker never
//! takes, so any interleaving of calls terminates.

use super::messages::{self, Advertisement, AppSequence};
use super::multicast;
use crate::config::{
    DEVICE_SERVICE_PATH, DISCOVERY_JOIN_TIMEOUT_MS, DISCOVERY_MAX_MESSAGE_SIZE,
    DISCOVERY_MULTICAST_ADDR, DISCOVERY_PORT, DISCOVERY_RECV_TIMEOUT_MS, FALLBACK_HOSTNAME,
    FALLBACK_IPV4, HELLO_INTERVAL_SECS,
};
use crate::error::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Responder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Announce destination. The socket joins it when it is a multicast
    /// group; a unicast address is used as-is.
    pub group: Ipv4Addr,
    pub port: u16,
    pub hello_interval: Duration,
    pub recv_timeout: Duration,
    pub join_timeout: Duration,
    /// Advertised address; auto-detected when `None`.
    pub advertise_ip: Option<Ipv4Addr>,
    /// Host identity for the endpoint address; the local host name when `None`.
    pub hostname: Option<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: Ipv4Addr::from(DISCOVERY_MULTICAST_ADDR),
            port: DISCOVERY_PORT,
            hello_interval: Duration::from_secs(HELLO_INTERVAL_SECS),
            recv_timeout: Duration::from_millis(DISCOVERY_RECV_TIMEOUT_MS),
            join_timeout: Duration::from_millis(DISCOVERY_JOIN_TIMEOUT_MS),
            advertise_ip: None,
            hostname: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStatus {
    Stopped,
    Running,
    Stopping,
}

impl DiscoveryStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => DiscoveryStatus::Running,
            2 => DiscoveryStatus::Stopping,
            _ => DiscoveryStatus::Stopped,
        }
    }
}

/// Counters snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub hellos_sent: u64,
    pub byes_sent: u64,
    pub probes_received: u64,
    pub matches_sent: u64,
    pub datagrams_dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hellos_sent: AtomicU64,
    byes_sent: AtomicU64,
    probes_received: AtomicU64,
    matches_sent: AtomicU64,
    datagrams_dropped: AtomicU64,
}

/// What the worker thread and the lifecycle calls share.
struct Shared {
    advertisement: Advertisement,
    announce_to: SocketAddr,
    instance_id: u64,
    message_number: Arc<AtomicU64>,
    counters: Arc<Counters>,
}

impl Shared {
    fn next_seq(&self) -> AppSequence {
        AppSequence {
            instance_id: self.instance_id,
            message_number: self.message_number.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    fn send_hello(&self, socket: &UdpSocket) {
        let xml = messages::hello(&self.advertisement, &messages::new_message_id(), self.next_seq());
        match socket.send_to(xml.as_bytes(), self.announce_to) {
            Ok(_) => {
                self.counters.hellos_sent.fetch_add(1, Ordering::Relaxed);
                log::debug!("[WSD] Hello sent to {}", self.announce_to);
            }
            Err(e) => log::warn!("[WSD] Hello to {} failed: {}", self.announce_to, e),
        }
    }

    fn send_bye(&self, socket: &UdpSocket) {
        let xml = messages::bye(&self.advertisement, &messages::new_message_id(), self.next_seq());
        match socket.send_to(xml.as_bytes(), self.announce_to) {
            Ok(_) => {
                self.counters.byes_sent.fetch_add(1, Ordering::Relaxed);
                log::debug!("[WSD] Bye sent to {}", self.announce_to);
            }
            Err(e) => log::warn!("[WSD] Bye to {} failed: {}", self.announce_to, e),
        }
    }

    fn handle_datagram(&self, socket: &UdpSocket, data: &[u8], peer: SocketAddr) {
        let Some(probe) = messages::parse_probe(data) else {
            return;
        };
        self.counters.probes_received.fetch_add(1, Ordering::Relaxed);

        let relates_to = probe.message_id.as_deref().unwrap_or("");
        let xml = messages::probe_match(
            &self.advertisement,
            &messages::new_message_id(),
            relates_to,
            self.next_seq(),
        );
        match socket.send_to(xml.as_bytes(), peer) {
            Ok(_) => {
                self.counters.matches_sent.fetch_add(1, Ordering::Relaxed);
                log::debug!("[WSD] ProbeMatch sent to {}", peer);
            }
            Err(e) => log::warn!("[WSD] ProbeMatch to {} failed: {}", peer, e),
        }
    }
}

struct Worker {
    handle: JoinHandle<()>,
    done: Receiver<()>,
    socket: Arc<UdpSocket>,
    running: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

/// Discovery responder state.
pub struct DiscoveryState {
    config: DiscoveryConfig,
    endpoint: String,
    instance_id: u64,
    message_number: Arc<AtomicU64>,
    counters: Arc<Counters>,
    status: AtomicU8,
    lifecycle: Mutex<Option<Worker>>,
    http_port: AtomicU16,
}

impl DiscoveryState {
    /// Derive the endpoint address once; it is reused for every message.
    pub fn new(config: DiscoveryConfig) -> Self {
        let hostname = config
            .hostname
            .clone()
            .unwrap_or_else(crate::service::device::local_hostname);
        let hostname = if hostname.is_empty() {
            FALLBACK_HOSTNAME.to_string()
        } else {
            hostname
        };
        let endpoint = messages::endpoint_address(&hostname);
        log::debug!("[WSD] endpoint {} (host '{}')", endpoint, hostname);

        Self {
            config,
            endpoint,
            instance_id: chrono::Utc::now().timestamp().max(0) as u64,
            message_number: Arc::new(AtomicU64::new(0)),
            counters: Arc::new(Counters::default()),
            status: AtomicU8::new(0),
            lifecycle: Mutex::new(None),
            http_port: AtomicU16::new(0),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// `urn:uuid:` endpoint address.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn status(&self) -> DiscoveryStatus {
        DiscoveryStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.status() == DiscoveryStatus::Running
    }

    /// HTTP port advertised by the last `start`.
    pub fn http_port(&self) -> u16 {
        self.http_port.load(Ordering::Relaxed)
    }

    /// Local address of the responder socket while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.lifecycle
            .lock()
            .as_ref()
            .and_then(|w| w.socket.local_addr().ok())
    }

    pub fn stats(&self) -> DiscoveryStats {
        let c = &self.counters;
        DiscoveryStats {
            hellos_sent: c.hellos_sent.load(Ordering::Relaxed),
            byes_sent: c.byes_sent.load(Ordering::Relaxed),
            probes_received: c.probes_received.load(Ordering::Relaxed),
            matches_sent: c.matches_sent.load(Ordering::Relaxed),
            datagrams_dropped: c.datagrams_dropped.load(Ordering::Relaxed),
        }
    }

    /// Start announcing `http_port`. No-op when already running.
    pub fn start(&self, http_port: u16) -> Result<()> {
        let mut slot = self.lifecycle.lock();
        if slot.is_some() {
            log::debug!("[WSD] start: already running");
            return Ok(());
        }

        let socket = multicast::bind_reusable(self.config.port, self.config.recv_timeout)?;
        if self.config.group.is_multicast() {
            multicast::join_multicast_group(&socket, self.config.group)?;
        }

        let ip = self
            .config
            .advertise_ip
            .unwrap_or_else(|| multicast::get_primary_interface_ip(Ipv4Addr::from(FALLBACK_IPV4)));
        let shared = Arc::new(Shared {
            advertisement: Advertisement {
                endpoint: self.endpoint.clone(),
                xaddr: format!("http://{}:{}{}", ip, http_port, DEVICE_SERVICE_PATH),
            },
            announce_to: multicast::group_addr(self.config.group, self.config.port),
            instance_id: self.instance_id,
            message_number: Arc::clone(&self.message_number),
            counters: Arc::clone(&self.counters),
        });

        let socket = Arc::new(socket);
        shared.send_hello(&socket);

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = channel::bounded(1);
        let handle = {
            let socket = Arc::clone(&socket);
            let running = Arc::clone(&running);
            let shared = Arc::clone(&shared);
            let interval = self.config.hello_interval;
            std::thread::Builder::new()
                .name("camd-wsd".to_string())
                .spawn(move || run_loop(&socket, &running, &shared, interval, &done_tx))
                .map_err(|e| Error::generic(format!("failed to spawn discovery thread: {}", e)))?
        };

        self.http_port.store(http_port, Ordering::Relaxed);
        self.status.store(1, Ordering::Release);
        *slot = Some(Worker {
            handle,
            done: done_rx,
            socket,
            running,
            shared,
        });
        log::info!(
            "[WSD] responder running on port {} advertising {}",
            self.config.port,
            self.endpoint
        );
        Ok(())
    }

    /// Stop the responder and send Bye. No-op when not running.
    pub fn stop(&self) {
        let mut slot = self.lifecycle.lock();
        let Some(worker) = slot.take() else {
            return;
        };
        self.status.store(2, Ordering::Release);

        worker.running.store(false, Ordering::Release);
        multicast::unblock_receiver(&worker.socket);

        match worker.done.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    log::error!("[WSD] responder thread panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                log::warn!(
                    "[WSD] responder thread did not exit within {:?}, detaching",
                    self.config.join_timeout
                );
            }
        }

        worker.shared.send_bye(&worker.socket);
        self.status.store(0, Ordering::Release);
        log::info!("[WSD] responder stopped");
    }
}

impl Drop for DiscoveryState {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn run_loop(
    socket: &UdpSocket,
    running: &AtomicBool,
    shared: &Shared,
    hello_interval: Duration,
    done: &Sender<()>,
) {
    // One spare byte detects oversized datagrams.
    let mut buf = vec![0u8; DISCOVERY_MAX_MESSAGE_SIZE + 1];
    let mut last_activity = Instant::now();

    while running.load(Ordering::Acquire) {
        match socket.recv_from(&mut buf) {
            Ok((0, _)) => {}
            Ok((len, peer)) => {
                last_activity = Instant::now();
                if len > DISCOVERY_MAX_MESSAGE_SIZE {
                    shared
                        .counters
                        .datagrams_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    log::debug!("[WSD] dropped oversized datagram from {}", peer);
                } else if running.load(Ordering::Acquire) {
                    shared.handle_datagram(socket, &buf[..len], peer);
                }
            }
            Err(e) if is_timeout(&e) => {}
            Err(e) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                log::warn!("[WSD] recv failed: {}", e);
                std::thread::sleep(Duration::from_millis(50));
            }
        }

        if running.load(Ordering::Acquire) && last_activity.elapsed() >= hello_interval {
            shared.send_hello(socket);
            last_activity = Instant::now();
        }
    }

    let _ = done.try_send(());
    log::debug!("[WSD] responder loop exited");
}
