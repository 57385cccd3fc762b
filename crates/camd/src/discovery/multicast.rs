// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Discovery socket setup and interface lookup.

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// Environment override for the advertised address.
pub const ADVERTISE_IF_ENV: &str = "CAMD_ADVERTISE_IF";

/// Bind a UDP socket on `port` with address reuse, so several responders
/// (or a responder and a probe tool) can share the discovery port.
pub fn bind_reusable(port: u16, read_timeout: Duration) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(read_timeout))?;
    Ok(socket)
}

/// Join `group` on every non-loopback interface, or on the default
/// interface when none is found.
///
/// Per-interface failures are not fatal. Returns the number of interfaces
/// joined.
pub fn join_multicast_group(socket: &UdpSocket, group: Ipv4Addr) -> io::Result<usize> {
    let interfaces = get_multicast_interfaces();

    let mut joined = 0;
    if interfaces.is_empty() {
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        log::debug!("[WSD] join_multicast_v4({}) on UNSPECIFIED", group);
        joined = 1;
    } else {
        for iface in &interfaces {
            match socket.join_multicast_v4(&group, iface) {
                Ok(()) => {
                    log::debug!("[WSD] join_multicast_v4({}) on {}", group, iface);
                    joined += 1;
                }
                Err(e) if e.raw_os_error() == Some(libc::EADDRINUSE) => {
                    log::debug!("[WSD] {} already joined on {}", group, iface);
                    joined += 1;
                }
                Err(e) => {
                    log::debug!(
                        "[WSD] join_multicast_v4({}) on {} failed (non-fatal): {}",
                        group,
                        iface,
                        e
                    );
                }
            }
        }
        if joined == 0 {
            socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
            joined = 1;
        }
    }

    socket.set_multicast_loop_v4(true)?;
    let _ = socket.set_multicast_ttl_v4(1);
    Ok(joined)
}

/// Every non-loopback IPv4 interface address.
pub fn get_multicast_interfaces() -> Vec<Ipv4Addr> {
    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            log::debug!("[WSD] failed to list network interfaces: {}", e);
            return Vec::new();
        }
    };

    interfaces
        .into_iter()
        .filter_map(|(_name, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
        .collect()
}

/// Address advertised in XAddrs: the override from the environment, the
/// default-route interface, the first non-loopback interface, or `fallback`.
pub fn get_primary_interface_ip(fallback: Ipv4Addr) -> Ipv4Addr {
    if let Ok(var) = std::env::var(ADVERTISE_IF_ENV) {
        if let Ok(addr) = var.parse::<Ipv4Addr>() {
            log::debug!("[WSD] using {}={}", ADVERTISE_IF_ENV, addr);
            return addr;
        }
        log::warn!("[WSD] invalid {}='{}', auto-detecting", ADVERTISE_IF_ENV, var);
    }

    if let Ok(IpAddr::V4(ip)) = local_ip_address::local_ip() {
        if !ip.is_loopback() && !ip.is_unspecified() {
            return ip;
        }
    }
    if let Some(ip) = get_multicast_interfaces().first() {
        return *ip;
    }

    log::warn!("[WSD] no usable interface found, advertising {}", fallback);
    fallback
}

/// Shut the read side down so a thread blocked in `recv_from` returns.
pub fn unblock_receiver(socket: &UdpSocket) {
    if let Err(e) = SockRef::from(socket).shutdown(std::net::Shutdown::Read) {
        // Linux reports ENOTCONN for unconnected UDP but still wakes the reader.
        log::trace!("[WSD] socket shutdown: {}", e);
    }
}

/// Multicast destination of discovery traffic.
pub fn group_addr(group: Ipv4Addr, port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(group, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interfaces_exclude_loopback() {
        assert!(get_multicast_interfaces().iter().all(|ip| !ip.is_loopback()));
    }

    #[test]
    fn test_primary_ip_is_never_loopback() {
        let ip = get_primary_interface_ip(Ipv4Addr::new(192, 168, 1, 100));
        assert!(!ip.is_loopback());
    }

    #[test]
    fn test_reusable_bind_shares_port() {
        let a = bind_reusable(0, Duration::from_millis(50)).expect("bind");
        let port = a.local_addr().expect("addr").port();
        let b = bind_reusable(port, Duration::from_millis(50)).expect("second bind");
        assert_eq!(b.local_addr().expect("addr").port(), port);
    }
}
