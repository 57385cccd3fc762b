// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! camd-probe - find cameras on the local network
//!
//! Multicasts a WS-Discovery Probe for network video transmitters and prints
//! every distinct ProbeMatch received before the timeout.

use camd::discovery::messages::{self, ProbeMatchInfo};
use camd::discovery::multicast;
use clap::Parser;
use colored::*;
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Find cameras via WS-Discovery
#[derive(Parser, Debug)]
#[command(name = "camd-probe")]
#[command(version)]
#[command(about = "Send a WS-Discovery Probe and list the cameras that answer")]
struct Args {
    /// Probe destination (multicast group or a single camera)
    #[arg(short, long, default_value = "239.255.255.250")]
    target: Ipv4Addr,

    /// Discovery port
    #[arg(short, long, default_value = "3702")]
    port: u16,

    /// Seconds to wait for answers
    #[arg(long, default_value = "3")]
    timeout: u64,

    /// Number of probes to send (answers are de-duplicated)
    #[arg(short, long, default_value = "2")]
    repeat: u32,

    /// Output format: pretty, json
    #[arg(short, long, default_value = "pretty")]
    format: OutputFormat,

    /// Quiet mode - one line per camera
    #[arg(long)]
    quiet: bool,
}

#[derive(Clone, Debug)]
enum OutputFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "p" => Ok(OutputFormat::Pretty),
            "json" | "j" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.set_read_timeout(Some(Duration::from_millis(200)))?;
    if args.target.is_multicast() {
        socket.set_multicast_ttl_v4(1)?;
        socket.set_multicast_loop_v4(true)?;
    }
    let destination = multicast::group_addr(args.target, args.port);

    if !args.quiet {
        eprintln!(
            "{} Probing {} for {}s",
            ">>>".green().bold(),
            destination,
            args.timeout
        );
    }

    let mut sent = HashSet::new();
    for _ in 0..args.repeat.max(1) {
        let id = messages::new_message_id();
        socket.send_to(messages::probe(&id).as_bytes(), destination)?;
        sent.insert(id);
    }

    let found = collect(&socket, &sent, &running, Duration::from_secs(args.timeout));

    match args.format {
        OutputFormat::Pretty => print_pretty(&found, args),
        OutputFormat::Json => print_json(&found)?,
    }
    Ok(())
}

fn collect(
    socket: &UdpSocket,
    sent: &HashSet<String>,
    running: &AtomicBool,
    timeout: Duration,
) -> Vec<(SocketAddr, ProbeMatchInfo)> {
    let deadline = Instant::now() + timeout;
    let mut seen = HashSet::new();
    let mut found = Vec::new();
    let mut buf = vec![0u8; 8192];

    while running.load(Ordering::SeqCst) && Instant::now() < deadline {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(v) => v,
            Err(_) => continue,
        };
        let Some(info) = messages::parse_probe_match(&buf[..len]) else {
            continue;
        };
        // Matches for someone else's probe share the multicast group.
        if info.relates_to.as_ref().is_some_and(|id| !sent.contains(id)) {
            continue;
        }
        if seen.insert(info.endpoint.clone()) {
            found.push((from, info));
        }
    }
    found
}

fn print_pretty(found: &[(SocketAddr, ProbeMatchInfo)], args: &Args) {
    if args.quiet {
        for (from, info) in found {
            println!("{} {} {}", from.ip(), info.endpoint, info.xaddrs.join(" "));
        }
        return;
    }

    println!();
    println!(
        "{} {} camera(s) answered",
        "Cameras:".cyan().bold(),
        found.len()
    );
    println!();
    for (i, (from, info)) in found.iter().enumerate() {
        println!("  {} {}", format!("[{}]", i + 1).yellow(), info.endpoint.green());
        println!("      From:   {}", from);
        println!("      Types:  {}", info.types);
        for xaddr in &info.xaddrs {
            println!("      XAddr:  {}", xaddr.white());
        }
        for scope in &info.scopes {
            println!("      Scope:  {}", scope.dimmed());
        }
    }
    if found.is_empty() {
        println!("{}", "  No answers (multicast blocked or no camera running?)".yellow());
    }
}

fn print_json(found: &[(SocketAddr, ProbeMatchInfo)]) -> Result<(), Box<dyn std::error::Error>> {
    let cameras: Vec<serde_json::Value> = found
        .iter()
        .map(|(from, info)| {
            serde_json::json!({
                "from": from.to_string(),
                "endpoint": info.endpoint,
                "types": info.types,
                "xaddrs": info.xaddrs,
                "scopes": info.scopes,
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({ "cameras": cameras }))?
    );
    Ok(())
}
