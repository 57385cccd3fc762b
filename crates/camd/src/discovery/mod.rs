// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! WS-Discovery responder.
//!
//! Announces the device with Hello when it comes up, answers Probes with a
//! unicast ProbeMatch, and says Bye on the way down.

pub mod messages;
pub mod multicast;
pub mod responder;

pub use messages::{Advertisement, AppSequence, ProbeMatchInfo, ProbeRequest};
pub use responder::{DiscoveryConfig, DiscoveryState, DiscoveryStats, DiscoveryStatus};
