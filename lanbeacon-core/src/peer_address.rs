//! Per-address liveness tracking.
//!
//! Each address a peer has been heard from keeps the timestamps of its
//! last few pings in a fixed ring. The span between the oldest and newest
//! retained entry ("duration") ranks addresses: a lower span means a
//! denser recent ping stream, so that address is preferred.

use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Number of ping timestamps retained per address.
pub const LAST_PING_CAPACITY: usize = 6;

/// A single address packets have been received from, with a ring of the
/// most recent ping times. `head` points at the newest entry.
#[derive(Debug, Clone)]
pub struct PeerAddress {
    ip: IpAddr,
    last_ping: [Option<Instant>; LAST_PING_CAPACITY],
    head: usize,
    occupied: usize,
}

impl PeerAddress {
    /// Create a record with the initial ping as its only ring entry.
    pub fn new(ip: IpAddr, now: Instant) -> Self {
        let mut last_ping = [None; LAST_PING_CAPACITY];
        last_ping[0] = Some(now);
        Self {
            ip,
            last_ping,
            head: 0,
            occupied: 1,
        }
    }

    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Advance the ring head and record the ping, overwriting the oldest
    /// entry once the ring is full.
    pub fn ping(&mut self, now: Instant) {
        self.head = (self.head + 1) % LAST_PING_CAPACITY;
        self.last_ping[self.head] = Some(now);
        if self.occupied < LAST_PING_CAPACITY {
            self.occupied += 1;
        }
    }

    /// Span between the oldest and newest retained ping. Zero until a
    /// second ping has been recorded.
    pub fn duration(&self) -> Duration {
        let newest = match self.last_ping[self.head] {
            Some(t) => t,
            None => return Duration::ZERO,
        };
        let oldest_slot = if self.occupied < LAST_PING_CAPACITY {
            0
        } else {
            (self.head + 1) % LAST_PING_CAPACITY
        };
        match self.last_ping[oldest_slot] {
            Some(oldest) => newest.saturating_duration_since(oldest),
            None => Duration::ZERO,
        }
    }

    /// Whether the most recent ping is at least `timeout` old.
    pub fn is_expired(&self, timeout: Duration, now: Instant) -> bool {
        match self.last_ping[self.head] {
            Some(newest) => now.saturating_duration_since(newest) >= timeout,
            None => true,
        }
    }

    #[cfg(test)]
    fn occupied_slots(&self) -> usize {
        self.last_ping.iter().filter(|slot| slot.is_some()).count()
    }
}
