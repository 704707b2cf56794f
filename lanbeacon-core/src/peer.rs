//! A peer observed on the network.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use crate::packet::Packet;
use crate::peer_address::PeerAddress;

/// State kept for a single discovered peer: the most recent user data it
/// announced and every address it has been heard from. No two entries
/// share an IP.
#[derive(Debug, Clone, Default)]
pub struct Peer {
    user_data: Vec<u8>,
    addrs: Vec<PeerAddress>,
}

impl Peer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a packet from this peer. The announced user data replaces
    /// the stored copy; the source address either refreshes its existing
    /// record or is appended as a new one.
    pub fn ping(&mut self, packet: &Packet, now: Instant) {
        self.user_data = packet.user_data.clone();
        let Some(ip) = packet.source else {
            return;
        };
        if let Some(addr) = self.addrs.iter_mut().find(|a| a.ip() == ip) {
            addr.ping(now);
        } else {
            self.addrs.push(PeerAddress::new(ip, now));
        }
    }

    /// The most recently announced user data.
    pub fn user_data(&self) -> &[u8] {
        &self.user_data
    }

    /// Known addresses, best first: ascending ping-ring duration, ties in
    /// the order the addresses were first heard.
    pub fn addresses(&self) -> Vec<IpAddr> {
        let mut addrs: Vec<&PeerAddress> = self.addrs.iter().collect();
        // Stable sort keeps insertion order for equal durations.
        addrs.sort_by_key(|a| a.duration());
        addrs.into_iter().map(|a| a.ip()).collect()
    }

    /// Drop every expired address and report whether none remain.
    pub fn sweep(&mut self, timeout: Duration, now: Instant) -> bool {
        self.addrs.retain(|a| !a.is_expired(timeout, now));
        self.addrs.is_empty()
    }
}
