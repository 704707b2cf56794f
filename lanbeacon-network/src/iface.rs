//! Snapshot model of the host's network interfaces.
//!
//! Enumeration is polled, not event-driven: the monitor re-reads this
//! snapshot on a timer, which keeps the crate portable at the cost of a
//! newly attached interface taking up to one poll interval to appear.

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr};

use lanbeacon_core::broadcast::{broadcast_from_parts, BroadcastError};

/// One network interface as seen at enumeration time.
#[derive(Debug, Clone)]
pub struct NetInterface {
    pub name: String,
    /// OS interface index; required to scope an IPv6 multicast join.
    pub index: Option<u32>,
    /// IPv4 (address, netmask) pairs in enumeration order.
    pub v4: Vec<(Ipv4Addr, Ipv4Addr)>,
    /// IPv6 link-local addresses (fe80::/10).
    pub v6_link_local: Vec<Ipv6Addr>,
}

impl NetInterface {
    /// Whether a broadcast receiver can be bound on this interface.
    pub fn supports_broadcast(&self) -> bool {
        self.find_broadcast().is_ok()
    }

    /// Whether a multicast receiver can be joined on this interface.
    pub fn supports_multicast(&self) -> bool {
        self.index.is_some() && !self.v6_link_local.is_empty()
    }

    /// First directed broadcast address derivable from the assigned
    /// addresses, in listed order.
    pub fn find_broadcast(&self) -> Result<Ipv4Addr, BroadcastError> {
        match self.v4.first() {
            Some((ip, netmask)) => Ok(broadcast_from_parts(*ip, *netmask)),
            None => Err(BroadcastError::NoBroadcast),
        }
    }
}

/// Enumerate all interfaces, with their addresses grouped by name.
pub fn interfaces() -> io::Result<Vec<NetInterface>> {
    let mut by_name: BTreeMap<String, NetInterface> = BTreeMap::new();
    for entry in if_addrs::get_if_addrs()? {
        let iface = by_name
            .entry(entry.name.clone())
            .or_insert_with(|| NetInterface {
                name: entry.name.clone(),
                index: None,
                v4: Vec::new(),
                v6_link_local: Vec::new(),
            });
        if iface.index.is_none() {
            iface.index = entry.index;
        }
        match entry.addr {
            if_addrs::IfAddr::V4(v4) => iface.v4.push((v4.ip, v4.netmask)),
            if_addrs::IfAddr::V6(v6) => {
                if is_link_local(&v6.ip) {
                    iface.v6_link_local.push(v6.ip);
                }
            }
        }
    }
    Ok(by_name.into_values().collect())
}

/// Names of every network interface; the monitor's enumerate capability.
pub fn names() -> io::Result<HashSet<String>> {
    Ok(if_addrs::get_if_addrs()?
        .into_iter()
        .map(|entry| entry.name)
        .collect())
}

/// Look up a single interface snapshot by name.
pub fn by_name(name: &str) -> io::Result<Option<NetInterface>> {
    Ok(interfaces()?.into_iter().find(|iface| iface.name == name))
}

fn is_link_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xffc0 == 0xfe80
}
