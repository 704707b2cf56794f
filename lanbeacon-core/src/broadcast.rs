//! IPv4 directed-broadcast derivation.
//!
//! The broadcast address of a network is its address with every host bit
//! set: `(ip & mask) | !mask`. Byte order is irrelevant as long as the
//! same form is used for both operands, so everything here works on
//! host-order `u32` values.

use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("not an IPv4 address: {0}")]
    NotIpv4(String),
    #[error("invalid CIDR notation: {0}")]
    InvalidCidr(String),
    #[error("no broadcast address was found")]
    NoBroadcast,
}

/// Derive the directed broadcast address from an `ip/prefix` string.
pub fn broadcast_from_cidr(cidr: &str) -> Result<Ipv4Addr, BroadcastError> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| BroadcastError::InvalidCidr(cidr.to_string()))?;
    let ip: IpAddr = addr
        .parse()
        .map_err(|_| BroadcastError::InvalidCidr(cidr.to_string()))?;
    let IpAddr::V4(ip) = ip else {
        return Err(BroadcastError::NotIpv4(addr.to_string()));
    };
    let prefix: u32 = prefix
        .parse()
        .map_err(|_| BroadcastError::InvalidCidr(cidr.to_string()))?;
    if prefix > 32 {
        return Err(BroadcastError::InvalidCidr(cidr.to_string()));
    }
    Ok(broadcast_from_parts(ip, Ipv4Addr::from(prefix_mask(prefix))))
}

/// Directed broadcast from an address and its netmask.
pub fn broadcast_from_parts(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    let (ip, mask) = (u32::from(ip), u32::from(netmask));
    Ipv4Addr::from(ip & mask | !mask)
}

fn prefix_mask(prefix: u32) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_c_network() {
        assert_eq!(
            broadcast_from_cidr("192.168.1.1/24"),
            Ok(Ipv4Addr::new(192, 168, 1, 255))
        );
    }

    #[test]
    fn class_a_network() {
        assert_eq!(
            broadcast_from_cidr("10.1.2.3/8"),
            Ok(Ipv4Addr::new(10, 255, 255, 255))
        );
    }

    #[test]
    fn host_route_is_its_own_broadcast() {
        assert_eq!(
            broadcast_from_cidr("172.16.0.9/32"),
            Ok(Ipv4Addr::new(172, 16, 0, 9))
        );
    }

    #[test]
    fn zero_prefix_is_the_limited_broadcast() {
        assert_eq!(
            broadcast_from_cidr("1.2.3.4/0"),
            Ok(Ipv4Addr::new(255, 255, 255, 255))
        );
    }

    #[test]
    fn ipv6_is_rejected() {
        assert_eq!(
            broadcast_from_cidr("::1/128"),
            Err(BroadcastError::NotIpv4("::1".to_string()))
        );
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(matches!(
            broadcast_from_cidr("192.168.1.1"),
            Err(BroadcastError::InvalidCidr(_))
        ));
        assert!(matches!(
            broadcast_from_cidr("not-an-ip/24"),
            Err(BroadcastError::InvalidCidr(_))
        ));
        assert!(matches!(
            broadcast_from_cidr("192.168.1.1/33"),
            Err(BroadcastError::InvalidCidr(_))
        ));
        assert!(matches!(
            broadcast_from_cidr("192.168.1.1/abc"),
            Err(BroadcastError::InvalidCidr(_))
        ));
    }

    #[test]
    fn parts_match_the_cidr_form() {
        assert_eq!(
            broadcast_from_parts(Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(255, 255, 255, 0)),
            Ipv4Addr::new(192, 168, 1, 255)
        );
    }
}
