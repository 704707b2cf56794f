//! Zero-configuration LAN peer discovery.
//!
//! Each participating host periodically announces `{id, user_data}` over
//! IPv4 directed broadcast and IPv6 link-local multicast on every
//! suitable network interface, listens for announcements from other
//! hosts, and keeps a live registry of the peers it has heard with their
//! addresses ranked by recent ping density.
//!
//! Responsibilities
//! ----------------
//! • Poll network interfaces and open/tear down sockets as they change.
//! • Emit pings on every active connection at a fixed interval.
//! • Track peers (id -> user data + ranked addresses) and expire them.
//! • Announce arrivals and departures on the [`PeerEvents`] streams.
//!
//! All interaction happens through a [`Service`]:
//!
//! ```no_run
//! use std::time::Duration;
//! use lanbeacon_network::{Service, ServiceConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let (service, mut events) = Service::start(ServiceConfig {
//!     poll_interval: Duration::from_secs(60),
//!     ping_interval: Duration::from_secs(2),
//!     peer_timeout: Duration::from_secs(8),
//!     port: 1234,
//!     id: "machine01".into(),
//!     user_data: b"v1".to_vec(),
//! })?;
//!
//! while let Some(id) = events.added.recv().await {
//!     println!("peer {id} reachable at {:?}", service.peer_addresses(&id));
//! }
//!
//! service.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod communicator;
pub mod connection;
pub mod enumerator;
pub mod iface;
pub mod monitor;
pub mod service;

pub use communicator::Communicator;
pub use connection::{ConnectError, Connection, Transport};
pub use enumerator::StringSetEnumerator;
pub use iface::NetInterface;
pub use monitor::InterfaceMonitor;
pub use service::{PeerEvents, Service, ServiceConfig, ServiceError};
