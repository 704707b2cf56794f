//! The discovery service: configuration, the peer table, three timers,
//! and the notification streams.
//!
//! Event semantics: the `PeerEvents` channels are bounded and nothing is
//! ever dropped, so a consumer that stops reading will eventually block
//! the service loop. The peer-table lock is always released before an
//! event is published, which means the consumer may call straight back
//! into [`Service::peer_user_data`] or [`Service::peer_addresses`] from
//! its event handler without deadlocking. Every publish is also paired
//! with the stop signal, so [`Service::stop`] wins over a stuck consumer.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lanbeacon_core::packet::Packet;
use lanbeacon_core::peer::Peer;

use crate::communicator::Communicator;

/// Buffer size of the `added` / `removed` event streams.
const EVENT_BUFFER: usize = 16;

/// Parameters of a running service. Frozen once passed to
/// [`Service::start`].
///
/// `peer_timeout` should be a small multiple of `ping_interval` so that a
/// single lost ping does not expire a peer. Typical values: poll one
/// minute, ping two seconds, timeout eight seconds. Keep `user_data`
/// small; the whole encoded packet must stay below 1000 bytes.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Time between polls for network interface changes.
    pub poll_interval: Duration,
    /// Time between outbound pings.
    pub ping_interval: Duration,
    /// Time after which a silent peer address is dropped.
    pub peer_timeout: Duration,
    /// UDP port used for broadcast and multicast.
    pub port: u16,
    /// Unique identifier for this host. Must be non-empty.
    pub id: String,
    /// Opaque payload attached to every outbound ping.
    pub user_data: Vec<u8>,
}

/// Errors surfaced by the service API.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service id must not be empty")]
    EmptyId,
    #[error("unknown peer: {0}")]
    UnknownPeer(String),
}

/// Streams of peer ids as they appear and disappear.
///
/// For every id the observed sequence is strictly alternating: it is
/// announced on `added` exactly once per absent-to-live transition, and
/// any announcement on `removed` comes after the matching `added`.
pub struct PeerEvents {
    pub added: mpsc::Receiver<String>,
    pub removed: mpsc::Receiver<String>,
}

type PeerTable = Arc<Mutex<HashMap<String, Peer>>>;

/// Handle to a running discovery service. Cloneable; queries may be made
/// from any task, including the one consuming [`PeerEvents`].
#[derive(Clone)]
pub struct Service {
    peers: PeerTable,
    cancel: CancellationToken,
    handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Service {
    /// Validate the configuration and start the service. Must be called
    /// within a tokio runtime; discovery begins immediately and events
    /// arrive on the returned [`PeerEvents`].
    pub fn start(config: ServiceConfig) -> Result<(Service, PeerEvents), ServiceError> {
        if config.id.is_empty() {
            return Err(ServiceError::EmptyId);
        }

        let peers: PeerTable = Arc::new(Mutex::new(HashMap::new()));
        let (added_tx, added) = mpsc::channel(EVENT_BUFFER);
        let (removed_tx, removed) = mpsc::channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(run(
            config,
            Arc::clone(&peers),
            added_tx,
            removed_tx,
            cancel.clone(),
        ));

        let service = Service {
            peers,
            cancel,
            handle: Arc::new(Mutex::new(Some(handle))),
        };
        Ok((service, PeerEvents { added, removed }))
    }

    /// Latest user data announced by the peer.
    pub fn peer_user_data(&self, id: &str) -> Result<Vec<u8>, ServiceError> {
        lock(&self.peers)
            .get(id)
            .map(|peer| peer.user_data().to_vec())
            .ok_or_else(|| ServiceError::UnknownPeer(id.to_string()))
    }

    /// Addresses the peer is reachable at, best first.
    pub fn peer_addresses(&self, id: &str) -> Result<Vec<IpAddr>, ServiceError> {
        lock(&self.peers)
            .get(id)
            .map(|peer| peer.addresses())
            .ok_or_else(|| ServiceError::UnknownPeer(id.to_string()))
    }

    /// Ids of every currently live peer.
    pub fn peer_ids(&self) -> Vec<String> {
        lock(&self.peers).keys().cloned().collect()
    }

    /// Shut the service down: stop the loop, tear down the communicator
    /// and drop all peers. Idempotent; once it returns, no further events
    /// are delivered.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = lock_handle(&self.handle).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run(
    config: ServiceConfig,
    peers: PeerTable,
    added_tx: mpsc::Sender<String>,
    removed_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) {
    let mut communicator = Communicator::spawn(config.poll_interval, config.port);
    let outbound = Packet::new(config.id.clone(), config.user_data.clone());

    let mut ping = tokio::time::interval(config.ping_interval);
    let mut sweep = tokio::time::interval(config.peer_timeout);

    info!(id = %config.id, port = config.port, "discovery service started");

    'run: loop {
        tokio::select! {
            _ = cancel.cancelled() => break 'run,
            packet = communicator.packets.recv() => match packet {
                Some(packet) => {
                    if let Some(id) = record_packet(&peers, &config.id, packet, Instant::now()) {
                        // The table lock is released; this may block on the
                        // consumer but yields to stop.
                        tokio::select! {
                            _ = cancel.cancelled() => break 'run,
                            _ = added_tx.send(id) => {}
                        }
                    }
                }
                None => break 'run,
            },
            _ = ping.tick() => {
                tokio::select! {
                    _ = cancel.cancelled() => break 'run,
                    sent = communicator.send(outbound.clone()) => {
                        if let Err(err) = sent {
                            warn!("ping dispatch failed: {err}");
                        }
                    }
                }
            }
            _ = sweep.tick() => {
                for id in sweep_table(&peers, config.peer_timeout, Instant::now()) {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'run,
                        _ = removed_tx.send(id) => {}
                    }
                }
            }
        }
    }

    communicator.stop().await;
    lock(&peers).clear();
    info!(id = %config.id, "discovery service stopped");
}

/// Record a packet against the table. Returns the peer id when this packet
/// created the peer; the announcement must happen after the lock is
/// released, which is why it is left to the caller.
fn record_packet(peers: &PeerTable, own_id: &str, packet: Packet, now: Instant) -> Option<String> {
    // Our own pings come back on every connection; ignore them.
    if packet.id == own_id {
        return None;
    }
    let mut table = lock(peers);
    let added = !table.contains_key(&packet.id);
    table.entry(packet.id.clone()).or_default().ping(&packet, now);
    added.then(|| packet.id)
}

/// Sweep every peer and drop the ones left with no live address. Returns
/// the removed ids for announcement outside the lock.
fn sweep_table(peers: &PeerTable, timeout: Duration, now: Instant) -> Vec<String> {
    let mut table = lock(peers);
    let mut removed = Vec::new();
    table.retain(|id, peer| {
        if peer.sweep(timeout, now) {
            removed.push(id.clone());
            false
        } else {
            true
        }
    });
    removed
}

fn lock(peers: &PeerTable) -> MutexGuard<'_, HashMap<String, Peer>> {
    peers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_handle(
    handle: &Arc<Mutex<Option<JoinHandle<()>>>>,
) -> MutexGuard<'_, Option<JoinHandle<()>>> {
    handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn table() -> PeerTable {
        Arc::new(Mutex::new(HashMap::new()))
    }

    fn packet_from(id: &str, data: &[u8], ip: [u8; 4]) -> Packet {
        let mut packet = Packet::new(id, data.to_vec());
        packet.source = Some(IpAddr::V4(Ipv4Addr::from(ip)));
        packet
    }

    #[test]
    fn own_packets_are_ignored() {
        let peers = table();
        let announced = record_packet(
            &peers,
            "a",
            packet_from("a", b"x", [10, 0, 0, 7]),
            Instant::now(),
        );
        assert_eq!(announced, None);
        assert!(lock(&peers).is_empty());
    }

    #[test]
    fn first_packet_announces_the_peer_once() {
        let peers = table();
        let now = Instant::now();
        assert_eq!(
            record_packet(&peers, "a", packet_from("b", b"x", [10, 0, 0, 7]), now),
            Some("b".to_string())
        );
        assert_eq!(
            record_packet(&peers, "a", packet_from("b", b"x", [10, 0, 0, 7]), now),
            None
        );
    }

    #[test]
    fn recorded_peer_is_queryable_until_swept() {
        let peers = table();
        let t0 = Instant::now();
        record_packet(&peers, "a", packet_from("b", b"x", [10, 0, 0, 7]), t0);

        assert_eq!(lock(&peers).get("b").map(|p| p.user_data().to_vec()), Some(b"x".to_vec()));
        assert_eq!(
            lock(&peers).get("b").map(|p| p.addresses()),
            Some(vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))])
        );

        // Quiet past the timeout: the sweep removes and reports the peer.
        let removed = sweep_table(&peers, Duration::from_millis(200), t0 + Duration::from_millis(250));
        assert_eq!(removed, vec!["b".to_string()]);
        assert!(lock(&peers).is_empty());
    }

    #[test]
    fn sweep_keeps_fresh_peers() {
        let peers = table();
        let t0 = Instant::now();
        record_packet(&peers, "a", packet_from("b", b"x", [10, 0, 0, 7]), t0);
        let removed = sweep_table(&peers, Duration::from_millis(200), t0 + Duration::from_millis(100));
        assert!(removed.is_empty());
        assert_eq!(lock(&peers).len(), 1);
    }

    #[test]
    fn addresses_rank_by_ping_density() {
        let peers = table();
        let t0 = Instant::now();
        for i in 0..3u64 {
            record_packet(
                &peers,
                "a",
                packet_from("c", b"", [1, 1, 1, 1]),
                t0 + Duration::from_secs(i),
            );
            record_packet(
                &peers,
                "a",
                packet_from("c", b"", [2, 2, 2, 2]),
                t0 + Duration::from_millis(i * 100),
            );
        }
        assert_eq!(
            lock(&peers).get("c").map(|p| p.addresses()),
            Some(vec![
                IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2)),
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
            ])
        );
    }

    #[tokio::test]
    async fn empty_id_is_rejected() {
        let result = Service::start(ServiceConfig {
            poll_interval: Duration::from_secs(60),
            ping_interval: Duration::from_secs(2),
            peer_timeout: Duration::from_secs(8),
            port: 0,
            id: String::new(),
            user_data: Vec::new(),
        });
        assert!(matches!(result, Err(ServiceError::EmptyId)));
    }
}
