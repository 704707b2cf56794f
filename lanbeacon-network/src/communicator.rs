//! Fans connections in and out.
//!
//! The communicator owns one set of connections per interface, created and
//! torn down as the interface monitor reports changes. Every connection's
//! receive stream is funnelled into a single aggregate channel, and every
//! send request goes out on every connection of every interface.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lanbeacon_core::packet::Packet;

use crate::connection::{Connection, Transport};
use crate::iface;
use crate::monitor::InterfaceMonitor;

/// Buffer sizes of the aggregate packet stream and the send-request queue.
const PACKET_BUFFER: usize = 64;
const SEND_BUFFER: usize = 16;

/// Network interface manager and packet pump.
pub struct Communicator {
    /// Every packet received on any connection. Per-connection receive
    /// order is preserved; across connections no order is guaranteed.
    pub packets: mpsc::Receiver<Packet>,
    send_tx: mpsc::Sender<Packet>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Communicator {
    /// Spawn the communicator and its interface monitor.
    pub fn spawn(poll_interval: Duration, port: u16) -> Self {
        let cancel = CancellationToken::new();
        let (packet_tx, packets) = mpsc::channel(PACKET_BUFFER);
        let (send_tx, send_rx) = mpsc::channel(SEND_BUFFER);
        let monitor = InterfaceMonitor::spawn(poll_interval);
        let handle = tokio::spawn(run(monitor, port, packet_tx, send_rx, cancel.clone()));
        Self {
            packets,
            send_tx,
            cancel,
            handle,
        }
    }

    /// Queue a packet for delivery on every active connection.
    pub async fn send(&self, packet: Packet) -> anyhow::Result<()> {
        self.send_tx
            .send(packet)
            .await
            .map_err(|_| anyhow!("communicator is stopped"))
    }

    /// Stop every connection, wait for all receive loops to drain, and
    /// close the aggregate packet channel.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

async fn run(
    mut monitor: InterfaceMonitor,
    port: u16,
    packet_tx: mpsc::Sender<Packet>,
    mut send_rx: mpsc::Receiver<Packet>,
    cancel: CancellationToken,
) {
    let mut connections: HashMap<String, Vec<Connection>> = HashMap::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            name = monitor.added.recv() => match name {
                Some(name) => add_interface(&mut connections, &name, port, &packet_tx, &cancel).await,
                None => break,
            },
            name = monitor.removed.recv() => {
                if let Some(name) = name {
                    remove_interface(&mut connections, &name).await;
                }
            }
            request = send_rx.recv() => match request {
                Some(packet) => send_all(&connections, &packet).await,
                None => break,
            },
        }
    }

    // Tear down every interface and wait for its receivers before letting
    // the aggregate channel close (packet_tx drops when this task ends).
    let names: Vec<String> = connections.keys().cloned().collect();
    for name in names {
        remove_interface(&mut connections, &name).await;
    }
    monitor.stop().await;
}

/// Open a connection per transport the interface supports. Each mode is
/// gated on its own capability; a failure to open one mode is logged and
/// does not affect the other.
async fn add_interface(
    connections: &mut HashMap<String, Vec<Connection>>,
    name: &str,
    port: u16,
    packet_tx: &mpsc::Sender<Packet>,
    cancel: &CancellationToken,
) {
    let iface = match iface::by_name(name) {
        Ok(Some(iface)) => iface,
        Ok(None) => {
            warn!(iface = name, "interface disappeared before it could be opened");
            return;
        }
        Err(err) => {
            error!(iface = name, "interface lookup failed: {err}");
            return;
        }
    };

    let mut opened = Vec::new();
    for transport in [Transport::Multicast, Transport::Broadcast] {
        let supported = match transport {
            Transport::Multicast => iface.supports_multicast(),
            Transport::Broadcast => iface.supports_broadcast(),
        };
        if !supported {
            continue;
        }
        match Connection::open(&iface, port, transport, packet_tx.clone(), cancel.child_token()) {
            Ok(conn) => opened.push(conn),
            Err(err) => warn!(iface = name, ?transport, "could not open connection: {err}"),
        }
    }
    connections.insert(name.to_string(), opened);
}

async fn remove_interface(connections: &mut HashMap<String, Vec<Connection>>, name: &str) {
    if let Some(conns) = connections.remove(name) {
        info!(iface = name, "closing {} connection(s)", conns.len());
        for conn in conns {
            conn.stop().await;
        }
    }
}

/// Encode once, deliver to every connection across every interface.
async fn send_all(connections: &HashMap<String, Vec<Connection>>, packet: &Packet) {
    let data = match packet.encode() {
        Ok(data) => data,
        Err(err) => {
            error!("could not encode outbound ping: {err}");
            return;
        }
    };
    for conns in connections.values() {
        for conn in conns {
            if let Err(err) = conn.send(&data).await {
                warn!(local = %conn.local_addr(), "send failed: {err}");
            }
        }
    }
}
