//! A single receiving endpoint bound to one (interface, transport) pair.
//!
//! Multicast connections join the all-nodes link-local IPv6 group on their
//! interface; broadcast connections bind the interface's IPv4 directed
//! broadcast address. Either way the socket doubles as the send path:
//! outbound pings are written to the connection's own bound address, which
//! reaches every peer listening on the same scope.

use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lanbeacon_core::broadcast::BroadcastError;
use lanbeacon_core::packet::{Packet, MAX_PACKET_SIZE};

use crate::iface::NetInterface;

/// All-nodes link-local multicast group (ff02::1).
const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// How a connection receives its datagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// IPv6 all-nodes link-local multicast.
    Multicast,
    /// IPv4 directed broadcast.
    Broadcast,
}

/// Errors raised while building a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("interface {0} does not support {1:?}")]
    Unsupported(String, Transport),
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),
    #[error("bind failed: {0}")]
    Bind(#[from] io::Error),
}

/// One bound datagram socket plus the task reading from it.
pub struct Connection {
    transport: Transport,
    socket: Arc<UdpSocket>,
    local: SocketAddr,
    cancel: CancellationToken,
    reader: JoinHandle<()>,
}

impl Connection {
    /// Bind a receiver on `iface` for the given transport and start its
    /// receive loop. Decoded packets are delivered to `packets` with their
    /// source IP filled in.
    pub fn open(
        iface: &NetInterface,
        port: u16,
        transport: Transport,
        packets: mpsc::Sender<Packet>,
        cancel: CancellationToken,
    ) -> Result<Self, ConnectError> {
        let (socket, local) = match transport {
            Transport::Multicast => bind_multicast(iface, port)?,
            Transport::Broadcast => bind_broadcast(iface, port)?,
        };
        let socket = Arc::new(socket);
        let reader = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            packets,
            cancel.clone(),
        ));
        info!(iface = %iface.name, %local, ?transport, "connection open");
        Ok(Self {
            transport,
            socket,
            local,
            cancel,
            reader,
        })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Write one already-encoded ping out through the bound address.
    /// Errors are the caller's to log; the connection stays usable.
    pub async fn send(&self, data: &[u8]) -> io::Result<()> {
        self.socket.send_to(data, self.local).await.map(|_| ())
    }

    /// Signal the receive loop to stop and wait for it to finish.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.reader.await;
    }
}

fn bind_multicast(iface: &NetInterface, port: u16) -> Result<(UdpSocket, SocketAddr), ConnectError> {
    let index = match iface.index {
        Some(index) if iface.supports_multicast() => index,
        _ => {
            return Err(ConnectError::Unsupported(
                iface.name.clone(),
                Transport::Multicast,
            ))
        }
    };
    let addr = SocketAddrV6::new(ALL_NODES, port, 0, index);
    let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_only_v6(true)?;
    socket.bind(&addr.into())?;
    socket.join_multicast_v6(&ALL_NODES, index)?;
    socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(socket.into())?;
    let local = socket.local_addr()?;
    Ok((socket, local))
}

fn bind_broadcast(iface: &NetInterface, port: u16) -> Result<(UdpSocket, SocketAddr), ConnectError> {
    let broadcast = iface.find_broadcast()?;
    let addr = SocketAddrV4::new(broadcast, port);
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(socket.into())?;
    let local = socket.local_addr()?;
    Ok((socket, local))
}

/// Read datagrams until the socket fails or the connection is stopped.
/// Undecodable datagrams are dropped; each delivery is paired with the
/// stop signal so a slow consumer cannot wedge shutdown.
async fn receive_loop(
    socket: Arc<UdpSocket>,
    packets: mpsc::Sender<Packet>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; MAX_PACKET_SIZE];
    loop {
        let (len, from) = tokio::select! {
            _ = cancel.cancelled() => return,
            received = socket.recv_from(&mut buf) => match received {
                Ok(received) => received,
                Err(err) => {
                    warn!("socket read failed, closing receiver: {err}");
                    return;
                }
            },
        };

        let mut packet = match Packet::decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(err) => {
                debug!(%from, "dropping undecodable datagram: {err}");
                continue;
            }
        };
        packet.source = Some(from.ip());

        tokio::select! {
            _ = cancel.cancelled() => return,
            sent = packets.send(packet) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn multicast_requires_a_link_local_address() {
        let iface = NetInterface {
            name: "test0".to_string(),
            index: Some(1),
            v4: vec![(Ipv4Addr::new(192, 168, 1, 2), Ipv4Addr::new(255, 255, 255, 0))],
            v6_link_local: Vec::new(),
        };
        assert!(matches!(
            bind_multicast(&iface, 0),
            Err(ConnectError::Unsupported(_, Transport::Multicast))
        ));
    }

    #[test]
    fn broadcast_requires_an_ipv4_address() {
        let iface = NetInterface {
            name: "test0".to_string(),
            index: Some(1),
            v4: Vec::new(),
            v6_link_local: vec!["fe80::1".parse().unwrap()],
        };
        assert!(matches!(
            bind_broadcast(&iface, 0),
            Err(ConnectError::Broadcast(BroadcastError::NoBroadcast))
        ));
    }

    // Exercising real sockets depends on what the host exposes, so this
    // only runs against an interface that advertises broadcast support.
    #[tokio::test]
    async fn open_send_and_stop_on_a_real_interface() {
        let Some(iface) = iface::interfaces()
            .ok()
            .and_then(|all| all.into_iter().find(|i| i.supports_broadcast()))
        else {
            return;
        };

        let (tx, mut rx) = mpsc::channel(8);
        let conn = match Connection::open(&iface, 0, Transport::Broadcast, tx, CancellationToken::new()) {
            Ok(conn) => conn,
            // Binding a broadcast address can be denied in sandboxes.
            Err(_) => return,
        };
        assert_eq!(conn.transport(), Transport::Broadcast);

        let ping = Packet::new("conn-test", b"payload".to_vec());
        if conn.send(&ping.encode().unwrap()).await.is_ok() {
            // Loopback of a directed broadcast is environment-dependent;
            // when it does come back it must carry a source address.
            if let Ok(Some(received)) = timeout(Duration::from_millis(500), rx.recv()).await {
                assert_eq!(received.id, "conn-test");
                assert_eq!(received.user_data, b"payload");
                assert!(received.source.is_some());
            }
        }

        conn.stop().await;
    }
}
