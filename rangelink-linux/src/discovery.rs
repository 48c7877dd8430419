//! LAN discovery: UDP multicast announces, parse announces/replies, surface
//! newly seen peers to the core as `PeerDiscovered` events.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rangelink_core::{Event, PeerHandle, PeerIdentity, TransportEvent, SERVICE_NAMESPACE};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::secure::PublicKey;
use crate::wire::{decode_frame, encode_frame, LanMessage, LAN_PROTOCOL_VERSION};

const MULTICAST_GROUP: &str = "239.255.71.18";
const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(4);

/// Where to dial a discovered peer, plus its channel key.
#[derive(Debug, Clone)]
pub struct DiscoveredPeer {
    pub identity: PeerIdentity,
    pub public_key: PublicKey,
    pub addr: SocketAddr,
}

/// Shared handle→peer map the transport driver dials from.
pub type AddressBook = Arc<Mutex<HashMap<PeerHandle, DiscoveredPeer>>>;

/// Announce our presence and collect everyone else's. Runs until the socket
/// errors.
pub async fn run_discovery(
    local: PeerIdentity,
    public_key: PublicKey,
    discovery_port: u16,
    transport_port: u16,
    book: AddressBook,
    events: mpsc::UnboundedSender<Event>,
) -> std::io::Result<()> {
    let socket = Arc::new(make_multicast_socket(discovery_port).await?);

    let announce_frame = encode_frame(&LanMessage::Announce {
        protocol_version: LAN_PROTOCOL_VERSION,
        namespace: SERVICE_NAMESPACE.to_string(),
        identity: local.clone(),
        public_key: public_key.clone(),
        listen_port: transport_port,
    })
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let dest: SocketAddr = format!("{}:{}", MULTICAST_GROUP, discovery_port)
        .parse()
        .map_err(|e: std::net::AddrParseError| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        })?;

    let send_socket = socket.clone();
    let announce_task = tokio::spawn(async move {
        loop {
            let _ = send_socket.send_to(&announce_frame, dest).await;
            tokio::time::sleep(ANNOUNCE_INTERVAL).await;
        }
    });
    let recv_task = tokio::spawn(recv_loop(
        socket,
        local,
        public_key,
        transport_port,
        book,
        events,
    ));

    let _ = tokio::try_join!(announce_task, recv_task);
    Ok(())
}

async fn make_multicast_socket(discovery_port: u16) -> std::io::Result<UdpSocket> {
    let std_sock = std::net::UdpSocket::bind(("0.0.0.0", discovery_port))?;
    let multicast: std::net::Ipv4Addr =
        MULTICAST_GROUP
            .parse()
            .map_err(|e: std::net::AddrParseError| {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
            })?;
    std_sock.join_multicast_v4(&multicast, &"0.0.0.0".parse().unwrap())?;
    std_sock.set_multicast_ttl_v4(1)?;
    std_sock.set_nonblocking(true)?;
    UdpSocket::from_std(std_sock)
}

async fn recv_loop(
    socket: Arc<UdpSocket>,
    local: PeerIdentity,
    public_key: PublicKey,
    transport_port: u16,
    book: AddressBook,
    events: mpsc::UnboundedSender<Event>,
) -> std::io::Result<()> {
    let reply_frame = encode_frame(&LanMessage::AnnounceReply {
        protocol_version: LAN_PROTOCOL_VERSION,
        namespace: SERVICE_NAMESPACE.to_string(),
        identity: local.clone(),
        public_key,
        listen_port: transport_port,
    })
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut buf = vec![0u8; 65536];
    loop {
        let (n, from) = socket.recv_from(&mut buf).await?;
        let Ok((msg, _)) = decode_frame(&buf[..n]) else {
            continue;
        };
        let (reply, version, namespace, identity, peer_key, listen_port) = match msg {
            LanMessage::Announce {
                protocol_version,
                namespace,
                identity,
                public_key,
                listen_port,
            } => (true, protocol_version, namespace, identity, public_key, listen_port),
            LanMessage::AnnounceReply {
                protocol_version,
                namespace,
                identity,
                public_key,
                listen_port,
            } => (false, protocol_version, namespace, identity, public_key, listen_port),
        };
        if version != LAN_PROTOCOL_VERSION || namespace != SERVICE_NAMESPACE {
            continue;
        }
        if identity.handle == local.handle {
            continue;
        }
        let addr = SocketAddr::new(from.ip(), listen_port);
        let is_new = {
            let mut b = book.lock().await;
            let is_new = !b.contains_key(&identity.handle);
            b.insert(
                identity.handle,
                DiscoveredPeer {
                    identity: identity.clone(),
                    public_key: peer_key,
                    addr,
                },
            );
            is_new
        };
        if is_new {
            debug!(peer = %identity.display_name, %addr, "discovered peer");
            let _ = events.send(Event::Transport(TransportEvent::PeerDiscovered(identity)));
        }
        if reply {
            let _ = socket.send_to(&reply_frame, from).await;
        }
    }
}
