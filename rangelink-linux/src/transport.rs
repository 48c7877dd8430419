//! LAN transport backend: a command-driven TCP dialer/listener with an
//! encrypted, length-prefixed frame channel per peer. `LanTransport` is the
//! synchronous facade handed to the core; `LanDriver` owns the sockets.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rangelink_core::{
    ConnectionState, Event, PeerHandle, PeerIdentity, PeerTransport, TransportError,
    TransportEvent,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::discovery::{self, AddressBook};
use crate::secure::{decrypt_frame, derive_session_key, encrypt_frame, Keypair, PublicKey};
use crate::wire::LAN_PROTOCOL_VERSION;

const HANDSHAKE_SIZE: usize = 1 + 16 + 32; // version + handle + public key
const LEN_SIZE: usize = 4;
const MAX_FRAME_LEN: u32 = 64 * 1024;

/// Commands from the core's event loop to the async driver.
#[derive(Debug)]
pub enum LanCommand {
    Start,
    Invite(PeerHandle, Duration),
    Send(PeerHandle, Vec<u8>),
}

/// `PeerTransport` facade. Methods only enqueue commands; nothing blocks.
pub struct LanTransport {
    commands: mpsc::UnboundedSender<LanCommand>,
}

impl LanTransport {
    pub fn new(commands: mpsc::UnboundedSender<LanCommand>) -> Self {
        Self { commands }
    }

    fn push(&self, command: LanCommand) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::Stopped)
    }
}

impl PeerTransport for LanTransport {
    fn start(&mut self) -> Result<(), TransportError> {
        self.push(LanCommand::Start)
    }

    fn invite(&mut self, peer: &PeerHandle, timeout: Duration) -> Result<(), TransportError> {
        self.push(LanCommand::Invite(*peer, timeout))
    }

    fn send(&mut self, peer: &PeerHandle, payload: &[u8]) -> Result<(), TransportError> {
        self.push(LanCommand::Send(*peer, payload.to_vec()))
    }
}

type PeerSenders = Arc<Mutex<HashMap<PeerHandle, mpsc::UnboundedSender<Vec<u8>>>>>;

/// Async side of the backend: discovery, listener, dialer, per-connection
/// tasks. All state reports go back through the shared event queue.
pub struct LanDriver {
    keypair: Arc<Keypair>,
    local: PeerIdentity,
    discovery_port: u16,
    transport_port: u16,
    book: AddressBook,
    events: mpsc::UnboundedSender<Event>,
    senders: PeerSenders,
}

impl LanDriver {
    pub fn new(
        keypair: Arc<Keypair>,
        local: PeerIdentity,
        discovery_port: u16,
        transport_port: u16,
        book: AddressBook,
        events: mpsc::UnboundedSender<Event>,
    ) -> Self {
        Self {
            keypair,
            local,
            discovery_port,
            transport_port,
            book,
            events,
            senders: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn run(self, mut commands: mpsc::UnboundedReceiver<LanCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                LanCommand::Start => self.start().await,
                LanCommand::Invite(peer, timeout) => self.invite(peer, timeout).await,
                LanCommand::Send(peer, payload) => self.send(peer, payload).await,
            }
        }
    }

    /// Begin advertising (multicast announces) and listening for inbound
    /// connections.
    async fn start(&self) {
        let local = self.local.clone();
        let public_key = self.keypair.public_key().clone();
        let book = self.book.clone();
        let events = self.events.clone();
        let (discovery_port, transport_port) = (self.discovery_port, self.transport_port);
        tokio::spawn(async move {
            if let Err(err) = discovery::run_discovery(
                local,
                public_key,
                discovery_port,
                transport_port,
                book,
                events,
            )
            .await
            {
                warn!(%err, "discovery stopped");
            }
        });

        let listener = match TcpListener::bind(("0.0.0.0", self.transport_port)).await {
            Ok(listener) => listener,
            Err(err) => {
                warn!(%err, "failed to bind transport listener");
                return;
            }
        };
        let keypair = self.keypair.clone();
        let local_handle = self.local.handle;
        let events = self.events.clone();
        let senders = self.senders.clone();
        let book = self.book.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => {
                        let keypair = keypair.clone();
                        let events = events.clone();
                        let senders = senders.clone();
                        let book = book.clone();
                        tokio::spawn(async move {
                            match handshake(stream, local_handle, &keypair, true).await {
                                Ok(connection) => {
                                    run_connection(connection, events, senders, book).await;
                                }
                                Err(err) => debug!(%err, "inbound handshake failed"),
                            }
                        });
                    }
                    Err(err) => {
                        warn!(%err, "accept failed");
                        break;
                    }
                }
            }
        });
    }

    /// Dial an invited peer, bounded by the invitation timeout.
    async fn invite(&self, peer: PeerHandle, timeout: Duration) {
        if self.senders.lock().await.contains_key(&peer) {
            debug!(%peer, "already connected; ignoring invite");
            return;
        }
        let Some(entry) = self.book.lock().await.get(&peer).cloned() else {
            warn!(%peer, "invite for peer with no known address");
            return;
        };
        let keypair = self.keypair.clone();
        let local_handle = self.local.handle;
        let events = self.events.clone();
        let senders = self.senders.clone();
        let book = self.book.clone();
        let _ = events.send(Event::Transport(TransportEvent::ConnectionChanged(
            peer,
            ConnectionState::Connecting,
        )));
        tokio::spawn(async move {
            let dial = async {
                let stream = TcpStream::connect(entry.addr).await?;
                handshake(stream, local_handle, &keypair, false).await
            };
            match tokio::time::timeout(timeout, dial).await {
                Ok(Ok(connection)) => run_connection(connection, events, senders, book).await,
                Ok(Err(err)) => {
                    debug!(%peer, %err, "outbound connection failed");
                    // Forget the address so the next announce rediscovers the
                    // peer and triggers a fresh invite.
                    book.lock().await.remove(&peer);
                    let _ = events.send(Event::Transport(TransportEvent::ConnectionChanged(
                        peer,
                        ConnectionState::NotConnected,
                    )));
                }
                Err(_) => {
                    debug!(%peer, "invitation timed out");
                    book.lock().await.remove(&peer);
                    let _ = events.send(Event::Transport(TransportEvent::ConnectionChanged(
                        peer,
                        ConnectionState::NotConnected,
                    )));
                }
            }
        });
    }

    /// Hand a payload to the connection writer for `peer`, if one is live.
    async fn send(&self, peer: PeerHandle, payload: Vec<u8>) {
        match self.senders.lock().await.get(&peer) {
            Some(tx) => {
                let _ = tx.send(payload);
            }
            None => debug!(%peer, "send for peer with no live connection"),
        }
    }
}

struct Connection {
    peer: PeerHandle,
    stream: TcpStream,
    session_key: [u8; 32],
    /// Direction byte for our outbound nonces; the peer uses the opposite.
    send_direction: u8,
}

/// Exchange `version || handle || public key` and derive the session key.
/// Both sides write first, then read; 49 bytes always fits the socket buffer.
async fn handshake(
    mut stream: TcpStream,
    local: PeerHandle,
    keypair: &Keypair,
    inbound: bool,
) -> std::io::Result<Connection> {
    let mut out = [0u8; HANDSHAKE_SIZE];
    out[0] = LAN_PROTOCOL_VERSION;
    out[1..17].copy_from_slice(local.as_bytes());
    out[17..49].copy_from_slice(keypair.public_key().as_bytes());
    stream.write_all(&out).await?;
    stream.flush().await?;

    let mut buf = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut buf).await?;
    if buf[0] != LAN_PROTOCOL_VERSION {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "unsupported protocol version",
        ));
    }
    let mut handle = [0u8; 16];
    handle.copy_from_slice(&buf[1..17]);
    let mut public = [0u8; 32];
    public.copy_from_slice(&buf[17..49]);

    let session_key = derive_session_key(&keypair.shared_secret(&PublicKey::from_bytes(public)));
    Ok(Connection {
        peer: PeerHandle::from_bytes(handle),
        stream,
        session_key,
        send_direction: if inbound { 1 } else { 0 },
    })
}

/// Drive one established connection until either side closes it. Reports
/// Connected on entry and NotConnected on exit, and forgets the peer's
/// address on exit so the announce cadence can rediscover and reconnect it.
async fn run_connection(
    connection: Connection,
    events: mpsc::UnboundedSender<Event>,
    senders: PeerSenders,
    book: AddressBook,
) {
    let peer = connection.peer;
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    {
        let mut s = senders.lock().await;
        if s.contains_key(&peer) {
            debug!(%peer, "duplicate connection; dropping");
            return;
        }
        s.insert(peer, tx);
    }
    let _ = events.send(Event::Transport(TransportEvent::ConnectionChanged(
        peer,
        ConnectionState::Connected,
    )));

    let (mut read_half, mut write_half) = connection.stream.into_split();
    let key = connection.session_key;
    let send_direction = connection.send_direction;
    let recv_direction = send_direction ^ 1;

    let writer = tokio::spawn(async move {
        let mut counter: u64 = 0;
        while let Some(payload) = rx.recv().await {
            let frame = match encrypt_frame(&key, send_direction, counter, &payload) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%err, "frame encryption failed; closing connection");
                    break;
                }
            };
            counter += 1;
            let len = (frame.len() as u32).to_le_bytes();
            if write_half.write_all(&len).await.is_err() {
                break;
            }
            if write_half.write_all(&frame).await.is_err() {
                break;
            }
        }
    });

    let mut counter: u64 = 0;
    loop {
        let mut len_bytes = [0u8; LEN_SIZE];
        if read_half.read_exact(&mut len_bytes).await.is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_bytes);
        if len > MAX_FRAME_LEN {
            debug!(%peer, "oversized frame; closing connection");
            break;
        }
        let mut frame = vec![0u8; len as usize];
        if read_half.read_exact(&mut frame).await.is_err() {
            break;
        }
        match decrypt_frame(&key, recv_direction, counter, &frame) {
            Ok(plaintext) => {
                counter += 1;
                let _ = events.send(Event::Transport(TransportEvent::DataReceived(
                    peer, plaintext,
                )));
            }
            Err(err) => {
                debug!(%peer, %err, "undecryptable frame; closing connection");
                break;
            }
        }
    }

    writer.abort();
    senders.lock().await.remove(&peer);
    book.lock().await.remove(&peer);
    let _ = events.send(Event::Transport(TransportEvent::ConnectionChanged(
        peer,
        ConnectionState::NotConnected,
    )));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rangelink_core::PeerIdentity;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(TcpStream::connect(addr), async {
            listener.accept().await.unwrap()
        });
        (client.unwrap(), accepted.0)
    }

    #[tokio::test]
    async fn connection_end_evicts_the_address_book_entry() {
        let (client, server) = connected_pair().await;
        let peer = PeerHandle::generate();
        let book: AddressBook = Arc::new(Mutex::new(HashMap::new()));
        book.lock().await.insert(
            peer,
            discovery::DiscoveredPeer {
                identity: PeerIdentity::generate("test"),
                public_key: Keypair::generate().public_key().clone(),
                addr: server.peer_addr().unwrap(),
            },
        );
        let senders: PeerSenders = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();

        let connection = Connection {
            peer,
            stream: client,
            session_key: [0u8; 32],
            send_direction: 0,
        };
        let task = tokio::spawn(run_connection(
            connection,
            events_tx,
            senders.clone(),
            book.clone(),
        ));

        match events_rx.recv().await {
            Some(Event::Transport(TransportEvent::ConnectionChanged(
                p,
                ConnectionState::Connected,
            ))) => assert_eq!(p, peer),
            other => panic!("expected Connected, got {:?}", other),
        }
        assert!(!book.lock().await.is_empty());

        // Transient drop from the far side.
        drop(server);
        match events_rx.recv().await {
            Some(Event::Transport(TransportEvent::ConnectionChanged(
                p,
                ConnectionState::NotConnected,
            ))) => assert_eq!(p, peer),
            other => panic!("expected NotConnected, got {:?}", other),
        }
        task.await.unwrap();

        // Address forgotten: the next announce is new again, so discovery
        // re-emits PeerDiscovered and the core re-invites.
        assert!(book.lock().await.is_empty());
        assert!(senders.lock().await.is_empty());
    }
}
