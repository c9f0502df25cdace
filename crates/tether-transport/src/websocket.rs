//! WebSocket transport implementation.
//!
//! Envelopes travel as binary WebSocket messages, length-prefixed and
//! MessagePack-encoded by `tether-protocol`. The hub accepts peers on a
//! TCP listener; the leaf dials in the background and fires its connect
//! notification once the handshake completes.

use crate::dispatch::{lock, Dispatcher};
use crate::traits::{
    Args, ConnectFn, EstablishedFn, Hub, Leaf, MessageFn, Peer, PeerId, TransportError,
};
use bytes::BytesMut;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_protocol::{codec, Envelope};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, connect_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};

/// Delay between dial attempts on the leaf side.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

type ConnectSubscriber = Arc<dyn Fn(Arc<dyn Peer>) + Send + Sync>;

/// Hub side: accepts WebSocket peers on a TCP listener.
pub struct WebSocketHub {
    inner: Arc<WsHubInner>,
    local_addr: SocketAddr,
}

struct WsHubInner {
    peers: DashMap<PeerId, Arc<WsPeer>>,
    connect_subs: Mutex<Vec<ConnectSubscriber>>,
}

impl WebSocketHub {
    /// Bind the listener and start accepting peers.
    ///
    /// # Errors
    ///
    /// Returns an error if binding to the address fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::Io)?;
        let local_addr = listener.local_addr().map_err(TransportError::Io)?;

        info!("WebSocket hub listening on {}", local_addr);

        let inner = Arc::new(WsHubInner {
            peers: DashMap::new(),
            connect_subs: Mutex::new(Vec::new()),
        });

        let accept_inner = inner.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        let inner = accept_inner.clone();
                        tokio::spawn(async move {
                            accept_peer(stream, remote, inner).await;
                        });
                    }
                    Err(e) => {
                        error!("Accept failed: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self { inner, local_addr })
    }

    /// The address the listener is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Hub for WebSocketHub {
    fn on_connect(&self, callback: ConnectFn) {
        lock(&self.inner.connect_subs).push(Arc::from(callback));
    }

    fn peers(&self) -> Vec<Arc<dyn Peer>> {
        self.inner
            .peers
            .iter()
            .map(|entry| entry.value().clone() as Arc<dyn Peer>)
            .collect()
    }
}

async fn accept_peer(stream: TcpStream, remote: SocketAddr, inner: Arc<WsHubInner>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", remote, e);
            return;
        }
    };

    debug!("WebSocket handshake completed with {}", remote);

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let peer = Arc::new(WsPeer {
        id: PeerId::generate(),
        inbound: Dispatcher::new(),
        outbound: outbound_tx,
        open: AtomicBool::new(true),
        remote,
    });

    inner.peers.insert(peer.id.clone(), peer.clone());

    let subs = lock(&inner.connect_subs).clone();
    for subscriber in &subs {
        subscriber(peer.clone() as Arc<dyn Peer>);
    }

    run_pumps(ws, outbound_rx, &peer.inbound).await;

    peer.open.store(false, Ordering::SeqCst);
    inner.peers.remove(&peer.id);
    debug!(peer = %peer.id, "peer disconnected");
}

/// Pump the socket until it closes: outbound messages from the queue,
/// inbound bytes reassembled into envelopes and dispatched.
async fn run_pumps<S>(
    ws: WebSocketStream<S>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    inbound: &Arc<Dispatcher>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            outgoing = outbound.recv() => {
                match outgoing {
                    Some(message) => {
                        if let Err(e) = sink.send(message).await {
                            warn!("Send failed: {}", e);
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Binary(data))) => {
                        read_buffer.extend_from_slice(&data);
                        loop {
                            match codec::decode_from(&mut read_buffer) {
                                Ok(Some(envelope)) => {
                                    inbound.dispatch(&envelope.event, envelope.args, None);
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!("Protocol error, dropping buffer: {}", e);
                                    read_buffer.clear();
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sink.send(Message::Pong(data)).await {
                            warn!("Failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Text(_))) => {
                        warn!("Ignoring text frame: envelopes are binary");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        }
    }
}

/// One connected WebSocket peer, as seen from the hub.
struct WsPeer {
    id: PeerId,
    inbound: Arc<Dispatcher>,
    outbound: mpsc::UnboundedSender<Message>,
    open: AtomicBool,
    remote: SocketAddr,
}

impl Peer for WsPeer {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn send(&self, event: &str, args: Args) -> Result<(), TransportError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let data = codec::encode(&Envelope::new(event, args))?;
        self.outbound
            .send(Message::Binary(data.to_vec()))
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn on_message(&self, event: &str, callback: MessageFn) {
        self.inbound.subscribe(event, callback);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for WsPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsPeer")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .finish_non_exhaustive()
    }
}

/// Leaf side: dials a hub in the background.
///
/// The handle is usable immediately; sends fail with
/// [`TransportError::NotConnected`] until the connect notification fires.
#[derive(Clone)]
pub struct WebSocketLeaf {
    inner: Arc<WsLeafInner>,
}

struct WsLeafInner {
    id: PeerId,
    url: String,
    inbound: Arc<Dispatcher>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    connected: AtomicBool,
    connect_subs: Mutex<Vec<EstablishedFn>>,
}

impl WebSocketLeaf {
    /// Start connecting to `url` in the background.
    ///
    /// Dial failures are retried until the handshake succeeds; the connect
    /// notification fires once, on establishment.
    #[must_use]
    pub fn connect(url: impl Into<String>) -> Self {
        let inner = Arc::new(WsLeafInner {
            id: PeerId::generate(),
            url: url.into(),
            inbound: Dispatcher::new(),
            outbound: Mutex::new(None),
            connected: AtomicBool::new(false),
            connect_subs: Mutex::new(Vec::new()),
        });

        let dial = inner.clone();
        tokio::spawn(async move {
            run_leaf(dial).await;
        });

        Self { inner }
    }
}

async fn run_leaf(inner: Arc<WsLeafInner>) {
    let ws = loop {
        match connect_async(inner.url.as_str()).await {
            Ok((ws, _response)) => break ws,
            Err(e) => {
                warn!(url = %inner.url, "Connect failed: {}, retrying", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    };

    info!(url = %inner.url, "WebSocket channel established");

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    *lock(&inner.outbound) = Some(outbound_tx);
    inner.connected.store(true, Ordering::SeqCst);

    let callbacks: Vec<EstablishedFn> = std::mem::take(&mut *lock(&inner.connect_subs));
    for callback in callbacks {
        callback();
    }

    run_pumps(ws, outbound_rx, &inner.inbound).await;

    inner.connected.store(false, Ordering::SeqCst);
    *lock(&inner.outbound) = None;
    debug!(url = %inner.url, "WebSocket channel closed");
}

impl Peer for WebSocketLeaf {
    fn id(&self) -> &PeerId {
        &self.inner.id
    }

    fn send(&self, event: &str, args: Args) -> Result<(), TransportError> {
        let sender = lock(&self.inner.outbound)
            .clone()
            .ok_or(TransportError::NotConnected)?;
        let data = codec::encode(&Envelope::new(event, args))?;
        sender
            .send(Message::Binary(data.to_vec()))
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn on_message(&self, event: &str, callback: MessageFn) {
        self.inner.inbound.subscribe(event, callback);
    }

    fn is_open(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

impl Leaf for WebSocketLeaf {
    fn on_connect(&self, callback: EstablishedFn) {
        if self.inner.connected.load(Ordering::SeqCst) {
            callback();
        } else {
            lock(&self.inner.connect_subs).push(callback);
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn as_peer(self: Arc<Self>) -> Arc<dyn Peer> {
        self
    }
}
