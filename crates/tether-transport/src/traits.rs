//! Transport capability traits for Tether.
//!
//! A model consumes its channel through exactly four capabilities: a
//! connect notification, a fire-and-forget named send, a named-message
//! subscription, and (hub side) enumeration of the currently connected
//! peers. These traits define that surface; everything else about the
//! underlying transport (handshakes, reconnection, heartbeats, framing)
//! stays behind the implementation.

use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Opaque payload argument list carried by a named message.
pub type Args = Vec<Value>;

/// A remote-supplied reply callback, delivered alongside a message.
pub type ReplyFn = Arc<dyn Fn(Args) + Send + Sync>;

/// Subscription callback for inbound named messages.
///
/// By convention the transport may hand over a reply callback supplied by
/// the remote sender; when present it replaces any synthesized reply.
pub type MessageFn = Box<dyn Fn(Args, Option<ReplyFn>) + Send + Sync>;

/// Callback fired once per newly established peer (hub side).
pub type ConnectFn = Box<dyn Fn(Arc<dyn Peer>) + Send + Sync>;

/// Callback fired once when a leaf channel is established.
pub type EstablishedFn = Box<dyn FnOnce() + Send>;

/// Process-wide counter backing [`PeerId::generate`].
static PEER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a peer connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub String);

impl PeerId {
    /// Create a peer ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique peer ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = PEER_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("peer_{n:x}"))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Leaf channel has not been established yet.
    #[error("Channel not yet connected")]
    NotConnected,

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] tether_protocol::ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// One established connection, as seen from either side.
///
/// Sends are fire-and-forget: they never await an acknowledgement and
/// report only local failures.
pub trait Peer: Send + Sync {
    /// The connection's unique identifier.
    fn id(&self) -> &PeerId;

    /// Send a named message to the remote side.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be handed to the transport.
    fn send(&self, event: &str, args: Args) -> Result<(), TransportError>;

    /// Subscribe to inbound messages carrying the given wire event name.
    fn on_message(&self, event: &str, callback: MessageFn);

    /// Whether the connection is still open.
    fn is_open(&self) -> bool {
        true
    }
}

/// The multi-peer side of a channel.
pub trait Hub: Send + Sync {
    /// Register a callback fired once per newly established peer.
    fn on_connect(&self, callback: ConnectFn);

    /// Snapshot of the currently connected peers.
    fn peers(&self) -> Vec<Arc<dyn Peer>>;
}

/// The single-peer side of a channel, established asynchronously.
pub trait Leaf: Peer {
    /// Register a callback fired once when the channel is established.
    ///
    /// If the channel is already established the callback fires
    /// immediately.
    fn on_connect(&self, callback: EstablishedFn);

    /// Whether the channel has been established.
    fn is_connected(&self) -> bool;

    /// View of this channel as a plain peer handle.
    fn as_peer(self: Arc<Self>) -> Arc<dyn Peer>;
}
