//! # tether-transport
//!
//! Transport capability layer for Tether.
//!
//! A model talks to its channel through four capabilities (connect
//! notification, named send, named-message subscription, and peer
//! enumeration), defined here as the [`Hub`], [`Leaf`], and [`Peer`]
//! traits. Two implementations are provided:
//!
//! - **memory** - synchronous in-process hub/leaf pairs, always available
//! - **websocket** - tokio + tungstenite over TCP (feature `websocket`)
//!
//! ```rust
//! use tether_transport::{Hub, MemoryHub, MemoryLeaf, Peer};
//!
//! let hub = MemoryHub::new();
//! let leaf = MemoryLeaf::new();
//! leaf.establish(&hub);
//!
//! assert_eq!(hub.peers().len(), 1);
//! ```

mod dispatch;
pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryHub, MemoryLeaf};
pub use traits::{
    Args, ConnectFn, EstablishedFn, Hub, Leaf, MessageFn, Peer, PeerId, ReplyFn, TransportError,
};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketHub, WebSocketLeaf};
