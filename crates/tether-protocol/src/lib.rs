//! # tether-protocol
//!
//! Wire-level definitions for the Tether model pub/sub layer.
//!
//! This crate defines what actually crosses the transport: namespaced wire
//! event names of the form `<model>:<event>`, the [`Envelope`] carrying a
//! name plus an opaque JSON argument list, and a length-prefixed
//! MessagePack codec for stream transports.
//!
//! ## Example
//!
//! ```rust
//! use tether_protocol::{codec, Envelope};
//!
//! let envelope = Envelope::named("post", "create", vec![serde_json::json!({"id": 1})]);
//!
//! let encoded = codec::encode(&envelope).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(envelope, decoded);
//! ```

pub mod codec;
pub mod envelope;
pub mod name;

pub use codec::{decode, encode, ProtocolError};
pub use envelope::Envelope;
pub use name::{split_wire_name, validate_name, wire_name};
