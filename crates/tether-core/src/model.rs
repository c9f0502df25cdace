//! The model: a namespaced event surface over one channel.
//!
//! A [`Model`] wraps a channel in either hub mode (many peers, tracked by
//! the transport) or leaf mode (one peer, established asynchronously).
//! Handlers registered against the model are bound to every connection the
//! channel currently has and to every connection that arrives later; the
//! application never manages per-connection lifecycle itself.
//!
//! Fan-out has exactly two entry points, disjoint by construction:
//! [`Model::register`] applies the new handler across the connections that
//! already exist, and the transport's connect notification applies the
//! whole registry to the one new connection.

use crate::queue::PendingQueue;
use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tether_protocol::name::{validate_name, wire_name};
use tether_transport::{Args, Hub, Leaf, Peer, ReplyFn, TransportError};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// The connection-established pseudo-event.
///
/// In hub mode there is no wire message for it: handlers fire locally,
/// once per peer, at connection time. In leaf mode it is an ordinary wire
/// event: the hub's greeting arrives on `<model>:connect`.
pub const CONNECT_EVENT: &str = "connect";

/// Lock a mutex, tolerating poisoning from a panicked handler.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Model errors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Invalid model name.
    #[error("Invalid model name: {0}")]
    InvalidModelName(&'static str),

    /// Invalid event name.
    #[error("Invalid event name: {0}")]
    InvalidEventName(&'static str),

    /// Transport failure, passed through unchanged.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Operating mode, decided once at construction from the channel variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Multi-peer side: an evolving set of connections.
    Hub,
    /// Single-peer side: one connection, established asynchronously.
    Leaf,
}

/// Scope of the re-send performed after handlers run for an inbound
/// message (hub mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EchoPolicy {
    /// Re-send to the whole current peer set, originator included.
    #[default]
    Broadcast,
    /// Re-send only to the connection that delivered the message.
    Sender,
}

/// The channel a model is constructed over; the variant fixes the mode.
#[derive(Clone)]
pub enum Channel {
    /// Multi-peer side of the transport.
    Hub(Arc<dyn Hub>),
    /// Single-peer side of the transport.
    Leaf(Arc<dyn Leaf>),
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Hub(_) => write!(f, "Channel::Hub"),
            Channel::Leaf(_) => write!(f, "Channel::Leaf"),
        }
    }
}

/// A registered event handler.
///
/// Handlers always receive the reply capability, and the message payload
/// for everything except the hub-side [`CONNECT_EVENT`] (which has none).
pub type Handler = Arc<dyn Fn(&Reply, &[Value]) + Send + Sync>;

/// Capability to answer the message currently being handled.
///
/// Sends exactly one message per call, on the handler's wire event name,
/// to the connection that delivered the message. When the transport hands
/// over a remote-supplied reply callback it is used as-is; otherwise the
/// reply is synthesized from the origin connection's send capability.
pub struct Reply {
    inner: ReplyInner,
}

enum ReplyInner {
    Supplied(ReplyFn),
    Wire { peer: Arc<dyn Peer>, event: String },
}

impl Reply {
    fn supplied(callback: ReplyFn) -> Self {
        Self {
            inner: ReplyInner::Supplied(callback),
        }
    }

    fn wire(peer: Arc<dyn Peer>, event: String) -> Self {
        Self {
            inner: ReplyInner::Wire { peer, event },
        }
    }

    /// Send a response to the originating connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the send.
    pub fn send(&self, args: Args) -> Result<(), TransportError> {
        match &self.inner {
            ReplyInner::Supplied(callback) => {
                callback(args);
                Ok(())
            }
            ReplyInner::Wire { peer, event } => peer.send(event, args),
        }
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            ReplyInner::Supplied(_) => write!(f, "Reply::Supplied"),
            ReplyInner::Wire { event, .. } => write!(f, "Reply::Wire({event})"),
        }
    }
}

/// Leaf-mode connection state: the established peer, if any, and the
/// pre-connection send buffer. Unused (and permanently empty) in hub mode.
#[derive(Default)]
struct LeafLink {
    peer: Option<Arc<dyn Peer>>,
    pending: PendingQueue,
}

/// A namespaced model over one channel.
///
/// ```rust
/// use std::sync::Arc;
/// use tether_core::Model;
/// use tether_transport::{MemoryHub, MemoryLeaf};
///
/// let hub = MemoryHub::new();
/// let posts = Model::hub("post", Arc::new(hub.clone())).unwrap();
///
/// posts
///     .register("connect", |reply, _args| {
///         let _ = reply.send(vec![serde_json::json!("welcome")]);
///     })
///     .unwrap();
///
/// let leaf = MemoryLeaf::new();
/// leaf.establish(&hub);
/// ```
pub struct Model {
    name: String,
    channel: Channel,
    echo: EchoPolicy,
    registry: DashMap<String, Vec<Handler>>,
    link: Mutex<LeafLink>,
    collection: Mutex<Vec<Value>>,
    weak: Weak<Model>,
}

impl Model {
    /// Create a hub-mode model.
    ///
    /// # Errors
    ///
    /// Returns an error if the model name is invalid.
    pub fn hub(name: impl Into<String>, hub: Arc<dyn Hub>) -> Result<Arc<Self>, ModelError> {
        Self::new(name, Channel::Hub(hub))
    }

    /// Create a leaf-mode model.
    ///
    /// # Errors
    ///
    /// Returns an error if the model name is invalid.
    pub fn leaf(name: impl Into<String>, leaf: Arc<dyn Leaf>) -> Result<Arc<Self>, ModelError> {
        Self::new(name, Channel::Leaf(leaf))
    }

    /// Create a model over the given channel with the default echo policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the model name is invalid.
    pub fn new(name: impl Into<String>, channel: Channel) -> Result<Arc<Self>, ModelError> {
        Self::with_echo(name, channel, EchoPolicy::default())
    }

    /// Create a model with an explicit echo policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the model name is invalid.
    pub fn with_echo(
        name: impl Into<String>,
        channel: Channel,
        echo: EchoPolicy,
    ) -> Result<Arc<Self>, ModelError> {
        let name = name.into();
        validate_name(&name).map_err(ModelError::InvalidModelName)?;

        let model = Arc::new_cyclic(|weak| Self {
            name,
            channel: channel.clone(),
            echo,
            registry: DashMap::new(),
            link: Mutex::new(LeafLink::default()),
            collection: Mutex::new(Vec::new()),
            weak: weak.clone(),
        });

        match &model.channel {
            Channel::Hub(hub) => {
                let weak = model.weak.clone();
                hub.on_connect(Box::new(move |peer| {
                    if let Some(model) = weak.upgrade() {
                        model.adopt_peer(peer);
                    }
                }));
            }
            Channel::Leaf(leaf) => {
                let weak = model.weak.clone();
                leaf.on_connect(Box::new(move || {
                    if let Some(model) = weak.upgrade() {
                        model.establish();
                    }
                }));
            }
        }

        Ok(model)
    }

    /// Model name; namespaces every wire event.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Operating mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        match self.channel {
            Channel::Hub(_) => Mode::Hub,
            Channel::Leaf(_) => Mode::Leaf,
        }
    }

    /// The model collection: empty at construction, free for application
    /// use, never touched by the model itself.
    pub fn collection(&self) -> MutexGuard<'_, Vec<Value>> {
        lock(&self.collection)
    }

    /// Register a handler for `event`.
    ///
    /// The handler is appended to the event's invocation list and applied
    /// to every connection the channel currently has; connections arriving
    /// later pick up the whole registry at connect time. There is no
    /// unregister.
    ///
    /// # Errors
    ///
    /// Returns an error if the event name is invalid.
    pub fn register<F>(&self, event: &str, handler: F) -> Result<&Self, ModelError>
    where
        F: Fn(&Reply, &[Value]) + Send + Sync + 'static,
    {
        validate_name(event).map_err(ModelError::InvalidEventName)?;

        let handler: Handler = Arc::new(handler);
        let is_first = {
            let mut entry = self.registry.entry(event.to_string()).or_default();
            entry.push(handler.clone());
            entry.len() == 1
        };
        debug!(model = %self.name, event, "handler registered");

        // Fan-out over the connections as they stand right now. The
        // connect notification covers everything that arrives later.
        match (&self.channel, event) {
            (Channel::Hub(hub), CONNECT_EVENT) => {
                for peer in hub.peers() {
                    self.greet(&peer, std::slice::from_ref(&handler));
                }
            }
            (Channel::Hub(hub), _) if is_first => {
                for peer in hub.peers() {
                    self.bind(peer, event);
                }
            }
            (Channel::Leaf(_), _) if is_first => {
                let established = lock(&self.link).peer.clone();
                if let Some(peer) = established {
                    self.bind(peer, event);
                }
            }
            _ => {}
        }

        Ok(self)
    }

    /// Emit `event` with the given payload.
    ///
    /// Hub mode broadcasts to every currently connected peer. Leaf mode
    /// sends directly once the channel is established and buffers into the
    /// pending queue before that. Never blocks, never awaits a response.
    ///
    /// # Errors
    ///
    /// Returns an error if the event name is invalid or the transport
    /// rejects a send.
    pub fn emit(&self, event: &str, args: Args) -> Result<&Self, ModelError> {
        validate_name(event).map_err(ModelError::InvalidEventName)?;
        let wire = wire_name(&self.name, event);

        match &self.channel {
            Channel::Hub(hub) => {
                for peer in hub.peers() {
                    peer.send(&wire, args.clone())?;
                }
            }
            Channel::Leaf(_) => {
                let mut link = lock(&self.link);
                if let Some(peer) = link.peer.clone() {
                    drop(link);
                    peer.send(&wire, args)?;
                } else {
                    trace!(model = %self.name, event, "channel not live, queueing emit");
                    link.pending.push(event.to_string(), args);
                }
            }
        }

        Ok(self)
    }

    /// Hub side: a new peer arrived; apply the entire registry to it.
    fn adopt_peer(&self, peer: Arc<dyn Peer>) {
        debug!(model = %self.name, peer = %peer.id(), "peer connected");
        let snapshot: Vec<(String, Vec<Handler>)> = self
            .registry
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (event, handlers) in snapshot {
            if event == CONNECT_EVENT {
                self.greet(&peer, &handlers);
            } else {
                self.bind(peer.clone(), &event);
            }
        }
    }

    /// Invoke connect handlers for one peer: synchronous, local, with a
    /// reply aimed at that peer on `<model>:connect` and no payload.
    fn greet(&self, peer: &Arc<dyn Peer>, handlers: &[Handler]) {
        let wire = wire_name(&self.name, CONNECT_EVENT);
        for handler in handlers {
            let reply = Reply::wire(peer.clone(), wire.clone());
            handler(&reply, &[]);
        }
    }

    /// Subscribe the model to `event` on one connection. Inbound messages
    /// dispatch to the registry's current handler list, so handlers added
    /// after binding still fire, in registration order.
    fn bind(&self, peer: Arc<dyn Peer>, event: &str) {
        let wire = wire_name(&self.name, event);
        trace!(model = %self.name, event, peer = %peer.id(), "binding event");

        let weak = self.weak.clone();
        let event = event.to_string();
        let origin = peer.clone();
        peer.on_message(
            &wire,
            Box::new(move |args, supplied| {
                if let Some(model) = weak.upgrade() {
                    model.deliver(&event, &origin, args, supplied);
                }
            }),
        );
    }

    /// Deliver one inbound message: every handler in registration order,
    /// then the hub-side echo.
    fn deliver(&self, event: &str, origin: &Arc<dyn Peer>, args: Args, supplied: Option<ReplyFn>) {
        let handlers: Vec<Handler> = self
            .registry
            .get(event)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        let wire = wire_name(&self.name, event);
        trace!(model = %self.name, event, handlers = handlers.len(), "inbound message");

        let reply = match supplied {
            Some(callback) => Reply::supplied(callback),
            None => Reply::wire(origin.clone(), wire.clone()),
        };
        for handler in &handlers {
            handler(&reply, &args);
        }

        if let Channel::Hub(hub) = &self.channel {
            self.echo_out(hub, origin, &wire, args);
        }
    }

    /// Re-send an inbound message after its handlers ran, per policy.
    fn echo_out(&self, hub: &Arc<dyn Hub>, origin: &Arc<dyn Peer>, wire: &str, args: Args) {
        match self.echo {
            EchoPolicy::Sender => {
                if let Err(e) = origin.send(wire, args) {
                    warn!(model = %self.name, peer = %origin.id(), error = %e, "echo failed");
                }
            }
            EchoPolicy::Broadcast => {
                for peer in hub.peers() {
                    if let Err(e) = peer.send(wire, args.clone()) {
                        warn!(model = %self.name, peer = %peer.id(), error = %e, "rebroadcast failed");
                    }
                }
            }
        }
    }

    /// Leaf side: the channel is live. Bind the registry, adopt the
    /// connection, and flush the pending queue exactly once.
    fn establish(&self) {
        let Channel::Leaf(leaf) = &self.channel else {
            return;
        };
        let peer: Arc<dyn Peer> = leaf.clone().as_peer();
        debug!(model = %self.name, "channel established");

        let events: Vec<String> = self.registry.iter().map(|e| e.key().clone()).collect();
        for event in &events {
            self.bind(peer.clone(), event);
        }

        let drained = {
            let mut link = lock(&self.link);
            link.peer = Some(peer.clone());
            link.pending.drain()
        };
        if !drained.is_empty() {
            debug!(model = %self.name, queued = drained.len(), "flushing queued emits");
        }
        for (event, args) in drained {
            let wire = wire_name(&self.name, &event);
            if let Err(e) = peer.send(&wire, args) {
                warn!(model = %self.name, event = %event, error = %e, "failed to flush queued emit");
            }
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("mode", &self.mode())
            .field("events", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// A channel bound once, minting models by name.
///
/// ```rust
/// use std::sync::Arc;
/// use tether_core::ModelFactory;
/// use tether_transport::MemoryHub;
///
/// let factory = ModelFactory::hub(Arc::new(MemoryHub::new()));
/// let posts = factory.model("post").unwrap();
/// let users = factory.model("user").unwrap();
/// ```
pub struct ModelFactory {
    channel: Channel,
    echo: EchoPolicy,
}

impl ModelFactory {
    /// Bind a channel for later model construction.
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            echo: EchoPolicy::default(),
        }
    }

    /// Bind a hub channel.
    #[must_use]
    pub fn hub(hub: Arc<dyn Hub>) -> Self {
        Self::new(Channel::Hub(hub))
    }

    /// Bind a leaf channel.
    #[must_use]
    pub fn leaf(leaf: Arc<dyn Leaf>) -> Self {
        Self::new(Channel::Leaf(leaf))
    }

    /// Set the echo policy for models minted by this factory.
    #[must_use]
    pub fn with_echo(mut self, echo: EchoPolicy) -> Self {
        self.echo = echo;
        self
    }

    /// Create a model named `name` over the bound channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the model name is invalid.
    pub fn model(&self, name: &str) -> Result<Arc<Model>, ModelError> {
        Model::with_echo(name, self.channel.clone(), self.echo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_transport::{MemoryHub, MemoryLeaf, Peer};

    fn hub_model(name: &str, hub: &MemoryHub) -> Arc<Model> {
        Model::hub(name, Arc::new(hub.clone())).unwrap()
    }

    fn leaf_model(name: &str, leaf: &MemoryLeaf) -> Arc<Model> {
        Model::leaf(name, Arc::new(leaf.clone())).unwrap()
    }

    /// Handler that records the first payload argument of each invocation.
    fn capture() -> (Arc<Mutex<Vec<Value>>>, impl Fn(&Reply, &[Value])) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler = move |_reply: &Reply, args: &[Value]| {
            sink.lock()
                .unwrap()
                .push(args.first().cloned().unwrap_or(Value::Null));
        };
        (seen, handler)
    }

    #[test]
    fn test_mode_follows_channel_variant() {
        let hub = MemoryHub::new();
        let model = hub_model("post", &hub);
        assert_eq!(model.mode(), Mode::Hub);
        assert_eq!(model.name(), "post");

        let leaf = MemoryLeaf::new();
        let model = leaf_model("post", &leaf);
        assert_eq!(model.mode(), Mode::Leaf);
    }

    #[test]
    fn test_invalid_names_rejected() {
        let hub = MemoryHub::new();
        assert!(Model::hub("po:st", Arc::new(hub.clone())).is_err());
        assert!(Model::hub("", Arc::new(hub.clone())).is_err());

        let model = hub_model("post", &hub);
        assert!(matches!(
            model.register("cre:ate", |_, _| {}),
            Err(ModelError::InvalidEventName(_))
        ));
        assert!(matches!(
            model.emit("cre:ate", vec![]),
            Err(ModelError::InvalidEventName(_))
        ));
    }

    #[test]
    fn test_connect_fires_once_per_peer() {
        let hub = MemoryHub::new();
        let model = hub_model("post", &hub);

        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        model
            .register(CONNECT_EVENT, move |_, args| {
                assert!(args.is_empty());
                *counter.lock().unwrap() += 1;
            })
            .unwrap();

        let first = MemoryLeaf::new();
        first.establish(&hub);
        assert_eq!(*count.lock().unwrap(), 1);

        let second = MemoryLeaf::new();
        second.establish(&hub);
        assert_eq!(*count.lock().unwrap(), 2);

        // Ordinary traffic must not re-fire the connect handlers.
        first.send("post:create", vec![json!(1)]).unwrap();
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_connect_handler_registered_late_covers_existing_peers() {
        let hub = MemoryHub::new();
        let model = hub_model("post", &hub);

        let leaf = MemoryLeaf::new();
        leaf.establish(&hub);

        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        model
            .register(CONNECT_EVENT, move |_, _| *counter.lock().unwrap() += 1)
            .unwrap();

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_handler_registered_before_connection() {
        let hub = MemoryHub::new();
        let model = hub_model("post", &hub);

        let (seen, handler) = capture();
        model.register("create", handler).unwrap();

        let leaf = MemoryLeaf::new();
        leaf.establish(&hub);
        let leaf = leaf_model("post", &leaf);
        leaf.emit("create", vec![json!({"id": 7})]).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!({"id": 7})]);
    }

    #[test]
    fn test_message_sent_before_hub_registers() {
        // Model "post", event "create": the leaf emits before the channel
        // is live and before the hub has any handler; the hub registers
        // later and the handler fires once with the exact payload.
        let hub = MemoryHub::new();
        let hub_side = hub_model("post", &hub);

        let channel = MemoryLeaf::new();
        let leaf_side = leaf_model("post", &channel);
        let payload = json!({"id": 1234, "content": "post content"});
        leaf_side.emit("create", vec![payload.clone()]).unwrap();

        channel.establish(&hub);

        let (seen, handler) = capture();
        hub_side.register("create", handler).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![payload]);
    }

    #[test]
    fn test_model_created_after_peer_connected() {
        let hub = MemoryHub::new();
        let channel = MemoryLeaf::new();
        channel.establish(&hub);

        // Hub model built around an already-populated peer set.
        let model = hub_model("post", &hub);
        let (seen, handler) = capture();
        model.register("create", handler).unwrap();

        leaf_model("post", &channel)
            .emit("create", vec![json!(42)])
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!(42)]);
    }

    #[test]
    fn test_pending_queue_order_and_bypass() {
        let hub = MemoryHub::new();
        let hub_side = hub_model("post", &hub);
        let (seen, handler) = capture();
        hub_side.register("create", handler).unwrap();

        let channel = MemoryLeaf::new();
        let leaf_side = leaf_model("post", &channel);
        leaf_side
            .emit("create", vec![json!(1)])
            .unwrap()
            .emit("create", vec![json!(2)])
            .unwrap()
            .emit("create", vec![json!(3)])
            .unwrap();

        // Nothing crosses the wire before establishment.
        assert!(seen.lock().unwrap().is_empty());

        channel.establish(&hub);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!(1), json!(2), json!(3)],
            "queued emits must arrive in submission order"
        );

        // Established: the queue is bypassed entirely.
        leaf_side.emit("create", vec![json!(4)]).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!(1), json!(2), json!(3), json!(4)]
        );
    }

    #[test]
    fn test_connect_greeting_reaches_leaf() {
        // The hub answers each new peer with initial state; the leaf
        // observes it as a message on "post:connect".
        let hub = MemoryHub::new();
        let hub_side = hub_model("post", &hub);
        hub_side
            .register(CONNECT_EVENT, |reply, _| {
                reply.send(vec![json!(["p1", "p2", "p3"])]).unwrap();
            })
            .unwrap();

        let channel = MemoryLeaf::new();
        let leaf_side = leaf_model("post", &channel);
        let (seen, handler) = capture();
        leaf_side.register(CONNECT_EVENT, handler).unwrap();

        channel.establish(&hub);

        assert_eq!(*seen.lock().unwrap(), vec![json!(["p1", "p2", "p3"])]);
    }

    #[test]
    fn test_leaf_connect_handler_registered_after_establish() {
        let hub = MemoryHub::new();
        let hub_side = hub_model("post", &hub);
        hub_side
            .register(CONNECT_EVENT, |reply, _| {
                reply.send(vec![json!("welcome")]).unwrap();
            })
            .unwrap();

        let channel = MemoryLeaf::new();
        channel.establish(&hub);

        // The greeting was already sent; a late subscription still sees it
        // exactly once.
        let leaf_side = leaf_model("post", &channel);
        let (seen, handler) = capture();
        leaf_side.register(CONNECT_EVENT, handler).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!("welcome")]);
    }

    #[test]
    fn test_reply_targets_originating_peer() {
        let hub = MemoryHub::new();
        let hub_side = hub_model("post", &hub);
        hub_side
            .register("ping", |reply, args| {
                assert_eq!(args[0], json!("ping"));
                reply.send(vec![json!("pong")]).unwrap();
            })
            .unwrap();

        let first_channel = MemoryLeaf::new();
        let first = leaf_model("post", &first_channel);
        let (first_seen, handler) = capture();
        first.register("ping", handler).unwrap();
        first_channel.establish(&hub);

        let second_channel = MemoryLeaf::new();
        let second = leaf_model("post", &second_channel);
        let (second_seen, handler) = capture();
        second.register("ping", handler).unwrap();
        second_channel.establish(&hub);

        first.emit("ping", vec![json!("ping")]).unwrap();

        let first_seen = first_seen.lock().unwrap().clone();
        let second_seen = second_seen.lock().unwrap().clone();

        // The reply lands only on the originator; the broadcast echo of
        // the ping itself reaches both subscribers.
        assert!(first_seen.contains(&json!("pong")));
        assert!(!second_seen.contains(&json!("pong")));
        assert!(second_seen.contains(&json!("ping")));
    }

    #[test]
    fn test_echo_policy_broadcast() {
        let hub = MemoryHub::new();
        let hub_side = hub_model("post", &hub);
        hub_side.register("note", |_, _| {}).unwrap();

        let first_channel = MemoryLeaf::new();
        let first = leaf_model("post", &first_channel);
        let (first_seen, handler) = capture();
        first.register("note", handler).unwrap();
        first_channel.establish(&hub);

        let second_channel = MemoryLeaf::new();
        let second = leaf_model("post", &second_channel);
        let (second_seen, handler) = capture();
        second.register("note", handler).unwrap();
        second_channel.establish(&hub);

        first.emit("note", vec![json!("hello")]).unwrap();

        assert_eq!(*first_seen.lock().unwrap(), vec![json!("hello")]);
        assert_eq!(*second_seen.lock().unwrap(), vec![json!("hello")]);
    }

    #[test]
    fn test_echo_policy_sender() {
        let hub = MemoryHub::new();
        let hub_side = Model::with_echo(
            "post",
            Channel::Hub(Arc::new(hub.clone())),
            EchoPolicy::Sender,
        )
        .unwrap();
        hub_side.register("note", |_, _| {}).unwrap();

        let first_channel = MemoryLeaf::new();
        let first = leaf_model("post", &first_channel);
        let (first_seen, handler) = capture();
        first.register("note", handler).unwrap();
        first_channel.establish(&hub);

        let second_channel = MemoryLeaf::new();
        let second = leaf_model("post", &second_channel);
        let (second_seen, handler) = capture();
        second.register("note", handler).unwrap();
        second_channel.establish(&hub);

        first.emit("note", vec![json!("hello")]).unwrap();

        assert_eq!(*first_seen.lock().unwrap(), vec![json!("hello")]);
        assert!(second_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handlers_fire_in_registration_order() {
        let hub = MemoryHub::new();
        let model = hub_model("post", &hub);

        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        let second = order.clone();
        model
            .register("create", move |_, _| first.lock().unwrap().push(1))
            .unwrap()
            .register("create", move |_, _| second.lock().unwrap().push(2))
            .unwrap();

        let channel = MemoryLeaf::new();
        channel.establish(&hub);
        leaf_model("post", &channel)
            .emit("create", vec![json!(1)])
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_no_crosstalk_between_models_or_events() {
        let hub = MemoryHub::new();
        let factory = ModelFactory::hub(Arc::new(hub.clone()));
        let posts = factory.model("post").unwrap();
        let users = factory.model("user").unwrap();

        let (post_seen, handler) = capture();
        posts.register("create", handler).unwrap();
        let (user_seen, handler) = capture();
        users.register("create", handler).unwrap();
        let (delete_seen, handler) = capture();
        posts.register("delete", handler).unwrap();

        let channel = MemoryLeaf::new();
        channel.establish(&hub);
        leaf_model("post", &channel)
            .emit("create", vec![json!(1)])
            .unwrap();

        assert_eq!(*post_seen.lock().unwrap(), vec![json!(1)]);
        assert!(user_seen.lock().unwrap().is_empty());
        assert!(delete_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_two_peers_connect_independently() {
        let hub = MemoryHub::new();
        let model = hub_model("post", &hub);

        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        model
            .register(CONNECT_EVENT, move |_, _| *counter.lock().unwrap() += 1)
            .unwrap();

        let (seen, handler) = capture();
        model.register("create", handler).unwrap();

        let first_channel = MemoryLeaf::new();
        first_channel.establish(&hub);
        let second_channel = MemoryLeaf::new();
        second_channel.establish(&hub);
        assert_eq!(*count.lock().unwrap(), 2);

        leaf_model("post", &first_channel)
            .emit("create", vec![json!("from-first")])
            .unwrap();
        leaf_model("post", &second_channel)
            .emit("create", vec![json!("from-second")])
            .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!("from-first"), json!("from-second")]
        );
    }

    #[test]
    fn test_hub_emit_broadcasts_to_all_peers() {
        let hub = MemoryHub::new();
        let model = hub_model("post", &hub);

        let first_channel = MemoryLeaf::new();
        let first = leaf_model("post", &first_channel);
        let (first_seen, handler) = capture();
        first.register("refresh", handler).unwrap();
        first_channel.establish(&hub);

        let second_channel = MemoryLeaf::new();
        let second = leaf_model("post", &second_channel);
        let (second_seen, handler) = capture();
        second.register("refresh", handler).unwrap();
        second_channel.establish(&hub);

        model.emit("refresh", vec![json!(true)]).unwrap();

        assert_eq!(*first_seen.lock().unwrap(), vec![json!(true)]);
        assert_eq!(*second_seen.lock().unwrap(), vec![json!(true)]);
    }

    #[test]
    fn test_collection_starts_empty_and_is_free() {
        let hub = MemoryHub::new();
        let model = hub_model("post", &hub);
        assert!(model.collection().is_empty());

        model.collection().push(json!({"id": 1}));
        assert_eq!(model.collection().len(), 1);
    }

    #[test]
    fn test_factory_partial_application() {
        let leaf = MemoryLeaf::new();
        let factory = ModelFactory::leaf(Arc::new(leaf)).with_echo(EchoPolicy::Sender);

        let posts = factory.model("post").unwrap();
        let users = factory.model("user").unwrap();
        assert_eq!(posts.mode(), Mode::Leaf);
        assert_eq!(users.name(), "user");
        assert!(factory.model("bad:name").is_err());
    }
}
