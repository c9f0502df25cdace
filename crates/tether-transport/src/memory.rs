//! In-process transport.
//!
//! A [`MemoryHub`] and any number of [`MemoryLeaf`] channels wired to it
//! form a complete, synchronous, deterministic transport: sends deliver
//! into the remote side's dispatcher on the calling thread. This is the
//! transport the core test suites run on, and it works for single-process
//! wiring where hub and leaves share an address space.
//!
//! Every delivery carries a remote reply callback that sends back to the
//! originating side on the same wire event name.

use crate::dispatch::{lock, Dispatcher};
use crate::traits::{
    Args, ConnectFn, EstablishedFn, Hub, Leaf, MessageFn, Peer, PeerId, ReplyFn, TransportError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

type ConnectSubscriber = Arc<dyn Fn(Arc<dyn Peer>) + Send + Sync>;

/// Deliver a message into `target`, with a reply callback that routes the
/// response back into `source` under the same event name.
fn deliver(target: &Dispatcher, source: &Arc<Dispatcher>, event: &str, args: Args) {
    let back = Arc::downgrade(source);
    let reply_event = event.to_string();
    let reply: ReplyFn = Arc::new(move |reply_args| {
        if let Some(dispatcher) = back.upgrade() {
            dispatcher.dispatch(&reply_event, reply_args, None);
        }
    });
    target.dispatch(event, args, Some(reply));
}

/// Hub side of the in-process channel.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    peers: Mutex<Vec<Arc<MemoryPeer>>>,
    connect_subs: Mutex<Vec<ConnectSubscriber>>,
}

impl MemoryHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hub for MemoryHub {
    fn on_connect(&self, callback: ConnectFn) {
        lock(&self.inner.connect_subs).push(Arc::from(callback));
    }

    fn peers(&self) -> Vec<Arc<dyn Peer>> {
        lock(&self.inner.peers)
            .iter()
            .map(|p| p.clone() as Arc<dyn Peer>)
            .collect()
    }
}

/// The hub's handle for one connected leaf.
struct MemoryPeer {
    id: PeerId,
    /// Where this side's subscriptions live.
    inbound: Arc<Dispatcher>,
    /// The other side's dispatcher; sends deliver there.
    outbound: Weak<Dispatcher>,
}

impl Peer for MemoryPeer {
    fn id(&self) -> &PeerId {
        &self.id
    }

    fn send(&self, event: &str, args: Args) -> Result<(), TransportError> {
        let Some(target) = self.outbound.upgrade() else {
            return Err(TransportError::ConnectionClosed);
        };
        deliver(&target, &self.inbound, event, args);
        Ok(())
    }

    fn on_message(&self, event: &str, callback: MessageFn) {
        self.inbound.subscribe(event, callback);
    }
}

/// Leaf side of the in-process channel.
///
/// Created detached; [`MemoryLeaf::establish`] wires it to a hub and fires
/// the connect notifications on both sides.
#[derive(Clone)]
pub struct MemoryLeaf {
    inner: Arc<LeafInner>,
}

struct LeafInner {
    id: PeerId,
    inbound: Arc<Dispatcher>,
    outbound: Mutex<Weak<Dispatcher>>,
    connected: AtomicBool,
    connect_subs: Mutex<Vec<EstablishedFn>>,
}

impl MemoryLeaf {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LeafInner {
                id: PeerId::generate(),
                inbound: Dispatcher::new(),
                outbound: Mutex::new(Weak::new()),
                connected: AtomicBool::new(false),
                connect_subs: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Establish the channel against `hub`.
    ///
    /// Fires the hub's connect notification first (so the hub can bind its
    /// handlers and greet), then the leaf's own establishment notification.
    /// Establishing twice is a no-op.
    pub fn establish(&self, hub: &MemoryHub) {
        if self.inner.connected.swap(true, Ordering::SeqCst) {
            return;
        }

        let hub_side = Arc::new(MemoryPeer {
            id: PeerId::generate(),
            inbound: Dispatcher::new(),
            outbound: Arc::downgrade(&self.inner.inbound),
        });
        *lock(&self.inner.outbound) = Arc::downgrade(&hub_side.inbound);
        lock(&hub.inner.peers).push(hub_side.clone());
        debug!(peer = %hub_side.id, "leaf channel established");

        let subs = lock(&hub.inner.connect_subs).clone();
        for subscriber in &subs {
            subscriber(hub_side.clone() as Arc<dyn Peer>);
        }

        let callbacks: Vec<EstablishedFn> = std::mem::take(&mut *lock(&self.inner.connect_subs));
        for callback in callbacks {
            callback();
        }
    }
}

impl Default for MemoryLeaf {
    fn default() -> Self {
        Self::new()
    }
}

impl Peer for MemoryLeaf {
    fn id(&self) -> &PeerId {
        &self.inner.id
    }

    fn send(&self, event: &str, args: Args) -> Result<(), TransportError> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let Some(target) = lock(&self.inner.outbound).upgrade() else {
            return Err(TransportError::ConnectionClosed);
        };
        deliver(&target, &self.inner.inbound, event, args);
        Ok(())
    }

    fn on_message(&self, event: &str, callback: MessageFn) {
        self.inner.inbound.subscribe(event, callback);
    }

    fn is_open(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }
}

impl Leaf for MemoryLeaf {
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
