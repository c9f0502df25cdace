//! Pre-connection send buffer.
//!
//! A leaf-mode model buffers outbound events here until its channel is
//! established, then drains the queue exactly once, in submission order.
//! After that one drain the queue is permanently closed: later emits go
//! straight to the transport and must never be buffered again.

use tether_transport::Args;

/// FIFO buffer of `(event, args)` pairs with a one-shot drain.
#[derive(Default)]
pub struct PendingQueue {
    items: Vec<(String, Args)>,
    drained: bool,
}

impl PendingQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer an event, preserving submission order.
    ///
    /// Returns `false` (and buffers nothing) if the queue has already been
    /// drained.
    pub fn push(&mut self, event: String, args: Args) -> bool {
        if self.drained {
            return false;
        }
        self.items.push((event, args));
        true
    }

    /// Take every buffered event, in submission order, and close the
    /// queue.
    pub fn drain(&mut self) -> Vec<(String, Args)> {
        self.drained = true;
        std::mem::take(&mut self.items)
    }

    /// Number of buffered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the one-shot drain has happened.
    #[must_use]
    pub fn is_drained(&self) -> bool {
        self.drained
    }
}
