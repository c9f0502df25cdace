//! Inbound message dispatch shared by the transport implementations.
//!
//! Each side of a connection owns one [`Dispatcher`]: a table of wire
//! event name -> subscriber callbacks, plus an inbox holding messages that
//! arrived before any subscriber existed for their event. Held messages
//! are flushed, in arrival order, when the first subscription for that
//! event appears, so a message sent before the receiving side bound its
//! handlers is delivered exactly once instead of being dropped.

use crate::traits::{Args, MessageFn, ReplyFn};
use std::collections::{HashMap, VecDeque};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

/// Upper bound on messages held for events nobody has subscribed to yet.
/// The oldest message is dropped once the bound is hit.
const MAX_HELD_MESSAGES: usize = 1024;

/// Lock a mutex, tolerating poisoning from a panicked subscriber.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Subscriber = Arc<dyn Fn(Args, Option<ReplyFn>) + Send + Sync>;

struct Held {
    event: String,
    args: Args,
    reply: Option<ReplyFn>,
}

/// Subscription table and pre-subscription inbox for one connection side.
#[derive(Default)]
pub(crate) struct Dispatcher {
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    inbox: Mutex<VecDeque<Held>>,
}

impl Dispatcher {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a subscriber for `event` and flush any held messages.
    pub(crate) fn subscribe(&self, event: &str, callback: MessageFn) {
        let subscriber: Subscriber = Arc::from(callback);
        lock(&self.subscribers)
            .entry(event.to_string())
            .or_default()
            .push(subscriber);

        let held: Vec<Held> = {
            let mut inbox = lock(&self.inbox);
            let (matching, rest): (Vec<Held>, Vec<Held>) = mem::take(&mut *inbox)
                .into_iter()
                .partition(|m| m.event == event);
            *inbox = rest.into();
            matching
        };
        for message in held {
            trace!(event = %message.event, "flushing held message");
            self.dispatch(&message.event, message.args, message.reply);
        }
    }

    /// Deliver a message to every subscriber for `event`, or hold it if
    /// none exist yet.
    pub(crate) fn dispatch(&self, event: &str, args: Args, reply: Option<ReplyFn>) {
        let targets: Vec<Subscriber> = lock(&self.subscribers)
            .get(event)
            .cloned()
            .unwrap_or_default();

        if targets.is_empty() {
            trace!(event, "no subscriber yet, holding message");
            let mut inbox = lock(&self.inbox);
            if inbox.len() >= MAX_HELD_MESSAGES {
                if let Some(dropped) = inbox.pop_front() {
                    warn!(event = %dropped.event, "held-message bound reached, dropping oldest");
                }
            }
            inbox.push_back(Held {
                event: event.to_string(),
                args,
                reply,
            });
            return;
        }

        for target in &targets {
            target(args.clone(), reply.clone());
        }
    }
}
