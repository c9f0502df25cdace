//! The wire message envelope.
//!
//! An [`Envelope`] is the single unit of communication between peers: a
//! namespaced wire event name plus an opaque list of JSON arguments. No
//! schema or versioning is imposed on the arguments; they are passed
//! through unmodified.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::name::wire_name;

/// A named message with its payload arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire event name, `<model>:<event>`.
    pub event: String,
    /// Opaque payload argument list.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl Envelope {
    /// Create an envelope for an already-namespaced wire event name.
    #[must_use]
    pub fn new(event: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            event: event.into(),
            args,
        }
    }

    /// Create an envelope, namespacing `event` under `model`.
    #[must_use]
    pub fn named(model: &str, event: &str, args: Vec<Value>) -> Self {
        Self::new(wire_name(model, event), args)
    }

    /// Number of payload arguments.
    #[must_use]
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_named() {
        let env = Envelope::named("post", "create", vec![json!({"id": 1234})]);
        assert_eq!(env.event, "post:create");
        assert_eq!(env.arg_count(), 1);
    }

    #[test]
    fn test_envelope_empty_args() {
        let env = Envelope::new("post:connect", vec![]);
        assert!(env.args.is_empty());
    }
}
