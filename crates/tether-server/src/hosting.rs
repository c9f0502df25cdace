//! Model hosting glue.
//!
//! For each configured model name the hub mirrors a collection to its
//! peers: new peers are greeted with the current snapshot, `save` upserts
//! the payload into the collection, `delete` removes it. Peers see each
//! other's mutations through the model's echo.

use crate::metrics;
use serde_json::Value;
use std::sync::Arc;
use tether_core::{Channel, EchoPolicy, Model, ModelError, CONNECT_EVENT, DELETE_EVENT, SAVE_EVENT};
use tether_transport::Hub;
use tracing::{info, warn};

/// Host one model on the hub.
///
/// # Errors
///
/// Returns an error if the model name is invalid.
pub fn host_model(
    name: &str,
    hub: Arc<dyn Hub>,
    echo: EchoPolicy,
) -> Result<Arc<Model>, ModelError> {
    let model = Model::with_echo(name, Channel::Hub(hub), echo)?;

    let weak = Arc::downgrade(&model);
    model.register(CONNECT_EVENT, move |reply, _args| {
        let Some(model) = weak.upgrade() else { return };
        metrics::record_connection(model.name());
        let snapshot = model.collection().clone();
        if let Err(e) = reply.send(vec![Value::Array(snapshot)]) {
            warn!(model = %model.name(), error = %e, "greeting failed");
        }
    })?;

    let weak = Arc::downgrade(&model);
    model.register(SAVE_EVENT, move |_reply, args| {
        let Some(model) = weak.upgrade() else { return };
        metrics::record_event(model.name(), "save");
        let Some(item) = args.first() else { return };
        upsert(&mut model.collection(), item);
    })?;

    let weak = Arc::downgrade(&model);
    model.register(DELETE_EVENT, move |_reply, args| {
        let Some(model) = weak.upgrade() else { return };
        metrics::record_event(model.name(), "delete");
        let Some(item) = args.first() else { return };
        remove(&mut model.collection(), item);
    })?;

    info!(model = %model.name(), "model hosted");
    Ok(model)
}

/// Insert `item`, replacing an existing entry with the same `"id"`.
fn upsert(collection: &mut Vec<Value>, item: &Value) {
    if let Some(id) = item.get("id") {
        if let Some(existing) = collection.iter_mut().find(|v| v.get("id") == Some(id)) {
            *existing = item.clone();
            return;
        }
    }
    collection.push(item.clone());
}

/// Remove entries matching `item` by `"id"`, or by full equality when the
/// payload has none.
fn remove(collection: &mut Vec<Value>, item: &Value) {
    match item.get("id") {
        Some(id) => collection.retain(|v| v.get("id") != Some(id)),
        None => collection.retain(|v| v != item),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tether_transport::{MemoryHub, MemoryLeaf, Peer};

    #[test]
    fn test_upsert_inserts_and_replaces() {
        let mut collection = Vec::new();
        upsert(&mut collection, &json!({"id": 1, "content": "a"}));
        upsert(&mut collection, &json!({"id": 2, "content": "b"}));
        assert_eq!(collection.len(), 2);

        upsert(&mut collection, &json!({"id": 1, "content": "edited"}));
        assert_eq!(collection.len(), 2);
        assert_eq!(collection[0], json!({"id": 1, "content": "edited"}));
    }

    #[test]
    fn test_remove_by_id_or_equality() {
        let mut collection = vec![json!({"id": 1}), json!({"id": 2}), json!("loose")];

        remove(&mut collection, &json!({"id": 1}));
        assert_eq!(collection.len(), 2);

        remove(&mut collection, &json!("loose"));
        assert_eq!(collection, vec![json!({"id": 2})]);
    }

    #[test]
    fn test_hosted_model_mirrors_collection() {
        let hub = MemoryHub::new();
        let model = host_model("post", Arc::new(hub.clone()), EchoPolicy::Broadcast).unwrap();

        let channel = MemoryLeaf::new();
        channel.establish(&hub);

        channel
            .send("post:save", vec![json!({"id": 1, "content": "first"})])
            .unwrap();
        channel
            .send("post:save", vec![json!({"id": 1, "content": "edited"})])
            .unwrap();
        assert_eq!(
            *model.collection(),
            vec![json!({"id": 1, "content": "edited"})]
        );

        channel.send("post:delete", vec![json!({"id": 1})]).unwrap();
        assert!(model.collection().is_empty());
    }

    #[test]
    fn test_new_peer_greeted_with_snapshot() {
        let hub = MemoryHub::new();
        let model = host_model("post", Arc::new(hub.clone()), EchoPolicy::Broadcast).unwrap();
        model.collection().push(json!({"id": 1}));

        let channel = MemoryLeaf::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        channel.on_message(
            "post:connect",
            Box::new(move |args, _| sink.lock().unwrap().push(args)),
        );
        channel.establish(&hub);

        assert_eq!(*seen.lock().unwrap(), vec![vec![json!([{"id": 1}])]]);
    }
}
