//! Object-style convenience over a model's `save`/`delete` events.
//!
//! A [`Record`] is a bag of JSON fields bound to a model. Saving or
//! deleting it without arguments emits the record's own fields as a single
//! object payload; the `_with` variants forward explicit arguments
//! untouched (explicit arguments always win). Fields are plain JSON
//! values, so nothing callable can leak into a payload.

use crate::model::{Model, ModelError};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Event emitted by [`Record::save`].
pub const SAVE_EVENT: &str = "save";

/// Event emitted by [`Record::delete`].
pub const DELETE_EVENT: &str = "delete";

/// A value object bound to a model.
#[derive(Clone)]
pub struct Record {
    model: Arc<Model>,
    fields: Map<String, Value>,
}

impl Model {
    /// Create an empty record bound to this model.
    #[must_use]
    pub fn record(self: &Arc<Self>) -> Record {
        Record {
            model: self.clone(),
            fields: Map::new(),
        }
    }

    /// Create a record seeded from a JSON object's fields.
    ///
    /// Non-object values produce an empty record.
    #[must_use]
    pub fn record_from(self: &Arc<Self>, value: &Value) -> Record {
        let fields = match value {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        Record {
            model: self.clone(),
            fields,
        }
    }
}

impl Record {
    /// Set a field, builder-style.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Set a field in place.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    /// Get a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The record's fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Emit `save` with this record's fields as the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the emit fails.
    pub fn save(&self) -> Result<(), ModelError> {
        self.model
            .emit(SAVE_EVENT, vec![Value::Object(self.fields.clone())])
            .map(|_| ())
    }

    /// Emit `save` with an explicit payload instead of the fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the emit fails.
    pub fn save_with(&self, args: Vec<Value>) -> Result<(), ModelError> {
        self.model.emit(SAVE_EVENT, args).map(|_| ())
    }

    /// Emit `delete` with this record's fields as the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the emit fails.
    pub fn delete(&self) -> Result<(), ModelError> {
        self.model
            .emit(DELETE_EVENT, vec![Value::Object(self.fields.clone())])
            .map(|_| ())
    }

    /// Emit `delete` with an explicit payload instead of the fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the emit fails.
    pub fn delete_with(&self, args: Vec<Value>) -> Result<(), ModelError> {
        self.model.emit(DELETE_EVENT, args).map(|_| ())
    }
}
