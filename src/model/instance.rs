use crate::model::ResourceId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A stored instance of an entity. `values` holds attributes and
/// relationships keyed by name; relationships are stored as identifier JSON
/// (a single id or null for to-one, an id array for to-many).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub entity: String,
    pub id: ResourceId,
    pub values: BTreeMap<String, Value>,
}

impl Instance {
    pub fn new(entity: impl Into<String>, id: ResourceId) -> Self {
        Self {
            entity: entity.into(),
            id,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Setting `null` clears the key.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if value.is_null() {
            self.values.remove(&key);
        } else {
            self.values.insert(key, value);
        }
    }
}

/// JSON object built for a response; only the keys that passed the
/// permission check are present.
pub type Representation = Map<String, Value>;
