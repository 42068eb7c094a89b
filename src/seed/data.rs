use crate::model::{DataType, EntityDef, Instance, ResourceId};
use crate::store::MemoryStore;
use serde_json::{json, Value};

/// Demonstration model: users writing notes.
pub fn notes_model() -> Vec<EntityDef> {
    vec![
        EntityDef::new("Note")
            .attribute("id", DataType::Integer)
            .attribute("title", DataType::String)
            .attribute("body", DataType::String)
            .attribute_with_default("archived", DataType::Boolean, Value::Bool(false))
            .to_one("author", "User"),
        EntityDef::new("User")
            .attribute("id", DataType::Integer)
            .attribute("name", DataType::String)
            .attribute("email", DataType::String),
    ]
}

fn create_instance(entity: &str, id: u64, values: Value) -> Instance {
    let mut instance = Instance::new(entity, ResourceId::Integer(id));
    if let Value::Object(map) = values {
        for (key, value) in map {
            instance.set(key, value);
        }
    }
    instance
}

/// Preload a couple of rows so a fresh server has something to show.
pub fn load_seed_data(store: &MemoryStore) {
    store.put(create_instance(
        "User",
        1,
        json!({"name": "Ada", "email": "ada@example.com"}),
    ));
    store.put(create_instance(
        "Note",
        1,
        json!({
            "title": "Welcome",
            "body": "Try PATCH /notes/1 or POST /notes/1/archive",
            "archived": false,
            "author": 1
        }),
    ));
    log::info!(
        "Seed data loaded: {} users, {} notes",
        store.count("User"),
        store.count("Note")
    );
}
