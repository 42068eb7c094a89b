use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::model::{AttributeDef, Cardinality, EntitySchema, RelationshipDef, ResourceId};
use crate::store::Transaction;

/// Reject a value that does not fit the attribute's declared type.
pub fn check_attribute_value(
    schema: &EntitySchema,
    attr: &AttributeDef,
    value: &Value,
) -> GatewayResult<()> {
    if attr.data_type.accepts(value) {
        Ok(())
    } else {
        Err(GatewayError::Validation(format!(
            "'{}' of {} expects {:?}, got {}",
            attr.name,
            schema.name,
            attr.data_type,
            json_type_name(value)
        )))
    }
}

/// Check a relationship payload against the target entity and return the
/// normalized identifier JSON to store. Every referenced instance must exist
/// in the request's transaction.
pub async fn resolve_relationship_value<T: Transaction>(
    transaction: &mut T,
    rel: &RelationshipDef,
    target: &EntitySchema,
    value: &Value,
) -> GatewayResult<Value> {
    match (rel.cardinality, value) {
        // A cleared to-many reads back the same as one never set
        (Cardinality::Many, Value::Null) => Ok(Value::Array(Vec::new())),
        (Cardinality::One, Value::Null) => Ok(Value::Null),
        (Cardinality::One, value) => {
            let id = parse_reference(rel, target, value)?;
            ensure_exists(transaction, rel, target, &id).await?;
            Ok(id.to_json())
        }
        (Cardinality::Many, Value::Array(items)) => {
            let mut ids: Vec<ResourceId> = Vec::with_capacity(items.len());
            for item in items {
                let id = parse_reference(rel, target, item)?;
                if !ids.contains(&id) {
                    ensure_exists(transaction, rel, target, &id).await?;
                    ids.push(id);
                }
            }
            Ok(Value::Array(ids.iter().map(ResourceId::to_json).collect()))
        }
        (Cardinality::Many, other) => Err(GatewayError::Validation(format!(
            "'{}' expects an array of {} identifiers, got {}",
            rel.name,
            target.name,
            json_type_name(other)
        ))),
    }
}

fn parse_reference(
    rel: &RelationshipDef,
    target: &EntitySchema,
    value: &Value,
) -> GatewayResult<ResourceId> {
    ResourceId::from_json(value, target.id_type()).ok_or_else(|| {
        GatewayError::Validation(format!(
            "'{}' expects {} identifiers of type {:?}, got {}",
            rel.name,
            target.name,
            target.id_type(),
            value
        ))
    })
}

async fn ensure_exists<T: Transaction>(
    transaction: &mut T,
    rel: &RelationshipDef,
    target: &EntitySchema,
    id: &ResourceId,
) -> GatewayResult<()> {
    match transaction.fetch(&target.name, id).await? {
        Some(_) => Ok(()),
        None => Err(GatewayError::Validation(format!(
            "'{}' references missing {} {}",
            rel.name, target.name, id
        ))),
    }
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, EntityDef, Instance, RequestKind};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn schema(def: EntityDef) -> EntitySchema {
        EntitySchema {
            name: def.name.clone(),
            resource_path: def.name.to_lowercase(),
            attributes: def.attributes,
            relationships: def.relationships,
            id_attribute: "id".to_string(),
            functions: Default::default(),
        }
    }

    #[test]
    fn test_attribute_type_mismatch() {
        let note = schema(EntityDef::new("Note").attribute("id", DataType::Integer).attribute("title", DataType::String));
        let title = note.get_attribute("title").unwrap();
        assert!(check_attribute_value(&note, title, &json!("x")).is_ok());
        let err = check_attribute_value(&note, title, &json!(5)).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[tokio::test]
    async fn test_relationship_references_must_exist() {
        let store = MemoryStore::new();
        store.put(Instance::new("User", ResourceId::Integer(1)));
        let user = schema(EntityDef::new("User").attribute("id", DataType::Integer));
        let note = schema(
            EntityDef::new("Note")
                .attribute("id", DataType::Integer)
                .to_one("author", "User")
                .to_many("readers", "User"),
        );
        let author = note.get_relationship("author").unwrap();
        let readers = note.get_relationship("readers").unwrap();
        let mut tx = store.begin(RequestKind::Create);

        assert_eq!(
            resolve_relationship_value(&mut tx, author, &user, &json!(1)).await.unwrap(),
            json!(1)
        );
        assert!(resolve_relationship_value(&mut tx, author, &user, &json!(2)).await.is_err());
        assert!(resolve_relationship_value(&mut tx, author, &user, &json!("1")).await.is_err());
        assert_eq!(
            resolve_relationship_value(&mut tx, readers, &user, &json!([1, 1])).await.unwrap(),
            json!([1])
        );
        assert!(resolve_relationship_value(&mut tx, readers, &user, &json!(1)).await.is_err());
    }

    #[tokio::test]
    async fn test_cleared_relationships() {
        let store = MemoryStore::new();
        let user = schema(EntityDef::new("User").attribute("id", DataType::Integer));
        let note = schema(
            EntityDef::new("Note")
                .attribute("id", DataType::Integer)
                .to_one("author", "User")
                .to_many("readers", "User"),
        );
        let author = note.get_relationship("author").unwrap();
        let readers = note.get_relationship("readers").unwrap();
        let mut tx = store.begin(RequestKind::Update);

        assert_eq!(
            resolve_relationship_value(&mut tx, author, &user, &Value::Null).await.unwrap(),
            Value::Null
        );
        assert_eq!(
            resolve_relationship_value(&mut tx, readers, &user, &Value::Null).await.unwrap(),
            json!([])
        );
    }
}
