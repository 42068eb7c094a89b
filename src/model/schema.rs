use crate::model::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Entity declaration supplied by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub name: String,
    /// Attributes in declaration order
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, data_type: DataType) -> Self {
        self.attributes.push(AttributeDef {
            name: name.into(),
            data_type,
            default: None,
        });
        self
    }

    pub fn attribute_with_default(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
        default: serde_json::Value,
    ) -> Self {
        self.attributes.push(AttributeDef {
            name: name.into(),
            data_type,
            default: Some(default),
        });
        self
    }

    pub fn to_one(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships.push(RelationshipDef {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::One,
        });
        self
    }

    pub fn to_many(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relationships.push(RelationshipDef {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::Many,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub data_type: DataType,
    /// Value assigned when an instance is created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    /// Name of the target entity
    pub target: String,
    pub cardinality: Cardinality,
}

/// A registered entity: the host declaration plus everything the gateway
/// derived for it at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySchema {
    pub name: String,
    pub resource_path: String,
    pub attributes: Vec<AttributeDef>,
    pub relationships: Vec<RelationshipDef>,
    pub id_attribute: String,
    pub functions: BTreeSet<String>,
}

/// What a payload or filter key refers to on an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field<'a> {
    Attribute(&'a AttributeDef),
    Relationship(&'a RelationshipDef),
}

impl EntitySchema {
    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn get_relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|rel| rel.name == name)
    }

    pub fn field(&self, name: &str) -> Option<Field<'_>> {
        self.get_attribute(name)
            .map(Field::Attribute)
            .or_else(|| self.get_relationship(name).map(Field::Relationship))
    }

    /// Attribute and relationship names in declaration order, attributes first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .iter()
            .map(|attr| attr.name.as_str())
            .chain(self.relationships.iter().map(|rel| rel.name.as_str()))
    }

    /// Type of the identifying attribute. Registration guarantees it exists.
    pub fn id_type(&self) -> DataType {
        self.get_attribute(&self.id_attribute)
            .map(|attr| attr.data_type)
            .unwrap_or(DataType::Integer)
    }

    pub fn declares_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note_schema() -> EntitySchema {
        let def = EntityDef::new("Note")
            .attribute("id", DataType::Integer)
            .attribute("title", DataType::String)
            .to_one("author", "User");
        EntitySchema {
            name: def.name,
            resource_path: "notes".to_string(),
            attributes: def.attributes,
            relationships: def.relationships,
            id_attribute: "id".to_string(),
            functions: BTreeSet::from(["archive".to_string()]),
        }
    }

    #[test]
    fn test_field_lookup() {
        let schema = note_schema();
        assert!(matches!(schema.field("title"), Some(Field::Attribute(_))));
        assert!(matches!(schema.field("author"), Some(Field::Relationship(_))));
        assert!(schema.field("missing").is_none());
        assert_eq!(schema.keys().collect::<Vec<_>>(), vec!["id", "title", "author"]);
        assert_eq!(schema.id_type(), DataType::Integer);
        assert!(schema.declares_function("archive"));
    }
}
