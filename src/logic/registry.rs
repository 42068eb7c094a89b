use itertools::Itertools;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::model::{EntityDef, EntitySchema};
use crate::store::DataSource;

/// Resource path → entity lookup table. Built before the server accepts
/// traffic and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    by_path: HashMap<String, Arc<EntitySchema>>,
    by_name: HashMap<String, Arc<EntitySchema>>,
    search_path: String,
    /// Paths owned by the gateway itself (search, WebSocket)
    reserved: Vec<String>,
}

/// Strip surrounding slashes; a valid path is a single non-empty segment.
pub fn normalize_path(path: &str) -> Option<String> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() || trimmed.contains('/') {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl SchemaRegistry {
    pub fn new(config: &GatewayConfig) -> GatewayResult<Self> {
        let search_path = normalize_path(&config.search_path).ok_or_else(|| {
            GatewayError::Schema(format!("Invalid search path '{}'", config.search_path))
        })?;
        let websocket_path = normalize_path(&config.websocket_path).ok_or_else(|| {
            GatewayError::Schema(format!(
                "Invalid WebSocket path '{}'",
                config.websocket_path
            ))
        })?;
        if search_path == websocket_path {
            return Err(GatewayError::SchemaConflict(format!(
                "Search path and WebSocket path are both '{}'",
                search_path
            )));
        }

        Ok(Self {
            by_path: HashMap::new(),
            by_name: HashMap::new(),
            search_path: search_path.clone(),
            reserved: vec![search_path, websocket_path],
        })
    }

    /// Register every entity of the host model, asking the data source for
    /// resource paths and function sets.
    pub fn build<S: DataSource>(
        model: &[EntityDef],
        source: &S,
        config: &GatewayConfig,
    ) -> GatewayResult<Self> {
        let mut registry = Self::new(config)?;

        for def in model {
            let schema = EntitySchema {
                name: def.name.clone(),
                resource_path: source.resource_path(def),
                attributes: def.attributes.clone(),
                relationships: def.relationships.clone(),
                id_attribute: config.resource_id_attribute.clone(),
                functions: source.functions(def),
            };
            registry.register(schema)?;
        }

        // Targets can only be checked once every entity is known
        for schema in registry.by_name.values() {
            if let Some(rel) = schema
                .relationships
                .iter()
                .find(|rel| !registry.by_name.contains_key(&rel.target))
            {
                return Err(GatewayError::Schema(format!(
                    "Relationship '{}' of {} targets unknown entity '{}'",
                    rel.name, schema.name, rel.target
                )));
            }
        }

        log::info!(
            "Registered {} entities: {}",
            registry.by_path.len(),
            registry
                .by_path
                .values()
                .map(|schema| format!("/{} → {}", schema.resource_path, schema.name))
                .sorted()
                .join(", ")
        );

        Ok(registry)
    }

    pub fn register(&mut self, mut schema: EntitySchema) -> GatewayResult<()> {
        schema.resource_path = normalize_path(&schema.resource_path).ok_or_else(|| {
            GatewayError::Schema(format!(
                "Invalid resource path '{}' for {}",
                schema.resource_path, schema.name
            ))
        })?;

        if self.reserved.contains(&schema.resource_path) {
            return Err(GatewayError::SchemaConflict(format!(
                "Resource path '{}' of {} is reserved by the gateway",
                schema.resource_path, schema.name
            )));
        }
        if let Some(existing) = self.by_path.get(&schema.resource_path) {
            return Err(GatewayError::SchemaConflict(format!(
                "Resource path '{}' is claimed by both {} and {}",
                schema.resource_path, existing.name, schema.name
            )));
        }
        if self.by_name.contains_key(&schema.name) {
            return Err(GatewayError::SchemaConflict(format!(
                "Entity {} is registered twice",
                schema.name
            )));
        }

        if let Some(key) = schema.keys().duplicates().next() {
            return Err(GatewayError::Schema(format!(
                "{} declares '{}' more than once",
                schema.name, key
            )));
        }
        match schema.get_attribute(&schema.id_attribute) {
            Some(attr) if attr.data_type.is_identifier_type() => {}
            Some(attr) => {
                return Err(GatewayError::Schema(format!(
                    "Identifying attribute '{}' of {} has type {:?}; expected Integer or String",
                    attr.name, schema.name, attr.data_type
                )))
            }
            None => {
                return Err(GatewayError::Schema(format!(
                    "{} has no identifying attribute '{}'",
                    schema.name, schema.id_attribute
                )))
            }
        }
        if let Some(function) = schema
            .functions
            .iter()
            .find(|name| normalize_path(name).as_deref() != Some(name.as_str()))
        {
            return Err(GatewayError::Schema(format!(
                "Function name '{}' of {} is not a valid path segment",
                function, schema.name
            )));
        }

        let schema = Arc::new(schema);
        self.by_path
            .insert(schema.resource_path.clone(), Arc::clone(&schema));
        self.by_name.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn resolve(&self, path: &str) -> Option<&Arc<EntitySchema>> {
        self.by_path.get(path.trim_matches('/'))
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntitySchema>> {
        self.by_name.get(name)
    }

    pub fn search_path(&self) -> &str {
        &self.search_path
    }

    pub fn entities(&self) -> impl Iterator<Item = &Arc<EntitySchema>> {
        self.by_path.values()
    }
}
