use crate::model::{generate_text_id, DataType, EntitySchema, Instance, RequestKind, ResourceId};
use crate::store::traits::{DuplicateResource, MissingResource, Transaction};
use anyhow::{anyhow, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

type Table = BTreeMap<ResourceId, Instance>;

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Table>,
    /// Last integer identifier handed out per entity
    counters: HashMap<String, u64>,
}

/// Transactional in-memory store. Cloning shares the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, kind: RequestKind) -> MemoryTransaction {
        log::trace!("Opening {} transaction", kind);
        MemoryTransaction {
            tables: Arc::clone(&self.tables),
            writes: BTreeMap::new(),
        }
    }

    /// Next identifier for an entity. Integer identifiers are never reused,
    /// even after the instance holding one is deleted.
    pub fn next_id(&self, entity: &EntitySchema) -> Result<ResourceId> {
        match entity.id_type() {
            DataType::Integer => {
                let mut tables = self.tables.write();
                let highest = tables
                    .rows
                    .get(&entity.name)
                    .and_then(|table| table.keys().next_back())
                    .and_then(|id| match id {
                        ResourceId::Integer(n) => Some(*n),
                        ResourceId::Text(_) => None,
                    })
                    .unwrap_or(0);
                let counter = tables.counters.entry(entity.name.clone()).or_insert(0);
                *counter = (*counter).max(highest) + 1;
                Ok(ResourceId::Integer(*counter))
            }
            DataType::String => Ok(generate_text_id()),
            other => Err(anyhow!(
                "{:?} cannot back the identifier of {}",
                other,
                entity.name
            )),
        }
    }

    /// Committed state of one instance
    pub fn get(&self, entity: &str, id: &ResourceId) -> Option<Instance> {
        self.tables
            .read()
            .rows
            .get(entity)
            .and_then(|table| table.get(id))
            .cloned()
    }

    pub fn count(&self, entity: &str) -> usize {
        self.tables
            .read()
            .rows
            .get(entity)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Insert outside any request, e.g. for seed data
    pub fn put(&self, instance: Instance) {
        let mut tables = self.tables.write();
        tables
            .rows
            .entry(instance.entity.clone())
            .or_default()
            .insert(instance.id.clone(), instance);
    }
}

#[derive(Debug, Clone)]
enum Write {
    Insert(Instance),
    Save(Instance),
    Delete,
}

#[derive(Debug)]
pub struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    writes: BTreeMap<(String, ResourceId), Write>,
}

impl MemoryTransaction {
    fn committed(&self, entity: &str, id: &ResourceId) -> Option<Instance> {
        self.tables
            .read()
            .rows
            .get(entity)
            .and_then(|table| table.get(id))
            .cloned()
    }

    fn key(entity: &str, id: &ResourceId) -> (String, ResourceId) {
        (entity.to_string(), id.clone())
    }
}

#[async_trait::async_trait]
impl Transaction for MemoryTransaction {
    async fn fetch(&mut self, entity: &str, id: &ResourceId) -> Result<Option<Instance>> {
        match self.writes.get(&Self::key(entity, id)) {
            Some(Write::Insert(instance)) | Some(Write::Save(instance)) => {
                Ok(Some(instance.clone()))
            }
            Some(Write::Delete) => Ok(None),
            None => Ok(self.committed(entity, id)),
        }
    }

    async fn scan(&mut self, entity: &str) -> Result<Vec<Instance>> {
        let mut table = self
            .tables
            .read()
            .rows
            .get(entity)
            .cloned()
            .unwrap_or_default();

        for ((write_entity, id), write) in &self.writes {
            if write_entity != entity {
                continue;
            }
            match write {
                Write::Insert(instance) | Write::Save(instance) => {
                    table.insert(id.clone(), instance.clone());
                }
                Write::Delete => {
                    table.remove(id);
                }
            }
        }

        Ok(table.into_values().collect())
    }

    async fn insert(&mut self, instance: Instance) -> Result<()> {
        if self.fetch(&instance.entity, &instance.id).await?.is_some() {
            return Err(DuplicateResource {
                entity: instance.entity,
                id: instance.id,
            }
            .into());
        }
        let key = Self::key(&instance.entity, &instance.id);
        self.writes.insert(key, Write::Insert(instance));
        Ok(())
    }

    async fn save(&mut self, instance: Instance) -> Result<()> {
        if self.fetch(&instance.entity, &instance.id).await?.is_none() {
            return Err(MissingResource {
                entity: instance.entity,
                id: instance.id,
            }
            .into());
        }
        let key = Self::key(&instance.entity, &instance.id);
        let write = match self.writes.get(&key) {
            // Still an insert as far as the committed state is concerned
            Some(Write::Insert(_)) => Write::Insert(instance),
            _ => Write::Save(instance),
        };
        self.writes.insert(key, write);
        Ok(())
    }

    async fn delete(&mut self, entity: &str, id: &ResourceId) -> Result<bool> {
        let existed = self.fetch(entity, id).await?.is_some();
        if existed {
            let key = Self::key(entity, id);
            if let Some(Write::Insert(_)) = self.writes.get(&key) {
                self.writes.remove(&key);
            } else {
                self.writes.insert(key, Write::Delete);
            }
        }
        Ok(existed)
    }

    async fn commit(self) -> Result<()> {
        let mut tables = self.tables.write();

        // Check every write before applying anything so a conflict leaves
        // the store untouched. Inserts need a free identifier, saves a row
        // that no other transaction deleted in the meantime.
        for ((entity, id), write) in &self.writes {
            let present = tables
                .rows
                .get(entity)
                .map(|table| table.contains_key(id))
                .unwrap_or(false);
            match write {
                Write::Insert(_) if present => {
                    return Err(DuplicateResource {
                        entity: entity.clone(),
                        id: id.clone(),
                    }
                    .into());
                }
                Write::Save(_) if !present => {
                    return Err(MissingResource {
                        entity: entity.clone(),
                        id: id.clone(),
                    }
                    .into());
                }
                _ => {}
            }
        }

        for ((entity, id), write) in self.writes {
            let table = tables.rows.entry(entity).or_default();
            match write {
                Write::Insert(instance) | Write::Save(instance) => {
                    table.insert(id, instance);
                }
                Write::Delete => {
                    table.remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        log::trace!("Discarding {} pending writes", self.writes.len());
        Ok(())
    }
}
