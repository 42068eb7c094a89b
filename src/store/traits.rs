use crate::error::GatewayError;
use crate::model::{
    EntityDef, EntitySchema, FieldAccess, FunctionOutcome, GatewayRequest, GatewayResponse,
    Instance, RequestKind, ResourceId,
};
use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use thiserror::Error;

/// Raised by a store when an insert reuses an existing identifier.
#[derive(Debug, Error)]
#[error("{entity} with id {id} already exists")]
pub struct DuplicateResource {
    pub entity: String,
    pub id: ResourceId,
}

/// Raised by a store when a save targets an instance that no longer exists.
#[derive(Debug, Error)]
#[error("{entity} with id {id} no longer exists")]
pub struct MissingResource {
    pub entity: String,
    pub id: ResourceId,
}

/// Request-scoped handle to the store. Writes become visible to other
/// transactions only on `commit`; dropping the handle without committing
/// discards them.
#[async_trait::async_trait]
pub trait Transaction: Send + Sized + 'static {
    /// Fetch one instance, seeing this transaction's own writes
    async fn fetch(&mut self, entity: &str, id: &ResourceId) -> Result<Option<Instance>>;
    /// All instances of an entity in identifier order
    async fn scan(&mut self, entity: &str) -> Result<Vec<Instance>>;
    /// Fails with `DuplicateResource` if the identifier is taken
    async fn insert(&mut self, instance: Instance) -> Result<()>;
    /// Replace an existing instance. Fails with `MissingResource` if it was
    /// deleted, here or by a transaction that committed first.
    async fn save(&mut self, instance: Instance) -> Result<()>;
    /// Returns false when nothing was deleted
    async fn delete(&mut self, entity: &str, id: &ResourceId) -> Result<bool>;
    async fn commit(self) -> Result<()>;
    async fn rollback(self) -> Result<()>;
}

/// Host capabilities the gateway cannot work without.
#[async_trait::async_trait]
pub trait DataSource: Send + Sync + 'static {
    type Transaction: Transaction;

    /// Fresh transaction for one request; never shared between requests
    async fn begin(&self, kind: RequestKind) -> Result<Self::Transaction>;

    /// Identifier for a new instance, unique among existing instances
    async fn new_resource_id(&self, entity: &EntitySchema) -> Result<ResourceId>;

    /// Collection path segment for an entity, without slashes
    fn resource_path(&self, entity: &EntityDef) -> String;

    /// Functions invokable on instances of an entity
    fn functions(&self, _entity: &EntityDef) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Run a declared function. Hosts that declare functions override this.
    async fn perform_function(
        &self,
        _request: &GatewayRequest,
        _function: &str,
        _instance: &mut Instance,
        _transaction: &mut Self::Transaction,
        _input: &Map<String, Value>,
    ) -> Result<FunctionOutcome> {
        Ok(FunctionOutcome::Unrecognized)
    }
}

/// Host callbacks for errors, coarse access control, auditing and
/// per-field permissions.
pub trait Delegate: Send + Sync + 'static {
    /// Called for every internal and schema error, with full detail
    fn did_encounter_error(&self, error: &GatewayError, request: Option<&GatewayRequest>);

    /// A status other than 200 rejects the request before the store is touched
    fn status_for_request(&self, request: &GatewayRequest) -> Option<StatusCode>;

    fn did_perform_request(&self, request: &GatewayRequest, response: &GatewayResponse);

    /// `key` is `None` for the instance-level check. Evaluated on every
    /// call; implementations must not assume results are cached.
    fn permission(
        &self,
        _request: &GatewayRequest,
        _instance: &Instance,
        _key: Option<&str>,
    ) -> FieldAccess {
        FieldAccess::ReadWrite
    }
}
