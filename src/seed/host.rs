use anyhow::Result;
use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::GatewayError;
use crate::model::{
    EntityDef, EntitySchema, FieldAccess, FunctionOutcome, GatewayRequest, GatewayResponse,
    Instance, RequestKind, ResourceId,
};
use crate::store::{DataSource, Delegate, MemoryStore, MemoryTransaction};

/// Access rules of the demonstration host.
#[derive(Debug, Clone, Default)]
pub struct NotesPolicy {
    /// Keys nobody may read or write
    pub hidden: BTreeSet<String>,
    /// Keys that are shown but never written
    pub read_only: BTreeSet<String>,
    /// Functions nobody may invoke
    pub locked_functions: BTreeSet<String>,
    /// Instances nobody may see
    pub hidden_instances: BTreeSet<ResourceId>,
    /// Instances that are shown but never changed or deleted
    pub read_only_instances: BTreeSet<ResourceId>,
    /// Reject anonymous writes with 401 before the store is touched
    pub require_authentication_for_writes: bool,
}

/// Host application backing the `Note` and `User` entities with an
/// in-memory store.
#[derive(Debug, Default)]
pub struct NotesHost {
    store: MemoryStore,
    policy: NotesPolicy,
    archive_calls: AtomicUsize,
}

impl NotesHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: NotesPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Number of times the `archive` function body ran
    pub fn archive_calls(&self) -> usize {
        self.archive_calls.load(Ordering::SeqCst)
    }

    fn archive(&self, instance: &mut Instance, input: &Map<String, Value>) -> FunctionOutcome {
        self.archive_calls.fetch_add(1, Ordering::SeqCst);

        if instance.get("archived") == Some(&Value::Bool(true)) {
            return FunctionOutcome::Failure {
                status: StatusCode::CONFLICT,
                output: Some(json!({"error": format!("Note {} is already archived", instance.id)})),
            };
        }

        instance.set("archived", Value::Bool(true));
        let mut output = json!({"id": instance.id.to_json(), "archived": true});
        if let Some(reason) = input.get("reason").and_then(Value::as_str) {
            output["reason"] = Value::String(reason.to_string());
        }
        FunctionOutcome::Success(Some(output))
    }
}

#[async_trait::async_trait]
impl DataSource for NotesHost {
    type Transaction = MemoryTransaction;

    async fn begin(&self, kind: RequestKind) -> Result<MemoryTransaction> {
        Ok(self.store.begin(kind))
    }

    async fn new_resource_id(&self, entity: &EntitySchema) -> Result<ResourceId> {
        self.store.next_id(entity)
    }

    fn resource_path(&self, entity: &EntityDef) -> String {
        format!("{}s", entity.name.to_lowercase())
    }

    fn functions(&self, entity: &EntityDef) -> BTreeSet<String> {
        match entity.name.as_str() {
            "Note" => BTreeSet::from(["archive".to_string()]),
            _ => BTreeSet::new(),
        }
    }

    async fn perform_function(
        &self,
        _request: &GatewayRequest,
        function: &str,
        instance: &mut Instance,
        _transaction: &mut MemoryTransaction,
        input: &Map<String, Value>,
    ) -> Result<FunctionOutcome> {
        match (instance.entity.as_str(), function) {
            ("Note", "archive") => Ok(self.archive(instance, input)),
            _ => Ok(FunctionOutcome::Unrecognized),
        }
    }
}

impl Delegate for NotesHost {
    fn did_encounter_error(&self, error: &GatewayError, request: Option<&GatewayRequest>) {
        match request {
            Some(request) => log::error!(
                "{} on {} failed: {}",
                request.kind(),
                request.entity.name,
                error
            ),
            None => log::error!("Gateway error: {}", error),
        }
    }

    fn status_for_request(&self, request: &GatewayRequest) -> Option<StatusCode> {
        let writes = !matches!(request.kind(), RequestKind::Search | RequestKind::Read);
        if writes && self.policy.require_authentication_for_writes && !request.user.authenticated {
            return Some(StatusCode::UNAUTHORIZED);
        }
        None
    }

    fn did_perform_request(&self, request: &GatewayRequest, response: &GatewayResponse) {
        log::info!(
            "[audit] user={} {} {}{} -> {}",
            request.user.user_id,
            request.kind(),
            request.entity.name,
            request
                .resource_id()
                .map(|id| format!(" {}", id))
                .unwrap_or_default(),
            response.status.as_u16()
        );
    }

    fn permission(
        &self,
        _request: &GatewayRequest,
        instance: &Instance,
        key: Option<&str>,
    ) -> FieldAccess {
        if self.policy.hidden_instances.contains(&instance.id) {
            return FieldAccess::NoAccess;
        }
        let access = match key {
            None => FieldAccess::ReadWrite,
            Some(key) if self.policy.hidden.contains(key) => FieldAccess::NoAccess,
            Some(key)
                if self.policy.read_only.contains(key)
                    || self.policy.locked_functions.contains(key) =>
            {
                FieldAccess::ReadOnly
            }
            Some(_) => FieldAccess::ReadWrite,
        };
        if self.policy.read_only_instances.contains(&instance.id) {
            access.min(FieldAccess::ReadOnly)
        } else {
            access
        }
    }
}
