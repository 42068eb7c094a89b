use crate::model::{EntitySchema, ResourceId, SearchRequest, UserContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Search,
    Create,
    Read,
    Update,
    Delete,
    Function,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Search => "search",
            RequestKind::Create => "create",
            RequestKind::Read => "read",
            RequestKind::Update => "update",
            RequestKind::Delete => "delete",
            RequestKind::Function => "function",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Http,
    WebSocket,
}

/// What a classified request asks for. The variant fixes whether an
/// instance identifier and a payload are present.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Search(SearchRequest),
    Create(Map<String, Value>),
    Read(ResourceId),
    Update(ResourceId, Map<String, Value>),
    Delete(ResourceId),
    Function {
        id: ResourceId,
        name: String,
        input: Map<String, Value>,
    },
}

/// Canonical request, identical for both transports.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub operation: Operation,
    pub connection: ConnectionKind,
    pub entity: Arc<EntitySchema>,
    pub user: UserContext,
    /// Set for requests that arrived over a WebSocket connection
    pub connection_id: Option<Uuid>,
}

impl GatewayRequest {
    pub fn new(
        operation: Operation,
        connection: ConnectionKind,
        entity: Arc<EntitySchema>,
        user: UserContext,
    ) -> Self {
        Self {
            operation,
            connection,
            entity,
            user,
            connection_id: None,
        }
    }

    pub fn with_connection_id(mut self, connection_id: Uuid) -> Self {
        self.connection_id = Some(connection_id);
        self
    }

    pub fn kind(&self) -> RequestKind {
        match self.operation {
            Operation::Search(_) => RequestKind::Search,
            Operation::Create(_) => RequestKind::Create,
            Operation::Read(_) => RequestKind::Read,
            Operation::Update(..) => RequestKind::Update,
            Operation::Delete(_) => RequestKind::Delete,
            Operation::Function { .. } => RequestKind::Function,
        }
    }

    pub fn resource_id(&self) -> Option<&ResourceId> {
        match &self.operation {
            Operation::Read(id) | Operation::Update(id, _) | Operation::Delete(id) => Some(id),
            Operation::Function { id, .. } => Some(id),
            Operation::Search(_) | Operation::Create(_) => None,
        }
    }

    pub fn function_name(&self) -> Option<&str> {
        match &self.operation {
            Operation::Function { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Access level for one (request, instance, key) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FieldAccess {
    NoAccess,
    ReadOnly,
    ReadWrite,
}

impl FieldAccess {
    pub fn can_read(self) -> bool {
        self >= FieldAccess::ReadOnly
    }

    pub fn can_write(self) -> bool {
        self == FieldAccess::ReadWrite
    }
}

/// Result of a function invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutcome {
    Success(Option<Value>),
    /// The host picks the status sent back to the client
    Failure {
        status: axum::http::StatusCode,
        output: Option<Value>,
    },
    PermissionDenied,
    Unrecognized,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_access_ordering() {
        assert!(!FieldAccess::NoAccess.can_read());
        assert!(FieldAccess::ReadOnly.can_read());
        assert!(!FieldAccess::ReadOnly.can_write());
        assert!(FieldAccess::ReadWrite.can_write());
    }
}
