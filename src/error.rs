use axum::http::StatusCode;
use thiserror::Error;

use crate::store::{DuplicateResource, MissingResource};

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown entity, unknown function or invalid schema declaration
    #[error("schema error: {0}")]
    Schema(String),

    /// Two registrations claim the same resource path or entity name
    #[error("schema conflict: {0}")]
    SchemaConflict(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Status chosen by the host delegate
    #[error("request rejected with status {0}")]
    Status(StatusCode),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Schema(_) | GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::SchemaConflict(_) | GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::Status(status) => *status,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients. Internal details stay server-side.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Internal(_) => "Internal server error".to_string(),
            GatewayError::Status(status) => status
                .canonical_reason()
                .unwrap_or("Request rejected")
                .to_string(),
            other => other.to_string(),
        }
    }

    /// Errors the host delegate must be told about.
    pub fn is_reportable(&self) -> bool {
        matches!(
            self,
            GatewayError::Internal(_) | GatewayError::Schema(_) | GatewayError::SchemaConflict(_)
        )
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(error: anyhow::Error) -> Self {
        if let Some(duplicate) = error.downcast_ref::<DuplicateResource>() {
            return GatewayError::Conflict(duplicate.to_string());
        }
        if let Some(missing) = error.downcast_ref::<MissingResource>() {
            return GatewayError::NotFound(missing.to_string());
        }
        GatewayError::Internal(error)
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceId;

    #[test]
    fn test_internal_error_hides_details() {
        let error = GatewayError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.client_message().contains("disk"));
        assert!(error.is_reportable());
    }

    #[test]
    fn test_duplicate_resource_maps_to_conflict() {
        let error = GatewayError::from(anyhow::Error::new(DuplicateResource {
            entity: "Note".to_string(),
            id: ResourceId::Integer(1),
        }));
        assert_eq!(error.status(), StatusCode::CONFLICT);
        assert!(!error.is_reportable());
    }

    #[test]
    fn test_missing_resource_maps_to_not_found() {
        let error = GatewayError::from(anyhow::Error::new(MissingResource {
            entity: "Note".to_string(),
            id: ResourceId::Integer(1),
        }));
        assert_eq!(error.status(), StatusCode::NOT_FOUND);
        assert!(!error.is_reportable());
    }
}
