use axum::http::StatusCode;
use serde_json::{Map, Value};

use crate::error::{GatewayError, GatewayResult};
use crate::logic::gateway::{finish, rollback, Gateway};
use crate::logic::require_access;
use crate::model::{
    FieldAccess, FunctionOutcome, GatewayRequest, GatewayResponse, RequestKind, ResourceId,
};
use crate::store::{DataSource, Delegate, Transaction};

impl<S: DataSource, D: Delegate> Gateway<S, D> {
    /// Invoke a host function on one instance. A successful run saves the
    /// instance in the same transaction it was fetched in; every other
    /// outcome rolls back.
    pub(crate) async fn invoke_function(
        &self,
        request: &GatewayRequest,
        id: &ResourceId,
        name: &str,
        input: &Map<String, Value>,
    ) -> GatewayResult<GatewayResponse> {
        let schema = &request.entity;
        if !schema.declares_function(name) {
            return Err(GatewayError::NotFound(format!(
                "{} has no function '{}'",
                schema.name, name
            )));
        }

        let mut transaction = self.source.begin(RequestKind::Function).await?;

        let mut instance = match self.fetch_existing(request, &mut transaction, id).await {
            Ok(instance) => instance,
            Err(error) => {
                rollback(transaction).await;
                return Err(error);
            }
        };

        if let Err(error) = require_access(
            &*self.delegate,
            request,
            &instance,
            Some(name),
            FieldAccess::ReadWrite,
        ) {
            rollback(transaction).await;
            return Err(error);
        }

        let outcome = self
            .source
            .perform_function(request, name, &mut instance, &mut transaction, input)
            .await;

        match outcome {
            Ok(FunctionOutcome::Success(output)) => {
                let saved = transaction.save(instance).await.map_err(GatewayError::from);
                finish(transaction, saved).await?;
                log::debug!("Function {} on {} {} succeeded", name, schema.name, id);
                Ok(GatewayResponse::new(StatusCode::OK, output))
            }
            Ok(FunctionOutcome::Failure { status, output }) => {
                rollback(transaction).await;
                log::debug!(
                    "Function {} on {} {} failed with {}",
                    name,
                    schema.name,
                    id,
                    status
                );
                Ok(GatewayResponse::new(status, output))
            }
            Ok(FunctionOutcome::PermissionDenied) => {
                rollback(transaction).await;
                Err(GatewayError::Forbidden(format!(
                    "Function '{}' denied on {} {}",
                    name, schema.name, id
                )))
            }
            Ok(FunctionOutcome::Unrecognized) => {
                rollback(transaction).await;
                Err(GatewayError::NotFound(format!(
                    "{} has no function '{}'",
                    schema.name, name
                )))
            }
            Err(e) => {
                rollback(transaction).await;
                Err(GatewayError::Internal(e.context(format!(
                    "Function '{}' on {} {}",
                    name, schema.name, id
                ))))
            }
        }
    }
}
