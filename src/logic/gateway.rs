use axum::http::StatusCode;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::logic::{classify, RawRequest, SchemaRegistry};
use crate::model::{
    ConnectionKind, EntityDef, GatewayRequest, GatewayResponse, Operation, UserContext,
};
use crate::store::{DataSource, Delegate, Transaction};

/// Routes classified requests to the CRUD, search and function handlers.
pub struct Gateway<S: DataSource, D: Delegate> {
    pub(crate) source: Arc<S>,
    pub(crate) delegate: Arc<D>,
    pub(crate) registry: Arc<SchemaRegistry>,
    config: GatewayConfig,
}

impl<S: DataSource, D: Delegate> Gateway<S, D> {
    pub fn new(
        source: Arc<S>,
        delegate: Arc<D>,
        registry: Arc<SchemaRegistry>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            source,
            delegate,
            registry,
            config,
        }
    }

    /// Build the registry from the host model and assemble the gateway.
    /// Schema problems are reported to the delegate before failing.
    pub fn from_model(
        model: &[EntityDef],
        source: Arc<S>,
        delegate: Arc<D>,
        config: GatewayConfig,
    ) -> GatewayResult<Self> {
        let registry = match SchemaRegistry::build(model, &*source, &config) {
            Ok(registry) => registry,
            Err(error) => {
                delegate.did_encounter_error(&error, None);
                return Err(error);
            }
        };
        Ok(Self::new(source, delegate, Arc::new(registry), config))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn delegate(&self) -> &Arc<D> {
        &self.delegate
    }

    /// Classify and handle a transport request.
    pub async fn route(
        &self,
        raw: RawRequest,
        connection: ConnectionKind,
        user: UserContext,
        connection_id: Option<Uuid>,
    ) -> GatewayResponse {
        log::debug!("{:?} {:?} {}", connection, raw.verb, raw.path);
        match classify(&self.registry, raw, connection, user) {
            Ok(request) => {
                let request = match connection_id {
                    Some(id) => request.with_connection_id(id),
                    None => request,
                };
                self.handle(request).await
            }
            Err(error) => self.error_response(&error, None),
        }
    }

    /// Run one classified request through the coarse status check and its
    /// handler, then notify the delegate.
    pub async fn handle(&self, request: GatewayRequest) -> GatewayResponse {
        let result = match self.delegate.status_for_request(&request) {
            Some(status) if status != StatusCode::OK => Err(GatewayError::Status(status)),
            _ => self.dispatch(&request).await,
        };

        let response = match result {
            Ok(response) => response,
            Err(error) => self.error_response(&error, Some(&request)),
        };

        log::debug!(
            "{} {} on {} -> {}",
            request.kind(),
            request
                .resource_id()
                .map(|id| id.to_string())
                .unwrap_or_default(),
            request.entity.name,
            response.status
        );
        self.delegate.did_perform_request(&request, &response);
        response
    }

    async fn dispatch(&self, request: &GatewayRequest) -> GatewayResult<GatewayResponse> {
        match &request.operation {
            Operation::Search(search) => self.search(request, search).await,
            Operation::Create(payload) => self.create(request, payload).await,
            Operation::Read(id) => self.read(request, id).await,
            Operation::Update(id, payload) => self.update(request, id, payload).await,
            Operation::Delete(id) => self.delete(request, id).await,
            Operation::Function { id, name, input } => {
                self.invoke_function(request, id, name, input).await
            }
        }
    }

    pub(crate) fn error_response(
        &self,
        error: &GatewayError,
        request: Option<&GatewayRequest>,
    ) -> GatewayResponse {
        if error.is_reportable() {
            log::error!("{}", error);
            self.delegate.did_encounter_error(error, request);
        }
        GatewayResponse::error(error.status(), &error.client_message())
    }
}

/// Commit on success, roll back on failure. Every transaction a handler
/// opens ends here.
pub(crate) async fn finish<T: Transaction, R>(
    transaction: T,
    result: GatewayResult<R>,
) -> GatewayResult<R> {
    match result {
        Ok(value) => {
            transaction.commit().await?;
            Ok(value)
        }
        Err(error) => {
            rollback(transaction).await;
            Err(error)
        }
    }
}

pub(crate) async fn rollback<T: Transaction>(transaction: T) {
    if let Err(e) = transaction.rollback().await {
        log::warn!("Rollback failed: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::Verb;
    use crate::seed::{notes_model, NotesHost, NotesPolicy};
    use serde_json::{json, Value};
    use crate::model::{Instance, ResourceId};
    use std::collections::BTreeSet;

    fn gateway_with(host: NotesHost) -> (Gateway<NotesHost, NotesHost>, Arc<NotesHost>) {
        let host = Arc::new(host);
        let gateway = Gateway::from_model(
            &notes_model(),
            Arc::clone(&host),
            Arc::clone(&host),
            GatewayConfig::default(),
        )
        .unwrap();
        (gateway, host)
    }

    fn stored_note(id: u64, title: &str) -> Instance {
        let mut instance = Instance::new("Note", ResourceId::Integer(id));
        instance.set("title", json!(title));
        instance
    }

    async fn send(
        gateway: &Gateway<NotesHost, NotesHost>,
        verb: Verb,
        path: &str,
        body: Option<Value>,
    ) -> GatewayResponse {
        let mut raw = RawRequest::new(verb, path);
        raw.body = body;
        gateway
            .route(raw, ConnectionKind::Http, UserContext::new("tester"), None)
            .await
    }

    #[tokio::test]
    async fn test_note_crud_scenario() {
        let (gateway, _host) = gateway_with(NotesHost::new());

        let created = send(&gateway, Verb::Post, "/notes", Some(json!({"title": "Hello"}))).await;
        assert_eq!(created.status, StatusCode::CREATED);
        let body = created.body.unwrap();
        assert_eq!(body["title"], "Hello");
        assert_eq!(body["archived"], false);
        let id = body["id"].as_u64().unwrap();

        let read = send(&gateway, Verb::Get, &format!("/notes/{}", id), None).await;
        assert_eq!(read.status, StatusCode::OK);
        assert_eq!(read.body.unwrap(), body);

        let updated = send(
            &gateway,
            Verb::Patch,
            &format!("/notes/{}", id),
            Some(json!({"body": "World"})),
        )
        .await;
        assert_eq!(updated.status, StatusCode::OK);
        assert_eq!(updated.body.unwrap()["body"], "World");

        let deleted = send(&gateway, Verb::Delete, &format!("/notes/{}", id), None).await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        assert!(deleted.body.is_none());

        let again = send(&gateway, Verb::Delete, &format!("/notes/{}", id), None).await;
        assert_eq!(again.status, StatusCode::NOT_FOUND);
        let gone = send(&gateway, Verb::Get, &format!("/notes/{}", id), None).await;
        assert_eq!(gone.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_created_ids_are_unique() {
        let (gateway, _host) = gateway_with(NotesHost::new());
        let mut ids = Vec::new();
        for i in 0..5 {
            let response =
                send(&gateway, Verb::Post, "/notes", Some(json!({"title": format!("n{}", i)}))).await;
            ids.push(response.body.unwrap()["id"].clone());
        }
        let deleted = send(&gateway, Verb::Delete, "/notes/5", None).await;
        assert_eq!(deleted.status, StatusCode::NO_CONTENT);
        let next = send(&gateway, Verb::Post, "/notes", Some(json!({}))).await;
        ids.push(next.body.unwrap()["id"].clone());

        let unique: BTreeSet<String> = ids.iter().map(Value::to_string).collect();
        assert_eq!(unique.len(), 6);
        assert_eq!(ids.last(), Some(&json!(6)));
    }

    #[tokio::test]
    async fn test_client_identifier_ignored() {
        let (gateway, _host) = gateway_with(NotesHost::new());
        send(&gateway, Verb::Post, "/notes", Some(json!({"title": "a"}))).await;
        let second = send(&gateway, Verb::Post, "/notes", Some(json!({"id": 1, "title": "b"}))).await;
        assert_eq!(second.status, StatusCode::CREATED);
        assert_eq!(second.body.unwrap()["id"], 2);
    }

    #[tokio::test]
    async fn test_read_only_key_not_persisted() {
        let policy = NotesPolicy {
            read_only: ["title".to_string()].into(),
            ..Default::default()
        };
        let (gateway, host) = gateway_with(NotesHost::with_policy(policy));

        let created = send(
            &gateway,
            Verb::Post,
            "/notes",
            Some(json!({"title": "ignored", "body": "kept"})),
        )
        .await;
        assert_eq!(created.status, StatusCode::CREATED);
        let body = created.body.unwrap();
        assert_eq!(body["title"], Value::Null);
        assert_eq!(body["body"], "kept");

        let stored = host
            .store()
            .get("Note", &crate::model::ResourceId::Integer(1))
            .unwrap();
        assert!(stored.get("title").is_none());
    }

    #[tokio::test]
    async fn test_hidden_key_never_returned() {
        let policy = NotesPolicy {
            hidden: ["body".to_string()].into(),
            ..Default::default()
        };
        let (gateway, _host) = gateway_with(NotesHost::with_policy(policy));

        let created = send(&gateway, Verb::Post, "/notes", Some(json!({"title": "t", "body": "secret"}))).await;
        assert!(created.body.unwrap().get("body").is_none());

        let first = send(&gateway, Verb::Get, "/notes/1", None).await;
        let second = send(&gateway, Verb::Get, "/notes/1", None).await;
        let body = first.body.unwrap();
        assert!(body.get("body").is_none());
        assert_eq!(Some(body), second.body);

        // Filtering on a hidden key excludes every instance
        let search = send(
            &gateway,
            Verb::Post,
            "/search",
            Some(json!({"entity": "Note", "where": {"exists": "body"}})),
        )
        .await;
        assert_eq!(search.body, Some(json!([])));
    }

    #[tokio::test]
    async fn test_type_mismatch_rolls_back() {
        let (gateway, host) = gateway_with(NotesHost::new());
        let response = send(&gateway, Verb::Post, "/notes", Some(json!({"title": 42}))).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(host.store().count("Note"), 0);
    }

    #[tokio::test]
    async fn test_relationship_must_exist() {
        let (gateway, _host) = gateway_with(NotesHost::new());
        let missing = send(&gateway, Verb::Post, "/notes", Some(json!({"author": 9}))).await;
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);

        let user = send(&gateway, Verb::Post, "/users", Some(json!({"name": "Ada"}))).await;
        let user_id = user.body.unwrap()["id"].clone();
        let note = send(&gateway, Verb::Post, "/notes", Some(json!({"author": user_id.clone()}))).await;
        assert_eq!(note.status, StatusCode::CREATED);
        assert_eq!(note.body.unwrap()["author"], user_id);
    }

    #[tokio::test]
    async fn test_search_filters_sorts_and_pages() {
        let (gateway, _host) = gateway_with(NotesHost::new());
        for title in ["b", "d", "a", "c"] {
            send(&gateway, Verb::Post, "/notes", Some(json!({"title": title}))).await;
        }

        let all = send(&gateway, Verb::Get, "/notes", None).await;
        assert_eq!(all.body, Some(json!([1, 2, 3, 4])));

        let sorted = send(
            &gateway,
            Verb::Post,
            "/search",
            Some(json!({"entity": "Note", "sort": "-title", "offset": 1, "limit": 2})),
        )
        .await;
        assert_eq!(sorted.status, StatusCode::OK);
        assert_eq!(sorted.body, Some(json!([4, 1])));

        let filtered = send(
            &gateway,
            Verb::Get,
            "/notes",
            Some(json!({"where": {"in": ["$.title", ["a", "b"]]}, "sort": "title"})),
        )
        .await;
        assert_eq!(filtered.body, Some(json!([3, 1])));

        let unknown = send(
            &gateway,
            Verb::Post,
            "/search",
            Some(json!({"entity": "Note", "where": {"eq": ["color", "red"]}})),
        )
        .await;
        assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_sorts_text_titles_as_text() {
        let (gateway, _host) = gateway_with(NotesHost::new());
        let titles = ["48", "106a", "129", "9", "1a", "10", "b"];
        for title in titles {
            send(&gateway, Verb::Post, "/notes", Some(json!({"title": title}))).await;
        }

        let sorted = send(
            &gateway,
            Verb::Post,
            "/search",
            Some(json!({"entity": "Note", "sort": "title"})),
        )
        .await;
        assert_eq!(sorted.status, StatusCode::OK);
        // "10" "106a" "129" "1a" "48" "9" "b"
        assert_eq!(sorted.body, Some(json!([6, 2, 3, 5, 1, 4, 7])));

        let descending = send(
            &gateway,
            Verb::Post,
            "/search",
            Some(json!({"entity": "Note", "sort": "-title"})),
        )
        .await;
        assert_eq!(descending.body, Some(json!([7, 4, 1, 5, 3, 2, 6])));
    }

    #[tokio::test]
    async fn test_hidden_instance_is_invisible() {
        let policy = NotesPolicy {
            hidden_instances: [ResourceId::Integer(2)].into(),
            ..Default::default()
        };
        let (gateway, host) = gateway_with(NotesHost::with_policy(policy));
        for (id, title) in [(1, "shown"), (2, "secret"), (3, "also shown")] {
            host.store().put(stored_note(id, title));
        }

        let all = send(&gateway, Verb::Get, "/notes", None).await;
        assert_eq!(all.body, Some(json!([1, 3])));
        let sorted = send(
            &gateway,
            Verb::Post,
            "/search",
            Some(json!({"entity": "Note", "sort": "-title"})),
        )
        .await;
        assert_eq!(sorted.body, Some(json!([1, 3])));

        let read = send(&gateway, Verb::Get, "/notes/2", None).await;
        assert_eq!(read.status, StatusCode::FORBIDDEN);
        let update = send(&gateway, Verb::Patch, "/notes/2", Some(json!({"title": "x"}))).await;
        assert_eq!(update.status, StatusCode::FORBIDDEN);
        let delete = send(&gateway, Verb::Delete, "/notes/2", None).await;
        assert_eq!(delete.status, StatusCode::FORBIDDEN);

        let stored = host.store().get("Note", &ResourceId::Integer(2)).unwrap();
        assert_eq!(stored.get("title"), Some(&json!("secret")));
    }

    #[tokio::test]
    async fn test_read_only_instance_cannot_change() {
        let policy = NotesPolicy {
            read_only_instances: [ResourceId::Integer(1)].into(),
            ..Default::default()
        };
        let (gateway, host) = gateway_with(NotesHost::with_policy(policy));
        host.store().put(stored_note(1, "pinned"));

        let read = send(&gateway, Verb::Get, "/notes/1", None).await;
        assert_eq!(read.status, StatusCode::OK);
        assert_eq!(read.body.unwrap()["title"], "pinned");

        let update = send(&gateway, Verb::Put, "/notes/1", Some(json!({"title": "x"}))).await;
        assert_eq!(update.status, StatusCode::FORBIDDEN);
        let delete = send(&gateway, Verb::Delete, "/notes/1", None).await;
        assert_eq!(delete.status, StatusCode::FORBIDDEN);
        let archive = send(&gateway, Verb::Post, "/notes/1/archive", None).await;
        assert_eq!(archive.status, StatusCode::FORBIDDEN);

        assert_eq!(host.archive_calls(), 0);
        let stored = host.store().get("Note", &ResourceId::Integer(1)).unwrap();
        assert_eq!(stored.get("title"), Some(&json!("pinned")));
    }

    #[tokio::test]
    async fn test_archive_runs_in_transaction() {
        let (gateway, host) = gateway_with(NotesHost::new());
        send(&gateway, Verb::Post, "/notes", Some(json!({"title": "t"}))).await;

        let archived = send(&gateway, Verb::Post, "/notes/1/archive", Some(json!({"reason": "done"}))).await;
        assert_eq!(archived.status, StatusCode::OK);
        assert_eq!(archived.body, Some(json!({"id": 1, "archived": true, "reason": "done"})));
        let stored = host
            .store()
            .get("Note", &crate::model::ResourceId::Integer(1))
            .unwrap();
        assert_eq!(stored.get("archived"), Some(&Value::Bool(true)));

        let twice = send(&gateway, Verb::Post, "/notes/1/archive", None).await;
        assert_eq!(twice.status, StatusCode::CONFLICT);
        assert_eq!(host.archive_calls(), 2);

        let unknown = send(&gateway, Verb::Post, "/notes/1/publish", None).await;
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        let missing = send(&gateway, Verb::Post, "/notes/99/archive", None).await;
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
        assert_eq!(host.archive_calls(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_function_never_runs() {
        let policy = NotesPolicy {
            locked_functions: ["archive".to_string()].into(),
            ..Default::default()
        };
        let (gateway, host) = gateway_with(NotesHost::with_policy(policy));
        send(&gateway, Verb::Post, "/notes", Some(json!({"title": "t"}))).await;

        let response = send(&gateway, Verb::Post, "/notes/1/archive", None).await;
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        assert_eq!(host.archive_calls(), 0);
    }

    #[tokio::test]
    async fn test_coarse_status_preempts_store() {
        let policy = NotesPolicy {
            require_authentication_for_writes: true,
            ..Default::default()
        };
        let (gateway, host) = gateway_with(NotesHost::with_policy(policy));

        let response = gateway
            .route(
                RawRequest::new(Verb::Post, "/notes").with_body(json!({"title": "t"})),
                ConnectionKind::Http,
                UserContext::anonymous(),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(host.store().count("Note"), 0);

        let search = gateway
            .route(
                RawRequest::new(Verb::Get, "/notes"),
                ConnectionKind::Http,
                UserContext::anonymous(),
                None,
            )
            .await;
        assert_eq!(search.status, StatusCode::OK);
    }
}
