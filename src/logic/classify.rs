use axum::http::Method;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::logic::{parse_filter_expr, SchemaRegistry};
use crate::model::{
    ConnectionKind, EntitySchema, GatewayRequest, Operation, ResourceId, SearchRequest,
    UserContext,
};

/// Transport verb, independent of HTTP so WebSocket messages can use it too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn from_method(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Verb::Get),
            Method::POST => Some(Verb::Post),
            Method::PUT => Some(Verb::Put),
            Method::PATCH => Some(Verb::Patch),
            Method::DELETE => Some(Verb::Delete),
            _ => None,
        }
    }

    pub fn parse(verb: &str) -> Option<Self> {
        match verb.to_ascii_uppercase().as_str() {
            "GET" => Some(Verb::Get),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "PATCH" => Some(Verb::Patch),
            "DELETE" => Some(Verb::Delete),
            _ => None,
        }
    }
}

/// Inbound request as the transport saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub verb: Verb,
    pub path: String,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

impl RawRequest {
    pub fn new(verb: Verb, path: impl Into<String>) -> Self {
        Self {
            verb,
            path: path.into(),
            query: HashMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }
}

/// Resolve a raw request into exactly one gateway operation.
pub fn classify(
    registry: &SchemaRegistry,
    raw: RawRequest,
    connection: ConnectionKind,
    user: UserContext,
) -> GatewayResult<GatewayRequest> {
    let trimmed = raw.path.trim_matches('/');
    let segments: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    };
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(GatewayError::NotFound(format!("No resource at {}", raw.path)));
    }

    let (entity, operation) = match segments.as_slice() {
        [] => return Err(GatewayError::NotFound("No resource path given".to_string())),

        [path] if *path == registry.search_path() => {
            if !matches!(raw.verb, Verb::Get | Verb::Post) {
                return Err(not_allowed(raw.verb, &raw.path));
            }
            let search = search_from_body(raw.body)?
                .ok_or_else(|| GatewayError::Validation("Search body is required".to_string()))?;
            let name = search.entity.as_deref().ok_or_else(|| {
                GatewayError::Validation("Search body must name an entity".to_string())
            })?;
            let entity = registry
                .entity(name)
                .ok_or_else(|| GatewayError::Schema(format!("Unknown entity '{}'", name)))?;
            (Arc::clone(entity), Operation::Search(search))
        }

        [path, rest @ ..] => {
            let entity = Arc::clone(
                registry
                    .resolve(path)
                    .ok_or_else(|| GatewayError::Schema(format!("No resource at /{}", path)))?,
            );
            let operation = match (rest, raw.verb) {
                ([], Verb::Get) => Operation::Search(collection_search(&entity, raw.body, &raw.query)?),
                ([], Verb::Post) => Operation::Create(payload_object(raw.body)?),
                ([id], Verb::Get) => Operation::Read(parse_id(&entity, id)?),
                ([id], Verb::Put | Verb::Patch) => {
                    Operation::Update(parse_id(&entity, id)?, payload_object(raw.body)?)
                }
                ([id], Verb::Delete) => Operation::Delete(parse_id(&entity, id)?),
                ([id, function], _) => Operation::Function {
                    id: parse_id(&entity, id)?,
                    name: function.to_string(),
                    input: payload_object(raw.body)?,
                },
                ([] | [_], verb) => return Err(not_allowed(verb, &raw.path)),
                _ => return Err(GatewayError::NotFound(format!("No resource at {}", raw.path))),
            };
            (entity, operation)
        }
    };

    Ok(GatewayRequest::new(operation, connection, entity, user))
}

fn not_allowed(verb: Verb, path: &str) -> GatewayError {
    GatewayError::Validation(format!("{:?} is not supported on {}", verb, path))
}

fn parse_id(entity: &EntitySchema, segment: &str) -> GatewayResult<ResourceId> {
    ResourceId::parse(segment, entity.id_type()).ok_or_else(|| {
        GatewayError::Validation(format!(
            "'{}' is not a valid {:?} identifier for {}",
            segment,
            entity.id_type(),
            entity.name
        ))
    })
}

/// Create, update and function payloads must be JSON objects; a missing
/// body is an empty object.
fn payload_object(body: Option<Value>) -> GatewayResult<Map<String, Value>> {
    match body {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(GatewayError::Validation(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

fn search_from_body(body: Option<Value>) -> GatewayResult<Option<SearchRequest>> {
    match body {
        None | Some(Value::Null) => Ok(None),
        Some(value @ Value::Object(_)) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| GatewayError::Validation(format!("Malformed search: {}", e))),
        Some(_) => Err(GatewayError::Validation(
            "Search body must be a JSON object".to_string(),
        )),
    }
}

fn collection_search(
    entity: &EntitySchema,
    body: Option<Value>,
    query: &HashMap<String, String>,
) -> GatewayResult<SearchRequest> {
    if let Some(search) = search_from_body(body)? {
        if let Some(name) = &search.entity {
            if *name != entity.name {
                return Err(GatewayError::Validation(format!(
                    "Search names entity '{}' on the {} collection",
                    name, entity.name
                )));
            }
        }
        return Ok(search);
    }

    let where_clause = query
        .get("where")
        .map(|text| {
            serde_json::from_str::<Value>(text)
                .map_err(anyhow::Error::from)
                .and_then(parse_filter_expr)
                .map_err(|e| GatewayError::Validation(format!("Malformed filter: {}", e)))
        })
        .transpose()?;

    Ok(SearchRequest {
        entity: None,
        where_clause,
        sort: query.get("sort").cloned(),
        offset: parse_count(query, "offset")?,
        limit: parse_count(query, "limit")?,
    })
}

fn parse_count(query: &HashMap<String, String>, key: &str) -> GatewayResult<Option<usize>> {
    query
        .get(key)
        .map(|text| {
            text.parse::<usize>().map_err(|_| {
                GatewayError::Validation(format!("'{}' must be a non-negative integer", key))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::model::RequestKind;
    use crate::seed::{notes_model, NotesHost};
    use serde_json::json;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::build(&notes_model(), &NotesHost::new(), &GatewayConfig::default()).unwrap()
    }

    fn run(raw: RawRequest) -> GatewayResult<GatewayRequest> {
        classify(&registry(), raw, ConnectionKind::Http, UserContext::anonymous())
    }

    #[test]
    fn test_method_to_kind_mapping() {
        let cases = vec![
            (RawRequest::new(Verb::Get, "/notes"), RequestKind::Search),
            (RawRequest::new(Verb::Post, "/notes"), RequestKind::Create),
            (RawRequest::new(Verb::Get, "/notes/1"), RequestKind::Read),
            (RawRequest::new(Verb::Put, "/notes/1"), RequestKind::Update),
            (RawRequest::new(Verb::Patch, "/notes/1"), RequestKind::Update),
            (RawRequest::new(Verb::Delete, "/notes/1"), RequestKind::Delete),
            (RawRequest::new(Verb::Post, "/notes/1/archive"), RequestKind::Function),
            (RawRequest::new(Verb::Get, "/notes/1/archive"), RequestKind::Function),
        ];
        for (raw, kind) in cases {
            let path = raw.path.clone();
            let request = run(raw).unwrap();
            assert_eq!(request.kind(), kind, "{}", path);
            assert_eq!(request.entity.name, "Note");
            assert_eq!(
                request.resource_id().is_some(),
                !matches!(kind, RequestKind::Search | RequestKind::Create)
            );
        }
    }

    #[test]
    fn test_function_name_extracted() {
        let request = run(RawRequest::new(Verb::Post, "/notes/7/archive").with_body(json!({}))).unwrap();
        assert_eq!(request.function_name(), Some("archive"));
        assert_eq!(request.resource_id(), Some(&ResourceId::Integer(7)));
    }

    #[test]
    fn test_global_search_path_uses_body_entity() {
        let request = run(
            RawRequest::new(Verb::Post, "/search").with_body(json!({"entity": "User", "limit": 5})),
        )
        .unwrap();
        assert_eq!(request.kind(), RequestKind::Search);
        assert_eq!(request.entity.name, "User");

        let err = run(RawRequest::new(Verb::Post, "/search").with_body(json!({"entity": "Ghost"})))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Schema(_)));

        let err = run(RawRequest::new(Verb::Post, "/search")).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn test_unknown_resource_is_schema_error() {
        let err = run(RawRequest::new(Verb::Get, "/ghosts/1")).unwrap_err();
        assert!(matches!(err, GatewayError::Schema(_)));
        assert_eq!(err.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_unparseable_id_is_validation_error() {
        let err = run(RawRequest::new(Verb::Get, "/notes/abc")).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn test_rejects_non_object_payload() {
        let err = run(RawRequest::new(Verb::Post, "/notes").with_body(json!([1, 2]))).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn test_rejects_unsupported_verbs() {
        assert!(matches!(
            run(RawRequest::new(Verb::Delete, "/notes")).unwrap_err(),
            GatewayError::Validation(_)
        ));
        assert!(matches!(
            run(RawRequest::new(Verb::Post, "/notes/1")).unwrap_err(),
            GatewayError::Validation(_)
        ));
        assert!(matches!(
            run(RawRequest::new(Verb::Get, "/notes/1/archive/extra")).unwrap_err(),
            GatewayError::NotFound(_)
        ));
    }

    #[test]
    fn test_search_from_query_parameters() {
        let request = run(
            RawRequest::new(Verb::Get, "/notes")
                .with_query("where", r#"{"eq": ["title", "x"]}"#)
                .with_query("sort", "-title")
                .with_query("limit", "10"),
        )
        .unwrap();
        match request.operation {
            Operation::Search(search) => {
                assert!(search.where_clause.is_some());
                assert_eq!(search.sort.as_deref(), Some("-title"));
                assert_eq!(search.limit, Some(10));
                assert_eq!(search.offset, None);
            }
            other => panic!("Expected search, got {:?}", other),
        }

        let err = run(RawRequest::new(Verb::Get, "/notes").with_query("where", "{oops")).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        let err = run(RawRequest::new(Verb::Get, "/notes").with_query("limit", "-1")).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}
