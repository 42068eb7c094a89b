use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::routes::AppState;
use crate::logic::{RawRequest, Verb};
use crate::model::{ConnectionKind, GatewayResponse, UserContext};
use crate::store::{DataSource, Delegate};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// Catch-all for resource paths: every request that is not the health
/// check or the WebSocket upgrade is classified by the gateway.
pub async fn handle_resource<S: DataSource, D: Delegate>(
    State(state): State<Arc<AppState<S, D>>>,
    method: Method,
    uri: Uri,
    Query(query): Query<HashMap<String, String>>,
    user: UserContext,
    body: Bytes,
) -> Response {
    let pretty = state.gateway.config().pretty_print_json;

    let Some(verb) = Verb::from_method(&method) else {
        return render(
            GatewayResponse::error(
                StatusCode::METHOD_NOT_ALLOWED,
                &format!("{} is not supported", method),
            ),
            pretty,
        );
    };

    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(e) => {
            log::debug!("Rejecting malformed JSON body on {}: {}", uri.path(), e);
            return render(
                GatewayResponse::error(StatusCode::BAD_REQUEST, &format!("Invalid JSON body: {}", e)),
                pretty,
            );
        }
    };

    let raw = RawRequest {
        verb,
        path: uri.path().to_string(),
        query,
        body,
    };
    let response = state
        .gateway
        .route(raw, ConnectionKind::Http, user, None)
        .await;
    render(response, pretty)
}

/// An empty body is no body.
pub fn parse_body(bytes: &[u8]) -> serde_json::Result<Option<Value>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes).map(Some)
}

/// Serialize a gateway response as the HTTP reply.
pub fn render(response: GatewayResponse, pretty: bool) -> Response {
    let Some(body) = response.body else {
        return response.status.into_response();
    };

    let text = if pretty {
        serde_json::to_string_pretty(&body)
    } else {
        serde_json::to_string(&body)
    };
    match text {
        Ok(text) => (
            response.status,
            [(header::CONTENT_TYPE, "application/json")],
            text,
        )
            .into_response(),
        Err(e) => {
            log::error!("Failed to serialize response body: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), None);
        assert_eq!(parse_body(b"  \n").unwrap(), None);
        assert_eq!(parse_body(br#"{"a": 1}"#).unwrap(), Some(json!({"a": 1})));
        assert!(parse_body(b"{oops").is_err());
    }

    #[tokio::test]
    async fn test_render_pretty_toggle() {
        let compact = render(GatewayResponse::ok(json!({"a": 1})), false);
        assert_eq!(compact.status(), StatusCode::OK);
        assert_eq!(
            compact.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let bytes = axum::body::to_bytes(compact.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);

        let pretty = render(GatewayResponse::ok(json!({"a": 1})), true);
        let bytes = axum::body::to_bytes(pretty.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains('\n'));

        let empty = render(GatewayResponse::no_content(), false);
        assert_eq!(empty.status(), StatusCode::NO_CONTENT);
    }
}
