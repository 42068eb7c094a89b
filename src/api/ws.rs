//! WebSocket transport: every text frame (and every UTF-8 binary frame) is
//! offered to the command router; a command's reply goes back on the same
//! connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{StatusCode, Uri},
    response::Response,
};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::routes::AppState;
use crate::logic::{CommandDispatch, CommandHandler, CommandInvocation, Gateway, RawRequest, Verb};
use crate::model::{ConnectionKind, GatewayResponse, UserContext};
use crate::store::{DataSource, Delegate};

/// `METHOD /path [json]`, e.g. `PATCH /notes/1 {"title": "x"}`
pub const REQUEST_COMMAND_PATTERN: &str =
    r"^(?P<method>GET|POST|PUT|PATCH|DELETE)\s+(?P<path>/\S*)(?:\s+(?P<body>[\s\S]+))?$";

pub async fn ws_handler<S: DataSource, D: Delegate>(
    State(state): State<Arc<AppState<S, D>>>,
    user: UserContext,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket, user))
}

async fn handle_socket<S: DataSource, D: Delegate>(
    state: Arc<AppState<S, D>>,
    mut socket: WebSocket,
    user: UserContext,
) {
    let connection_id = Uuid::new_v4();
    log::info!(
        "WebSocket connection {} opened for {}",
        connection_id,
        user.user_id
    );

    while let Some(result) = socket.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    log::warn!("Dropping non-UTF-8 binary frame on {}", connection_id);
                    continue;
                }
            },
            Ok(Message::Ping(data)) => {
                if let Err(e) = socket.send(Message::Pong(data)).await {
                    log::error!("Failed to send pong on {}: {}", connection_id, e);
                    break;
                }
                continue;
            }
            Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                log::debug!("WebSocket close received on {}", connection_id);
                break;
            }
            Err(e) => {
                log::warn!("WebSocket error on {}: {}", connection_id, e);
                break;
            }
        };

        // Messages of one connection are handled strictly in arrival order.
        match state.commands.dispatch(&text, connection_id, &user).await {
            CommandDispatch::Handled(Some(reply)) => {
                if let Err(e) = socket.send(Message::Text(reply)).await {
                    log::error!("Failed to send reply on {}: {}", connection_id, e);
                    break;
                }
            }
            CommandDispatch::Handled(None) | CommandDispatch::Unrecognized => {}
        }
    }

    log::info!("WebSocket connection {} closed", connection_id);
}

/// Built-in command that runs `METHOD /path [json]` messages through the
/// gateway and replies with `{"status": <code>, "body": <json|null>}`.
pub fn request_command<S: DataSource, D: Delegate>(
    gateway: Arc<Gateway<S, D>>,
) -> impl CommandHandler {
    move |invocation: CommandInvocation| {
        let gateway = Arc::clone(&gateway);
        async move {
            let response = execute_request(&gateway, invocation).await;
            Some(response.to_envelope().to_string())
        }
    }
}

async fn execute_request<S: DataSource, D: Delegate>(
    gateway: &Gateway<S, D>,
    invocation: CommandInvocation,
) -> GatewayResponse {
    let Some(verb) = invocation.capture("method").and_then(Verb::parse) else {
        return GatewayResponse::error(StatusCode::BAD_REQUEST, "Missing request method");
    };

    let target = invocation.capture("path").unwrap_or("/");
    let uri: Uri = match target.parse() {
        Ok(uri) => uri,
        Err(e) => {
            return GatewayResponse::error(
                StatusCode::BAD_REQUEST,
                &format!("Invalid path '{}': {}", target, e),
            )
        }
    };
    let query = match Query::<HashMap<String, String>>::try_from_uri(&uri) {
        Ok(Query(query)) => query,
        Err(e) => {
            return GatewayResponse::error(
                StatusCode::BAD_REQUEST,
                &format!("Invalid query string: {}", e),
            )
        }
    };

    let parsed = invocation
        .capture("body")
        .map(serde_json::from_str::<Value>)
        .transpose();
    let body = match parsed {
        Ok(body) => body,
        Err(e) => {
            return GatewayResponse::error(
                StatusCode::BAD_REQUEST,
                &format!("Invalid JSON body: {}", e),
            )
        }
    };

    let raw = RawRequest {
        verb,
        path: uri.path().to_string(),
        query,
        body,
    };
    gateway
        .route(
            raw,
            ConnectionKind::WebSocket,
            invocation.user,
            Some(invocation.connection_id),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::logic::CommandRouter;
    use crate::seed::{notes_model, NotesHost};
    use serde_json::json;

    fn router() -> (CommandRouter, Arc<NotesHost>) {
        let host = Arc::new(NotesHost::new());
        let gateway = Gateway::from_model(
            &notes_model(),
            Arc::clone(&host),
            Arc::clone(&host),
            GatewayConfig::default(),
        )
        .unwrap();
        let router = CommandRouter::builder()
            .command(r"^ping$", |_inv: CommandInvocation| async {
                Some("pong".to_string())
            })
            .unwrap()
            .command(REQUEST_COMMAND_PATTERN, request_command(Arc::new(gateway)))
            .unwrap()
            .build();
        (router, host)
    }

    async fn send(router: &CommandRouter, message: &str) -> Value {
        match router
            .dispatch(message, Uuid::new_v4(), &UserContext::new("ws-user"))
            .await
        {
            CommandDispatch::Handled(Some(reply)) => serde_json::from_str(&reply).unwrap(),
            other => panic!("Expected a reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_command_round_trip() {
        let (router, host) = router();

        let created = send(&router, r#"POST /notes {"title": "over ws"}"#).await;
        assert_eq!(created["status"], 201);
        assert_eq!(created["body"]["title"], "over ws");

        let read = send(&router, "GET /notes/1").await;
        assert_eq!(read["status"], 200);
        assert_eq!(read["body"], created["body"]);

        let search = send(&router, "GET /notes?sort=-title&limit=1").await;
        assert_eq!(search["body"], json!([1]));

        let deleted = send(&router, "DELETE /notes/1").await;
        assert_eq!(deleted, json!({"status": 204, "body": null}));
        assert_eq!(host.store().count("Note"), 0);
    }

    #[tokio::test]
    async fn test_request_command_errors() {
        let (router, _host) = router();

        let bad_json = send(&router, "POST /notes {nope").await;
        assert_eq!(bad_json["status"], 400);

        let unknown = send(&router, "GET /ghosts/1").await;
        assert_eq!(unknown["status"], 404);
        assert!(unknown["body"]["error"].is_string());
    }

    #[tokio::test]
    async fn test_host_commands_and_unrecognized_messages() {
        let (router, _host) = router();
        assert_eq!(
            router
                .dispatch("ping", Uuid::new_v4(), &UserContext::anonymous())
                .await,
            CommandDispatch::Handled(Some("pong".to_string()))
        );
        assert_eq!(
            router
                .dispatch("HEAD /notes", Uuid::new_v4(), &UserContext::anonymous())
                .await,
            CommandDispatch::Unrecognized
        );
    }
}
