use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

/// Status plus JSON body, shared by the HTTP and WebSocket transports.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, body: Option<Value>) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, Some(body))
    }

    pub fn created(body: Value) -> Self {
        Self::new(StatusCode::CREATED, Some(body))
    }

    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, None)
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::to_value(ErrorResponse::new(message)).unwrap_or(Value::Null);
        Self::new(status, Some(body))
    }

    /// Envelope pushed back over a WebSocket connection.
    pub fn to_envelope(&self) -> Value {
        serde_json::json!({
            "status": self.status.as_u16(),
            "body": self.body.clone().unwrap_or(Value::Null),
        })
    }
}
