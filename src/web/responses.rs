use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

/// Canonical JSON payload for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Acknowledgement for mutating history requests.
#[derive(Debug, Serialize, Clone)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<u64>,
}

impl ActionResponse {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            removed: None,
        }
    }

    pub fn with_removed(mut self, removed: u64) -> Self {
        self.removed = Some(removed);
        self
    }
}

pub type ApiError = (StatusCode, Json<ApiMessage>);

/// Helper for controllers that need to return `(StatusCode, Json<ApiMessage>)`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ApiMessage::new(message)))
}

pub fn internal_error(err: anyhow::Error, context: &'static str) -> ApiError {
    tracing::error!(?err, "{context}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "服务器内部错误，请稍后再试。")
}
