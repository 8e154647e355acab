use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

use crate::error::ApiError;
use crate::types::{Outcome, Warning};

/// Success body: `{"success": true, "data": ..., "warnings": [...]}`.
/// `warnings` is omitted when nothing degraded.
#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    success: bool,
    data: &'a T,
    #[serde(skip_serializing_if = "none")]
    warnings: &'a [Warning],
}

fn none(warnings: &&[Warning]) -> bool {
    warnings.is_empty()
}

#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status: StatusCode,
    pub warnings: Vec<Warning>,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 with no warnings
    pub fn success(data: T) -> Self {
        Self {
            data,
            status: StatusCode::OK,
            warnings: Vec::new(),
        }
    }

    pub fn from_outcome(outcome: Outcome<T>, status: StatusCode) -> Self {
        Self {
            data: outcome.data,
            status,
            warnings: outcome.warnings,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let envelope = Envelope {
            success: true,
            data: &self.data,
            warnings: &self.warnings,
        };
        match serde_json::to_value(&envelope) {
            Ok(body) => (self.status, Json(body)).into_response(),
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                ApiError::internal_server_error("Failed to serialize response data").into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;
