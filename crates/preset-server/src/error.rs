use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use preset_core::error::PresetError;

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<PresetError>() {
            Some(e) => match e {
                PresetError::PresetNotFound(_) | PresetError::GroupNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                PresetError::NotRunnable { .. } | PresetError::NoActiveExecution(_) => {
                    StatusCode::CONFLICT
                }
                PresetError::InvalidPreset(_) => StatusCode::BAD_REQUEST,
                PresetError::PartialDispatchFailure { .. }
                | PresetError::DispatchTimeout { .. }
                | PresetError::Dispatch(_)
                | PresetError::Registry(_)
                | PresetError::Io(_)
                | PresetError::Yaml(_)
                | PresetError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
