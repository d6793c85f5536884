//! HTTP-facing error type

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::ingest::PipelineError;
use crate::store::StoreError;
use crate::validation::ValidationError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::NotFound(message)
            | AppError::Validation(message)
            | AppError::BadRequest(message)
            | AppError::Conflict(message) => message,
            AppError::Unavailable(message) => {
                tracing::warn!("Service unavailable: {}", message);
                "The event store is currently unavailable".to_string()
            },
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                "An internal error occurred".to_string()
            },
            AppError::Config(message) => {
                tracing::error!("Configuration error: {}", message);
                "Server configuration error".to_string()
            },
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(message) => AppError::NotFound(message),
            StoreError::Conflict(message) => AppError::Conflict(message),
            StoreError::Validation(e) => e.into(),
            StoreError::Unavailable(message) => AppError::Unavailable(message),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::JobNotFound(_) => AppError::NotFound(err.to_string()),
            PipelineError::Store(e) => e.into(),
            PipelineError::Task(message) => AppError::Internal(message),
            other => AppError::Validation(other.to_string()),
        }
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::NotFound(message) => AppError::NotFound(message),
            AnalysisError::Validation(e) => e.into(),
            AnalysisError::TooDeep { .. } => AppError::BadRequest(err.to_string()),
            AnalysisError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use uuid::Uuid;

    #[test]
    fn test_store_error_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(AppError::from(StoreError::event_not_found(id)).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::from(StoreError::duplicate_event(id)).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::from(StoreError::Unavailable("down".into())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(StoreError::Validation(ValidationError::SelfParent(id))).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_pipeline_error_mapping() {
        let missing = PipelineError::JobNotFound(Uuid::new_v4());
        assert_eq!(AppError::from(missing).status(), StatusCode::NOT_FOUND);

        let bad_source = PipelineError::NotAFile("/tmp".into());
        assert_eq!(AppError::from(bad_source).status(), StatusCode::BAD_REQUEST);

        let panicked = PipelineError::Task("format check panicked".into());
        assert_eq!(AppError::from(panicked).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_analysis_error_mapping() {
        let too_deep = AnalysisError::TooDeep {
            root_id: Uuid::new_v4(),
            depth: 300,
            limit: 256,
        };
        let err = AppError::from(too_deep);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("300 levels deep"));
    }

    #[tokio::test]
    async fn test_response_body_shape() {
        let response = AppError::NotFound("Event 'x' not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["message"], "Event 'x' not found");
        assert_eq!(body["error"]["status"], 404);
    }
}
