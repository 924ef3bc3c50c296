use axum::extract::rejection::{FormRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::calendar::GridError;
use crate::types::{DraftError, UnknownEventType};

/// JSON envelope shared by every API response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GridError> for AppError {
    fn from(value: GridError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<DraftError> for AppError {
    fn from(value: DraftError) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<UnknownEventType> for AppError {
    fn from(value: UnknownEventType) -> Self {
        Self::Validation(value.to_string())
    }
}

impl From<QueryRejection> for AppError {
    fn from(value: QueryRejection) -> Self {
        Self::Validation(value.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(value: FormRejection) -> Self {
        Self::Validation(value.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(err) => {
                error!(error = %format!("{:#}", err), "Request failed");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ApiResponse::<()>::failure(message))).into_response()
    }
}
