use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::jsonapi::JSONAPI_CONTENT_TYPE;

pub type AppResult<T> = Result<T, AppError>;

/// Where in the request an error originated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ErrorSource {
    /// JSON pointer into the request document, e.g. `/data/relationships/event`.
    Pointer {
        pointer: String,
    },
    /// Named model field, e.g. `discount_code_id`.
    Field {
        source: String,
    },
}

impl ErrorSource {
    pub fn pointer(pointer: impl Into<String>) -> Self {
        ErrorSource::Pointer { pointer: pointer.into() }
    }

    pub fn field(field: impl Into<String>) -> Self {
        ErrorSource::Field { source: field.into() }
    }

    pub fn empty() -> Self {
        ErrorSource::field("")
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("A valid relationship with {0} resource is required")]
    MissingRelationship(&'static str),

    #[error("{detail}")]
    Unprocessable { origin: ErrorSource, detail: String },

    #[error("Authentication error: {0}")]
    Unauthorized(String),

    #[error("{detail}")]
    Forbidden { origin: ErrorSource, detail: String },

    #[error("{detail}")]
    NotFound { origin: ErrorSource, detail: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Document error: {0}")]
    Document(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn unprocessable(origin: ErrorSource, detail: impl Into<String>) -> Self {
        AppError::Unprocessable { origin, detail: detail.into() }
    }

    pub fn forbidden(origin: ErrorSource, detail: impl Into<String>) -> Self {
        AppError::Forbidden { origin, detail: detail.into() }
    }

    pub fn not_found(origin: ErrorSource, detail: impl Into<String>) -> Self {
        AppError::NotFound { origin, detail: detail.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingRelationship(_) | AppError::Unprocessable { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PaymentGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Document(_)
            | AppError::Mail(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AppError::MissingRelationship(_) | AppError::Unprocessable { .. } => {
                "Unprocessable Entity"
            }
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden { .. } => "Access Forbidden",
            AppError::NotFound { .. } => "Object not found",
            AppError::Conflict(_) => "Conflict",
            AppError::PaymentGateway(_) => "Payment gateway error",
            AppError::Database(_)
            | AppError::Document(_)
            | AppError::Mail(_)
            | AppError::Internal(_) => "Internal Server Error",
        }
    }

    pub fn source(&self) -> Option<ErrorSource> {
        match self {
            AppError::MissingRelationship(name) => {
                Some(ErrorSource::pointer(format!("/data/relationships/{name}")))
            }
            AppError::Unprocessable { origin, .. }
            | AppError::Forbidden { origin, .. }
            | AppError::NotFound { origin, .. } => Some(origin.clone()),
            _ => None,
        }
    }

    /// Message shown to the client. Internal failures stay generic.
    pub fn public_detail(&self) -> String {
        match self {
            AppError::Database(_) => "A database error occurred".to_string(),
            AppError::Document(_) | AppError::Mail(_) | AppError::Internal(_) => {
                "Unknown error".to_string()
            }
            other => other.to_string(),
        }
    }

    fn log(&self) {
        match self {
            AppError::Database(e) => error!(error = ?e, "Database error"),
            AppError::Document(msg) | AppError::Mail(msg) | AppError::Internal(msg) => {
                error!(error = ?self, message = %msg, "Internal error")
            }
            AppError::PaymentGateway(msg) => error!(message = %msg, "Payment gateway error"),
            other => tracing::debug!(status = %other.status_code(), detail = %other, "Request rejected"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub status: u16,
    pub title: &'static str,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

#[derive(Debug, Serialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
    pub jsonapi: serde_json::Value,
}

impl ErrorDocument {
    pub fn from_error(err: &AppError) -> Self {
        ErrorDocument {
            errors: vec![ErrorObject {
                status: err.status_code().as_u16(),
                title: err.title(),
                detail: err.public_detail(),
                source: err.source(),
            }],
            jsonapi: serde_json::json!({ "version": "1.0" }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.status_code();
        let body = ErrorDocument::from_error(&self);
        (status, [(header::CONTENT_TYPE, JSONAPI_CONTENT_TYPE)], Json(body)).into_response()
    }
}
