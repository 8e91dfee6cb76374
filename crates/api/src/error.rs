//! API error types with HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind};
use serde::Serialize;

use crate::response::Message;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    message: &'static str,
    message_ar: &'static str,
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    details: String,
}

impl ApiError {
    /// Classifies the error the same way domain errors are classified.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Domain(err) => err.kind(),
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status for the error.
    pub fn status(&self) -> StatusCode {
        status_for(self.kind())
    }
}

/// Maps an error classification to its HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation | ErrorKind::BusinessRule => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidStateTransition | ErrorKind::Integrity | ErrorKind::Conflict => {
            StatusCode::CONFLICT
        }
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for(kind: ErrorKind) -> Message {
    let (en, ar) = match kind {
        ErrorKind::Validation => ("Validation failed", "فشل التحقق من صحة البيانات"),
        ErrorKind::NotFound => ("Resource not found", "المورد غير موجود"),
        ErrorKind::InvalidStateTransition => (
            "Operation not allowed in the current state",
            "العملية غير مسموحة في الحالة الحالية",
        ),
        ErrorKind::BusinessRule => ("Business rule violation", "مخالفة لقواعد العمل"),
        ErrorKind::Integrity => ("Data integrity violation", "انتهاك سلامة البيانات"),
        ErrorKind::Conflict => (
            "The resource was modified concurrently, please retry",
            "تم تعديل المورد بشكل متزامن، يرجى إعادة المحاولة",
        ),
        ErrorKind::Internal => ("Internal server error", "خطأ داخلي في الخادم"),
    };
    Message { en, ar }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);

        // Internal details stay in the logs.
        let details = if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "internal server error");
            message_for(kind).en.to_string()
        } else {
            tracing::debug!(error = %self, code = kind.code(), "request rejected");
            self.to_string()
        };

        let message = message_for(kind);
        let body = ErrorBody {
            success: false,
            message: message.en,
            message_ar: message.ar,
            error: ErrorDetail {
                code: kind.code(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
