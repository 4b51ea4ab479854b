use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type QueryResult<T> = Result<T, QueryError>;

/// Errors a query endpoint reports to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Missing or invalid query parameter
    #[error("{0}")]
    Validation(String),

    /// Well-formed query with no matching records
    #[error("{0}")]
    NotFound(String),
}

impl QueryError {
    pub fn validation(message: impl Into<String>) -> Self {
        QueryError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        QueryError::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            QueryError::Validation(_) => StatusCode::BAD_REQUEST,
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
