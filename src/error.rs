use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;

/// Failure of a booking, schedule, or chat operation. Each variant carries
/// the human-readable message surfaced to the caller; nothing here aborts
/// the process.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl ResponseError for OpError {
    fn status_code(&self) -> StatusCode {
        match self {
            OpError::NotFound(_) => StatusCode::NOT_FOUND,
            OpError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            OpError::Conflict(_) => StatusCode::CONFLICT,
            OpError::Forbidden(_) => StatusCode::FORBIDDEN,
            OpError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let OpError::Db(err) = self {
            log::error!("Database error: {err}");
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
