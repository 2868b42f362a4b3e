use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use storefront_types::ports::RepoError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock for product {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: Uuid,
        available: u32,
        requested: u32,
    },

    #[error("Dependency unavailable: {0}")]
    Dependency(String),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::InsufficientStock { .. } => StatusCode::CONFLICT,
            AppError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "Validation failed",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "Not found",
            AppError::Conflict(_) => "Conflict",
            AppError::InsufficientStock { .. } => "Insufficient stock",
            AppError::Dependency(_) => "Service unavailable",
            AppError::Internal(_) => "Internal server error",
        }
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::DbError(m) => AppError::Dependency(m),
            RepoError::NotFound(what) => AppError::NotFound(what),
            RepoError::InsufficientStock {
                product_id,
                available,
                requested,
            } => AppError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            RepoError::Conflict(m) => AppError::Conflict(m),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: &'static str,
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.status();
        let error = match &self {
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };

        let body = serde_json::to_string(&ErrorBody {
            message: self.message(),
            error,
        })
        .unwrap_or_else(|_| "{\"message\":\"Internal server error\",\"error\":\"internal serialization\"}".into());
        (code, [("content-type", "application/json")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_errors_map_to_http_statuses() {
        let cases = [
            (RepoError::DbError("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (RepoError::NotFound("order x".into()), StatusCode::NOT_FOUND),
            (RepoError::Conflict("dup".into()), StatusCode::CONFLICT),
            (
                RepoError::InsufficientStock {
                    product_id: Uuid::new_v4(),
                    available: 1,
                    requested: 2,
                },
                StatusCode::CONFLICT,
            ),
        ];
        for (repo_err, status) in cases {
            assert_eq!(AppError::from(repo_err).status(), status);
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let resp = AppError::Internal(anyhow::anyhow!("secret path")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
