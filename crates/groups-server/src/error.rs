use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use groups_shared::api::{ErrorBody, FieldError};
use groups_shared::Group;
use serde_json::json;
use uuid::Uuid;

use crate::groups::GroupError;
use crate::store::StoreError;
use crate::validation::ValidationErrors;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Rejected { status: StatusCode, message: String },

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected { status, .. } => *status,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::Duplicate { model, field, value } => {
                let field_error = FieldError::new(field, "unique", message).with_value(json!(value));
                AppError::Validation(ValidationErrors::single(model, field_error))
            }
            StoreError::Database(e) => AppError::Database(e),
            StoreError::Internal(e) => AppError::Internal(e),
        }
    }
}

fn invalid_parent(kind: &str, message: String, value: Option<Uuid>) -> AppError {
    let mut field_error = FieldError::new("parent", kind, message);
    if let Some(value) = value {
        field_error = field_error.with_value(json!(value));
    }
    AppError::Validation(ValidationErrors::single(Group::MODEL_NAME, field_error))
}

impl From<GroupError> for AppError {
    fn from(err: GroupError) -> Self {
        let message = err.to_string();
        match err {
            GroupError::NotFound(_) => AppError::NotFound(message),
            GroupError::ParentNotFound(parent) => invalid_parent("exists", message, Some(parent)),
            GroupError::SelfParent => invalid_parent("self", message, None),
            GroupError::Cycle { parent, .. } => invalid_parent("acyclic", message, Some(parent)),
            GroupError::Validation(errors) => AppError::Validation(errors),
            GroupError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection {
            JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
                StatusCode::BAD_REQUEST
            }
            ref other => other.status(),
        };
        AppError::Rejected {
            status,
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (message, meta) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                ("An internal server error occurred".to_string(), None)
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                ("An internal server error occurred".to_string(), None)
            }
            AppError::Validation(errors) => (errors.to_string(), Some(errors.into_meta())),
            other => (other.to_string(), None),
        };

        let body = ErrorBody {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message,
            meta,
        };

        (status, Json(body)).into_response()
    }
}
