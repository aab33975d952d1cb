use crate::sync::SyncError;
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_db_pools::sqlx;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use serde::Serialize;
use std::io::Cursor;

#[derive(Debug)]
pub enum ApiError {
    DatabaseError(sqlx::Error),
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Unprocessable(String),
    BadGateway(String),
    GatewayTimeout(String),
    InternalError(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = match self {
            ApiError::DatabaseError(e) => {
                log::error!("database error: {}", e);
                (Status::InternalServerError, "DatabaseError", e.to_string())
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "BadRequest", msg)
            }
            ApiError::Unauthorized(msg) => {
                log::info!("authentication required: {}", msg);
                (Status::Unauthorized, "AuthMissing", msg)
            }
            ApiError::Conflict(msg) => {
                log::warn!("conflict: {}", msg);
                (Status::Conflict, "SchemaConflict", msg)
            }
            ApiError::Unprocessable(msg) => {
                log::debug!("unprocessable: {}", msg);
                (Status::UnprocessableEntity, "UnsupportedDefinition", msg)
            }
            ApiError::BadGateway(msg) => {
                log::warn!("remote API failure: {}", msg);
                (Status::BadGateway, "RemoteApiError", msg)
            }
            ApiError::GatewayTimeout(msg) => {
                log::warn!("remote API timeout: {}", msg);
                (Status::GatewayTimeout, "RemoteApiTimeout", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (Status::InternalServerError, "InternalError", msg)
            }
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        let json = serde_json::to_string(&error_response)
            .unwrap_or_else(|_| r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string());

        Response::build()
            .status(status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(json.len(), Cursor::new(json))
            .ok()
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(Responses::default())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            _ => ApiError::DatabaseError(err),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        let message = err.to_string();
        match err {
            SyncError::Database(e) => ApiError::from(e),
            SyncError::AuthMissing { .. } => ApiError::Unauthorized(message),
            SyncError::NotFound(_) => ApiError::NotFound(message),
            SyncError::InvalidIdentifier(_) => ApiError::BadRequest(message),
            SyncError::UnsupportedType { .. } | SyncError::InvalidDefinition { .. } => {
                ApiError::Unprocessable(message)
            }
            SyncError::SchemaConflict { .. } => ApiError::Conflict(message),
            SyncError::Timeout(_) => ApiError::GatewayTimeout(message),
            SyncError::Network(_)
            | SyncError::RemoteApi { .. }
            | SyncError::Decode(_)
            | SyncError::UnexpectedPageUrl(_) => ApiError::BadGateway(message),
            SyncError::Upsert { .. } => ApiError::InternalError(message),
        }
    }
}
