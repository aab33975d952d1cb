//! Read-only views of the remote API: object listing, describe, record preview.

use crate::error::ApiError;
use crate::models::{DataResponse, ObjectDefinition, ObjectSummary, QueryPage};
use crate::sync::SyncEngine;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use std::sync::Arc;

#[openapi(tag = "Remote")]
#[get("/remote/objects")]
pub async fn list_remote_objects(
    engine: &State<Arc<SyncEngine>>,
) -> Result<Json<DataResponse<Vec<ObjectSummary>>>, ApiError> {
    let objects = engine.list_remote_objects().await?;
    Ok(Json(DataResponse { data: objects }))
}

#[openapi(tag = "Remote")]
#[get("/remote/objects/<name>/describe")]
pub async fn describe_object(
    name: &str,
    engine: &State<Arc<SyncEngine>>,
) -> Result<Json<ObjectDefinition>, ApiError> {
    Ok(Json(engine.describe(name).await?))
}

/// First page of live records; nothing is written locally.
#[openapi(tag = "Remote")]
#[get("/remote/objects/<name>/records")]
pub async fn preview_records(
    name: &str,
    engine: &State<Arc<SyncEngine>>,
) -> Result<Json<QueryPage>, ApiError> {
    Ok(Json(engine.preview_records(name).await?))
}
