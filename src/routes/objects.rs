//! Catalog endpoints: enable sync for an object and inspect sync status.

use crate::error::ApiError;
use crate::models::{CatalogEntry, DataResponse};
use crate::sync::SyncEngine;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::openapi;
use std::sync::Arc;

/// Describe the remote object and register it for periodic pulling.
///
/// Calling this again for an enabled object refreshes its stored definition;
/// the local table is only created the first time.
#[openapi(tag = "Objects")]
#[post("/objects/<name>/sync")]
pub async fn enable_sync(
    name: &str,
    engine: &State<Arc<SyncEngine>>,
) -> Result<Json<CatalogEntry>, ApiError> {
    let entry = engine.enable_sync(name).await?;
    Ok(Json(entry))
}

/// List every object registered for sync with its status and last pull.
#[openapi(tag = "Objects")]
#[get("/objects")]
pub async fn list_status(
    engine: &State<Arc<SyncEngine>>,
) -> Result<Json<DataResponse<Vec<CatalogEntry>>>, ApiError> {
    let entries = engine.list_status().await?;
    Ok(Json(DataResponse { data: entries }))
}

#[openapi(tag = "Objects")]
#[get("/objects/<name>")]
pub async fn get_object(
    name: &str,
    engine: &State<Arc<SyncEngine>>,
) -> Result<Json<CatalogEntry>, ApiError> {
    Ok(Json(engine.entry(name).await?))
}
