//! Liveness endpoint reporting scheduler configuration.

use crate::sync::SyncEngine;
use rocket::State;
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub scheduler_enabled: bool,
    pub tick_interval_secs: u64,
}

#[openapi(tag = "Health")]
#[get("/health")]
pub fn health_check(engine: &State<Arc<SyncEngine>>) -> Json<HealthResponse> {
    let config = engine.config();
    Json(HealthResponse {
        status: "ok".to_string(),
        scheduler_enabled: config.scheduler_enabled,
        tick_interval_secs: config.tick_interval.as_secs(),
    })
}
