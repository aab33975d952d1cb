//! Interactive sync runs.
//!
//! `POST /objects/<name>/runs` answers immediately with a run id. The run's
//! log is available as a JSON snapshot or as a Server-Sent Events stream that
//! replays buffered lines and ends with a `close` event.

use crate::error::ApiError;
use crate::sync::{RunEvent, SyncEngine};
use crate::models::RunSnapshot;
use rocket::State;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const CLOSE_EVENT: &str = "close";

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: String,
    pub events_url: String,
}

fn parse_run_id(run_id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(run_id).map_err(|_| ApiError::BadRequest(format!("invalid run id '{run_id}'")))
}

/// Start an interactive sync for one object.
#[openapi(tag = "Runs")]
#[post("/objects/<name>/runs")]
pub fn start_run(name: &str, engine: &State<Arc<SyncEngine>>) -> Json<StartRunResponse> {
    let run_id = engine.start_run(name);
    Json(StartRunResponse {
        run_id: run_id.to_string(),
        events_url: format!("/api/v1/runs/{run_id}/events"),
    })
}

#[openapi(tag = "Runs")]
#[get("/runs/<run_id>")]
pub fn get_run(
    run_id: &str,
    engine: &State<Arc<SyncEngine>>,
) -> Result<Json<RunSnapshot>, ApiError> {
    let id = parse_run_id(run_id)?;
    Ok(Json(engine.run_snapshot(&id)?))
}

/// Stream a run's log. Each line is a `message` event; the last event is `close`.
#[get("/runs/<run_id>/events")]
pub fn run_events(
    run_id: &str,
    engine: &State<Arc<SyncEngine>>,
) -> Result<EventStream![], ApiError> {
    let id = parse_run_id(run_id)?;
    let mut subscription = engine.subscribe_run(&id)?;

    Ok(EventStream! {
        while let Some(event) = subscription.next().await {
            match event {
                RunEvent::Line(line) => yield Event::data(line),
                RunEvent::Closed => yield Event::data(CLOSE_EVENT).event(CLOSE_EVENT),
            }
        }
    })
}
