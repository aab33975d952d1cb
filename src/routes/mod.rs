//! HTTP route handlers for the presentation layer.
//!
//! Handlers stay thin: each one resolves the shared `SyncEngine` from Rocket
//! state, calls a single engine operation and converts `SyncError` into an
//! `ApiError`. JSON routes are annotated with `#[openapi]`; the event stream
//! route is mounted separately.

pub mod health;
pub mod objects;
pub mod remote;
pub mod runs;
