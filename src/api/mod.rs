//! HTTP API for the session reconciler.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `POST /api/debug-sessions` - Report task/session inconsistencies
//! - `POST /api/fix-sessions` - Fix every current inconsistency
//! - `POST /api/reset-task` - Reset a single task to pending
//! - `GET /api/tasks` - List tasks
//! - `POST /api/tasks` - Create a task
//! - `GET /api/tasks/{id}` - Get a task with its sessions
//! - `POST /api/tasks/{id}/start` - Start a work session
//! - `POST /api/tasks/{id}/stop` - Stop the current work session
//! - `POST /api/tasks/{id}/status` - Set a non-active status
//! - `DELETE /api/tasks/{id}` - Soft-delete a task

pub mod auth;
mod reconcile;
mod routes;
mod tasks;
pub mod types;

pub use auth::AuthUser;
pub use routes::{router, serve, AppState};
pub use types::*;
