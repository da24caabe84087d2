//! # Session Reconciler
//!
//! Detects and repairs inconsistencies between tasks and their work sessions
//! in a multi-tenant time tracker.
//!
//! This library provides:
//! - A task/session data model with the two consistency invariants
//! - Pluggable owner-scoped storage (in-memory and SQLite)
//! - Detection, bulk fix and single-task reset operations
//! - An authenticated HTTP API over all of the above
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │     HTTP API (axum, JWT auth)    │
//!        └────────────────┬─────────────────┘
//!                         │ owner id
//!                         ▼
//!        ┌──────────────────────────────────┐
//!        │  reconcile: detect / fix / reset │
//!        └────────────────┬─────────────────┘
//!                         │ conditional updates
//!                         ▼
//!                ┌─────────────────┐
//!                │  TrackerStore   │
//!                │ (memory|sqlite) │
//!                └─────────────────┘
//! ```
//!
//! ## Modules
//! - `tracker`: Task and Session records
//! - `store`: Owner-scoped persistence
//! - `reconcile`: Consistency scan and repairs
//! - `api`: HTTP server
//! - `config`: Environment configuration

pub mod api;
pub mod config;
pub mod reconcile;
pub mod store;
pub mod tracker;

pub use config::Config;
