//! User repository with a unique `username` key, backed by PostgreSQL or an
//! in-process store, plus a thin axum adapter.

pub mod app;
pub mod config;
pub mod error;
pub mod state;
pub mod users;
