use crate::state::AppState;
use axum::Router;

mod dto;
pub mod handlers;
pub mod memory_store;
pub mod pg_store;
pub mod repo;
pub mod repo_types;
pub mod store;

pub use repo::{LookupKey, RepoError, UserRepository};

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
