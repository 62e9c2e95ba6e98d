use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::users::repo_types::{UserFilter, UserInput, UserPatch, UserRow};

/// Name of the unique index guarding `username`.
pub const USERNAME_UNIQUE_INDEX: &str = "users_username_key";

const UNIQUE_VIOLATION: &str = "23505";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let constraint = db_err
                    .constraint()
                    .unwrap_or(USERNAME_UNIQUE_INDEX)
                    .to_string();
                return StoreError::UniqueViolation { constraint };
            }
        }
        StoreError::Database(e)
    }
}

/// Durable keyed store for user rows.
///
/// Implementations must enforce uniqueness of `username` themselves and
/// report a collision as [`StoreError::UniqueViolation`].
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRow>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError>;

    /// Rows matching `filter`, ordered by `name` ascending (missing names
    /// first, ties by insertion order), then `skip`, then `limit`.
    async fn scan(
        &self,
        filter: &UserFilter,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<UserRow>, StoreError>;

    /// Insert with a store-generated id and timestamps.
    async fn insert(&self, candidate: &UserInput) -> Result<UserRow, StoreError>;

    /// Merge `patch` into the row owning `username`, bump its revision and
    /// refresh `updated_at`. `None` when no such row exists.
    async fn find_and_update(
        &self,
        username: &str,
        patch: &UserPatch,
    ) -> Result<Option<UserRow>, StoreError>;

    /// Remove the row owning `username` and return it as it was.
    async fn find_and_delete(&self, username: &str) -> Result<Option<UserRow>, StoreError>;
}
