use std::{fmt, sync::Arc};

use thiserror::Error;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::error::Problem;
use crate::users::{
    repo_types::{ProjectedUser, Projection, User, UserFilter, UserInput, UserPatch},
    store::{StoreError, UserStore},
};

/// Key a missing record was looked up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupKey {
    Id(Uuid),
    Username(String),
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKey::Id(id) => write!(f, "id {id}"),
            LookupKey::Username(username) => write!(f, "username {username}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("user not found: {key}")]
    NotFound { key: LookupKey },
    #[error("username already exists: {username}")]
    Conflict { username: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RepoError> for Problem {
    fn from(e: RepoError) -> Self {
        match &e {
            RepoError::NotFound { .. } => Problem::not_found(e.to_string()),
            RepoError::Conflict { .. } => Problem::conflict(e.to_string()),
            RepoError::InvalidInput(_) => Problem::bad_request(e.to_string()),
            RepoError::Store(inner) => {
                error!(error = %inner, "user store failure");
                Problem::internal("storage failure")
            }
        }
    }
}

/// A uniqueness violation raised by the store means `username` is taken.
fn conflict_or_store(e: StoreError, username: &str) -> RepoError {
    match e {
        StoreError::UniqueViolation { constraint } => {
            warn!(%username, %constraint, "store rejected duplicate username");
            RepoError::Conflict {
                username: username.to_string(),
            }
        }
        other => RepoError::Store(other),
    }
}

fn ensure_username(username: &str) -> Result<(), RepoError> {
    if username.is_empty() {
        return Err(RepoError::InvalidInput("username must not be empty".into()));
    }
    Ok(())
}

/// CRUD over users with `username` as the unique logical key.
///
/// Holds no state of its own; every call is forwarded to the injected store.
#[derive(Clone)]
pub struct UserRepository {
    store: Arc<dyn UserStore>,
}

impl UserRepository {
    pub fn new(store: Arc<dyn UserStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, candidate), fields(username = %candidate.username))]
    pub async fn create_user(&self, candidate: UserInput) -> Result<User, RepoError> {
        ensure_username(&candidate.username)?;

        if self
            .store
            .find_by_username(&candidate.username)
            .await?
            .is_some()
        {
            warn!("username already taken");
            return Err(RepoError::Conflict {
                username: candidate.username,
            });
        }

        let row = self
            .store
            .insert(&candidate)
            .await
            .map_err(|e| conflict_or_store(e, &candidate.username))?;
        debug!(id = %row.id, "user created");
        Ok(row.into())
    }

    #[instrument(skip(self))]
    pub async fn read_user(&self, id: Uuid) -> Result<User, RepoError> {
        match self.store.get_by_id(id).await? {
            Some(row) => Ok(row.into()),
            None => {
                debug!("user not found");
                Err(RepoError::NotFound {
                    key: LookupKey::Id(id),
                })
            }
        }
    }

    /// Matching users ordered by `name`, then paged with `skip` and `limit`.
    #[instrument(skip(self))]
    pub async fn read_users(
        &self,
        filter: &UserFilter,
        projection: &Projection,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<ProjectedUser>, RepoError> {
        let rows = self.store.scan(filter, skip, limit).await?;
        debug!(count = rows.len(), "users listed");
        Ok(rows
            .into_iter()
            .map(|row| projection.apply(User::from(row)))
            .collect())
    }

    #[instrument(skip(self, patch))]
    pub async fn update_user(&self, username: &str, patch: UserPatch) -> Result<User, RepoError> {
        let target = match &patch.username {
            Some(new_name) if new_name != username => {
                // a missing record wins over any problem with the new name
                if self.store.find_by_username(username).await?.is_none() {
                    warn!("update target missing");
                    return Err(RepoError::NotFound {
                        key: LookupKey::Username(username.to_string()),
                    });
                }
                ensure_username(new_name)?;
                if self.store.find_by_username(new_name).await?.is_some() {
                    warn!(%new_name, "rename collides with an existing user");
                    return Err(RepoError::Conflict {
                        username: new_name.clone(),
                    });
                }
                new_name.as_str()
            }
            _ => username,
        };

        let updated = self
            .store
            .find_and_update(username, &patch)
            .await
            .map_err(|e| conflict_or_store(e, target))?;

        match updated {
            Some(row) => {
                debug!(id = %row.id, "user updated");
                Ok(row.into())
            }
            None => {
                warn!("update target missing");
                Err(RepoError::NotFound {
                    key: LookupKey::Username(username.to_string()),
                })
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_user(&self, username: &str) -> Result<User, RepoError> {
        match self.store.find_and_delete(username).await? {
            Some(row) => {
                debug!(id = %row.id, "user deleted");
                Ok(row.into())
            }
            None => {
                warn!("delete target missing");
                Err(RepoError::NotFound {
                    key: LookupKey::Username(username.to_string()),
                })
            }
        }
    }
}
