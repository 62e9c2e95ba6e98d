use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::instrument;
use uuid::Uuid;

use crate::users::{
    repo_types::{UserFilter, UserInput, UserPatch, UserRow},
    store::{StoreError, UserStore, USERNAME_UNIQUE_INDEX},
};

/// In-process store with the same constraints as the PostgreSQL one.
/// Every operation runs under a single lock, so each is atomic.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i64, UserRow>,
    by_id: HashMap<Uuid, i64>,
    by_username: HashMap<String, i64>,
    last_seq: i64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unique_violation() -> StoreError {
    StoreError::UniqueViolation {
        constraint: USERNAME_UNIQUE_INDEX.to_string(),
    }
}

/// `now`, or one microsecond past `prev` if the clock has not moved on.
fn next_updated_at(prev: OffsetDateTime) -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    let floor = prev + Duration::microseconds(1);
    if now > floor {
        now
    } else {
        floor
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRow>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_id
            .get(&id)
            .and_then(|seq| inner.rows.get(seq))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_username
            .get(username)
            .and_then(|seq| inner.rows.get(seq))
            .cloned())
    }

    #[instrument(skip(self))]
    async fn scan(
        &self,
        filter: &UserFilter,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<UserRow>, StoreError> {
        let inner = self.inner.read().await;
        // rows iterate in seq order; the stable sort keeps it within equal names
        let mut matched: Vec<&UserRow> =
            inner.rows.values().filter(|r| filter.matches(r)).collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(matched
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    #[instrument(skip(self, candidate), fields(username = %candidate.username))]
    async fn insert(&self, candidate: &UserInput) -> Result<UserRow, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.by_username.contains_key(&candidate.username) {
            return Err(unique_violation());
        }

        inner.last_seq += 1;
        let now = OffsetDateTime::now_utc();
        let row = UserRow {
            id: Uuid::new_v4(),
            seq: inner.last_seq,
            username: candidate.username.clone(),
            password: candidate.password.clone(),
            name: candidate.name.clone(),
            lastname: candidate.lastname.clone(),
            email: candidate.email.clone(),
            confirmed: candidate.confirmed,
            blocked: candidate.blocked,
            status: candidate.status,
            revision: 0,
            created_at: now,
            updated_at: now,
        };

        inner.by_id.insert(row.id, row.seq);
        inner.by_username.insert(row.username.clone(), row.seq);
        inner.rows.insert(row.seq, row.clone());
        Ok(row)
    }

    #[instrument(skip(self, patch))]
    async fn find_and_update(
        &self,
        username: &str,
        patch: &UserPatch,
    ) -> Result<Option<UserRow>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(&seq) = inner.by_username.get(username) else {
            return Ok(None);
        };

        if let Some(new_name) = &patch.username {
            if inner.by_username.get(new_name).is_some_and(|&other| other != seq) {
                return Err(unique_violation());
            }
        }

        let Some(row) = inner.rows.get_mut(&seq) else {
            return Ok(None);
        };
        patch.apply_to(row);
        row.revision += 1;
        row.updated_at = next_updated_at(row.updated_at);
        let updated = row.clone();

        if updated.username != username {
            inner.by_username.remove(username);
            inner.by_username.insert(updated.username.clone(), seq);
        }
        Ok(Some(updated))
    }

    #[instrument(skip(self))]
    async fn find_and_delete(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let mut inner = self.inner.write().await;
        let Some(seq) = inner.by_username.remove(username) else {
            return Ok(None);
        };
        let removed = inner.rows.remove(&seq);
        if let Some(row) = &removed {
            inner.by_id.remove(&row.id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(username: &str, name: Option<&str>) -> UserInput {
        UserInput {
            username: username.into(),
            password: "pw".into(),
            name: name.map(Into::into),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_username() {
        let store = MemoryUserStore::new();
        let row = store.insert(&input("alice", None)).await.unwrap();
        assert_eq!(row.created_at, row.updated_at);
        assert_eq!(row.revision, 0);

        let err = store.insert(&input("alice", None)).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::UniqueViolation { ref constraint } if constraint == USERNAME_UNIQUE_INDEX
        ));
    }

    #[tokio::test]
    async fn scan_orders_by_name_then_insertion() {
        let store = MemoryUserStore::new();
        store.insert(&input("u1", Some("Bob"))).await.unwrap();
        store.insert(&input("u2", Some("Alice"))).await.unwrap();
        store.insert(&input("u3", None)).await.unwrap();
        store.insert(&input("u4", Some("Alice"))).await.unwrap();

        let rows = store.scan(&UserFilter::default(), 0, 10).await.unwrap();
        let order: Vec<&str> = rows.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(order, vec!["u3", "u2", "u4", "u1"]);

        let page = store.scan(&UserFilter::default(), 1, 2).await.unwrap();
        let order: Vec<&str> = page.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(order, vec!["u2", "u4"]);
    }

    #[tokio::test]
    async fn update_bumps_revision_and_timestamp() {
        let store = MemoryUserStore::new();
        let before = store.insert(&input("alice", None)).await.unwrap();

        let patch = UserPatch {
            blocked: Some(true),
            ..Default::default()
        };
        let after = store
            .find_and_update("alice", &patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.revision, 1);
        assert!(after.updated_at > before.updated_at);
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.blocked, Some(true));
    }

    #[tokio::test]
    async fn rename_moves_username_index() {
        let store = MemoryUserStore::new();
        let row = store.insert(&input("alice", None)).await.unwrap();
        store.insert(&input("bob", None)).await.unwrap();

        let clash = UserPatch {
            username: Some("bob".into()),
            ..Default::default()
        };
        assert!(matches!(
            store.find_and_update("alice", &clash).await,
            Err(StoreError::UniqueViolation { .. })
        ));

        let rename = UserPatch {
            username: Some("carol".into()),
            ..Default::default()
        };
        store.find_and_update("alice", &rename).await.unwrap();
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        assert_eq!(
            store.find_by_username("carol").await.unwrap().map(|r| r.id),
            Some(row.id)
        );
    }

    #[tokio::test]
    async fn delete_clears_both_indexes() {
        let store = MemoryUserStore::new();
        let row = store.insert(&input("alice", None)).await.unwrap();

        let removed = store.find_and_delete("alice").await.unwrap().unwrap();
        assert_eq!(removed, row);
        assert!(store.get_by_id(row.id).await.unwrap().is_none());
        assert!(store.find_and_delete("alice").await.unwrap().is_none());

        // the username is free again
        store.insert(&input("alice", None)).await.unwrap();
    }
}
