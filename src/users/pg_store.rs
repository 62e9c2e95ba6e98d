use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use crate::users::{
    repo_types::{UserFilter, UserInput, UserPatch, UserRow},
    store::{StoreError, UserStore},
};

const SELECT_USERS: &str = "SELECT id, seq, username, password, name, lastname, email, \
     confirmed, blocked, status, revision, created_at, updated_at FROM users";

const RETURNING_USER: &str = " RETURNING id, seq, username, password, name, lastname, email, \
     confirmed, blocked, status, revision, created_at, updated_at";

const INSERT_USER: &str = "INSERT INTO users \
     (username, password, name, lastname, email, confirmed, blocked, status) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

fn select_where(column: &str) -> String {
    format!("{SELECT_USERS} WHERE {column} = $1")
}

/// PostgreSQL-backed store. Expects the `users` table from `migrations/`.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self))]
    async fn get_by_id(&self, id: Uuid) -> Result<Option<UserRow>, StoreError> {
        let sql = select_where("id");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let sql = select_where("username");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn scan(
        &self,
        filter: &UserFilter,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<UserRow>, StoreError> {
        let mut qb = build_scan_query(filter, skip, limit);
        let rows = qb.build_query_as::<UserRow>().fetch_all(&self.db).await?;
        Ok(rows)
    }

    #[instrument(skip(self, candidate), fields(username = %candidate.username))]
    async fn insert(&self, candidate: &UserInput) -> Result<UserRow, StoreError> {
        let sql = format!("{INSERT_USER}{RETURNING_USER}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&candidate.username)
            .bind(&candidate.password)
            .bind(&candidate.name)
            .bind(&candidate.lastname)
            .bind(&candidate.email)
            .bind(candidate.confirmed)
            .bind(candidate.blocked)
            .bind(candidate.status)
            .fetch_one(&self.db)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self, patch))]
    async fn find_and_update(
        &self,
        username: &str,
        patch: &UserPatch,
    ) -> Result<Option<UserRow>, StoreError> {
        let mut qb = build_update_query(username, patch);
        let row = qb
            .build_query_as::<UserRow>()
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    #[instrument(skip(self))]
    async fn find_and_delete(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        let sql = format!("DELETE FROM users WHERE username = $1{RETURNING_USER}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }
}

fn build_scan_query(
    filter: &UserFilter,
    skip: u32,
    limit: u32,
) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new(SELECT_USERS);
    let mut has_where = false;

    push_eq(&mut qb, &mut has_where, "username", filter.username.clone());
    push_eq(&mut qb, &mut has_where, "name", filter.name.clone());
    push_eq(&mut qb, &mut has_where, "lastname", filter.lastname.clone());
    push_eq(&mut qb, &mut has_where, "email", filter.email.clone());
    push_eq(&mut qb, &mut has_where, "confirmed", filter.confirmed);
    push_eq(&mut qb, &mut has_where, "blocked", filter.blocked);
    push_eq(&mut qb, &mut has_where, "status", filter.status);

    qb.push(" ORDER BY name ASC NULLS FIRST, seq ASC")
        .push(" LIMIT ")
        .push_bind(i64::from(limit))
        .push(" OFFSET ")
        .push_bind(i64::from(skip));
    qb
}

fn build_update_query(username: &str, patch: &UserPatch) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE users SET ");

    push_set(&mut qb, "username", patch.username.clone());
    push_set(&mut qb, "password", patch.password.clone());
    push_set(&mut qb, "name", patch.name.clone());
    push_set(&mut qb, "lastname", patch.lastname.clone());
    push_set(&mut qb, "email", patch.email.clone());
    push_set(&mut qb, "confirmed", patch.confirmed);
    push_set(&mut qb, "blocked", patch.blocked);
    push_set(&mut qb, "status", patch.status);

    // updated_at must strictly advance even if the clock does not
    qb.push(
        "revision = revision + 1, \
         updated_at = GREATEST(clock_timestamp(), updated_at + INTERVAL '1 microsecond')",
    )
    .push(" WHERE username = ")
    .push_bind(username.to_string())
    .push(RETURNING_USER);
    qb
}

fn push_eq<T>(
    qb: &mut QueryBuilder<'static, Postgres>,
    has_where: &mut bool,
    column: &str,
    value: Option<T>,
) where
    T: 'static + sqlx::Encode<'static, Postgres> + sqlx::Type<Postgres> + Send,
{
    let Some(value) = value else {
        return;
    };
    if *has_where {
        qb.push(" AND ");
    } else {
        qb.push(" WHERE ");
        *has_where = true;
    }
    qb.push(column).push(" = ").push_bind(value);
}

fn push_set<T>(qb: &mut QueryBuilder<'static, Postgres>, column: &str, value: Option<T>)
where
    T: 'static + sqlx::Encode<'static, Postgres> + sqlx::Type<Postgres> + Send,
{
    if let Some(value) = value {
        qb.push(column).push(" = ").push_bind(value).push(", ");
    }
}
