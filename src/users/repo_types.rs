use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// User row as persisted by a store, including storage metadata.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub seq: i64, // natural insertion order, tie-breaker for scans
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub confirmed: Option<bool>,
    pub blocked: Option<bool>,
    pub status: Option<bool>,
    pub revision: i64, // bumped on every update, never exposed
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Externally visible user record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String, // stored as provided, never rendered
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub confirmed: Option<bool>,
    pub blocked: Option<bool>,
    pub status: Option<bool>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            password: r.password,
            name: r.name,
            lastname: r.lastname,
            email: r.email,
            confirmed: r.confirmed,
            blocked: r.blocked,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Candidate for a new user.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInput {
    pub username: String,
    pub password: String,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub confirmed: Option<bool>,
    pub blocked: Option<bool>,
    pub status: Option<bool>,
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub confirmed: Option<bool>,
    pub blocked: Option<bool>,
    pub status: Option<bool>,
}

impl UserPatch {
    /// Merge present fields into `row`. Does not touch metadata or timestamps.
    pub fn apply_to(&self, row: &mut UserRow) {
        if let Some(v) = &self.username {
            row.username = v.clone();
        }
        if let Some(v) = &self.password {
            row.password = v.clone();
        }
        if let Some(v) = &self.name {
            row.name = Some(v.clone());
        }
        if let Some(v) = &self.lastname {
            row.lastname = Some(v.clone());
        }
        if let Some(v) = &self.email {
            row.email = Some(v.clone());
        }
        if let Some(v) = self.confirmed {
            row.confirmed = Some(v);
        }
        if let Some(v) = self.blocked {
            row.blocked = Some(v);
        }
        if let Some(v) = self.status {
            row.status = Some(v);
        }
    }
}

/// Equality filter for scans. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub username: Option<String>,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub confirmed: Option<bool>,
    pub blocked: Option<bool>,
    pub status: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, row: &UserRow) -> bool {
        fn eq<T: PartialEq>(want: &Option<T>, have: Option<&T>) -> bool {
            want.as_ref().map_or(true, |w| have == Some(w))
        }
        eq(&self.username, Some(&row.username))
            && eq(&self.name, row.name.as_ref())
            && eq(&self.lastname, row.lastname.as_ref())
            && eq(&self.email, row.email.as_ref())
            && eq(&self.confirmed, row.confirmed.as_ref())
            && eq(&self.blocked, row.blocked.as_ref())
            && eq(&self.status, row.status.as_ref())
    }
}

/// Attribute of the external user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    Id,
    Username,
    Password,
    Name,
    Lastname,
    Email,
    Confirmed,
    Blocked,
    Status,
    CreatedAt,
    UpdatedAt,
}

impl UserField {
    pub fn as_str(self) -> &'static str {
        match self {
            UserField::Id => "id",
            UserField::Username => "username",
            UserField::Password => "password",
            UserField::Name => "name",
            UserField::Lastname => "lastname",
            UserField::Email => "email",
            UserField::Confirmed => "confirmed",
            UserField::Blocked => "blocked",
            UserField::Status => "status",
            UserField::CreatedAt => "createdAt",
            UserField::UpdatedAt => "updatedAt",
        }
    }
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("unknown user field: {0}")]
    UnknownField(String),
    #[error("projection cannot mix included and excluded fields")]
    Mixed,
}

impl FromStr for UserField {
    type Err = ProjectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "id" => UserField::Id,
            "username" => UserField::Username,
            "password" => UserField::Password,
            "name" => UserField::Name,
            "lastname" => UserField::Lastname,
            "email" => UserField::Email,
            "confirmed" => UserField::Confirmed,
            "blocked" => UserField::Blocked,
            "status" => UserField::Status,
            "createdAt" => UserField::CreatedAt,
            "updatedAt" => UserField::UpdatedAt,
            other => return Err(ProjectionError::UnknownField(other.to_string())),
        })
    }
}

/// Field selector applied to list reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Projection {
    #[default]
    All,
    /// Only these fields, plus `id`.
    Include(Vec<UserField>),
    /// Every field except these. `id` may be excluded here.
    Exclude(Vec<UserField>),
}

impl Projection {
    /// Parse `"name,email"` (include) or `"-password,-email"` (exclude).
    pub fn parse(spec: &str) -> Result<Self, ProjectionError> {
        let parts: Vec<&str> = spec
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            return Ok(Projection::All);
        }

        let excluded = parts.iter().filter(|p| p.starts_with('-')).count();
        if excluded == parts.len() {
            let fields = parts
                .iter()
                .map(|p| p[1..].parse())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Projection::Exclude(fields))
        } else if excluded == 0 {
            let fields = parts
                .iter()
                .map(|p| p.parse())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Projection::Include(fields))
        } else {
            Err(ProjectionError::Mixed)
        }
    }

    pub fn keeps(&self, field: UserField) -> bool {
        match self {
            Projection::All => true,
            Projection::Include(fields) => field == UserField::Id || fields.contains(&field),
            Projection::Exclude(fields) => !fields.contains(&field),
        }
    }

    pub fn apply(&self, user: User) -> ProjectedUser {
        fn pick<T>(keep: bool, v: T) -> Option<T> {
            keep.then_some(v)
        }
        ProjectedUser {
            id: pick(self.keeps(UserField::Id), user.id),
            username: pick(self.keeps(UserField::Username), user.username),
            password: pick(self.keeps(UserField::Password), user.password),
            name: pick(self.keeps(UserField::Name), user.name).flatten(),
            lastname: pick(self.keeps(UserField::Lastname), user.lastname).flatten(),
            email: pick(self.keeps(UserField::Email), user.email).flatten(),
            confirmed: pick(self.keeps(UserField::Confirmed), user.confirmed).flatten(),
            blocked: pick(self.keeps(UserField::Blocked), user.blocked).flatten(),
            status: pick(self.keeps(UserField::Status), user.status).flatten(),
            created_at: pick(self.keeps(UserField::CreatedAt), user.created_at),
            updated_at: pick(self.keeps(UserField::UpdatedAt), user.updated_at),
        }
    }
}

/// User record after a projection. Missing attributes are omitted from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectedUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<bool>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub created_at: Option<OffsetDateTime>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub updated_at: Option<OffsetDateTime>,
}
