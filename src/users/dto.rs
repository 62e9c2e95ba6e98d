use serde::Deserialize;

use crate::users::repo_types::UserFilter;

/// Query string for `GET /users`.
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    /// `name,email` to include, `-password,-email` to exclude.
    pub fields: Option<String>,

    pub username: Option<String>,
    pub name: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub confirmed: Option<bool>,
    pub blocked: Option<bool>,
    pub status: Option<bool>,
}

impl ListUsersQuery {
    pub fn filter(&self) -> UserFilter {
        UserFilter {
            username: self.username.clone(),
            name: self.name.clone(),
            lastname: self.lastname.clone(),
            email: self.email.clone(),
            confirmed: self.confirmed,
            blocked: self.blocked,
            status: self.status,
        }
    }

    /// Requested page size, falling back to `default` and capped at `max`.
    pub fn page_size(&self, default: u32, max: u32) -> u32 {
        self.limit.unwrap_or(default).min(max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_defaults_and_caps() {
        let q = ListUsersQuery::default();
        assert_eq!(q.page_size(20, 100), 20);

        let q = ListUsersQuery {
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(q.page_size(20, 100), 100);

        let q = ListUsersQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(q.page_size(20, 100), 0);
    }

    #[test]
    fn filter_copies_query_fields() {
        let q = ListUsersQuery {
            name: Some("Ann".into()),
            blocked: Some(false),
            ..Default::default()
        };
        assert_eq!(
            q.filter(),
            UserFilter {
                name: Some("Ann".into()),
                blocked: Some(false),
                ..Default::default()
            }
        );
    }
}
