use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{error::Problem, state::AppState};

use super::dto::ListUsersQuery;
use super::repo_types::{ProjectedUser, Projection, User, UserInput, UserPatch};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        // GET takes an id, PATCH and DELETE take a username
        .route(
            "/users/:key",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[instrument(skip(state, body), fields(username = %body.username))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<UserInput>,
) -> Result<impl IntoResponse, Problem> {
    let user = state.users.create_user(body).await?;
    let location = format!("/users/{}", user.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(user)))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    Query(q): Query<ListUsersQuery>,
) -> Result<Json<Vec<ProjectedUser>>, Problem> {
    let projection = match q.fields.as_deref() {
        Some(spec) => Projection::parse(spec).map_err(|e| Problem::bad_request(e.to_string()))?,
        None => Projection::All,
    };
    let limits = &state.config.users;
    let limit = q.page_size(limits.default_limit, limits.max_limit);

    let users = state
        .users
        .read_users(&q.filter(), &projection, q.skip.unwrap_or(0), limit)
        .await?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<User>, Problem> {
    let id = Uuid::parse_str(&key)
        .map_err(|_| Problem::bad_request(format!("invalid user id: {key}")))?;
    Ok(Json(state.users.read_user(id).await?))
}

#[instrument(skip(state, patch))]
pub async fn update_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>, Problem> {
    Ok(Json(state.users.update_user(&username, patch).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<User>, Problem> {
    Ok(Json(state.users.delete_user(&username).await?))
}
