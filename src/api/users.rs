//! User management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::user::{CreateUser, UpdateUser, UserQuery, UserView},
    AppState,
};

use super::AuthenticatedUser;

/// List users
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "Users, newest first", body = Vec<UserView>),
        (status = 403, description = "Admin only")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<Vec<UserView>>> {
    caller.require_admin()?;

    let users = state.services.users.search_users(&query).await?;
    Ok(Json(users.into_iter().map(UserView::from).collect()))
}

/// Get user by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = UserView),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<UserView>> {
    caller.require_self_or_admin(id)?;

    let user = state.services.users.get_by_id(id).await?;
    Ok(Json(user.into()))
}

/// Create a user
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = UserView),
        (status = 400, description = "Invalid data"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Membership ID or phone already registered")
    )
)]
pub async fn create_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(user): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    caller.require_admin()?;

    let created = state.services.users.create_user(user).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = UserView),
        (status = 400, description = "Invalid data"),
        (status = 403, description = "Not allowed"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Membership ID or phone already registered")
    )
)]
pub async fn update_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<UpdateUser>,
) -> AppResult<Json<UserView>> {
    let user = state.services.users.update_user(&caller, id, changes).await?;
    Ok(Json(user.into()))
}

/// Delete a user
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User still has borrowed books")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.require_admin()?;

    state.services.users.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
