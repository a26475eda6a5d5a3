//! Authentication and account endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::AppResult,
    models::user::{ChangePassword, RegisterUser, UpdateProfile, UserView},
    AppState,
};

use super::AuthenticatedUser;

/// Login request
#[derive(Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Membership ID (case-insensitive), also accepted as `userId`
    #[serde(alias = "userId")]
    #[validate(length(min = 1, message = "User ID and password are required"))]
    pub membership_id: String,
    #[validate(length(min = 1, message = "User ID and password are required"))]
    pub password: String,
}

/// Login response
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    /// JWT bearer token
    pub token: String,
    pub user: UserView,
}

/// Plain acknowledgement
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Register a new member account
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterUser,
    responses(
        (status = 201, description = "Account created", body = UserView),
        (status = 400, description = "Invalid data"),
        (status = 409, description = "Membership ID or phone already registered")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterUser>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let user = state.services.users.register(request).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Login with membership ID and password
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing credentials"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    request.validate()?;

    let (token, user) = state
        .services
        .auth
        .login(&request.membership_id, &request.password)
        .await?;

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

/// Get the current user's profile
#[utoipa::path(
    get,
    path = "/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = UserView),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> AppResult<Json<UserView>> {
    let user = state.services.users.get_by_id(caller.id).await?;
    Ok(Json(user.into()))
}

/// Update the current user's name, phone or address
#[utoipa::path(
    put,
    path = "/auth/profile",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = UpdateProfile,
    responses(
        (status = 200, description = "Profile updated", body = UserView),
        (status = 400, description = "Invalid data"),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Phone already registered")
    )
)]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(profile): Json<UpdateProfile>,
) -> AppResult<Json<UserView>> {
    let user = state.services.users.update_profile(&caller, profile).await?;
    Ok(Json(user.into()))
}

/// Change the current user's password
#[utoipa::path(
    put,
    path = "/auth/change-password",
    tag = "auth",
    security(("bearer_auth" = [])),
    request_body = ChangePassword,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password too short"),
        (status = 401, description = "Current password is incorrect")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<ChangePassword>,
) -> AppResult<Json<MessageResponse>> {
    state.services.users.change_password(caller.id, request).await?;
    Ok(Json(MessageResponse {
        message: "Password changed successfully".to_string(),
    }))
}
