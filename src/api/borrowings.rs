//! Borrowing lifecycle endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::borrowing::{BorrowingDetails, BorrowingQuery, CreateBorrowing, ExtendBorrowing},
    AppState,
};

use super::AuthenticatedUser;

/// List borrowings (members only see their own)
#[utoipa::path(
    get,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(BorrowingQuery),
    responses(
        (status = 200, description = "Borrowings, newest first", body = Vec<BorrowingDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_borrowings(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Query(query): Query<BorrowingQuery>,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    let borrowings = state.services.borrowings.list(&caller, &query).await?;
    Ok(Json(borrowings))
}

/// List all borrowings of one user
#[utoipa::path(
    get,
    path = "/users/{id}/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User's borrowings, newest first", body = Vec<BorrowingDetails>),
        (status = 403, description = "Not your account"),
        (status = 404, description = "User not found")
    )
)]
pub async fn list_user_borrowings(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    let borrowings = state
        .services
        .borrowings
        .list_for_user(&caller, user_id)
        .await?;
    Ok(Json(borrowings))
}

/// Get borrowing by ID
#[utoipa::path(
    get,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Borrowing details", body = BorrowingDetails),
        (status = 403, description = "Not your borrowing"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn get_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state.services.borrowings.get(&caller, id).await?;
    Ok(Json(borrowing))
}

/// Request to borrow a book
#[utoipa::path(
    post,
    path = "/borrowings",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    request_body = CreateBorrowing,
    responses(
        (status = 201, description = "Request created, pending approval", body = BorrowingDetails),
        (status = 400, description = "Due date in the past"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book unavailable or already requested")
    )
)]
pub async fn create_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<CreateBorrowing>,
) -> AppResult<(StatusCode, Json<BorrowingDetails>)> {
    let borrowing = state.services.borrowings.create(&caller, request).await?;
    Ok((StatusCode::CREATED, Json(borrowing)))
}

/// Approve a pending request
#[utoipa::path(
    put,
    path = "/borrowings/{id}/approve",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Book lent out", body = BorrowingDetails),
        (status = 400, description = "Request is not pending"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Borrowing not found"),
        (status = 409, description = "No copy left")
    )
)]
pub async fn approve_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingDetails>> {
    caller.require_admin()?;

    let borrowing = state.services.borrowings.approve(id).await?;
    Ok(Json(borrowing))
}

/// Reject a pending request
#[utoipa::path(
    put,
    path = "/borrowings/{id}/reject",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Request rejected", body = BorrowingDetails),
        (status = 400, description = "Request is not pending"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn reject_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingDetails>> {
    caller.require_admin()?;

    let borrowing = state.services.borrowings.reject(id).await?;
    Ok(Json(borrowing))
}

/// Return a borrowed book
#[utoipa::path(
    put,
    path = "/borrowings/{id}/return",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Book returned, fine settled", body = BorrowingDetails),
        (status = 400, description = "Book is not borrowed"),
        (status = 403, description = "Not your borrowing"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn return_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingDetails>> {
    let borrowing = state.services.borrowings.return_book(&caller, id).await?;
    Ok(Json(borrowing))
}

/// Record the fine owed so far on an overdue loan
#[utoipa::path(
    put,
    path = "/borrowings/{id}/calculate-fine",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    responses(
        (status = 200, description = "Fine recorded", body = BorrowingDetails),
        (status = 400, description = "Not borrowed or not overdue yet"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn calculate_fine(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BorrowingDetails>> {
    caller.require_admin()?;

    let borrowing = state.services.borrowings.calculate_fine(id).await?;
    Ok(Json(borrowing))
}

/// Extend the due date of a loan
#[utoipa::path(
    put,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    request_body = ExtendBorrowing,
    responses(
        (status = 200, description = "Due date updated", body = BorrowingDetails),
        (status = 400, description = "Date in the past or book not borrowed"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn extend_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(request): Json<ExtendBorrowing>,
) -> AppResult<Json<BorrowingDetails>> {
    caller.require_admin()?;

    let borrowing = state.services.borrowings.extend(id, request).await?;
    Ok(Json(borrowing))
}

/// Delete a borrowing record
#[utoipa::path(
    delete,
    path = "/borrowings/{id}",
    tag = "borrowings",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Borrowing ID")),
    responses(
        (status = 204, description = "Borrowing deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Borrowing not found")
    )
)]
pub async fn delete_borrowing(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.require_admin()?;

    state.services.borrowings.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
