//! Book catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::book::{BookQuery, BookView, CreateBook, UpdateBook},
    AppState,
};

use super::AuthenticatedUser;

/// List books
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    params(BookQuery),
    responses(
        (status = 200, description = "Books, newest first", body = Vec<BookView>)
    )
)]
pub async fn list_books(
    State(state): State<AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<Vec<BookView>>> {
    let books = state.services.catalog.search_books(&query).await?;
    Ok(Json(books))
}

/// Get book by ID
#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = BookView),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BookView>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = BookView),
        (status = 400, description = "Invalid data"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(book): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<BookView>)> {
    caller.require_admin()?;

    let created = state.services.catalog.create_book(book).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = BookView),
        (status = 400, description = "Invalid data or copy counts"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(changes): Json<UpdateBook>,
) -> AppResult<Json<BookView>> {
    caller.require_admin()?;

    let book = state.services.catalog.update_book(id, changes).await?;
    Ok(Json(book))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book has borrowed copies")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.require_admin()?;

    state.services.catalog.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
