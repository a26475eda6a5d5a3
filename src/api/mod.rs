//! API handlers for Shelfmark REST endpoints

pub mod auth;
pub mod books;
pub mod borrowings;
pub mod health;
pub mod openapi;
pub mod uploads;
pub mod users;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    services::ServeDir,
    trace::TraceLayer,
};

use crate::{error::AppError, models::user::Caller, services::auth::AccessDenied, AppState};

/// Slack on top of the file size for multipart framing and other fields
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Extractor for the authenticated caller, resolved from the bearer token
pub struct AuthenticatedUser(pub Caller);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = match parts.headers.get(AUTHORIZATION) {
            None => None,
            Some(value) => {
                let header = value.to_str().map_err(|_| AccessDenied::InvalidCredential)?;
                let token = header
                    .strip_prefix("Bearer ")
                    .ok_or(AccessDenied::InvalidCredential)?;
                Some(token)
            }
        };

        let caller = state.services.auth.resolve_caller(token).await?;
        Ok(AuthenticatedUser(caller))
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = state.services.uploads.max_file_size() + MULTIPART_OVERHEAD;
    let uploads = Router::new()
        .route("/upload/image", post(uploads::upload_image))
        .route("/upload/pdf", post(uploads::upload_pdf))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit));

    let api = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/profile", get(auth::get_profile).put(auth::update_profile))
        .route("/auth/change-password", put(auth::change_password))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book).put(books::update_book).delete(books::delete_book),
        )
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/users/:id/borrowings", get(borrowings::list_user_borrowings))
        // Borrowings
        .route(
            "/borrowings",
            get(borrowings::list_borrowings).post(borrowings::create_borrowing),
        )
        .route(
            "/borrowings/:id",
            get(borrowings::get_borrowing)
                .put(borrowings::extend_borrowing)
                .delete(borrowings::delete_borrowing),
        )
        .route("/borrowings/:id/approve", put(borrowings::approve_borrowing))
        .route("/borrowings/:id/reject", put(borrowings::reject_borrowing))
        .route("/borrowings/:id/return", put(borrowings::return_borrowing))
        .route("/borrowings/:id/calculate-fine", put(borrowings::calculate_fine))
        .merge(uploads)
        .with_state(state.clone());

    let files = ServeDir::new(&state.config.uploads.dir);

    Router::new()
        .nest("/api", api)
        .nest_service(&state.config.uploads.public_path, files)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
