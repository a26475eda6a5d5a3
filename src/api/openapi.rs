//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, borrowings, health, uploads, users};

/// Registers the bearer token scheme referenced by secured paths
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shelfmark API",
        version = "0.3.0",
        description = "Library lending REST API: catalog, members and borrowings"
    ),
    servers(
        (url = "/api", description = "API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::get_profile,
        auth::update_profile,
        auth::change_password,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        // Borrowings
        borrowings::list_borrowings,
        borrowings::list_user_borrowings,
        borrowings::get_borrowing,
        borrowings::create_borrowing,
        borrowings::approve_borrowing,
        borrowings::reject_borrowing,
        borrowings::return_borrowing,
        borrowings::calculate_fine,
        borrowings::extend_borrowing,
        borrowings::delete_borrowing,
        // Uploads
        uploads::upload_image,
        uploads::upload_pdf,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::MessageResponse,
            // Books
            crate::models::book::Book,
            crate::models::book::BookView,
            crate::models::book::BookSummary,
            crate::models::book::BookQuery,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Users
            crate::models::user::Role,
            crate::models::user::MembershipType,
            crate::models::user::User,
            crate::models::user::UserView,
            crate::models::user::UserSummary,
            crate::models::user::UserQuery,
            crate::models::user::RegisterUser,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            crate::models::user::UpdateProfile,
            crate::models::user::ChangePassword,
            // Borrowings
            crate::models::borrowing::BorrowingStatus,
            crate::models::borrowing::Borrowing,
            crate::models::borrowing::BorrowingDetails,
            crate::models::borrowing::BorrowingQuery,
            crate::models::borrowing::CreateBorrowing,
            crate::models::borrowing::ExtendBorrowing,
            // Uploads
            crate::services::uploads::StoredFile,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, login and own account"),
        (name = "books", description = "Book catalog"),
        (name = "users", description = "Member management"),
        (name = "borrowings", description = "Borrow requests, loans and fines"),
        (name = "uploads", description = "Cover image and PDF uploads")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
