//! File upload endpoints

use axum::{extract::State, Json};
use axum_extra::extract::Multipart;

use crate::{
    error::{AppError, AppResult},
    services::uploads::{StoredFile, UploadKind},
    AppState,
};

use super::AuthenticatedUser;

/// Find the file field for `kind` and hand it to the uploads service
async fn store_field(state: &AppState, kind: UploadKind, mut multipart: Multipart) -> AppResult<StoredFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(kind.field_name()) {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;

        return state
            .services
            .uploads
            .store(kind, file_name.as_deref(), content_type.as_deref(), &data)
            .await;
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}

/// Upload a cover image
#[utoipa::path(
    post,
    path = "/upload/image",
    tag = "uploads",
    security(("bearer_auth" = [])),
    request_body(content = String, content_type = "multipart/form-data", description = "Image file in the `image` field"),
    responses(
        (status = 200, description = "Image stored", body = StoredFile),
        (status = 400, description = "Missing, oversized or non-image file"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<Json<StoredFile>> {
    caller.require_admin()?;

    let stored = store_field(&state, UploadKind::Image, multipart).await?;
    Ok(Json(stored))
}

/// Upload a PDF copy of a book
#[utoipa::path(
    post,
    path = "/upload/pdf",
    tag = "uploads",
    security(("bearer_auth" = [])),
    request_body(content = String, content_type = "multipart/form-data", description = "PDF file in the `pdf` field"),
    responses(
        (status = 200, description = "PDF stored", body = StoredFile),
        (status = 400, description = "Missing, oversized or non-PDF file"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn upload_pdf(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<Json<StoredFile>> {
    caller.require_admin()?;

    let stored = store_field(&state, UploadKind::Pdf, multipart).await?;
    Ok(Json(stored))
}
