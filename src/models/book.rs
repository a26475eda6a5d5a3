//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Book as persisted in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub genre: String,
    pub publication_year: i32,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub cover_image: Option<String>,
    pub pdf_file: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }

    /// Copies currently lent out
    pub fn reserved_copies(&self) -> i32 {
        self.total_copies - self.available_copies
    }

    /// Resolve new (total, available) copy counts for an update.
    ///
    /// Changing only the total shifts the available count by the same amount.
    /// Whatever the request, `total - available` may not drop below the
    /// `borrowed` copies actually lent out.
    pub fn apply_copy_changes(
        &self,
        total_copies: Option<i32>,
        available_copies: Option<i32>,
        borrowed: i32,
    ) -> Result<(i32, i32), String> {
        let total = total_copies.unwrap_or(self.total_copies);
        let available = match (total_copies, available_copies) {
            (_, Some(available)) => available,
            (Some(total), None) => self.available_copies + (total - self.total_copies),
            (None, None) => self.available_copies,
        };

        if total < 1 {
            return Err("Total copies must be at least 1".to_string());
        }
        if available < 0 {
            return Err(format!(
                "Cannot reduce total copies below the {} copies currently borrowed",
                self.reserved_copies()
            ));
        }
        if available > total {
            return Err("Available copies cannot exceed total copies".to_string());
        }
        if total - available < borrowed {
            return Err(format!(
                "{} copies are currently borrowed, at most {} can be available",
                borrowed,
                (total - borrowed).max(0)
            ));
        }
        Ok((total, available))
    }
}

/// Book with derived fields, as returned by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookView {
    #[serde(flatten)]
    pub book: Book,
    pub is_available: bool,
}

impl From<Book> for BookView {
    fn from(book: Book) -> Self {
        let is_available = book.is_available();
        Self { book, is_available }
    }
}

/// Short book representation embedded in borrowing views
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub genre: String,
    pub cover_image: Option<String>,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            genre: book.genre.clone(),
            cover_image: book.cover_image.clone(),
        }
    }
}

/// Book query parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct BookQuery {
    /// Case-insensitive substring match on title, author or ISBN
    pub search: Option<String>,
    /// Case-insensitive substring match on genre
    pub genre: Option<String>,
    /// Only books with at least one available copy
    pub available: Option<bool>,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    #[validate(length(min = 1, message = "Genre is required"))]
    pub genre: String,
    pub publication_year: i32,
    pub publisher: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: Option<i32>,
    #[validate(range(min = 0, message = "Available copies cannot be negative"))]
    pub available_copies: Option<i32>,
    pub cover_image: Option<String>,
    pub pdf_file: Option<String>,
}

/// Update book request, absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    #[validate(length(min = 1, message = "ISBN cannot be empty"))]
    pub isbn: Option<String>,
    #[validate(length(min = 1, message = "Genre cannot be empty"))]
    pub genre: Option<String>,
    pub publication_year: Option<i32>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Total copies must be at least 1"))]
    pub total_copies: Option<i32>,
    #[validate(range(min = 0, message = "Available copies cannot be negative"))]
    pub available_copies: Option<i32>,
    pub cover_image: Option<String>,
    pub pdf_file: Option<String>,
}

/// Book record ready to be inserted
#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub genre: String,
    pub publication_year: i32,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub total_copies: i32,
    pub available_copies: i32,
    pub cover_image: Option<String>,
    pub pdf_file: Option<String>,
}

impl TryFrom<CreateBook> for NewBook {
    type Error = String;

    fn try_from(book: CreateBook) -> Result<Self, Self::Error> {
        let total_copies = book.total_copies.unwrap_or(1);
        let available_copies = book.available_copies.unwrap_or(total_copies);
        if total_copies < 1 {
            return Err("Total copies must be at least 1".to_string());
        }
        if available_copies < 0 || available_copies > total_copies {
            return Err("Available copies must be between 0 and total copies".to_string());
        }

        Ok(Self {
            title: book.title.trim().to_string(),
            author: book.author.trim().to_string(),
            isbn: book.isbn.trim().to_string(),
            genre: book.genre.trim().to_string(),
            publication_year: book.publication_year,
            publisher: book.publisher,
            description: book.description,
            total_copies,
            available_copies,
            cover_image: book.cover_image,
            pdf_file: book.pdf_file,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(total: i32, available: i32) -> Book {
        let now = Utc::now();
        Book {
            id: Uuid::new_v4(),
            title: "1984".into(),
            author: "George Orwell".into(),
            isbn: "978-0-452-28423-4".into(),
            genre: "Dystopian".into(),
            publication_year: 1949,
            publisher: None,
            description: None,
            total_copies: total,
            available_copies: available,
            cover_image: None,
            pdf_file: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_total_change_shifts_available() {
        let b = book(3, 1);
        assert_eq!(b.apply_copy_changes(Some(5), None, 2), Ok((5, 3)));
        assert_eq!(b.apply_copy_changes(Some(2), None, 2), Ok((2, 0)));
        assert!(b.apply_copy_changes(Some(1), None, 2).is_err());
    }

    #[test]
    fn test_explicit_available_must_fit_total() {
        let b = book(3, 3);
        assert_eq!(b.apply_copy_changes(None, Some(1), 0), Ok((3, 1)));
        assert!(b.apply_copy_changes(None, Some(4), 0).is_err());
        assert!(b.apply_copy_changes(Some(0), None, 0).is_err());
    }

    #[test]
    fn test_borrowed_copies_cannot_be_made_available() {
        let b = book(3, 1);
        assert!(b.apply_copy_changes(None, Some(3), 2).is_err());
        assert!(b.apply_copy_changes(None, Some(2), 2).is_err());
        assert_eq!(b.apply_copy_changes(None, Some(1), 2), Ok((3, 1)));

        // Counts that drifted upward cannot hide lent copies on a shrink
        let drifted = book(3, 3);
        assert!(drifted.apply_copy_changes(Some(2), Some(2), 1).is_err());
        assert_eq!(drifted.apply_copy_changes(Some(2), Some(1), 1), Ok((2, 1)));
    }

    #[test]
    fn test_new_book_defaults_available_to_total() {
        let create = CreateBook {
            title: " Dune ".into(),
            author: "Frank Herbert".into(),
            isbn: "978-0441013593".into(),
            genre: "Science Fiction".into(),
            publication_year: 1965,
            publisher: None,
            description: None,
            total_copies: Some(4),
            available_copies: None,
            cover_image: None,
            pdf_file: None,
        };
        let new_book = NewBook::try_from(create).unwrap();
        assert_eq!(new_book.title, "Dune");
        assert_eq!(new_book.available_copies, 4);
    }

    #[test]
    fn test_view_derives_availability() {
        assert!(BookView::from(book(2, 1)).is_available);
        assert!(!BookView::from(book(2, 0)).is_available);
    }
}
