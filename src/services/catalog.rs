//! Book catalog service

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookQuery, BookView, CreateBook, NewBook, UpdateBook},
        borrowing::{BorrowingFilter, BorrowingStatus},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Search books, newest first
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<Vec<BookView>> {
        let books = self.repository.books.search(query).await?;
        Ok(books.into_iter().map(BookView::from).collect())
    }

    /// Get book by ID
    pub async fn get_book(&self, id: Uuid) -> AppResult<BookView> {
        self.repository.books.get_by_id(id).await.map(BookView::from)
    }

    /// Create a new book
    pub async fn create_book(&self, book: CreateBook) -> AppResult<BookView> {
        book.validate()?;
        let book = NewBook::try_from(book).map_err(AppError::Validation)?;

        let created = self.repository.books.create(book).await?;
        tracing::info!(book_id = %created.id, title = %created.title, "Book created");

        Ok(created.into())
    }

    /// Update an existing book
    pub async fn update_book(&self, id: Uuid, changes: UpdateBook) -> AppResult<BookView> {
        changes.validate()?;
        self.repository.books.update(id, &changes).await.map(BookView::from)
    }

    /// Delete a book; refused while any copy is borrowed
    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        self.repository.books.get_by_id(id).await?;

        let active = self
            .repository
            .borrowings
            .count(&BorrowingFilter {
                book_id: Some(id),
                status: Some(BorrowingStatus::Borrowed),
                ..Default::default()
            })
            .await?;
        if active > 0 {
            tracing::warn!(book_id = %id, active, "Book deletion refused: copies still borrowed");
            return Err(AppError::Conflict(
                "Cannot delete book with active borrowings".to_string(),
            ));
        }

        self.repository.books.delete(id).await?;
        tracing::info!(book_id = %id, "Book deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(title: &str, genre: &str, copies: i32) -> CreateBook {
        CreateBook {
            title: title.to_string(),
            author: "Ursula K. Le Guin".to_string(),
            isbn: format!("978-{}", title.len()),
            genre: genre.to_string(),
            publication_year: 1969,
            publisher: None,
            description: None,
            total_copies: Some(copies),
            available_copies: None,
            cover_image: None,
            pdf_file: None,
        }
    }

    #[tokio::test]
    async fn test_search_filters_and_orders_newest_first() {
        let catalog = CatalogService::new(Repository::in_memory());
        catalog.create_book(create("The Left Hand of Darkness", "Science Fiction", 2)).await.unwrap();
        catalog.create_book(create("A Wizard of Earthsea", "Fantasy", 1)).await.unwrap();
        let tombs = catalog.create_book(create("The Tombs of Atuan", "fantasy", 1)).await.unwrap();

        let all = catalog.search_books(&BookQuery::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].book.id, tombs.book.id);

        let fantasy = catalog
            .search_books(&BookQuery {
                genre: Some("FANTASY".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fantasy.len(), 2);

        let by_title = catalog
            .search_books(&BookQuery {
                search: Some("earthsea".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].book.title, "A Wizard of Earthsea");
    }

    #[tokio::test]
    async fn test_available_filter() {
        let catalog = CatalogService::new(Repository::in_memory());
        let lent = catalog.create_book(create("Lent out", "Fantasy", 1)).await.unwrap();
        catalog.create_book(create("On shelf", "Fantasy", 1)).await.unwrap();
        catalog
            .update_book(
                lent.book.id,
                UpdateBook {
                    available_copies: Some(0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let available = catalog
            .search_books(&BookQuery {
                available: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].book.title, "On shelf");
        assert!(available[0].is_available);
    }

    #[tokio::test]
    async fn test_update_rejects_broken_copy_counts() {
        let catalog = CatalogService::new(Repository::in_memory());
        let book = catalog.create_book(create("Dune", "Science Fiction", 2)).await.unwrap();

        let err = catalog
            .update_book(
                book.book.id,
                UpdateBook {
                    available_copies: Some(3),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let grown = catalog
            .update_book(
                book.book.id,
                UpdateBook {
                    total_copies: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(grown.book.total_copies, 5);
        assert_eq!(grown.book.available_copies, 5);
    }

    #[tokio::test]
    async fn test_create_validates_required_fields() {
        let catalog = CatalogService::new(Repository::in_memory());
        let err = catalog.create_book(create("", "Fantasy", 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut too_many = create("Dune", "Science Fiction", 1);
        too_many.available_copies = Some(2);
        let err = catalog.create_book(too_many).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_book() {
        let catalog = CatalogService::new(Repository::in_memory());
        let err = catalog.delete_book(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
