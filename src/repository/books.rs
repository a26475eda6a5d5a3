//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::BooksStore;
use crate::{
    error::{AppError, AppResult},
    models::book::{Book, BookQuery, NewBook, UpdateBook},
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn like_pattern(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| format!("%{}%", v))
}

#[async_trait]
impl BooksStore for BooksRepository {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn search(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT * FROM books
            WHERE ($1::text IS NULL OR title ILIKE $1 OR author ILIKE $1 OR isbn ILIKE $1)
              AND ($2::text IS NULL OR genre ILIKE $2)
              AND ($3 = FALSE OR available_copies > 0)
            ORDER BY created_at DESC
            "#,
        )
        .bind(like_pattern(&query.search))
        .bind(like_pattern(&query.genre))
        .bind(query.available.unwrap_or(false))
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn create(&self, book: NewBook) -> AppResult<Book> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (id, title, author, isbn, genre, publication_year, publisher,
                               description, total_copies, available_copies, cover_image, pdf_file)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&book.title)
        .bind(&book.author)
        .bind(&book.isbn)
        .bind(&book.genre)
        .bind(book.publication_year)
        .bind(&book.publisher)
        .bind(&book.description)
        .bind(book.total_copies)
        .bind(book.available_copies)
        .bind(&book.cover_image)
        .bind(&book.pdf_file)
        .fetch_one(&self.pool)
        .await?;

        Ok(book)
    }

    async fn update(&self, id: Uuid, changes: &UpdateBook) -> AppResult<Book> {
        let mut tx = self.pool.begin().await?;

        // Row lock keeps concurrent approvals from racing the copy count check
        let current = sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| not_found(id))?;

        let borrowed: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrowings WHERE book_id = $1 AND status = 'borrowed'",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let (total, available) = current
            .apply_copy_changes(changes.total_copies, changes.available_copies, borrowed as i32)
            .map_err(AppError::Validation)?;

        let book = sqlx::query_as::<_, Book>(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                isbn = COALESCE($4, isbn),
                genre = COALESCE($5, genre),
                publication_year = COALESCE($6, publication_year),
                publisher = COALESCE($7, publisher),
                description = COALESCE($8, description),
                cover_image = COALESCE($9, cover_image),
                pdf_file = COALESCE($10, pdf_file),
                total_copies = $11,
                available_copies = $12,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(changes.title.as_deref().map(str::trim))
        .bind(changes.author.as_deref().map(str::trim))
        .bind(changes.isbn.as_deref().map(str::trim))
        .bind(changes.genre.as_deref().map(str::trim))
        .bind(changes.publication_year)
        .bind(&changes.publisher)
        .bind(&changes.description)
        .bind(&changes.cover_image)
        .bind(&changes.pdf_file)
        .bind(total)
        .bind(available)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(book)
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }

        Ok(())
    }

    async fn take_copy(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies - 1, updated_at = NOW()
            WHERE id = $1 AND available_copies > 0
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_copy(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE books SET available_copies = available_copies + 1, updated_at = NOW()
            WHERE id = $1 AND available_copies < total_copies
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
