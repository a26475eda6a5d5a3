//! Borrowings repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{postgres::PgRow, FromRow, Pool, Postgres, Row};
use uuid::Uuid;

use super::{unique_violation, BorrowingsStore, StatusChange};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::BookSummary,
        borrowing::{Borrowing, BorrowingDetails, BorrowingFilter, BorrowingStatus, NewBorrowing},
        user::UserSummary,
    },
};

/// Partial unique index over (user_id, book_id) for pending and borrowed records
const OPEN_REQUEST_INDEX: &str = "borrowings_open_request_idx";

const DETAILS_SELECT: &str = r#"
    SELECT b.*,
           u.name AS user_name, u.phone AS user_phone, u.membership_id AS user_membership_id,
           bk.title AS book_title, bk.author AS book_author, bk.isbn AS book_isbn,
           bk.genre AS book_genre, bk.cover_image AS book_cover_image
    FROM borrowings b
    LEFT JOIN users u ON b.user_id = u.id
    LEFT JOIN books bk ON b.book_id = bk.id
"#;

const FILTER_WHERE: &str = r#"
    WHERE ($1::text IS NULL OR b.status = $1)
      AND ($2::uuid IS NULL OR b.user_id = $2)
      AND ($3::uuid IS NULL OR b.book_id = $3)
      AND ($4::timestamptz IS NULL OR (b.status = 'borrowed' AND b.due_date < $4))
"#;

#[derive(Clone)]
pub struct BorrowingsRepository {
    pool: Pool<Postgres>,
}

impl BorrowingsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Borrowing with id {} not found", id))
}

/// Build a joined view from a `DETAILS_SELECT` row
fn details_from_row(row: &PgRow, now: DateTime<Utc>) -> AppResult<BorrowingDetails> {
    let borrowing = Borrowing::from_row(row)?;

    let user = match row.try_get::<Option<String>, _>("user_name")? {
        Some(name) => Some(UserSummary {
            id: borrowing.user_id,
            name,
            phone: row.try_get("user_phone")?,
            membership_id: row.try_get("user_membership_id")?,
        }),
        None => None,
    };

    let book = match row.try_get::<Option<String>, _>("book_title")? {
        Some(title) => Some(BookSummary {
            id: borrowing.book_id,
            title,
            author: row.try_get("book_author")?,
            isbn: row.try_get("book_isbn")?,
            genre: row.try_get("book_genre")?,
            cover_image: row.try_get("book_cover_image")?,
        }),
        None => None,
    };

    Ok(BorrowingDetails::new(borrowing, user, book, now))
}

#[async_trait]
impl BorrowingsStore for BorrowingsRepository {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>("SELECT * FROM borrowings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn get_details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<BorrowingDetails> {
        let row = sqlx::query(&format!("{} WHERE b.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))?;

        details_from_row(&row, now)
    }

    async fn list_details(&self, filter: &BorrowingFilter, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let rows = sqlx::query(&format!(
            "{} {} ORDER BY b.created_at DESC",
            DETAILS_SELECT, FILTER_WHERE
        ))
        .bind(filter.status)
        .bind(filter.user_id)
        .bind(filter.book_id)
        .bind(filter.overdue_at)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(|row| details_from_row(row, now)).collect()
    }

    async fn count(&self, filter: &BorrowingFilter) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM borrowings b {}", FILTER_WHERE))
            .bind(filter.status)
            .bind(filter.user_id)
            .bind(filter.book_id)
            .bind(filter.overdue_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn has_open_request(&self, user_id: Uuid, book_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM borrowings
                WHERE user_id = $1 AND book_id = $2 AND status IN ('pending', 'borrowed')
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn token_exists(&self, token_number: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM borrowings WHERE token_number = $1)")
                .bind(token_number)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn create(&self, borrowing: NewBorrowing) -> AppResult<Borrowing> {
        sqlx::query_as::<_, Borrowing>(
            r#"
            INSERT INTO borrowings (id, user_id, book_id, token_number, due_date, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(borrowing.user_id)
        .bind(borrowing.book_id)
        .bind(&borrowing.token_number)
        .bind(borrowing.due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(constraint) if constraint == OPEN_REQUEST_INDEX => AppError::Conflict(
                "You already have a pending request or loan for this book".to_string(),
            ),
            Some(_) => AppError::Conflict("Token number already in use".to_string()),
            None => AppError::Database(e),
        })
    }

    async fn transition(&self, id: Uuid, from: BorrowingStatus, change: StatusChange) -> AppResult<Option<Borrowing>> {
        let borrowing = sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings SET
                status = $2,
                borrow_date = COALESCE($3, borrow_date),
                return_date = COALESCE($4, return_date),
                fine = COALESCE($5, fine),
                updated_at = NOW()
            WHERE id = $1 AND status = $6
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(change.status)
        .bind(change.borrow_date)
        .bind(change.return_date)
        .bind(change.fine)
        .bind(from)
        .fetch_optional(&self.pool)
        .await?;

        Ok(borrowing)
    }

    async fn revert_approval(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE borrowings SET status = 'pending', borrow_date = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'borrowed'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn extend(&self, id: Uuid, due_date: DateTime<Utc>, notes: Option<String>) -> AppResult<Option<Borrowing>> {
        let borrowing = sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings SET due_date = $2, notes = COALESCE($3, notes), updated_at = NOW()
            WHERE id = $1 AND status = 'borrowed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(due_date)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await?;

        Ok(borrowing)
    }

    async fn set_fine(&self, id: Uuid, fine: Decimal) -> AppResult<Option<Borrowing>> {
        let borrowing = sqlx::query_as::<_, Borrowing>(
            r#"
            UPDATE borrowings SET fine = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'borrowed'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(fine)
        .fetch_optional(&self.pool)
        .await?;

        Ok(borrowing)
    }

    async fn delete_if_status(&self, id: Uuid, status: BorrowingStatus) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM borrowings WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
