//! Repository layer: entity store traits and their implementations
//!
//! Services only see the `*Store` traits. [`Repository::new`] wires the
//! PostgreSQL implementations, [`Repository::in_memory`] the in-process one.

pub mod books;
pub mod borrowings;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery, NewBook, UpdateBook},
        borrowing::{Borrowing, BorrowingDetails, BorrowingFilter, BorrowingStatus, NewBorrowing},
        user::{NewUser, UpdateUser, User, UserQuery},
    },
};

/// Book persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BooksStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Book>;

    /// Books matching the query, newest first
    async fn search(&self, query: &BookQuery) -> AppResult<Vec<Book>>;

    async fn create(&self, book: NewBook) -> AppResult<Book>;

    /// Apply an update; copy counts are resolved with [`Book::apply_copy_changes`]
    /// against the current record, atomically with respect to other copy changes
    async fn update(&self, id: Uuid, changes: &UpdateBook) -> AppResult<Book>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Take one copy if any is available. Returns false, leaving the book
    /// untouched, when no copy is left.
    async fn take_copy(&self, id: Uuid) -> AppResult<bool>;

    /// Give one copy back, never above the total. Returns false when the book
    /// is gone or already fully available.
    async fn release_copy(&self, id: Uuid) -> AppResult<bool>;
}

/// User persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsersStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<User>;

    /// Lookup by canonical (upper-cased) membership ID
    async fn get_by_membership_id(&self, membership_id: &str) -> AppResult<Option<User>>;

    async fn membership_id_exists(&self, membership_id: &str, exclude_id: Option<Uuid>) -> AppResult<bool>;

    async fn phone_exists(&self, phone: &str, exclude_id: Option<Uuid>) -> AppResult<bool>;

    /// Users matching the query, newest first
    async fn search(&self, query: &UserQuery) -> AppResult<Vec<User>>;

    async fn create(&self, user: NewUser) -> AppResult<User>;

    async fn update(&self, id: Uuid, changes: &UpdateUser) -> AppResult<User>;

    async fn set_password(&self, id: Uuid, password_hash: &str) -> AppResult<()>;

    async fn add_borrowed_book(&self, id: Uuid, borrowing_id: Uuid) -> AppResult<()>;

    async fn remove_borrowed_book(&self, id: Uuid, borrowing_id: Uuid) -> AppResult<()>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;
}

/// Fields written together with a status transition; `None` keeps the stored value
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub status: BorrowingStatus,
    pub borrow_date: Option<DateTime<Utc>>,
    pub return_date: Option<DateTime<Utc>>,
    pub fine: Option<Decimal>,
}

impl StatusChange {
    pub fn to(status: BorrowingStatus) -> Self {
        Self {
            status,
            borrow_date: None,
            return_date: None,
            fine: None,
        }
    }
}

/// Borrowing persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BorrowingsStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Borrowing>;

    /// Borrowing joined with its user and book
    async fn get_details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<BorrowingDetails>;

    /// Joined borrowings matching the filter, newest first
    async fn list_details(&self, filter: &BorrowingFilter, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>>;

    async fn count(&self, filter: &BorrowingFilter) -> AppResult<i64>;

    /// True when the user already has a pending or borrowed record for the book
    async fn has_open_request(&self, user_id: Uuid, book_id: Uuid) -> AppResult<bool>;

    async fn token_exists(&self, token_number: &str) -> AppResult<bool>;

    /// Insert a pending borrowing. Fails with a conflict when the user already
    /// has an open request for the book or the token number is taken.
    async fn create(&self, borrowing: NewBorrowing) -> AppResult<Borrowing>;

    /// Move a record from `from` to `change.status`. Returns None, leaving the
    /// record untouched, when it is no longer in `from`.
    async fn transition(&self, id: Uuid, from: BorrowingStatus, change: StatusChange) -> AppResult<Option<Borrowing>>;

    /// Put a record still in `borrowed` status back to `pending`, clearing its
    /// borrow date. Returns false when the record has moved on.
    async fn revert_approval(&self, id: Uuid) -> AppResult<bool>;

    /// Update due date (and notes) of a record still in `borrowed` status
    async fn extend(&self, id: Uuid, due_date: DateTime<Utc>, notes: Option<String>) -> AppResult<Option<Borrowing>>;

    /// Record a fine on a record still in `borrowed` status
    async fn set_fine(&self, id: Uuid, fine: Decimal) -> AppResult<Option<Borrowing>>;

    /// Delete a record if it is still in `status`. Returns false otherwise.
    async fn delete_if_status(&self, id: Uuid, status: BorrowingStatus) -> AppResult<bool>;
}

/// Main repository struct holding the entity stores
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BooksStore>,
    pub users: Arc<dyn UsersStore>,
    pub borrowings: Arc<dyn BorrowingsStore>,
}

impl Repository {
    /// Create a repository backed by PostgreSQL
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            borrowings: Arc::new(borrowings::BorrowingsRepository::new(pool)),
        }
    }

    /// Create a repository backed by an in-process store
    pub fn in_memory() -> Self {
        let store = memory::MemoryStore::new();
        Self {
            books: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            borrowings: Arc::new(store),
        }
    }
}

/// Name of the unique constraint a PostgreSQL error violated, if any
pub(crate) fn unique_violation(error: &sqlx::Error) -> Option<String> {
    match error {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}
