//! Borrowing lifecycle service
//!
//! ```text
//! pending ──approve──▶ borrowed ──return──▶ returned
//!    │                    │
//!    └──reject──▶ rejected └──delete──▶ (removed, copy released)
//! ```
//!
//! A copy of the book is reserved when a request is approved, not when it is
//! made. `overdue` is observed on borrowed records past their due date and is
//! never stored.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::{
    config::BorrowingsConfig,
    error::{AppError, AppResult},
    models::{
        borrowing::{
            compute_fine, generate_token_number, Borrowing, BorrowingDetails, BorrowingFilter,
            BorrowingQuery, BorrowingStatus, CreateBorrowing, ExtendBorrowing, NewBorrowing,
        },
        user::Caller,
    },
    repository::{Repository, StatusChange},
};

const TOKEN_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct BorrowingsService {
    repository: Repository,
    config: BorrowingsConfig,
}

impl BorrowingsService {
    pub fn new(repository: Repository, config: BorrowingsConfig) -> Self {
        Self { repository, config }
    }

    async fn details(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        self.repository.borrowings.get_details(id, Utc::now()).await
    }

    /// Load a record and require it to be in `expected` status
    async fn get_in_status(&self, id: Uuid, expected: BorrowingStatus, action: &str) -> AppResult<Borrowing> {
        let borrowing = self.repository.borrowings.get_by_id(id).await?;
        if borrowing.status != expected {
            tracing::warn!(
                borrowing_id = %id,
                status = %borrowing.status,
                "Cannot {} a {} borrowing",
                action,
                borrowing.status
            );
            return Err(AppError::InvalidState(format!(
                "Cannot {} a borrowing that is {} (expected {})",
                action, borrowing.status, expected
            )));
        }
        Ok(borrowing)
    }

    fn changed_concurrently(id: Uuid) -> AppError {
        AppError::InvalidState(format!("Borrowing {} was modified by another request", id))
    }

    /// Request a book. Nothing is reserved until an admin approves.
    pub async fn create(&self, caller: &Caller, request: CreateBorrowing) -> AppResult<BorrowingDetails> {
        let user_id = match request.user_id {
            Some(user_id) if user_id != caller.id => {
                caller.require_admin()?;
                user_id
            }
            _ => caller.id,
        };
        self.repository.users.get_by_id(user_id).await?;

        let now = Utc::now();
        let due_date = request
            .due_date
            .unwrap_or_else(|| now + Duration::days(self.config.loan_days));
        if due_date <= now {
            return Err(AppError::Validation("Due date must be in the future".to_string()));
        }

        let book = self.repository.books.get_by_id(request.book_id).await?;
        if !book.is_available() {
            return Err(AppError::Conflict("Book is not available".to_string()));
        }

        if self
            .repository
            .borrowings
            .has_open_request(user_id, book.id)
            .await?
        {
            return Err(AppError::Conflict(
                "You already have a pending request or loan for this book".to_string(),
            ));
        }

        let mut token_number = generate_token_number(now);
        for _ in 1..TOKEN_ATTEMPTS {
            if !self.repository.borrowings.token_exists(&token_number).await? {
                break;
            }
            token_number = generate_token_number(Utc::now());
        }

        let borrowing = self
            .repository
            .borrowings
            .create(NewBorrowing {
                user_id,
                book_id: book.id,
                token_number,
                due_date,
            })
            .await?;

        tracing::info!(
            borrowing_id = %borrowing.id,
            token = %borrowing.token_number,
            user_id = %user_id,
            book_id = %book.id,
            "Borrow request created"
        );

        self.details(borrowing.id).await
    }

    /// Get one borrowing; members only see their own
    pub async fn get(&self, caller: &Caller, id: Uuid) -> AppResult<BorrowingDetails> {
        let details = self.details(id).await?;
        caller.require_self_or_admin(details.borrowing.user_id)?;
        Ok(details)
    }

    /// List borrowings, newest first; members only see their own
    pub async fn list(&self, caller: &Caller, query: &BorrowingQuery) -> AppResult<Vec<BorrowingDetails>> {
        let now = Utc::now();
        let filter = BorrowingFilter {
            status: query.status,
            user_id: if caller.is_admin() {
                query.user_id
            } else {
                Some(caller.id)
            },
            book_id: None,
            overdue_at: query.overdue.unwrap_or(false).then_some(now),
        };

        self.repository.borrowings.list_details(&filter, now).await
    }

    /// All borrowings of one user, newest first
    pub async fn list_for_user(&self, caller: &Caller, user_id: Uuid) -> AppResult<Vec<BorrowingDetails>> {
        caller.require_self_or_admin(user_id)?;
        self.repository.users.get_by_id(user_id).await?;

        let filter = BorrowingFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        self.repository.borrowings.list_details(&filter, Utc::now()).await
    }

    /// Approve a pending request, reserving one copy of the book
    pub async fn approve(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        let borrowing = self.get_in_status(id, BorrowingStatus::Pending, "approve").await?;
        self.repository.users.get_by_id(borrowing.user_id).await?;

        if !self.repository.books.take_copy(borrowing.book_id).await? {
            // Distinguish a deleted book from an exhausted one
            self.repository.books.get_by_id(borrowing.book_id).await?;
            tracing::warn!(borrowing_id = %id, book_id = %borrowing.book_id, "Approval refused: no copy left");
            return Err(AppError::Conflict("Book is not available".to_string()));
        }

        let change = StatusChange {
            borrow_date: Some(Utc::now()),
            ..StatusChange::to(BorrowingStatus::Borrowed)
        };
        let approved = self
            .repository
            .borrowings
            .transition(id, BorrowingStatus::Pending, change)
            .await;

        let approved = match approved {
            Ok(Some(approved)) => approved,
            Ok(None) => {
                self.repository.books.release_copy(borrowing.book_id).await?;
                return Err(Self::changed_concurrently(id));
            }
            Err(e) => {
                self.repository.books.release_copy(borrowing.book_id).await?;
                return Err(e);
            }
        };

        if let Err(e) = self
            .repository
            .users
            .add_borrowed_book(approved.user_id, approved.id)
            .await
        {
            tracing::error!(borrowing_id = %id, error = %e, "Approval rolled back: member list update failed");
            if self.repository.borrowings.revert_approval(id).await? {
                self.repository.books.release_copy(borrowing.book_id).await?;
            }
            return Err(e);
        }

        tracing::info!(borrowing_id = %id, book_id = %approved.book_id, "Borrowing approved");
        self.details(id).await
    }

    /// Reject a pending request
    pub async fn reject(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        self.get_in_status(id, BorrowingStatus::Pending, "reject").await?;

        self.repository
            .borrowings
            .transition(id, BorrowingStatus::Pending, StatusChange::to(BorrowingStatus::Rejected))
            .await?
            .ok_or_else(|| Self::changed_concurrently(id))?;

        tracing::info!(borrowing_id = %id, "Borrowing rejected");
        self.details(id).await
    }

    /// Return a borrowed book, settling the fine and releasing the copy
    pub async fn return_book(&self, caller: &Caller, id: Uuid) -> AppResult<BorrowingDetails> {
        let borrowing = self.repository.borrowings.get_by_id(id).await?;
        caller.require_self_or_admin(borrowing.user_id)?;
        let borrowing = self.get_in_status(id, BorrowingStatus::Borrowed, "return").await?;

        let now = Utc::now();
        let fine = compute_fine(borrowing.due_date, now, self.config.daily_fine_rate);
        let change = StatusChange {
            return_date: Some(now),
            fine: Some(fine),
            ..StatusChange::to(BorrowingStatus::Returned)
        };

        let returned = self
            .repository
            .borrowings
            .transition(id, BorrowingStatus::Borrowed, change)
            .await?
            .ok_or_else(|| Self::changed_concurrently(id))?;

        self.release(&returned).await?;

        tracing::info!(borrowing_id = %id, fine = %fine, "Book returned");
        self.details(id).await
    }

    /// Move the due date of a borrowed book
    pub async fn extend(&self, id: Uuid, request: ExtendBorrowing) -> AppResult<BorrowingDetails> {
        if request.due_date <= Utc::now() {
            return Err(AppError::Validation("New due date must be in the future".to_string()));
        }
        self.get_in_status(id, BorrowingStatus::Borrowed, "extend").await?;

        self.repository
            .borrowings
            .extend(id, request.due_date, request.notes)
            .await?
            .ok_or_else(|| Self::changed_concurrently(id))?;

        tracing::info!(borrowing_id = %id, due_date = %request.due_date, "Due date extended");
        self.details(id).await
    }

    /// Record the fine owed so far on an overdue borrowing, without returning it
    pub async fn calculate_fine(&self, id: Uuid) -> AppResult<BorrowingDetails> {
        let borrowing = self
            .get_in_status(id, BorrowingStatus::Borrowed, "calculate a fine for")
            .await?;

        let now = Utc::now();
        if borrowing.due_date >= now {
            return Err(AppError::Validation("Book is not overdue yet".to_string()));
        }

        let fine = compute_fine(borrowing.due_date, now, self.config.daily_fine_rate);
        self.repository
            .borrowings
            .set_fine(id, fine)
            .await?
            .ok_or_else(|| Self::changed_concurrently(id))?;

        tracing::info!(borrowing_id = %id, fine = %fine, "Fine calculated");
        self.details(id).await
    }

    /// Delete a borrowing; a borrowed record gives its copy back first
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let borrowing = self.repository.borrowings.get_by_id(id).await?;

        if !self
            .repository
            .borrowings
            .delete_if_status(id, borrowing.status)
            .await?
        {
            return Err(Self::changed_concurrently(id));
        }

        if borrowing.status == BorrowingStatus::Borrowed {
            self.release(&borrowing).await?;
        }

        tracing::info!(borrowing_id = %id, status = %borrowing.status, "Borrowing deleted");
        Ok(())
    }

    /// Give a borrowed copy back to the book and drop it from the member's list
    async fn release(&self, borrowing: &Borrowing) -> AppResult<()> {
        if !self.repository.books.release_copy(borrowing.book_id).await? {
            tracing::warn!(
                borrowing_id = %borrowing.id,
                book_id = %borrowing.book_id,
                "No copy to release: book deleted or already fully available"
            );
        }
        self.repository
            .users
            .remove_borrowed_book(borrowing.user_id, borrowing.id)
            .await
    }
}
