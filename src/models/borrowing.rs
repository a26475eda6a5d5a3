//! Borrowing model: one member's request for, and loan of, one book copy

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::book::BookSummary;
use super::user::UserSummary;

/// Persisted lifecycle status.
///
/// `overdue` is never stored: it is observed on a `borrowed` record whose
/// due date has passed (see [`Borrowing::is_overdue`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    Pending,
    Borrowed,
    Returned,
    Rejected,
}

impl BorrowingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BorrowingStatus::Pending => "pending",
            BorrowingStatus::Borrowed => "borrowed",
            BorrowingStatus::Returned => "returned",
            BorrowingStatus::Rejected => "rejected",
        }
    }

    /// Pending requests and current loans block a second request for the same book
    pub fn is_open(&self) -> bool {
        matches!(self, BorrowingStatus::Pending | BorrowingStatus::Borrowed)
    }
}

impl std::fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BorrowingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BorrowingStatus::Pending),
            "borrowed" => Ok(BorrowingStatus::Borrowed),
            "returned" => Ok(BorrowingStatus::Returned),
            "rejected" => Ok(BorrowingStatus::Rejected),
            _ => Err(format!("Invalid borrowing status: {}", s)),
        }
    }
}

super::text_enum!(BorrowingStatus);

/// Borrowing record from the store
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Borrowing {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub token_number: String,
    pub borrow_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
    pub return_date: Option<DateTime<Utc>>,
    pub status: BorrowingStatus,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub fine: Decimal,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Borrowing {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == BorrowingStatus::Borrowed && now > self.due_date
    }

    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if self.is_overdue(now) {
            days_past_due(self.due_date, now)
        } else {
            0
        }
    }
}

/// Number of started days between `due_date` and `now`, zero when not yet due
pub fn days_past_due(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let late_ms = (now - due_date).num_milliseconds();
    if late_ms <= 0 {
        return 0;
    }
    let day_ms = Duration::days(1).num_milliseconds();
    (late_ms + day_ms - 1) / day_ms
}

/// Fine owed at `now`: every started day past the due date costs `daily_rate`
pub fn compute_fine(due_date: DateTime<Utc>, now: DateTime<Utc>, daily_rate: Decimal) -> Decimal {
    Decimal::from(days_past_due(due_date, now)) * daily_rate
}

/// Human-readable request identifier, e.g. `REQ-52814637-042`
pub fn generate_token_number(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().rem_euclid(100_000_000);
    let random: u16 = rand::thread_rng().gen_range(0..1000);
    format!("REQ-{:08}-{:03}", millis, random)
}

/// Borrowing record ready to be inserted
#[derive(Debug, Clone)]
pub struct NewBorrowing {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub token_number: String,
    pub due_date: DateTime<Utc>,
}

/// Borrowing joined with its user and book, as returned by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowingDetails {
    #[serde(flatten)]
    pub borrowing: Borrowing,
    /// None when the user has since been deleted
    pub user: Option<UserSummary>,
    /// None when the book has since been deleted
    pub book: Option<BookSummary>,
    pub is_overdue: bool,
    pub days_overdue: i64,
}

impl BorrowingDetails {
    pub fn new(
        borrowing: Borrowing,
        user: Option<UserSummary>,
        book: Option<BookSummary>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            is_overdue: borrowing.is_overdue(now),
            days_overdue: borrowing.days_overdue(now),
            borrowing,
            user,
            book,
        }
    }
}

/// Store-level borrowing filter
#[derive(Debug, Default, Clone)]
pub struct BorrowingFilter {
    pub status: Option<BorrowingStatus>,
    pub user_id: Option<Uuid>,
    pub book_id: Option<Uuid>,
    /// Only borrowed records whose due date is before this instant
    pub overdue_at: Option<DateTime<Utc>>,
}

/// Borrowing list query parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct BorrowingQuery {
    pub status: Option<BorrowingStatus>,
    /// Only borrowed records past their due date
    pub overdue: Option<bool>,
    /// Restrict to one member (admins only, members always see their own)
    pub user_id: Option<Uuid>,
}

/// Borrow request
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBorrowing {
    pub book_id: Uuid,
    /// Requested due date, defaults to the configured loan period
    pub due_date: Option<DateTime<Utc>>,
    /// Member to borrow for (admins only)
    pub user_id: Option<Uuid>,
}

/// Due date extension request
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendBorrowing {
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
}
