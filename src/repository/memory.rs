//! In-process entity store
//!
//! All three collections live behind one lock, so every store method is a
//! single atomic read-modify-write. Records are kept in insertion order.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{BooksStore, BorrowingsStore, StatusChange, UsersStore};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{Book, BookQuery, BookSummary, NewBook, UpdateBook},
        borrowing::{Borrowing, BorrowingDetails, BorrowingFilter, BorrowingStatus, NewBorrowing},
        user::{NewUser, UpdateUser, User, UserQuery, UserSummary},
    },
};

#[derive(Default)]
struct Tables {
    books: Vec<Book>,
    users: Vec<User>,
    borrowings: Vec<Borrowing>,
}

impl Tables {
    fn book(&self, id: Uuid) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    fn book_mut(&mut self, id: Uuid) -> AppResult<&mut Book> {
        self.books
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| book_not_found(id))
    }

    fn user(&self, id: Uuid) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    fn user_mut(&mut self, id: Uuid) -> AppResult<&mut User> {
        self.users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| user_not_found(id))
    }

    fn borrowing_mut(&mut self, id: Uuid) -> AppResult<&mut Borrowing> {
        self.borrowings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| borrowing_not_found(id))
    }

    fn details(&self, borrowing: &Borrowing, now: DateTime<Utc>) -> BorrowingDetails {
        BorrowingDetails::new(
            borrowing.clone(),
            self.user(borrowing.user_id).map(UserSummary::from),
            self.book(borrowing.book_id).map(BookSummary::from),
            now,
        )
    }

    fn matching<'a>(&'a self, filter: &'a BorrowingFilter) -> impl Iterator<Item = &'a Borrowing> + 'a {
        self.borrowings.iter().filter(move |b| {
            filter.status.map_or(true, |s| b.status == s)
                && filter.user_id.map_or(true, |id| b.user_id == id)
                && filter.book_id.map_or(true, |id| b.book_id == id)
                && filter
                    .overdue_at
                    .map_or(true, |at| b.status == BorrowingStatus::Borrowed && b.due_date < at)
        })
    }

    fn membership_id_taken(&self, membership_id: &str, exclude_id: Option<Uuid>) -> bool {
        self.users.iter().any(|u| {
            Some(u.id) != exclude_id && u.membership_id.eq_ignore_ascii_case(membership_id)
        })
    }

    fn phone_taken(&self, phone: &str, exclude_id: Option<Uuid>) -> bool {
        self.users
            .iter()
            .any(|u| Some(u.id) != exclude_id && u.phone == phone)
    }
}

fn book_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Book with id {} not found", id))
}

fn user_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("User with id {} not found", id))
}

fn borrowing_not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Borrowing with id {} not found", id))
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// Newest first; among equal timestamps the later insert wins
fn newest_first<T: Clone>(items: impl DoubleEndedIterator<Item = T>, created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut items: Vec<T> = items.rev().collect();
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    items
}

/// Entity store held in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| AppError::Internal("Store lock poisoned".to_string()))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| AppError::Internal("Store lock poisoned".to_string()))
    }
}

#[async_trait]
impl BooksStore for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        self.read()?.book(id).cloned().ok_or_else(|| book_not_found(id))
    }

    async fn search(&self, query: &BookQuery) -> AppResult<Vec<Book>> {
        let tables = self.read()?;
        let search = query.search.as_ref().map(|s| s.trim().to_lowercase());
        let genre = query.genre.as_ref().map(|g| g.trim().to_lowercase());
        let only_available = query.available.unwrap_or(false);

        let matching = tables.books.iter().filter(|b| {
            search.as_ref().map_or(true, |s| {
                contains_ci(&b.title, s) || contains_ci(&b.author, s) || contains_ci(&b.isbn, s)
            }) && genre.as_ref().map_or(true, |g| contains_ci(&b.genre, g))
                && (!only_available || b.is_available())
        });

        Ok(newest_first(matching.cloned().collect::<Vec<_>>().into_iter(), |b| b.created_at))
    }

    async fn create(&self, book: NewBook) -> AppResult<Book> {
        let now = Utc::now();
        let book = Book {
            id: Uuid::new_v4(),
            title: book.title,
            author: book.author,
            isbn: book.isbn,
            genre: book.genre,
            publication_year: book.publication_year,
            publisher: book.publisher,
            description: book.description,
            total_copies: book.total_copies,
            available_copies: book.available_copies,
            cover_image: book.cover_image,
            pdf_file: book.pdf_file,
            created_at: now,
            updated_at: now,
        };
        self.write()?.books.push(book.clone());
        Ok(book)
    }

    async fn update(&self, id: Uuid, changes: &UpdateBook) -> AppResult<Book> {
        let mut tables = self.write()?;
        let borrowed = tables
            .borrowings
            .iter()
            .filter(|b| b.book_id == id && b.status == BorrowingStatus::Borrowed)
            .count() as i32;
        let book = tables.book_mut(id)?;

        let (total, available) = book
            .apply_copy_changes(changes.total_copies, changes.available_copies, borrowed)
            .map_err(AppError::Validation)?;

        if let Some(ref title) = changes.title {
            book.title = title.trim().to_string();
        }
        if let Some(ref author) = changes.author {
            book.author = author.trim().to_string();
        }
        if let Some(ref isbn) = changes.isbn {
            book.isbn = isbn.trim().to_string();
        }
        if let Some(ref genre) = changes.genre {
            book.genre = genre.trim().to_string();
        }
        if let Some(year) = changes.publication_year {
            book.publication_year = year;
        }
        if changes.publisher.is_some() {
            book.publisher = changes.publisher.clone();
        }
        if changes.description.is_some() {
            book.description = changes.description.clone();
        }
        if changes.cover_image.is_some() {
            book.cover_image = changes.cover_image.clone();
        }
        if changes.pdf_file.is_some() {
            book.pdf_file = changes.pdf_file.clone();
        }
        book.total_copies = total;
        book.available_copies = available;
        book.updated_at = Utc::now();

        Ok(book.clone())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tables = self.write()?;
        let before = tables.books.len();
        tables.books.retain(|b| b.id != id);
        if tables.books.len() == before {
            return Err(book_not_found(id));
        }
        Ok(())
    }

    async fn take_copy(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.write()?;
        match tables.books.iter_mut().find(|b| b.id == id) {
            Some(book) if book.available_copies > 0 => {
                book.available_copies -= 1;
                book.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_copy(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.write()?;
        match tables.books.iter_mut().find(|b| b.id == id) {
            Some(book) if book.available_copies < book.total_copies => {
                book.available_copies += 1;
                book.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl UsersStore for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.read()?.user(id).cloned().ok_or_else(|| user_not_found(id))
    }

    async fn get_by_membership_id(&self, membership_id: &str) -> AppResult<Option<User>> {
        Ok(self
            .read()?
            .users
            .iter()
            .find(|u| u.membership_id.eq_ignore_ascii_case(membership_id))
            .cloned())
    }

    async fn membership_id_exists(&self, membership_id: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        Ok(self.read()?.membership_id_taken(membership_id, exclude_id))
    }

    async fn phone_exists(&self, phone: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        Ok(self.read()?.phone_taken(phone, exclude_id))
    }

    async fn search(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let tables = self.read()?;
        let search = query.search.as_ref().map(|s| s.trim().to_lowercase());

        let matching = tables.users.iter().filter(|u| {
            search.as_ref().map_or(true, |s| {
                contains_ci(&u.name, s) || contains_ci(&u.phone, s) || contains_ci(&u.membership_id, s)
            }) && query.membership_type.map_or(true, |t| u.membership_type == t)
        });

        Ok(newest_first(matching.cloned().collect::<Vec<_>>().into_iter(), |u| u.created_at))
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        let mut tables = self.write()?;
        if tables.membership_id_taken(&user.membership_id, None) || tables.phone_taken(&user.phone, None) {
            return Err(AppError::Conflict(
                "Phone number or membership ID already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: user.name,
            phone: user.phone,
            password: user.password_hash,
            membership_type: user.membership_type,
            membership_id: user.membership_id,
            address: user.address,
            role: user.role,
            join_date: now,
            is_active: true,
            borrowed_books: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update(&self, id: Uuid, changes: &UpdateUser) -> AppResult<User> {
        let mut tables = self.write()?;
        let membership_taken = changes
            .membership_id
            .as_deref()
            .map_or(false, |m| tables.membership_id_taken(m, Some(id)));
        let phone_taken = changes
            .phone
            .as_deref()
            .map_or(false, |p| tables.phone_taken(p, Some(id)));
        let user = tables.user_mut(id)?;
        if membership_taken || phone_taken {
            return Err(AppError::Conflict(
                "Phone number or membership ID already exists".to_string(),
            ));
        }

        if let Some(ref name) = changes.name {
            user.name = name.clone();
        }
        if let Some(ref phone) = changes.phone {
            user.phone = phone.clone();
        }
        if changes.address.is_some() {
            user.address = changes.address.clone();
        }
        if let Some(ref membership_id) = changes.membership_id {
            user.membership_id = membership_id.clone();
        }
        if let Some(membership_type) = changes.membership_type {
            user.membership_type = membership_type;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();

        Ok(user.clone())
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> AppResult<()> {
        let mut tables = self.write()?;
        let user = tables.user_mut(id)?;
        user.password = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn add_borrowed_book(&self, id: Uuid, borrowing_id: Uuid) -> AppResult<()> {
        let mut tables = self.write()?;
        let user = tables.user_mut(id)?;
        if !user.borrowed_books.contains(&borrowing_id) {
            user.borrowed_books.push(borrowing_id);
        }
        Ok(())
    }

    async fn remove_borrowed_book(&self, id: Uuid, borrowing_id: Uuid) -> AppResult<()> {
        let mut tables = self.write()?;
        if let Ok(user) = tables.user_mut(id) {
            user.borrowed_books.retain(|b| *b != borrowing_id);
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let mut tables = self.write()?;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Err(user_not_found(id));
        }
        Ok(())
    }
}

#[async_trait]
impl BorrowingsStore for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Borrowing> {
        self.read()?
            .borrowings
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or_else(|| borrowing_not_found(id))
    }

    async fn get_details(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<BorrowingDetails> {
        let tables = self.read()?;
        let borrowing = tables
            .borrowings
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| borrowing_not_found(id))?;
        Ok(tables.details(borrowing, now))
    }

    async fn list_details(&self, filter: &BorrowingFilter, now: DateTime<Utc>) -> AppResult<Vec<BorrowingDetails>> {
        let tables = self.read()?;
        let matching: Vec<&Borrowing> = tables.matching(filter).collect();
        Ok(newest_first(matching.into_iter(), |b| b.created_at)
            .into_iter()
            .map(|b| tables.details(b, now))
            .collect())
    }

    async fn count(&self, filter: &BorrowingFilter) -> AppResult<i64> {
        Ok(self.read()?.matching(filter).count() as i64)
    }

    async fn has_open_request(&self, user_id: Uuid, book_id: Uuid) -> AppResult<bool> {
        Ok(self
            .read()?
            .borrowings
            .iter()
            .any(|b| b.user_id == user_id && b.book_id == book_id && b.status.is_open()))
    }

    async fn token_exists(&self, token_number: &str) -> AppResult<bool> {
        Ok(self
            .read()?
            .borrowings
            .iter()
            .any(|b| b.token_number == token_number))
    }

    async fn create(&self, borrowing: NewBorrowing) -> AppResult<Borrowing> {
        let mut tables = self.write()?;
        if tables.borrowings.iter().any(|b| {
            b.user_id == borrowing.user_id && b.book_id == borrowing.book_id && b.status.is_open()
        }) {
            return Err(AppError::Conflict(
                "You already have a pending request or loan for this book".to_string(),
            ));
        }
        if tables
            .borrowings
            .iter()
            .any(|b| b.token_number == borrowing.token_number)
        {
            return Err(AppError::Conflict("Token number already in use".to_string()));
        }

        let now = Utc::now();
        let borrowing = Borrowing {
            id: Uuid::new_v4(),
            user_id: borrowing.user_id,
            book_id: borrowing.book_id,
            token_number: borrowing.token_number,
            borrow_date: None,
            due_date: borrowing.due_date,
            return_date: None,
            status: BorrowingStatus::Pending,
            fine: Decimal::ZERO,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        };
        tables.borrowings.push(borrowing.clone());
        Ok(borrowing)
    }

    async fn transition(&self, id: Uuid, from: BorrowingStatus, change: StatusChange) -> AppResult<Option<Borrowing>> {
        let mut tables = self.write()?;
        let borrowing = tables.borrowing_mut(id)?;
        if borrowing.status != from {
            return Ok(None);
        }

        borrowing.status = change.status;
        if change.borrow_date.is_some() {
            borrowing.borrow_date = change.borrow_date;
        }
        if change.return_date.is_some() {
            borrowing.return_date = change.return_date;
        }
        if let Some(fine) = change.fine {
            borrowing.fine = fine;
        }
        borrowing.updated_at = Utc::now();

        Ok(Some(borrowing.clone()))
    }

    async fn revert_approval(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.write()?;
        let borrowing = tables.borrowing_mut(id)?;
        if borrowing.status != BorrowingStatus::Borrowed {
            return Ok(false);
        }

        borrowing.status = BorrowingStatus::Pending;
        borrowing.borrow_date = None;
        borrowing.updated_at = Utc::now();
        Ok(true)
    }

    async fn extend(&self, id: Uuid, due_date: DateTime<Utc>, notes: Option<String>) -> AppResult<Option<Borrowing>> {
        let mut tables = self.write()?;
        let borrowing = tables.borrowing_mut(id)?;
        if borrowing.status != BorrowingStatus::Borrowed {
            return Ok(None);
        }

        borrowing.due_date = due_date;
        if let Some(notes) = notes {
            borrowing.notes = notes;
        }
        borrowing.updated_at = Utc::now();

        Ok(Some(borrowing.clone()))
    }

    async fn set_fine(&self, id: Uuid, fine: Decimal) -> AppResult<Option<Borrowing>> {
        let mut tables = self.write()?;
        let borrowing = tables.borrowing_mut(id)?;
        if borrowing.status != BorrowingStatus::Borrowed {
            return Ok(None);
        }

        borrowing.fine = fine;
        borrowing.updated_at = Utc::now();

        Ok(Some(borrowing.clone()))
    }

    async fn delete_if_status(&self, id: Uuid, status: BorrowingStatus) -> AppResult<bool> {
        let mut tables = self.write()?;
        let before = tables.borrowings.len();
        tables.borrowings.retain(|b| !(b.id == id && b.status == status));
        Ok(tables.borrowings.len() != before)
    }
}
