//! Users repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::{unique_violation, UsersStore};
use crate::{
    error::{AppError, AppResult},
    models::user::{NewUser, UpdateUser, User, UserQuery},
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("User with id {} not found", id))
}

/// Unique phone / membership ID violations become conflicts
fn map_write_error(error: sqlx::Error) -> AppError {
    match unique_violation(&error) {
        Some(_) => AppError::Conflict("Phone number or membership ID already exists".to_string()),
        None => AppError::Database(error),
    }
}

#[async_trait]
impl UsersStore for UsersRepository {
    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| not_found(id))
    }

    async fn get_by_membership_id(&self, membership_id: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE UPPER(membership_id) = UPPER($1)",
        )
        .bind(membership_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn membership_id_exists(&self, membership_id: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE UPPER(membership_id) = UPPER($1) AND ($2::uuid IS NULL OR id != $2)
            )
            "#,
        )
        .bind(membership_id)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn phone_exists(&self, phone: &str, exclude_id: Option<Uuid>) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users WHERE phone = $1 AND ($2::uuid IS NULL OR id != $2)
            )
            "#,
        )
        .bind(phone)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn search(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        let pattern = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE ($1::text IS NULL OR name ILIKE $1 OR phone ILIKE $1 OR membership_id ILIKE $1)
              AND ($2::text IS NULL OR membership_type = $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(pattern)
        .bind(query.membership_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    async fn create(&self, user: NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, phone, password, membership_type, membership_id, address, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.name)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.membership_type)
        .bind(&user.membership_id)
        .bind(&user.address)
        .bind(user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    async fn update(&self, id: Uuid, changes: &UpdateUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                address = COALESCE($4, address),
                membership_id = COALESCE($5, membership_id),
                membership_type = COALESCE($6, membership_type),
                role = COALESCE($7, role),
                is_active = COALESCE($8, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.phone)
        .bind(&changes.address)
        .bind(&changes.membership_id)
        .bind(changes.membership_type)
        .bind(changes.role)
        .bind(changes.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?
        .ok_or_else(|| not_found(id))
    }

    async fn set_password(&self, id: Uuid, password_hash: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }

        Ok(())
    }

    async fn add_borrowed_book(&self, id: Uuid, borrowing_id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users SET borrowed_books = array_append(array_remove(borrowed_books, $2), $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(borrowing_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove_borrowed_book(&self, id: Uuid, borrowing_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE users SET borrowed_books = array_remove(borrowed_books, $2) WHERE id = $1")
            .bind(id)
            .bind(borrowing_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }

        Ok(())
    }
}
