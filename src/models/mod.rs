//! Data models for Shelfmark

pub mod book;
pub mod borrowing;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookSummary, BookView};
pub use borrowing::{Borrowing, BorrowingDetails, BorrowingStatus};
pub use user::{Caller, Role, User, UserSummary, UserView};

/// Store a string-like enum as TEXT in PostgreSQL.
///
/// The enum must provide `as_str()` and `FromStr<Err = String>`.
macro_rules! text_enum {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s: &str = sqlx::Decode::<sqlx::Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub(crate) use text_enum;
