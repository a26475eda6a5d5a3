//! User (member) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{error::AppError, services::auth::AuthService};

/// User role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

super::text_enum!(Role);

/// Membership type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    #[default]
    Student,
    Staff,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipType::Student => "student",
            MembershipType::Staff => "staff",
        }
    }
}

impl std::str::FromStr for MembershipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(MembershipType::Student),
            "staff" => Ok(MembershipType::Staff),
            _ => Err(format!("Invalid membership type: {}", s)),
        }
    }
}

super::text_enum!(MembershipType);

/// Canonical form of a membership ID: trimmed and upper-cased
pub fn normalize_membership_id(membership_id: &str) -> String {
    membership_id.trim().to_uppercase()
}

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password: String,
    pub membership_type: MembershipType,
    pub membership_id: String,
    pub address: Option<String>,
    pub role: Role,
    pub join_date: DateTime<Utc>,
    pub is_active: bool,
    /// Borrowings currently in `borrowed` status
    pub borrowed_books: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn membership_info(&self) -> String {
        format!("{} ({})", self.membership_id, self.membership_type.as_str())
    }
}

/// User with derived fields, as returned by the API
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    #[serde(flatten)]
    pub user: User,
    pub membership_info: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        let membership_info = user.membership_info();
        Self { user, membership_info }
    }
}

/// Short user representation embedded in borrowing views
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub phone: String,
    pub membership_id: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            phone: user.phone.clone(),
            membership_id: user.membership_id.clone(),
        }
    }
}

/// User query parameters
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct UserQuery {
    /// Case-insensitive substring match on name, phone or membership ID
    pub search: Option<String>,
    pub membership_type: Option<MembershipType>,
}

/// User record ready to be inserted (password already hashed)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub phone: String,
    pub password_hash: String,
    pub membership_type: MembershipType,
    pub membership_id: String,
    pub address: Option<String>,
    pub role: Role,
}

/// Self-registration request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUser {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    /// Membership ID, also accepted as `userId`
    #[serde(alias = "userId")]
    #[validate(length(min = 1, message = "Membership ID is required"))]
    pub membership_id: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Mobile number is required"))]
    pub phone: String,
    pub address: Option<String>,
    pub membership_type: Option<MembershipType>,
}

/// Create user request (admin)
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateUser {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Membership ID is required"))]
    pub membership_id: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(length(min = 1, message = "Mobile number is required"))]
    pub phone: String,
    pub address: Option<String>,
    pub membership_type: Option<MembershipType>,
    pub role: Option<Role>,
}

/// Update user request, absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUser {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Mobile number cannot be empty"))]
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(length(min = 1, message = "Membership ID cannot be empty"))]
    pub membership_id: Option<String>,
    pub membership_type: Option<MembershipType>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UpdateUser {
    /// True when the update touches only fields a member may edit on their own record
    pub fn is_self_service(&self) -> bool {
        self.membership_id.is_none()
            && self.membership_type.is_none()
            && self.role.is_none()
            && self.is_active.is_none()
    }
}

/// Update own profile request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfile {
    #[validate(length(min = 1, message = "Name cannot be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, message = "Mobile number cannot be empty"))]
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl From<UpdateProfile> for UpdateUser {
    fn from(profile: UpdateProfile) -> Self {
        UpdateUser {
            name: profile.name,
            phone: profile.phone,
            address: profile.address,
            ..Default::default()
        }
    }
}

/// Change password request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePassword {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters long"))]
    pub new_password: String,
}

/// JWT claims issued at login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    /// User id
    pub sub: Uuid,
    pub membership_id: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

/// Identity attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: Uuid,
    pub membership_id: String,
    pub role: Role,
}

impl Caller {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Require admin privileges
    pub fn require_admin(&self) -> Result<(), AppError> {
        AuthService::require_role(self, Role::Admin).map_err(AppError::from)
    }

    /// Require that the caller is the given user or an admin
    pub fn require_self_or_admin(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.id == user_id || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Authorization("Access denied".to_string()))
        }
    }
}

impl From<&User> for Caller {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            membership_id: user.membership_id.clone(),
            role: user.role,
        }
    }
}
