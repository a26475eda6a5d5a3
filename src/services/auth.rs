//! Authentication service: credentials, session tokens and the access gate

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use thiserror::Error;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::user::{normalize_membership_id, Caller, Role, User, UserClaims},
    repository::Repository,
};

/// Reasons the access gate turns a request away
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessDenied {
    #[error("No token provided")]
    MissingCredential,
    #[error("Invalid or expired token")]
    InvalidCredential,
    #[error("User no longer exists")]
    StaleIdentity,
    #[error("Insufficient permissions")]
    InsufficientRole,
}

impl From<AccessDenied> for AppError {
    fn from(denied: AccessDenied) -> Self {
        match denied {
            AccessDenied::InsufficientRole => AppError::Authorization(denied.to_string()),
            _ => AppError::Authentication(denied.to_string()),
        }
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Check a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate by membership ID and password, returning a session token
    pub async fn login(&self, membership_id: &str, password: &str) -> AppResult<(String, User)> {
        let invalid = || AppError::Authentication("Invalid credentials".to_string());

        let user = self
            .repository
            .users
            .get_by_membership_id(&normalize_membership_id(membership_id))
            .await?
            .ok_or_else(invalid)?;

        if !verify_password(&user.password, password)? {
            tracing::warn!(membership_id = %user.membership_id, "Login refused: wrong password");
            return Err(invalid());
        }

        if !user.is_active {
            tracing::warn!(membership_id = %user.membership_id, "Login refused: account inactive");
            return Err(AppError::Authentication("Account is inactive".to_string()));
        }

        let token = self.issue_token(&user)?;
        tracing::info!(membership_id = %user.membership_id, "User logged in");

        Ok((token, user))
    }

    /// Create a signed session token for the user
    pub fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.id,
            membership_id: user.membership_id.clone(),
            role: user.role,
            exp: now + (self.config.jwt_expiration_hours as i64 * 3600),
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Resolve a bearer token to the live user it was issued for
    pub async fn resolve_caller(&self, token: Option<&str>) -> AppResult<Caller> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AccessDenied::MissingCredential)?;

        let claims = UserClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|_| AccessDenied::InvalidCredential)?;

        match self.repository.users.get_by_id(claims.sub).await {
            Ok(user) if !user.is_active => {
                tracing::warn!(user_id = %user.id, "Token presented for a deactivated account");
                Err(AccessDenied::StaleIdentity.into())
            }
            Ok(user) => Ok(Caller::from(&user)),
            Err(AppError::NotFound(_)) => Err(AccessDenied::StaleIdentity.into()),
            Err(e) => Err(e),
        }
    }

    /// Reject callers lacking the role
    pub fn require_role(caller: &Caller, role: Role) -> Result<(), AccessDenied> {
        if caller.role == role {
            Ok(())
        } else {
            Err(AccessDenied::InsufficientRole)
        }
    }
}
