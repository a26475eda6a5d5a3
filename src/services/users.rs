//! Member directory service

use validator::Validate;

use uuid::Uuid;

use crate::{
    config::BootstrapConfig,
    error::{AppError, AppResult},
    models::{
        borrowing::{BorrowingFilter, BorrowingStatus},
        user::{
            normalize_membership_id, Caller, ChangePassword, CreateUser, MembershipType, NewUser,
            RegisterUser, Role, UpdateProfile, UpdateUser, User, UserQuery,
        },
    },
    repository::Repository,
    services::auth::{hash_password, verify_password},
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// Search users, newest first
    pub async fn search_users(&self, query: &UserQuery) -> AppResult<Vec<User>> {
        self.repository.users.search(query).await
    }

    /// Self-registration; the account always gets the member role
    pub async fn register(&self, user: RegisterUser) -> AppResult<User> {
        self.create_user(CreateUser {
            name: user.name,
            membership_id: user.membership_id,
            password: user.password,
            phone: user.phone,
            address: user.address,
            membership_type: user.membership_type,
            role: Some(Role::User),
        })
        .await
    }

    /// Create a new user
    pub async fn create_user(&self, user: CreateUser) -> AppResult<User> {
        user.validate()?;

        let membership_id = normalize_membership_id(&user.membership_id);
        let phone = user.phone.trim().to_string();
        if membership_id.is_empty() {
            return Err(AppError::Validation("Membership ID is required".to_string()));
        }

        if self.repository.users.membership_id_exists(&membership_id, None).await? {
            return Err(AppError::Conflict("Membership ID already registered".to_string()));
        }
        if self.repository.users.phone_exists(&phone, None).await? {
            return Err(AppError::Conflict("Phone number already registered".to_string()));
        }

        let created = self
            .repository
            .users
            .create(NewUser {
                name: user.name.trim().to_string(),
                phone,
                password_hash: hash_password(&user.password)?,
                membership_type: user.membership_type.unwrap_or_default(),
                membership_id,
                address: user.address,
                role: user.role.unwrap_or_default(),
            })
            .await?;

        tracing::info!(user_id = %created.id, membership_id = %created.membership_id, "User created");
        Ok(created)
    }

    /// Update a user. Members may only change their own name, phone and address.
    pub async fn update_user(&self, caller: &Caller, id: Uuid, mut changes: UpdateUser) -> AppResult<User> {
        if !caller.is_admin() && !(caller.id == id && changes.is_self_service()) {
            return Err(AppError::Authorization("Access denied".to_string()));
        }
        changes.validate()?;

        if let Some(ref membership_id) = changes.membership_id {
            let membership_id = normalize_membership_id(membership_id);
            if self.repository.users.membership_id_exists(&membership_id, Some(id)).await? {
                return Err(AppError::Conflict("Membership ID already registered".to_string()));
            }
            changes.membership_id = Some(membership_id);
        }
        if let Some(ref phone) = changes.phone {
            let phone = phone.trim().to_string();
            if self.repository.users.phone_exists(&phone, Some(id)).await? {
                return Err(AppError::Conflict("Phone number already registered".to_string()));
            }
            changes.phone = Some(phone);
        }

        self.repository.users.update(id, &changes).await
    }

    /// Update the caller's own profile
    pub async fn update_profile(&self, caller: &Caller, profile: UpdateProfile) -> AppResult<User> {
        profile.validate()?;
        self.update_user(caller, caller.id, profile.into()).await
    }

    /// Change the caller's password after checking the current one
    pub async fn change_password(&self, id: Uuid, request: ChangePassword) -> AppResult<()> {
        request.validate()?;

        let user = self.repository.users.get_by_id(id).await?;
        if !verify_password(&user.password, &request.current_password)? {
            return Err(AppError::Authentication("Current password is incorrect".to_string()));
        }

        self.repository
            .users
            .set_password(id, &hash_password(&request.new_password)?)
            .await?;

        tracing::info!(user_id = %id, "Password changed");
        Ok(())
    }

    /// Delete a user; refused while they hold a borrowed book
    pub async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        self.repository.users.get_by_id(id).await?;

        let active = self
            .repository
            .borrowings
            .count(&BorrowingFilter {
                user_id: Some(id),
                status: Some(BorrowingStatus::Borrowed),
                ..Default::default()
            })
            .await?;
        if active > 0 {
            tracing::warn!(user_id = %id, active, "User deletion refused: books still borrowed");
            return Err(AppError::Conflict(
                "Cannot delete user with active borrowings".to_string(),
            ));
        }

        self.repository.users.delete(id).await?;
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Make sure the configured administrator account exists
    pub async fn ensure_admin(&self, config: &BootstrapConfig) -> AppResult<()> {
        let (Some(membership_id), Some(password)) =
            (config.admin_membership_id.as_deref(), config.admin_password.as_deref())
        else {
            return Ok(());
        };

        let membership_id = normalize_membership_id(membership_id);
        if let Some(existing) = self.repository.users.get_by_membership_id(&membership_id).await? {
            if existing.role != Role::Admin {
                let changes = UpdateUser {
                    role: Some(Role::Admin),
                    ..Default::default()
                };
                self.repository.users.update(existing.id, &changes).await?;
                tracing::info!(membership_id = %membership_id, "Promoted bootstrap account to admin");
            }
            return Ok(());
        }

        self.create_user(CreateUser {
            name: config
                .admin_name
                .clone()
                .unwrap_or_else(|| "Administrator".to_string()),
            membership_id,
            password: password.to_string(),
            phone: config
                .admin_phone
                .clone()
                .unwrap_or_else(|| "0000000000".to_string()),
            address: None,
            membership_type: Some(MembershipType::Staff),
            role: Some(Role::Admin),
        })
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> UsersService {
        UsersService::new(Repository::in_memory())
    }

    fn register(membership_id: &str, phone: &str) -> RegisterUser {
        RegisterUser {
            name: "Grace Hopper".to_string(),
            membership_id: membership_id.to_string(),
            password: "secret1".to_string(),
            phone: phone.to_string(),
            address: None,
            membership_type: None,
        }
    }

    fn caller(user: &User) -> Caller {
        Caller::from(user)
    }

    #[tokio::test]
    async fn test_register_normalizes_membership_id() {
        let users = service();
        let user = users.register(register(" lib001 ", "0700000001")).await.unwrap();
        assert_eq!(user.membership_id, "LIB001");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.membership_type, MembershipType::Student);
        assert!(user.is_active);
    }

    #[tokio::test]
    async fn test_membership_id_is_case_insensitive_unique() {
        let users = service();
        users.register(register("lib001", "0700000001")).await.unwrap();
        let err = users.register(register("LIB001", "0700000002")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_phone_is_unique() {
        let users = service();
        users.register(register("lib001", "0700000001")).await.unwrap();
        let err = users.register(register("lib002", " 0700000001 ")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_short_password_rejected() {
        let users = service();
        let mut request = register("lib001", "0700000001");
        request.password = "abc".to_string();
        let err = users.register(request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_member_cannot_change_own_role() {
        let users = service();
        let member = users.register(register("lib001", "0700000001")).await.unwrap();

        let promote = UpdateUser {
            role: Some(Role::Admin),
            ..Default::default()
        };
        let err = users
            .update_user(&caller(&member), member.id, promote)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));

        let rename = UpdateProfile {
            name: Some("Grace B. Hopper".to_string()),
            phone: None,
            address: Some("Arlington".to_string()),
        };
        let updated = users.update_profile(&caller(&member), rename).await.unwrap();
        assert_eq!(updated.name, "Grace B. Hopper");
        assert_eq!(updated.address.as_deref(), Some("Arlington"));
        assert_eq!(updated.role, Role::User);
    }

    #[tokio::test]
    async fn test_admin_update_checks_uniqueness() {
        let users = service();
        users.register(register("lib001", "0700000001")).await.unwrap();
        let other = users.register(register("lib002", "0700000002")).await.unwrap();
        let admin = Caller {
            id: Uuid::new_v4(),
            membership_id: "ADMIN".to_string(),
            role: Role::Admin,
        };

        let clash = UpdateUser {
            membership_id: Some("Lib001".to_string()),
            ..Default::default()
        };
        let err = users.update_user(&admin, other.id, clash).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_change_password() {
        let users = service();
        let member = users.register(register("lib001", "0700000001")).await.unwrap();

        let wrong = ChangePassword {
            current_password: "nope".to_string(),
            new_password: "secret2".to_string(),
        };
        assert!(matches!(
            users.change_password(member.id, wrong).await,
            Err(AppError::Authentication(_))
        ));

        let right = ChangePassword {
            current_password: "secret1".to_string(),
            new_password: "secret2".to_string(),
        };
        users.change_password(member.id, right).await.unwrap();
        let stored = users.get_by_id(member.id).await.unwrap();
        assert!(verify_password(&stored.password, "secret2").unwrap());
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let users = service();
        let config = BootstrapConfig {
            admin_membership_id: Some("admin".to_string()),
            admin_password: Some("admin123".to_string()),
            admin_name: None,
            admin_phone: None,
        };
        users.ensure_admin(&config).await.unwrap();
        users.ensure_admin(&config).await.unwrap();

        let all = users.search_users(&UserQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].membership_id, "ADMIN");
        assert_eq!(all[0].role, Role::Admin);
    }

    #[tokio::test]
    async fn test_ensure_admin_without_config_does_nothing() {
        let users = service();
        users.ensure_admin(&BootstrapConfig::default()).await.unwrap();
        assert!(users.search_users(&UserQuery::default()).await.unwrap().is_empty());
    }
}
