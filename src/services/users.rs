//! Patron registry service

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{non_empty, user::is_valid_email, CreateUser, UpdateUser, User},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
}

impl UsersService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub async fn list_users(&self) -> AppResult<Vec<User>> {
        self.repository.users.get_all().await
    }

    /// Register a new user
    pub async fn create_user(&self, data: CreateUser) -> AppResult<User> {
        data.validate()?;

        // Check if email already exists
        if self.repository.users.get_by_email(&data.email).await?.is_some() {
            return Err(AppError::Conflict("Email already in use".to_string()));
        }

        let user = User::new(data, Utc::now());
        self.repository.users.create(&user).await?;

        tracing::info!("User {} registered", user.id);
        Ok(user)
    }

    /// Partially update a user.
    ///
    /// An empty name keeps the stored one; the phone is always replaced.
    pub async fn update_user(&self, id: Uuid, data: UpdateUser) -> AppResult<User> {
        let mut user = self.repository.users.get_by_id(id).await?;

        if let Some(name) = non_empty(data.name) {
            user.name = name;
        }

        if let Some(email) = non_empty(data.email) {
            if !is_valid_email(&email) {
                return Err(AppError::Validation("Invalid email format".to_string()));
            }
            // Check if email already exists for another user
            if let Some(existing) = self.repository.users.get_by_email(&email).await? {
                if existing.id != user.id {
                    return Err(AppError::Conflict("Email already in use".to_string()));
                }
            }
            user.email = email;
        }

        user.phone = non_empty(data.phone);
        user.updated_at = Utc::now();

        self.repository.users.update(&user).await?;
        Ok(user)
    }

    /// Delete a user who holds no open loans
    pub async fn delete_user(&self, id: Uuid) -> AppResult<()> {
        let loans = self.repository.loans.get_by_user(id).await?;
        if loans.iter().any(|loan| !loan.is_returned) {
            return Err(AppError::Conflict(
                "Cannot delete a user with active loans".to_string(),
            ));
        }

        self.repository.users.delete(id).await?;
        tracing::info!("User {} deleted", id);
        Ok(())
    }
}
