//! Users repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::UserStore;
use crate::{
    error::{AppError, AppResult},
    models::User,
};

const DUPLICATE_EMAIL: &str = "Email already in use";

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UsersRepository {
    async fn create(&self, user: &User) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, phone, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_store(e, DUPLICATE_EMAIL))?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn get_all(&self) -> AppResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn update(&self, user: &User) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE users SET name = $1, email = $2, phone = $3, updated_at = $4 WHERE id = $5",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_store(e, DUPLICATE_EMAIL))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }
}
