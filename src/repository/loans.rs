//! Loans repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::LoanStore;
use crate::{
    error::{AppError, AppResult},
    models::Loan,
};

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoanStore for LoansRepository {
    async fn create(&self, loan: &Loan) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO loans (
                id, book_id, user_id, loan_date, due_date, return_date,
                is_returned, is_overdue, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(loan.id)
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .bind(loan.return_date)
        .bind(loan.is_returned)
        .bind(loan.is_overdue)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_store(e, "Book is already on loan"))?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", id)))
    }

    async fn get_all(&self) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>("SELECT * FROM loans ORDER BY loan_date DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(loans)
    }

    async fn update(&self, loan: &Loan) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE loans
            SET book_id = $1, user_id = $2, loan_date = $3, due_date = $4, return_date = $5,
                is_returned = $6, is_overdue = $7, updated_at = $8
            WHERE id = $9
            "#,
        )
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .bind(loan.return_date)
        .bind(loan.is_returned)
        .bind(loan.is_overdue)
        .bind(loan.updated_at)
        .bind(loan.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Loan {} not found", loan.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM loans WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Loan {} not found", id)));
        }
        Ok(())
    }

    async fn get_active(&self) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE is_returned = FALSE ORDER BY loan_date DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn get_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE is_returned = FALSE AND due_date < $1 ORDER BY due_date",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE user_id = $1 ORDER BY loan_date DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn get_by_book(&self, book_id: Uuid) -> AppResult<Vec<Loan>> {
        let loans = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE book_id = $1 ORDER BY loan_date DESC",
        )
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn get_active_by_book(&self, book_id: Uuid) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(
            "SELECT * FROM loans WHERE book_id = $1 AND is_returned = FALSE LIMIT 1",
        )
        .bind(book_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    async fn checkout(&self, loan: &Loan) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        // Lock the book row so a concurrent checkout waits for this one
        let available: bool = sqlx::query_scalar(
            "SELECT is_available FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(loan.book_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book {} not found", loan.book_id)))?;

        let user_exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
                .bind(loan.user_id)
                .fetch_one(&mut *tx)
                .await?;
        if !user_exists {
            return Err(AppError::NotFound(format!("User {} not found", loan.user_id)));
        }

        if !available {
            return Err(AppError::Conflict("Book is not available".to_string()));
        }

        let already_on_loan: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE book_id = $1 AND is_returned = FALSE)",
        )
        .bind(loan.book_id)
        .fetch_one(&mut *tx)
        .await?;
        if already_on_loan {
            return Err(AppError::Conflict("Book is already on loan".to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO loans (
                id, book_id, user_id, loan_date, due_date, return_date,
                is_returned, is_overdue, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NULL, FALSE, FALSE, $6, $7)
            "#,
        )
        .bind(loan.id)
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .bind(loan.created_at)
        .bind(loan.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_store(e, "Book is already on loan"))?;

        sqlx::query("UPDATE books SET is_available = FALSE, updated_at = $1 WHERE id = $2")
            .bind(loan.created_at)
            .bind(loan.book_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
