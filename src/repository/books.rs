//! Books repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::BookStore;
use crate::{
    error::{AppError, AppResult},
    models::Book,
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for BooksRepository {
    async fn create(&self, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, title, author, year_published, isbn, is_available, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(book.id)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.year_published)
        .bind(&book.isbn)
        .bind(book.is_available)
        .bind(book.created_at)
        .bind(book.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
    }

    async fn get_all(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>("SELECT * FROM books ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(books)
    }

    async fn update(&self, book: &Book) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE books
            SET title = $1, author = $2, year_published = $3, isbn = $4,
                is_available = $5, updated_at = $6
            WHERE id = $7
            "#,
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.year_published)
        .bind(&book.isbn)
        .bind(book.is_available)
        .bind(book.updated_at)
        .bind(book.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book {} not found", book.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book {} not found", id)));
        }
        Ok(())
    }

    async fn get_available(&self) -> AppResult<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT * FROM books WHERE is_available = TRUE ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(books)
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
