//! Persistence ports and their adapters
//!
//! Each entity has its own store trait. Services only see the traits; the
//! PostgreSQL adapters back the running server and the in-memory adapters
//! back development mode and tests.

pub mod books;
pub mod loans;
pub mod memory;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, Loan, User},
};

/// Book persistence port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn create(&self, book: &Book) -> AppResult<()>;

    /// Fails with `NotFound` when the id does not resolve
    async fn get_by_id(&self, id: Uuid) -> AppResult<Book>;

    /// All books ordered by title
    async fn get_all(&self) -> AppResult<Vec<Book>>;

    async fn update(&self, book: &Book) -> AppResult<()>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Books not currently on loan, ordered by title
    async fn get_available(&self) -> AppResult<Vec<Book>>;

    /// Cheap round trip proving the backing store answers
    async fn ping(&self) -> AppResult<()>;
}

/// User persistence port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered
    async fn create(&self, user: &User) -> AppResult<()>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<User>;

    /// All users ordered by name
    async fn get_all(&self) -> AppResult<Vec<User>>;

    async fn update(&self, user: &User) -> AppResult<()>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>>;
}

/// Loan persistence port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoanStore: Send + Sync {
    async fn create(&self, loan: &Loan) -> AppResult<()>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Loan>;

    /// All loans, newest loan date first
    async fn get_all(&self) -> AppResult<Vec<Loan>>;

    async fn update(&self, loan: &Loan) -> AppResult<()>;

    async fn delete(&self, id: Uuid) -> AppResult<()>;

    /// Loans not yet returned
    async fn get_active(&self) -> AppResult<Vec<Loan>>;

    /// Loans not yet returned whose due date is before `now`
    async fn get_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>>;

    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Vec<Loan>>;

    async fn get_by_book(&self, book_id: Uuid) -> AppResult<Vec<Loan>>;

    /// The open loan for a book, if any
    async fn get_active_by_book(&self, book_id: Uuid) -> AppResult<Option<Loan>>;

    /// Persist a new loan and mark its book on loan as one atomic unit.
    ///
    /// Book existence, user existence, book availability and the absence of
    /// another open loan are re-checked inside the same unit; nothing is
    /// written when any of them fails.
    async fn checkout(&self, loan: &Loan) -> AppResult<()>;
}

/// Store handles shared by all services
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub users: Arc<dyn UserStore>,
    pub loans: Arc<dyn LoanStore>,
}

impl Repository {
    /// Create a repository backed by PostgreSQL
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            loans: Arc::new(loans::LoansRepository::new(pool)),
        }
    }

    /// Create a repository whose stores share one in-memory state
    pub fn in_memory() -> Self {
        let state = memory::MemoryState::shared();
        Self {
            books: Arc::new(memory::MemoryBookStore::new(state.clone())),
            users: Arc::new(memory::MemoryUserStore::new(state.clone())),
            loans: Arc::new(memory::MemoryLoanStore::new(state)),
        }
    }
}
