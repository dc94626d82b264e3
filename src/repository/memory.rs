//! In-memory stores
//!
//! All three stores share one `MemoryState` behind a single mutex, so a
//! checkout observes and mutates books, users and loans as one unit.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BookStore, LoanStore, UserStore};
use crate::{
    error::{AppError, AppResult},
    models::{Book, Loan, User},
};

#[derive(Debug, Default)]
pub struct MemoryState {
    books: HashMap<Uuid, Book>,
    users: HashMap<Uuid, User>,
    loans: HashMap<Uuid, Loan>,
}

pub type SharedState = Arc<Mutex<MemoryState>>;

impl MemoryState {
    pub fn shared() -> SharedState {
        Arc::new(Mutex::new(Self::default()))
    }

    fn email_taken(&self, email: &str, exclude: Uuid) -> bool {
        self.users
            .values()
            .any(|u| u.email == email && u.id != exclude)
    }

    fn loans_where(&self, pred: impl Fn(&Loan) -> bool) -> Vec<Loan> {
        let mut loans: Vec<Loan> = self.loans.values().filter(|l| pred(l)).cloned().collect();
        loans.sort_by(|a, b| b.loan_date.cmp(&a.loan_date));
        loans
    }
}

fn sorted_books(books: impl Iterator<Item = Book>) -> Vec<Book> {
    let mut books: Vec<Book> = books.collect();
    books.sort_by(|a, b| a.title.cmp(&b.title));
    books
}

#[derive(Clone)]
pub struct MemoryBookStore {
    state: SharedState,
}

impl MemoryBookStore {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn create(&self, book: &Book) -> AppResult<()> {
        self.state.lock().await.books.insert(book.id, book.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        self.state
            .lock()
            .await
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
    }

    async fn get_all(&self) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        Ok(sorted_books(state.books.values().cloned()))
    }

    async fn update(&self, book: &Book) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match state.books.get_mut(&book.id) {
            Some(stored) => {
                *stored = book.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Book {} not found", book.id))),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.state
            .lock()
            .await
            .books
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", id)))
    }

    async fn get_available(&self) -> AppResult<Vec<Book>> {
        let state = self.state.lock().await;
        Ok(sorted_books(
            state.books.values().filter(|b| b.is_available).cloned(),
        ))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryUserStore {
    state: SharedState,
}

impl MemoryUserStore {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: &User) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.email_taken(&user.email, user.id) {
            return Err(AppError::Conflict("Email already in use".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<User> {
        self.state
            .lock()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn get_all(&self) -> AppResult<Vec<User>> {
        let state = self.state.lock().await;
        let mut users: Vec<User> = state.users.values().cloned().collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(users)
    }

    async fn update(&self, user: &User) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&user.id) {
            return Err(AppError::NotFound(format!("User {} not found", user.id)));
        }
        if state.email_taken(&user.email, user.id) {
            return Err(AppError::Conflict("Email already in use".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.state
            .lock()
            .await
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
    }

    async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }
}

#[derive(Clone)]
pub struct MemoryLoanStore {
    state: SharedState,
}

impl MemoryLoanStore {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl LoanStore for MemoryLoanStore {
    async fn create(&self, loan: &Loan) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let open_exists = state
            .loans
            .values()
            .any(|l| l.book_id == loan.book_id && !l.is_returned);
        if !loan.is_returned && open_exists {
            return Err(AppError::Conflict("Book is already on loan".to_string()));
        }
        state.loans.insert(loan.id, strip_relations(loan));
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Loan> {
        self.state
            .lock()
            .await
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", id)))
    }

    async fn get_all(&self) -> AppResult<Vec<Loan>> {
        Ok(self.state.lock().await.loans_where(|_| true))
    }

    async fn update(&self, loan: &Loan) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match state.loans.get_mut(&loan.id) {
            Some(stored) => {
                *stored = strip_relations(loan);
                Ok(())
            }
            None => Err(AppError::NotFound(format!("Loan {} not found", loan.id))),
        }
    }

    async fn delete(&self, id: Uuid) -> AppResult<()> {
        self.state
            .lock()
            .await
            .loans
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Loan {} not found", id)))
    }

    async fn get_active(&self) -> AppResult<Vec<Loan>> {
        Ok(self.state.lock().await.loans_where(|l| !l.is_returned))
    }

    async fn get_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Loan>> {
        let mut loans = self
            .state
            .lock()
            .await
            .loans_where(|l| !l.is_returned && l.due_date < now);
        loans.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(loans)
    }

    async fn get_by_user(&self, user_id: Uuid) -> AppResult<Vec<Loan>> {
        Ok(self.state.lock().await.loans_where(|l| l.user_id == user_id))
    }

    async fn get_by_book(&self, book_id: Uuid) -> AppResult<Vec<Loan>> {
        Ok(self.state.lock().await.loans_where(|l| l.book_id == book_id))
    }

    async fn get_active_by_book(&self, book_id: Uuid) -> AppResult<Option<Loan>> {
        let state = self.state.lock().await;
        Ok(state
            .loans
            .values()
            .find(|l| l.book_id == book_id && !l.is_returned)
            .cloned())
    }

    async fn checkout(&self, loan: &Loan) -> AppResult<()> {
        let mut state = self.state.lock().await;

        let available = state
            .books
            .get(&loan.book_id)
            .map(|b| b.is_available)
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", loan.book_id)))?;
        if !state.users.contains_key(&loan.user_id) {
            return Err(AppError::NotFound(format!("User {} not found", loan.user_id)));
        }
        if !available {
            return Err(AppError::Conflict("Book is not available".to_string()));
        }
        if state
            .loans
            .values()
            .any(|l| l.book_id == loan.book_id && !l.is_returned)
        {
            return Err(AppError::Conflict("Book is already on loan".to_string()));
        }

        state.loans.insert(loan.id, strip_relations(loan));
        if let Some(book) = state.books.get_mut(&loan.book_id) {
            book.is_available = false;
            book.updated_at = loan.created_at;
        }
        Ok(())
    }
}

/// Stored loans never carry hydrated relations
fn strip_relations(loan: &Loan) -> Loan {
    Loan {
        book: None,
        user: None,
        ..loan.clone()
    }
}
