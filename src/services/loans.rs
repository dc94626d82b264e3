//! Loan lifecycle service
//!
//! The only service that reaches across books, users and loans. A loan is
//! opened here, returned here exactly once, and its overdue flag is derived
//! whenever it is read.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{loan_days, LoanStatus},
        Book, CreateLoan, Loan, LoanSummary,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    default_days: i64,
}

impl LoansService {
    pub fn new(repository: Repository, default_days: i64) -> Self {
        Self {
            repository,
            default_days,
        }
    }

    /// Lend a book to a user
    pub async fn create_loan(&self, request: CreateLoan) -> AppResult<Loan> {
        request.validate()?;

        let mut book = self.repository.books.get_by_id(request.book_id).await?;
        let user = self.repository.users.get_by_id(request.user_id).await?;

        // The flag and the open-loan query are checked separately so that a
        // stale flag cannot let a second loan through.
        if !book.is_available {
            return Err(AppError::Conflict("Book is not available".to_string()));
        }
        if self
            .repository
            .loans
            .get_active_by_book(book.id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Book is already on loan".to_string()));
        }

        let days = loan_days(request.days_to_return, self.default_days);
        let mut loan = Loan::open(book.id, user.id, days, Utc::now());
        self.repository.loans.checkout(&loan).await?;

        book.is_available = false;
        book.updated_at = loan.created_at;

        tracing::info!(
            "Loan {} opened: book {} to user {}, due {}",
            loan.id,
            book.id,
            user.id,
            loan.due_date
        );

        loan.book = Some(book);
        loan.user = Some(user);
        Ok(loan)
    }

    /// Return a borrowed book
    pub async fn return_loan(&self, loan_id: Uuid) -> AppResult<Loan> {
        let mut loan = self.repository.loans.get_by_id(loan_id).await?;

        if loan.is_returned {
            return Err(AppError::Conflict("Loan already returned".to_string()));
        }

        let now = Utc::now();
        loan.return_date = Some(now);
        loan.is_returned = true;
        loan.is_overdue = false;
        loan.updated_at = now;
        self.repository.loans.update(&loan).await?;

        // The loan is closed at this point; restoring availability is best effort
        match self.release_book(loan.book_id, now).await {
            Ok(book) => loan.book = Some(book),
            Err(e) => tracing::warn!(
                "Loan {} returned but book {} availability was not restored: {}",
                loan.id,
                loan.book_id,
                e
            ),
        }
        if let Ok(user) = self.repository.users.get_by_id(loan.user_id).await {
            loan.user = Some(user);
        }

        tracing::info!("Loan {} returned", loan.id);
        Ok(loan)
    }

    /// Get a single loan with its book and user
    pub async fn get_loan(&self, loan_id: Uuid) -> AppResult<Loan> {
        let loan = self.repository.loans.get_by_id(loan_id).await?;
        Ok(self.prepare(loan, Utc::now()).await)
    }

    /// All loans, most recent first
    pub async fn list_loans(&self) -> AppResult<Vec<Loan>> {
        let loans = self.repository.loans.get_all().await?;
        Ok(self.prepare_all(loans).await)
    }

    /// Loans not yet returned
    pub async fn list_active(&self) -> AppResult<Vec<Loan>> {
        let loans = self.repository.loans.get_active().await?;
        Ok(self.prepare_all(loans).await)
    }

    /// Loans past their due date and not yet returned
    pub async fn list_overdue(&self) -> AppResult<Vec<Loan>> {
        let loans = self.repository.loans.get_overdue(Utc::now()).await?;
        Ok(self.prepare_all(loans).await)
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> AppResult<Vec<Loan>> {
        let loans = self.repository.loans.get_by_user(user_id).await?;
        Ok(self.prepare_all(loans).await)
    }

    pub async fn list_by_book(&self, book_id: Uuid) -> AppResult<Vec<Loan>> {
        let loans = self.repository.loans.get_by_book(book_id).await?;
        Ok(self.prepare_all(loans).await)
    }

    /// Count loans by lending state
    pub async fn summary(&self) -> AppResult<LoanSummary> {
        let now = Utc::now();
        let loans = self.list_loans().await?;

        let mut summary = LoanSummary {
            total: loans.len(),
            ..Default::default()
        };
        for loan in &loans {
            match loan.status(now) {
                LoanStatus::Active => summary.active += 1,
                LoanStatus::Overdue => {
                    summary.active += 1;
                    summary.overdue += 1;
                }
                LoanStatus::Returned => summary.returned += 1,
            }
        }
        Ok(summary)
    }

    async fn release_book(&self, book_id: Uuid, now: DateTime<Utc>) -> AppResult<Book> {
        let mut book = self.repository.books.get_by_id(book_id).await?;
        book.is_available = true;
        book.updated_at = now;
        self.repository.books.update(&book).await?;
        Ok(book)
    }

    async fn prepare_all(&self, loans: Vec<Loan>) -> Vec<Loan> {
        let now = Utc::now();
        let mut prepared = Vec::with_capacity(loans.len());
        for loan in loans {
            prepared.push(self.prepare(loan, now).await);
        }
        prepared
    }

    /// Attach relations and bring the overdue flag up to date
    async fn prepare(&self, mut loan: Loan, now: DateTime<Utc>) -> Loan {
        self.attach_relations(&mut loan).await;
        self.refresh_overdue(&mut loan, now).await;
        loan
    }

    /// Missing books or users are left unattached
    async fn attach_relations(&self, loan: &mut Loan) {
        if let Ok(book) = self.repository.books.get_by_id(loan.book_id).await {
            loan.book = Some(book);
        }
        if let Ok(user) = self.repository.users.get_by_id(loan.user_id).await {
            loan.user = Some(user);
        }
    }

    /// Persist the flag only when it changes
    async fn refresh_overdue(&self, loan: &mut Loan, now: DateTime<Utc>) {
        let overdue = loan.is_past_due(now);
        if loan.is_overdue == overdue {
            return;
        }
        // A returned loan is never overdue; an open one only becomes overdue
        if !overdue && !loan.is_returned {
            return;
        }

        loan.is_overdue = overdue;
        loan.updated_at = now;
        if let Err(e) = self.repository.loans.update(loan).await {
            tracing::warn!("Failed to persist overdue flag for loan {}: {}", loan.id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use tokio_test::assert_err;

    use super::*;
    use crate::{
        models::{CreateBook, CreateUser, User},
        repository::{MockBookStore, MockLoanStore},
        services::{books::BooksService, users::UsersService},
    };

    struct Fixture {
        repository: Repository,
        loans: LoansService,
        book: Book,
        user: User,
    }

    async fn fixture() -> Fixture {
        let repository = Repository::in_memory();
        let book = BooksService::new(repository.clone())
            .create_book(CreateBook {
                title: "The Left Hand of Darkness".to_string(),
                author: "Ursula K. Le Guin".to_string(),
                year_published: 1969,
                isbn: None,
            })
            .await
            .unwrap();
        let user = UsersService::new(repository.clone())
            .create_user(CreateUser {
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: None,
            })
            .await
            .unwrap();
        Fixture {
            loans: LoansService::new(repository.clone(), 14),
            repository,
            book,
            user,
        }
    }

    fn request(f: &Fixture, days: i64) -> CreateLoan {
        CreateLoan {
            book_id: f.book.id,
            user_id: f.user.id,
            days_to_return: days,
        }
    }

    /// Store an open loan that started `age_days` ago, bypassing checkout
    async fn seed_loan(f: &Fixture, age_days: i64, length_days: i64) -> Loan {
        let loan = Loan::open(
            f.book.id,
            f.user.id,
            length_days,
            Utc::now() - Duration::days(age_days),
        );
        f.repository.loans.create(&loan).await.unwrap();
        loan
    }

    #[tokio::test]
    async fn test_create_marks_book_on_loan_and_hydrates() {
        let f = fixture().await;
        let loan = f.loans.create_loan(request(&f, 10)).await.unwrap();

        assert_eq!(loan.due_date - loan.loan_date, Duration::days(10));
        assert!(!loan.is_returned);
        assert!(!loan.is_overdue);
        assert_eq!(loan.user.as_ref().map(|u| u.id), Some(f.user.id));
        assert_eq!(loan.book.as_ref().map(|b| b.is_available), Some(false));

        let stored = f.repository.books.get_by_id(f.book.id).await.unwrap();
        assert!(!stored.is_available);
    }

    #[tokio::test]
    async fn test_create_defaults_to_fourteen_days() {
        let f = fixture().await;
        let loan = f.loans.create_loan(request(&f, 0)).await.unwrap();
        assert_eq!(loan.due_date - loan.loan_date, Duration::days(14));

        let f = fixture().await;
        let loan = f.loans.create_loan(request(&f, -5)).await.unwrap();
        assert_eq!(loan.due_date - loan.loan_date, Duration::days(14));
    }

    #[tokio::test]
    async fn test_create_rejects_oversized_loan_period() {
        let f = fixture().await;

        let err = f
            .loans
            .create_loan(request(&f, 1_000_000_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(f.loans.list_loans().await.unwrap().is_empty());
        assert!(f.repository.books.get_by_id(f.book.id).await.unwrap().is_available);

        let loan = f.loans.create_loan(request(&f, 3650)).await.unwrap();
        assert_eq!(loan.due_date - loan.loan_date, Duration::days(3650));
    }

    #[tokio::test]
    async fn test_second_loan_on_same_book_conflicts() {
        let f = fixture().await;
        f.loans.create_loan(request(&f, 7)).await.unwrap();

        let err = f.loans.create_loan(request(&f, 7)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(f.loans.list_by_book(f.book.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_open_loan_blocks_even_when_flag_says_available() {
        let f = fixture().await;
        seed_loan(&f, 0, 14).await;
        assert!(f.repository.books.get_by_id(f.book.id).await.unwrap().is_available);

        let err = f.loans.create_loan(request(&f, 7)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_unknown_book_or_user() {
        let f = fixture().await;

        let err = f
            .loans
            .create_loan(CreateLoan {
                book_id: Uuid::new_v4(),
                ..request(&f, 7)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = f
            .loans
            .create_loan(CreateLoan {
                user_id: Uuid::new_v4(),
                ..request(&f, 7)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(f.repository.books.get_by_id(f.book.id).await.unwrap().is_available);
    }

    #[tokio::test]
    async fn test_return_happens_exactly_once() {
        let f = fixture().await;
        let loan = f.loans.create_loan(request(&f, 7)).await.unwrap();

        let returned = f.loans.return_loan(loan.id).await.unwrap();
        assert!(returned.is_returned);
        assert!(returned.return_date.is_some());
        assert_eq!(returned.book.as_ref().map(|b| b.is_available), Some(true));
        assert!(f.repository.books.get_by_id(f.book.id).await.unwrap().is_available);

        assert_err!(f.loans.return_loan(loan.id).await);
        let err = f.loans.return_loan(loan.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_return_unknown_loan() {
        let f = fixture().await;
        let err = f.loans.return_loan(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_book_can_be_lent_again_after_return() {
        let f = fixture().await;
        let first = f.loans.create_loan(request(&f, 7)).await.unwrap();
        f.loans.return_loan(first.id).await.unwrap();

        let second = f.loans.create_loan(request(&f, 7)).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(f.loans.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overdue_flag_derived_and_persisted_on_read() {
        let f = fixture().await;
        let seeded = seed_loan(&f, 20, 14).await;
        assert!(!seeded.is_overdue);

        let overdue = f.loans.list_overdue().await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert!(overdue[0].is_overdue);
        assert_eq!(overdue[0].book.as_ref().map(|b| b.id), Some(f.book.id));

        let stored = f.repository.loans.get_by_id(seeded.id).await.unwrap();
        assert!(stored.is_overdue);

        // Reading again keeps it overdue
        let again = f.loans.get_loan(seeded.id).await.unwrap();
        assert!(again.is_overdue);
        assert_eq!(again.status(Utc::now()), LoanStatus::Overdue);
    }

    #[tokio::test]
    async fn test_returned_loan_is_never_overdue() {
        let f = fixture().await;
        let seeded = seed_loan(&f, 20, 14).await;
        f.loans.list_loans().await.unwrap();

        let returned = f.loans.return_loan(seeded.id).await.unwrap();
        assert!(!returned.is_overdue);

        let listed = f.loans.list_by_user(f.user.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].is_overdue);
        assert!(f.loans.list_overdue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_relations_are_skipped() {
        let f = fixture().await;
        let loan = Loan::open(Uuid::new_v4(), f.user.id, 14, Utc::now());
        f.repository.loans.create(&loan).await.unwrap();

        let listed = f.loans.list_loans().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].book.is_none());
        assert_eq!(listed[0].user.as_ref().map(|u| u.id), Some(f.user.id));
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let f = fixture().await;
        let returned = f.loans.create_loan(request(&f, 7)).await.unwrap();
        f.loans.return_loan(returned.id).await.unwrap();
        seed_loan(&f, 30, 14).await;

        let summary = f.loans.summary().await.unwrap();
        assert_eq!(
            summary,
            LoanSummary {
                total: 2,
                active: 1,
                overdue: 1,
                returned: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_return_survives_book_reload_failure() {
        let memory = Repository::in_memory();
        let loan = Loan::open(Uuid::new_v4(), Uuid::new_v4(), 14, Utc::now());
        memory.loans.create(&loan).await.unwrap();

        let mut books = MockBookStore::new();
        books
            .expect_get_by_id()
            .returning(|id| Err(AppError::NotFound(format!("Book {} not found", id))));
        books.expect_update().never();

        let repository = Repository {
            books: Arc::new(books),
            ..memory.clone()
        };
        let service = LoansService::new(repository, 14);

        let returned = service.return_loan(loan.id).await.unwrap();
        assert!(returned.is_returned);
        assert!(returned.book.is_none());
        assert!(memory.loans.get_by_id(loan.id).await.unwrap().is_returned);
    }

    #[tokio::test]
    async fn test_overdue_persist_failure_does_not_fail_read() {
        let past_due = Loan::open(
            Uuid::new_v4(),
            Uuid::new_v4(),
            14,
            Utc::now() - Duration::days(30),
        );

        let mut loans = MockLoanStore::new();
        let stored = past_due.clone();
        loans
            .expect_get_all()
            .returning(move || Ok(vec![stored.clone()]));
        loans
            .expect_update()
            .times(1)
            .returning(|_| Err(AppError::Internal("disk full".to_string())));

        let repository = Repository {
            loans: Arc::new(loans),
            ..Repository::in_memory()
        };
        let service = LoansService::new(repository, 14);

        let listed = service.list_loans().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_overdue);
    }
}
