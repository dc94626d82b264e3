//! Data models for the lending tracker

pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::{Book, CreateBook, UpdateBook};
pub use loan::{CreateLoan, Loan, LoanStatus, LoanSummary};
pub use user::{CreateUser, UpdateUser, User};

/// Collapse empty optional strings to `None`
pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
