//! Loan model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::book::Book;
use super::user::User;

/// Loan length applied when the caller asks for zero or fewer days
pub const DEFAULT_LOAN_DAYS: i64 = 14;

/// Longest loan that can be requested or configured
pub const MAX_LOAN_DAYS: i64 = 3650;

/// Loan record, optionally hydrated with its book and borrower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: Uuid,
    pub book_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book: Option<Book>,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<DateTime<Utc>>,
    pub is_returned: bool,
    /// Derived from `due_date` on read; never true once returned
    pub is_overdue: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived lending state of a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Overdue,
    Returned,
}

impl Loan {
    /// Open a loan starting at `now`, due `days` days later
    pub fn open(book_id: Uuid, user_id: Uuid, days: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            book_id,
            user_id,
            book: None,
            user: None,
            loan_date: now,
            due_date: now + Duration::days(days),
            return_date: None,
            is_returned: false,
            is_overdue: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the loan is still out and its due date has passed
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_returned && now > self.due_date
    }

    pub fn status(&self, now: DateTime<Utc>) -> LoanStatus {
        if self.is_returned {
            LoanStatus::Returned
        } else if self.is_past_due(now) {
            LoanStatus::Overdue
        } else {
            LoanStatus::Active
        }
    }
}

/// Resolve the requested loan length, falling back to `default_days`
pub fn loan_days(requested: i64, default_days: i64) -> i64 {
    if requested <= 0 {
        default_days
    } else {
        requested
    }
}

/// Create loan request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub book_id: Uuid,
    pub user_id: Uuid,
    /// Days until due; zero or negative means the default of 14
    #[serde(default)]
    #[validate(range(max = 3650, message = "Loan period cannot exceed 3650 days"))]
    pub days_to_return: i64,
}

/// Loan counts for the reports screen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct LoanSummary {
    pub total: usize,
    pub active: usize,
    pub overdue: usize,
    pub returned: usize,
}
