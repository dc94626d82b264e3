//! User (patron) model and request types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::non_empty;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
});

/// Check an address against the `local@domain.tld` shape
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// User record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Unique across all users
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(data: CreateUser, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: data.name,
            email: data.email,
            phone: non_empty(data.phone),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Create user request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateUser {
    #[serde(default)]
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(
        length(min = 1, message = "Email is required"),
        regex(path = *EMAIL_REGEX, message = "Invalid email format")
    )]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Update user request.
///
/// An empty name keeps the stored one; `phone` always replaces the stored
/// value; a non-empty `email` is re-validated and must stay unique.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateUser {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}
