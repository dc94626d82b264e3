//! Book model and request types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::non_empty;

/// Book record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub year_published: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isbn: Option<String>,
    /// False while exactly one open loan references the book
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Build a new, available book from a validated request
    pub fn new(data: CreateBook, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: data.title,
            author: data.author,
            year_published: data.year_published,
            isbn: non_empty(data.isbn),
            is_available: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Create book request
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[serde(default)]
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    #[serde(default)]
    pub year_published: i32,
    #[serde(default)]
    pub isbn: Option<String>,
}

/// Update book request.
///
/// Empty strings and non-positive years keep the stored value, except
/// `isbn` which always replaces it (absent or empty clears it).
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateBook {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub year_published: Option<i32>,
    #[serde(default)]
    pub isbn: Option<String>,
}
