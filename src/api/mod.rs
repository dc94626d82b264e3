//! API handlers for the lending REST endpoints

pub mod books;
pub mod health;
pub mod loans;
pub mod openapi;
pub mod users;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path},
    http::request::Parts,
    routing::{get, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::{error::AppError, AppState};

/// Extractor for the `:id` path segment, rejecting malformed UUIDs with 400
pub struct EntityId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for EntityId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        Uuid::parse_str(&raw)
            .map(EntityId)
            .map_err(|_| AppError::BadRequest(format!("Invalid id: {}", raw)))
    }
}

/// JSON body extractor whose rejections use the API error body
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/available", get(books::list_available))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Loans
        .route("/loans", get(loans::list_loans).post(loans::create_loan))
        .route("/loans/active", get(loans::list_active))
        .route("/loans/overdue", get(loans::list_overdue))
        .route("/loans/summary", get(loans::loan_summary))
        .route("/loans/user/:id", get(loans::list_user_loans))
        .route("/loans/book/:id", get(loans::list_book_loans))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", put(loans::return_loan));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api", api)
        .with_state(state)
        .merge(openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
