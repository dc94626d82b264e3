//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{books, health, loans, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lending API",
        version = "0.1.0",
        description = "Library lending tracker REST API"
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Books
        books::list_books,
        books::list_available,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        users::delete_user,
        // Loans
        loans::create_loan,
        loans::return_loan,
        loans::get_loan,
        loans::list_loans,
        loans::list_active,
        loans::list_overdue,
        loans::loan_summary,
        loans::list_user_loans,
        loans::list_book_loans,
    ),
    components(
        schemas(
            // Books
            crate::models::book::Book,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            // Users
            crate::models::user::User,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            // Loans
            crate::models::loan::Loan,
            crate::models::loan::LoanStatus,
            crate::models::loan::CreateLoan,
            crate::models::loan::LoanSummary,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "books", description = "Book catalogue"),
        (name = "users", description = "User management"),
        (name = "loans", description = "Loan management")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
