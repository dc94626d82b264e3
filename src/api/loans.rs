//! Loan management endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::{CreateLoan, Loan, LoanSummary},
    AppState,
};

use super::{AppJson, EntityId};

/// Lend a book to a user
#[utoipa::path(
    post,
    path = "/api/loans",
    tag = "loans",
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 404, description = "Book or user not found"),
        (status = 409, description = "Book is not available")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateLoan>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let loan = state.services.loans.create_loan(request).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book
#[utoipa::path(
    put,
    path = "/api/loans/{id}/return",
    tag = "loans",
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Book returned", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.return_loan(id).await?;
    Ok(Json(loan))
}

/// Get a loan by ID
#[utoipa::path(
    get,
    path = "/api/loans/{id}",
    tag = "loans",
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan details", body = Loan),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> AppResult<Json<Loan>> {
    let loan = state.services.loans.get_loan(id).await?;
    Ok(Json(loan))
}

/// List all loans, most recent first
#[utoipa::path(
    get,
    path = "/api/loans",
    tag = "loans",
    responses(
        (status = 200, description = "All loans", body = Vec<Loan>)
    )
)]
pub async fn list_loans(State(state): State<AppState>) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loans.list_loans().await?;
    Ok(Json(loans))
}

/// List loans not yet returned
#[utoipa::path(
    get,
    path = "/api/loans/active",
    tag = "loans",
    responses(
        (status = 200, description = "Active loans", body = Vec<Loan>)
    )
)]
pub async fn list_active(State(state): State<AppState>) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loans.list_active().await?;
    Ok(Json(loans))
}

/// List loans past their due date
#[utoipa::path(
    get,
    path = "/api/loans/overdue",
    tag = "loans",
    responses(
        (status = 200, description = "Overdue loans", body = Vec<Loan>)
    )
)]
pub async fn list_overdue(State(state): State<AppState>) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loans.list_overdue().await?;
    Ok(Json(loans))
}

/// Loan counts by state
#[utoipa::path(
    get,
    path = "/api/loans/summary",
    tag = "loans",
    responses(
        (status = 200, description = "Loan counts", body = LoanSummary)
    )
)]
pub async fn loan_summary(State(state): State<AppState>) -> AppResult<Json<LoanSummary>> {
    let summary = state.services.loans.summary().await?;
    Ok(Json(summary))
}

/// List every loan of a user
#[utoipa::path(
    get,
    path = "/api/loans/user/{id}",
    tag = "loans",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "The user's loans", body = Vec<Loan>)
    )
)]
pub async fn list_user_loans(
    State(state): State<AppState>,
    EntityId(user_id): EntityId,
) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loans.list_by_user(user_id).await?;
    Ok(Json(loans))
}

/// List every loan of a book
#[utoipa::path(
    get,
    path = "/api/loans/book/{id}",
    tag = "loans",
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 200, description = "The book's loans", body = Vec<Loan>)
    )
)]
pub async fn list_book_loans(
    State(state): State<AppState>,
    EntityId(book_id): EntityId,
) -> AppResult<Json<Vec<Loan>>> {
    let loans = state.services.loans.list_by_book(book_id).await?;
    Ok(Json(loans))
}
