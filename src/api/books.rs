//! Book catalogue endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::{Book, CreateBook, UpdateBook},
    AppState,
};

use super::{AppJson, EntityId};

/// List all books, ordered by title
#[utoipa::path(
    get,
    path = "/api/books",
    tag = "books",
    responses(
        (status = 200, description = "All books", body = Vec<Book>)
    )
)]
pub async fn list_books(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.books.list_books().await?;
    Ok(Json(books))
}

/// List books that can be lent right now
#[utoipa::path(
    get,
    path = "/api/books/available",
    tag = "books",
    responses(
        (status = 200, description = "Available books", body = Vec<Book>)
    )
)]
pub async fn list_available(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
    let books = state.services.books.list_available().await?;
    Ok(Json(books))
}

/// Get book details by ID
#[utoipa::path(
    get,
    path = "/api/books/{id}",
    tag = "books",
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> AppResult<Json<Book>> {
    let book = state.services.books.get_by_id(id).await?;
    Ok(Json(book))
}

/// Add a book to the catalogue
#[utoipa::path(
    post,
    path = "/api/books",
    tag = "books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Missing title or author")
    )
)]
pub async fn create_book(
    State(state): State<AppState>,
    AppJson(data): AppJson<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let book = state.services.books.create_book(data).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Update a book
#[utoipa::path(
    put,
    path = "/api/books/{id}",
    tag = "books",
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 404, description = "Book not found")
    )
)]
pub async fn update_book(
    State(state): State<AppState>,
    EntityId(id): EntityId,
    AppJson(data): AppJson<UpdateBook>,
) -> AppResult<Json<Book>> {
    let book = state.services.books.update_book(id, data).await?;
    Ok(Json(book))
}

/// Delete a book
#[utoipa::path(
    delete,
    path = "/api/books/{id}",
    tag = "books",
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book is on loan")
    )
)]
pub async fn delete_book(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> AppResult<StatusCode> {
    state.services.books.delete_book(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
