//! Book catalogue service

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{non_empty, Book, CreateBook, UpdateBook},
    repository::Repository,
};

#[derive(Clone)]
pub struct BooksService {
    repository: Repository,
}

impl BooksService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Add a book to the catalogue; new books start available
    pub async fn create_book(&self, data: CreateBook) -> AppResult<Book> {
        data.validate()?;

        let book = Book::new(data, Utc::now());
        self.repository.books.create(&book).await?;

        tracing::info!("Book {} created: {}", book.id, book.title);
        Ok(book)
    }

    pub async fn get_by_id(&self, id: Uuid) -> AppResult<Book> {
        self.repository.books.get_by_id(id).await
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        self.repository.books.get_all().await
    }

    pub async fn list_available(&self) -> AppResult<Vec<Book>> {
        self.repository.books.get_available().await
    }

    /// Check that the catalogue store is reachable
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.books.ping().await
    }

    /// Partially update a book.
    ///
    /// Empty title/author and non-positive years keep the stored value;
    /// the ISBN is always replaced, so omitting it clears it.
    pub async fn update_book(&self, id: Uuid, data: UpdateBook) -> AppResult<Book> {
        let mut book = self.repository.books.get_by_id(id).await?;

        if let Some(title) = non_empty(data.title) {
            book.title = title;
        }
        if let Some(author) = non_empty(data.author) {
            book.author = author;
        }
        if let Some(year) = data.year_published.filter(|y| *y > 0) {
            book.year_published = year;
        }
        book.isbn = non_empty(data.isbn);
        book.updated_at = Utc::now();

        self.repository.books.update(&book).await?;
        Ok(book)
    }

    /// Delete a book that is not currently on loan
    pub async fn delete_book(&self, id: Uuid) -> AppResult<()> {
        if self.repository.loans.get_active_by_book(id).await?.is_some() {
            return Err(AppError::Conflict(
                "Cannot delete a book that is on loan".to_string(),
            ));
        }

        self.repository.books.delete(id).await?;
        tracing::info!("Book {} deleted", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Loan;

    fn service() -> (BooksService, Repository) {
        let repository = Repository::in_memory();
        (BooksService::new(repository.clone()), repository)
    }

    fn dune() -> CreateBook {
        CreateBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            year_published: 1965,
            isbn: Some("9780441013593".to_string()),
        }
    }

    #[tokio::test]
    async fn test_create_requires_title_and_author() {
        let (service, _) = service();

        let err = service
            .create_book(CreateBook {
                title: String::new(),
                ..dune()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = service
            .create_book(CreateBook {
                author: String::new(),
                ..dune()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_starts_available() {
        let (service, _) = service();
        let book = service.create_book(dune()).await.unwrap();
        assert!(book.is_available);
        assert_eq!(service.list_available().await.unwrap(), vec![book]);
    }

    #[tokio::test]
    async fn test_update_keeps_empty_fields_but_always_replaces_isbn() {
        let (service, _) = service();
        let book = service.create_book(dune()).await.unwrap();

        let updated = service
            .update_book(
                book.id,
                UpdateBook {
                    title: Some(String::new()),
                    author: None,
                    year_published: Some(0),
                    isbn: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.title, "Dune");
        assert_eq!(updated.author, "Frank Herbert");
        assert_eq!(updated.year_published, 1965);
        assert_eq!(updated.isbn, None);

        let updated = service
            .update_book(
                book.id,
                UpdateBook {
                    title: Some("Dune Messiah".to_string()),
                    year_published: Some(1969),
                    isbn: Some("9780593098233".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Dune Messiah");
        assert_eq!(updated.year_published, 1969);
        assert_eq!(updated.isbn.as_deref(), Some("9780593098233"));
        assert_eq!(service.get_by_id(book.id).await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_update_unknown_book() {
        let (service, _) = service();
        let err = service
            .update_book(Uuid::new_v4(), UpdateBook::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_guarded_by_open_loan() {
        let (service, repository) = service();
        let book = service.create_book(dune()).await.unwrap();

        let mut loan = Loan::open(book.id, Uuid::new_v4(), 14, Utc::now());
        repository.loans.create(&loan).await.unwrap();

        let err = service.delete_book(book.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        loan.is_returned = true;
        repository.loans.update(&loan).await.unwrap();
        service.delete_book(book.id).await.unwrap();
        assert!(service.list_books().await.unwrap().is_empty());
    }
}
