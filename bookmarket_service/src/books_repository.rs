pub use in_memory_books_repository::InMemoryBookRepository;
pub use postgres_books_repository::{PostgresBooksRepository, PostgresBooksRepositoryConfig};

use crate::api::{Book, BookId, BookPatch, BookQuery, Pagination, UserId};
use crate::validation::ValidationError;

mod in_memory_books_repository;
mod postgres_books_repository;

#[derive(thiserror::Error, Debug)]
pub enum BookRepositoryError {
    #[error("Invalid book: {0}")]
    Validation(#[from] ValidationError),

    #[error("Book {0} already exists")]
    AlreadyExists(BookId),

    #[error("Failed to deserialize book: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait BookRepository: Send + Sync {
    /// Inserts a new book, the id is assigned by the caller
    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError>;
    /// Lists books matching the search, in the requested order and page
    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, BookRepositoryError>;
    /// Lists books sold by the seller, all of them when no pagination is given
    async fn list_books_by_seller(
        &self,
        seller_id: &UserId,
        pagination: Option<Pagination>,
    ) -> Result<Vec<Book>, BookRepositoryError>;
    /// Retrieves the book, None if it does not exist
    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>, BookRepositoryError>;
    /// Merges the patch into the stored book, returns None if book was not found
    async fn update_book(
        &self,
        book_id: &BookId,
        patch: BookPatch,
    ) -> Result<Option<Book>, BookRepositoryError>;
    /// Deletes the book, returns false if there was nothing to delete
    async fn delete_book(&self, book_id: &BookId) -> Result<bool, BookRepositoryError>;
}

/// Applies the patch as JSON merge patch, id and seller are kept from the stored book
pub(crate) fn apply_patch(book: &Book, patch: &BookPatch) -> Result<Book, BookRepositoryError> {
    let mut merged = serde_json::json!(book);
    json_patch::merge(&mut merged, &serde_json::json!(patch));
    let mut patched: Book = serde_json::from_value(merged)?;
    patched.id = book.id.clone();
    patched.seller = book.seller.clone();
    Ok(patched)
}
