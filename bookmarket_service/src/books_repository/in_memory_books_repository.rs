use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::api::{Book, BookId, BookPatch, BookQuery, BookSort, Pagination, UserId};
use crate::books_repository::{apply_patch, BookRepository, BookRepositoryError};
use crate::validation::validate_book;

#[derive(Default)]
pub struct InMemoryBookRepository {
    books: parking_lot::RwLock<HashMap<BookId, Book>>,
}

fn matches_search(book: &Book, search: &str) -> bool {
    let needle = search.to_lowercase();
    [
        book.title.as_str(),
        book.authors.as_str(),
        book.publisher.as_str(),
        book.seller.id(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(&needle))
        || price_text(book.price).contains(&needle)
}

/// Price as it appears in the stored JSON document, `12.0` rather than `12`
fn price_text(price: f64) -> String {
    serde_json::to_string(&price).unwrap_or_default()
}

fn compare_books(sort: BookSort, a: &Book, b: &Book) -> Ordering {
    let ordering = match sort {
        BookSort::Recent => b.publication_date.cmp(&a.publication_date),
        BookSort::Smallest => a.pages.cmp(&b.pages),
        BookSort::Biggest => b.pages.cmp(&a.pages),
        BookSort::Cheapest => a.price.total_cmp(&b.price),
        BookSort::MostExpensive => b.price.total_cmp(&a.price),
    };
    ordering.then_with(|| a.id.cmp(&b.id))
}

fn paginate(books: Vec<Book>, pagination: Pagination) -> Vec<Book> {
    books
        .into_iter()
        .skip(pagination.offset() as usize)
        .take(pagination.limit as usize)
        .collect()
}

#[async_trait::async_trait]
impl BookRepository for InMemoryBookRepository {
    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
        validate_book(&book)?;
        match self.books.write().entry(book.id.clone()) {
            Entry::Occupied(_) => Err(BookRepositoryError::AlreadyExists(book.id)),
            Entry::Vacant(entry) => Ok(entry.insert(book).clone()),
        }
    }

    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, BookRepositoryError> {
        let mut books: Vec<Book> = self
            .books
            .read()
            .values()
            .filter(|book| {
                query
                    .search
                    .as_deref()
                    .map(|search| matches_search(book, search))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        books.sort_by(|a, b| compare_books(query.sort, a, b));
        Ok(paginate(books, query.pagination))
    }

    async fn list_books_by_seller(
        &self,
        seller_id: &UserId,
        pagination: Option<Pagination>,
    ) -> Result<Vec<Book>, BookRepositoryError> {
        let mut books: Vec<Book> = self
            .books
            .read()
            .values()
            .filter(|book| book.seller.id() == seller_id)
            .cloned()
            .collect();
        books.sort_by(|a, b| compare_books(BookSort::Recent, a, b));
        Ok(match pagination {
            Some(pagination) => paginate(books, pagination),
            None => books,
        })
    }

    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>, BookRepositoryError> {
        Ok(self.books.read().get(book_id).cloned())
    }

    async fn update_book(
        &self,
        book_id: &BookId,
        patch: BookPatch,
    ) -> Result<Option<Book>, BookRepositoryError> {
        let mut locked_books = self.books.write();
        if let Some(book) = locked_books.get_mut(book_id) {
            let patched = apply_patch(book, &patch)?;
            validate_book(&patched)?;
            *book = patched.clone();
            Ok(Some(patched))
        } else {
            Ok(None)
        }
    }

    async fn delete_book(&self, book_id: &BookId) -> Result<bool, BookRepositoryError> {
        Ok(self.books.write().remove(book_id).is_some())
    }
}
