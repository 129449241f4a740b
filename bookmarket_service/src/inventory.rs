use std::path::PathBuf;
use std::sync::Arc;

use crate::api::{
    Book, BookId, BookPatch, BookQuery, NewBook, Pagination, SellerRef, SellerSummary, UserId,
};
use crate::book_content_store::{BookContentStore, ContentStoreError, StoredPdf};
use crate::books_repository::{BookRepository, BookRepositoryError};
use crate::id_generator::IdGenerator;
use crate::pdf_metadata::{PdfMetadata, PdfMetadataError};
use crate::users_repository::{UserRepository, UserRepositoryError};

#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    #[error(transparent)]
    Books(#[from] BookRepositoryError),

    #[error(transparent)]
    Users(#[from] UserRepositoryError),

    #[error(transparent)]
    Storage(#[from] ContentStoreError),

    #[error(transparent)]
    Pdf(#[from] PdfMetadataError),
}

/// Book catalogue together with the PDFs stored for its books
pub struct BookInventory {
    books: Arc<dyn BookRepository>,
    users: Arc<dyn UserRepository>,
    content: BookContentStore,
    ids: Arc<IdGenerator>,
}

impl BookInventory {
    pub fn new(
        books: Arc<dyn BookRepository>,
        users: Arc<dyn UserRepository>,
        content: BookContentStore,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self {
            books,
            users,
            content,
            ids,
        }
    }

    pub fn content(&self) -> &BookContentStore {
        &self.content
    }

    /// Stores a new book sold by `seller_id` under a freshly generated id
    pub async fn create_book(
        &self,
        seller_id: &UserId,
        new_book: NewBook,
    ) -> Result<Book, InventoryError> {
        let book = new_book.into_book(self.ids.generate(), seller_id.clone());
        let book = self.books.add_book(book).await?;
        tracing::info!("Created book {} of seller {}", book.id, seller_id);
        Ok(book)
    }

    pub async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, InventoryError> {
        Ok(self.books.list_books(query).await?)
    }

    pub async fn get_books_by_seller(
        &self,
        seller_id: &UserId,
        pagination: Option<Pagination>,
    ) -> Result<Vec<Book>, InventoryError> {
        Ok(self
            .books
            .list_books_by_seller(seller_id, pagination)
            .await?)
    }

    /// With `populate_seller` the seller is resolved to its id and name,
    /// a seller that no longer exists stays unresolved
    pub async fn get_book_by_id(
        &self,
        book_id: &BookId,
        populate_seller: bool,
    ) -> Result<Option<Book>, InventoryError> {
        let Some(mut book) = self.books.get_book(book_id).await? else {
            return Ok(None);
        };
        if populate_seller {
            let seller_id = book.seller.id().to_string();
            if let Some(seller) = self.users.get_user(&seller_id).await? {
                book.seller = SellerRef::Resolved(SellerSummary {
                    id: seller.id,
                    name: seller.name,
                });
            }
        }
        Ok(Some(book))
    }

    /// Returns None when the book no longer exists
    pub async fn update_book(
        &self,
        book_id: &BookId,
        patch: BookPatch,
    ) -> Result<Option<Book>, InventoryError> {
        Ok(self.books.update_book(book_id, patch).await?)
    }

    /// Removes the stored PDF first, then the book itself.
    /// Returns whether a book was removed.
    pub async fn delete_book(&self, book_id: &BookId) -> Result<bool, InventoryError> {
        let Some(book) = self.books.get_book(book_id).await? else {
            return Ok(false);
        };
        self.content.delete_book_pdf(book.seller.id(), &book.id).await;
        let deleted = self.books.delete_book(&book.id).await?;
        if deleted {
            tracing::info!("Deleted book {}", book.id);
        }
        Ok(deleted)
    }

    /// Deletes the user along with every book they sell and the books' PDFs.
    /// Returns false when the user did not exist.
    pub async fn delete_user(&self, user_id: &UserId) -> Result<bool, InventoryError> {
        let books = self.books.list_books_by_seller(user_id, None).await?;
        for book in &books {
            self.delete_book(&book.id).await?;
        }
        let deleted = self.users.delete_user(user_id).await?;
        if deleted {
            tracing::info!("Deleted user {} and {} of their books", user_id, books.len());
        }
        Ok(deleted)
    }

    /// Checks the PDF against the book and stores it, replacing any previous one
    pub async fn upload_book_pdf(&self, book: &Book, bytes: &[u8]) -> Result<PathBuf, InventoryError> {
        PdfMetadata::parse(bytes)?.validate_against(book)?;
        Ok(self
            .content
            .write_book_pdf(book.seller.id(), &book.id, &book.title, bytes)
            .await?)
    }

    pub async fn get_book_pdf_path(&self, book: &Book) -> Result<Option<PathBuf>, InventoryError> {
        Ok(self
            .content
            .get_book_pdf_path(book.seller.id(), &book.id)
            .await?)
    }

    pub async fn get_book_pdf(&self, book: &Book) -> Result<Option<StoredPdf>, InventoryError> {
        Ok(self.content.get_book_pdf(book.seller.id(), &book.id).await?)
    }
}

#[cfg(test)]
mod inventory_tests {
    use super::*;
    use crate::api::BookSort;
    use crate::books_repository::InMemoryBookRepository;
    use crate::purchase::{PurchaseWorkflow, SimulatedPaymentGateway};
    use crate::test_support::{date, pdf_for_book, sample_seller, sample_user};
    use crate::users_repository::InMemoryUserRepository;

    struct Fixture {
        _storage: tempfile::TempDir,
        users: Arc<InMemoryUserRepository>,
        books: Arc<InMemoryBookRepository>,
        inventory: BookInventory,
    }

    fn fixture() -> Fixture {
        let storage = tempfile::TempDir::new().unwrap();
        let users = Arc::new(InMemoryUserRepository::default());
        let books = Arc::new(InMemoryBookRepository::default());
        let inventory = BookInventory::new(
            books.clone(),
            users.clone(),
            BookContentStore::new(storage.path()),
            Arc::new(IdGenerator::default()),
        );
        Fixture {
            _storage: storage,
            users,
            books,
            inventory,
        }
    }

    fn new_book(title: &str, price: f64) -> NewBook {
        NewBook {
            title: title.to_string(),
            authors: "Frank Herbert".to_string(),
            pages: 3,
            publication_date: date(2020, 1, 1),
            publisher: "Chilton".to_string(),
            price,
        }
    }

    #[tokio::test]
    async fn test_create_and_read_books() {
        let f = fixture();
        let seller = sample_seller("1", "seller@mail.com");
        f.users.add_user(seller.clone()).await.unwrap();

        let dune = f
            .inventory
            .create_book(&seller.id, new_book("Dune", 12.0))
            .await
            .unwrap();
        let emma = f
            .inventory
            .create_book(&seller.id, new_book("Emma", 3.0))
            .await
            .unwrap();
        assert_ne!(dune.id, emma.id);
        assert_eq!(dune.seller, SellerRef::Unresolved(seller.id.clone()));

        let populated = f
            .inventory
            .get_book_by_id(&dune.id, true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            populated.seller,
            SellerRef::Resolved(SellerSummary {
                id: seller.id.clone(),
                name: seller.name.clone(),
            })
        );
        let raw = f
            .inventory
            .get_book_by_id(&dune.id, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(raw, dune);
        assert_eq!(
            f.inventory
                .get_book_by_id(&"missing".to_string(), true)
                .await
                .unwrap(),
            None
        );

        let cheapest = f
            .inventory
            .list_books(&BookQuery {
                sort: BookSort::Cheapest,
                ..BookQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(cheapest, vec![emma.clone(), dune.clone()]);

        let updated = f
            .inventory
            .update_book(
                &dune.id,
                BookPatch {
                    price: Some(1.0),
                    ..BookPatch::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.price, 1.0);
        assert_eq!(updated.seller, dune.seller);
    }

    #[tokio::test]
    async fn test_invalid_pdf_is_not_stored() {
        let f = fixture();
        let seller = sample_seller("1", "seller@mail.com");
        let book = f
            .inventory
            .create_book(&seller.id, new_book("Dune", 12.0))
            .await
            .unwrap();

        assert!(matches!(
            f.inventory.upload_book_pdf(&book, b"garbage").await,
            Err(InventoryError::Pdf(PdfMetadataError::InvalidFile(..)))
        ));
        let mut other = book.clone();
        other.title = "Other".to_string();
        assert!(matches!(
            f.inventory.upload_book_pdf(&book, &pdf_for_book(&other)).await,
            Err(InventoryError::Pdf(PdfMetadataError::ContentMismatch))
        ));
        assert_eq!(f.inventory.get_book_pdf_path(&book).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_book_removes_pdf() {
        let f = fixture();
        let seller = sample_seller("1", "seller@mail.com");
        let book = f
            .inventory
            .create_book(&seller.id, new_book("Dune", 12.0))
            .await
            .unwrap();
        f.inventory
            .upload_book_pdf(&book, &pdf_for_book(&book))
            .await
            .unwrap();
        let dir = f.inventory.content().book_dir(&seller.id, &book.id).unwrap();
        assert!(dir.exists());

        assert!(f.inventory.delete_book(&book.id).await.unwrap());
        assert!(!dir.exists());
        assert!(!f.inventory.delete_book(&book.id).await.unwrap());
    }

    #[tokio::test]
    /// Deleting a seller removes all of their books and PDFs
    async fn test_delete_user_cascades() {
        let f = fixture();
        let seller = sample_seller("1", "seller@mail.com");
        let other_seller = sample_seller("2", "other@mail.com");
        f.users.add_user(seller.clone()).await.unwrap();
        f.users.add_user(other_seller.clone()).await.unwrap();

        let mut dirs = vec![];
        for title in ["Dune", "Emma"] {
            let book = f
                .inventory
                .create_book(&seller.id, new_book(title, 5.0))
                .await
                .unwrap();
            f.inventory
                .upload_book_pdf(&book, &pdf_for_book(&book))
                .await
                .unwrap();
            dirs.push(f.inventory.content().book_dir(&seller.id, &book.id).unwrap());
        }
        let kept = f
            .inventory
            .create_book(&other_seller.id, new_book("Kept", 5.0))
            .await
            .unwrap();

        assert!(f.inventory.delete_user(&seller.id).await.unwrap());

        assert!(f
            .inventory
            .get_books_by_seller(&seller.id, None)
            .await
            .unwrap()
            .is_empty());
        assert!(dirs.iter().all(|dir| !dir.exists()));
        assert_eq!(f.users.get_user(&seller.id).await.unwrap(), None);
        assert_eq!(f.books.get_book(&kept.id).await.unwrap(), Some(kept));
        assert!(!f.inventory.delete_user(&seller.id).await.unwrap());
    }

    #[tokio::test]
    /// Seller lists a book, uploads its PDF and another user buys it
    async fn test_sell_upload_and_purchase() {
        let f = fixture();
        let seller = sample_seller("1", "seller@mail.com");
        let mut buyer = sample_user("2", "buyer@mail.com");
        f.users.add_user(seller.clone()).await.unwrap();
        f.users.add_user(buyer.clone()).await.unwrap();

        let book = f
            .inventory
            .create_book(&seller.id, new_book("Dune", 12.5))
            .await
            .unwrap();
        f.inventory
            .upload_book_pdf(&book, &pdf_for_book(&book))
            .await
            .unwrap();
        let path = f.inventory.get_book_pdf_path(&book).await.unwrap().unwrap();
        assert!(!path.as_os_str().is_empty());

        let workflow = PurchaseWorkflow::new(
            f.users.clone(),
            Arc::new(SimulatedPaymentGateway::new(0.0)),
        );
        workflow.process_purchase(&mut buyer, &book).await.unwrap();

        let buyer = f.users.get_user(&buyer.id).await.unwrap().unwrap();
        assert_eq!(buyer.details.purchased_books, vec![book.id.clone()]);
        let seller = f.users.get_user(&seller.id).await.unwrap().unwrap();
        assert_eq!(seller.details.balance, 12.5);
        assert_eq!(seller.details.books_sold, 1);

        let pdf = f.inventory.get_book_pdf(&book).await.unwrap().unwrap();
        assert_eq!(pdf.path, path);
        assert_eq!(pdf.bytes, pdf_for_book(&book));
    }
}
