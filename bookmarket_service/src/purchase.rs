use std::sync::Arc;

use rand::Rng;

use crate::api::{Book, User};
use crate::users_repository::{UserRepository, UserRepositoryError};

/// Purchase failure rate used when nothing else is configured
pub const DEFAULT_FAILURE_RATE: f64 = 0.45;

#[derive(thiserror::Error, Debug)]
pub enum PurchaseError {
    #[error("3032 | Sorry, the payment cannot be completed now.")]
    PaymentDeclined,

    #[error("You already purchased this book")]
    AlreadyPurchased,

    #[error("404 | User Not Found")]
    BuyerNotFound,

    #[error("404 | Seller Not Found")]
    SellerNotFound,

    #[error("Store failure {0}")]
    Store(#[from] UserRepositoryError),
}

/// Charges the buyer for a book. Must fail before anything is persisted.
#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, buyer: &User, book: &Book) -> Result<(), PurchaseError>;
}

/// Gateway that declines a configurable share of payments at random
pub struct SimulatedPaymentGateway {
    failure_rate: f64,
}

impl SimulatedPaymentGateway {
    /// `failure_rate` is the probability of a decline, clamped to [0, 1]
    pub fn new(failure_rate: f64) -> Self {
        let failure_rate = if failure_rate.is_nan() {
            0.0
        } else {
            failure_rate.clamp(0.0, 1.0)
        };
        Self { failure_rate }
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

impl Default for SimulatedPaymentGateway {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_RATE)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(&self, buyer: &User, book: &Book) -> Result<(), PurchaseError> {
        let declined = rand::thread_rng().gen_bool(self.failure_rate);
        if declined {
            tracing::info!("Payment of user {} for book {} declined", buyer.id, book.id);
            return Err(PurchaseError::PaymentDeclined);
        }
        Ok(())
    }
}

/// Records purchases: charges the buyer, grants the book, credits the seller.
///
/// Buyer and seller are written with two separate store calls. When the
/// seller cannot be found the buyer keeps the book, nothing is rolled back.
/// Two concurrent purchases of the same book by one buyer are not excluded.
pub struct PurchaseWorkflow {
    users: Arc<dyn UserRepository>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PurchaseWorkflow {
    pub fn new(users: Arc<dyn UserRepository>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { users, gateway }
    }

    /// Callers check beforehand that the book exists and has a stored PDF.
    /// On success `buyer` reflects the persisted buyer.
    pub async fn process_purchase(&self, buyer: &mut User, book: &Book) -> Result<(), PurchaseError> {
        self.gateway.charge(buyer, book).await?;

        if buyer.details.owns_book(&book.id) {
            return Err(PurchaseError::AlreadyPurchased);
        }

        let mut updated_buyer = buyer.clone();
        updated_buyer.details.add_purchased_book(&book.id);
        if !self.users.update_user(&updated_buyer).await? {
            return Err(PurchaseError::BuyerNotFound);
        }
        *buyer = updated_buyer;

        let mut seller = self
            .users
            .get_user(&book.seller.id().to_string())
            .await?
            .ok_or(PurchaseError::SellerNotFound)?;
        seller.details.books_sold += 1;
        seller.details.balance += book.price;
        if !self.users.update_user(&seller).await? {
            return Err(PurchaseError::SellerNotFound);
        }

        tracing::info!(
            "User {} purchased book {} from seller {}",
            buyer.id,
            book.id,
            seller.id
        );
        Ok(())
    }
}

#[cfg(test)]
mod purchase_tests {
    use super::*;
    use crate::test_support::{sample_book, sample_seller, sample_user};
    use crate::users_repository::InMemoryUserRepository;

    async fn setup(failure_rate: f64) -> (Arc<InMemoryUserRepository>, PurchaseWorkflow, User, Book) {
        let users = Arc::new(InMemoryUserRepository::default());
        let seller = sample_seller("1", "seller@mail.com");
        let buyer = sample_user("2", "buyer@mail.com");
        users.add_user(seller.clone()).await.unwrap();
        users.add_user(buyer.clone()).await.unwrap();

        let mut book = sample_book("10", &seller.id);
        book.price = 7.5;
        let workflow = PurchaseWorkflow::new(
            users.clone(),
            Arc::new(SimulatedPaymentGateway::new(failure_rate)),
        );
        (users, workflow, buyer, book)
    }

    async fn stored(users: &InMemoryUserRepository, id: &str) -> User {
        users.get_user(&id.to_string()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_purchase_credits_seller() {
        let (users, workflow, mut buyer, book) = setup(0.0).await;

        workflow.process_purchase(&mut buyer, &book).await.unwrap();

        assert_eq!(buyer.details.purchased_books, vec![book.id.clone()]);
        assert_eq!(stored(&users, "2").await, buyer);
        let seller = stored(&users, "1").await;
        assert_eq!(seller.details.books_sold, 1);
        assert_eq!(seller.details.balance, 7.5);
    }

    #[tokio::test]
    /// Declined payments leave buyer and seller untouched
    async fn test_declined_payment_changes_nothing() {
        let (users, workflow, mut buyer, book) = setup(1.0).await;
        let buyer_before = stored(&users, "2").await;
        let seller_before = stored(&users, "1").await;

        for _ in 0..5 {
            assert!(matches!(
                workflow.process_purchase(&mut buyer, &book).await,
                Err(PurchaseError::PaymentDeclined)
            ));
        }

        assert_eq!(buyer, buyer_before);
        assert_eq!(stored(&users, "2").await, buyer_before);
        assert_eq!(stored(&users, "1").await, seller_before);
    }

    #[tokio::test]
    async fn test_book_can_not_be_bought_twice() {
        let (users, workflow, mut buyer, book) = setup(0.0).await;

        workflow.process_purchase(&mut buyer, &book).await.unwrap();
        assert!(matches!(
            workflow.process_purchase(&mut buyer, &book).await,
            Err(PurchaseError::AlreadyPurchased)
        ));

        assert_eq!(stored(&users, "2").await.details.purchased_books.len(), 1);
        assert_eq!(stored(&users, "1").await.details.books_sold, 1);
    }

    #[tokio::test]
    /// The buyer update is not rolled back when the seller is gone
    async fn test_missing_seller_keeps_buyer_update() {
        let (users, workflow, mut buyer, book) = setup(0.0).await;
        users.delete_user(&"1".to_string()).await.unwrap();

        let result = workflow.process_purchase(&mut buyer, &book).await;
        assert!(matches!(result, Err(PurchaseError::SellerNotFound)));
        assert_eq!(
            result.unwrap_err().to_string(),
            "404 | Seller Not Found"
        );
        assert_eq!(
            stored(&users, "2").await.details.purchased_books,
            vec![book.id.clone()]
        );
    }

    #[test]
    fn failure_rate_is_clamped() {
        assert_eq!(SimulatedPaymentGateway::new(3.0).failure_rate(), 1.0);
        assert_eq!(SimulatedPaymentGateway::new(-1.0).failure_rate(), 0.0);
        assert_eq!(SimulatedPaymentGateway::new(f64::NAN).failure_rate(), 0.0);
        assert_eq!(SimulatedPaymentGateway::default().failure_rate(), 0.45);
        assert_eq!(
            PurchaseError::PaymentDeclined.to_string(),
            "3032 | Sorry, the payment cannot be completed now."
        );
    }
}
