pub use in_memory_users_repository::InMemoryUserRepository;
pub use postgres_users_repository::{PostgresUsersRepository, PostgresUsersRepositoryConfig};

use crate::api::{User, UserId, UserQuery};
use crate::validation::ValidationError;

mod in_memory_users_repository;
mod postgres_users_repository;

#[derive(thiserror::Error, Debug)]
pub enum UserRepositoryError {
    #[error("Invalid user: {0}")]
    Validation(#[from] ValidationError),

    #[error("Email {0} already registered")]
    EmailAlreadyRegistered(String),

    #[error("User {0} already exists")]
    AlreadyExists(UserId),

    #[error("Failed to deserialize user: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("DatabaseFailure failure {0}")]
    DatabaseFailure(#[from] tokio_postgres::Error),

    #[error("Other error {0}")]
    Other(String),
}

#[async_trait::async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts a new user, the id is assigned by the caller
    async fn add_user(&self, user: User) -> Result<User, UserRepositoryError>;
    /// Retrieves the user, None if it does not exist
    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, UserRepositoryError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError>;
    /// Lists users whose name matches the search, in the requested order and page
    async fn list_users(&self, query: &UserQuery) -> Result<Vec<User>, UserRepositoryError>;
    /// Replaces the stored user with the given one, returns false if user was not found
    async fn update_user(&self, user: &User) -> Result<bool, UserRepositoryError>;
    /// Deletes the user, returns false if there was nothing to delete
    async fn delete_user(&self, user_id: &UserId) -> Result<bool, UserRepositoryError>;
}
