use std::cmp::Ordering;
use std::collections::HashMap;

use crate::api::{User, UserId, UserQuery, UserSort};
use crate::users_repository::{UserRepository, UserRepositoryError};
use crate::validation::validate_user;

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: parking_lot::RwLock<HashMap<UserId, User>>,
}

fn compare_users(sort: UserSort, a: &User, b: &User) -> Ordering {
    let ordering = match sort {
        UserSort::Recent => b.details.dates.joined.cmp(&a.details.dates.joined),
        UserSort::LastSeen => b.details.dates.last_seen.cmp(&a.details.dates.last_seen),
        UserSort::Famous => b.details.books_sold.cmp(&a.details.books_sold),
    };
    ordering.then_with(|| a.id.cmp(&b.id))
}

fn email_taken(users: &HashMap<UserId, User>, email: &str, except: &UserId) -> bool {
    users
        .values()
        .any(|user| user.email == email && &user.id != except)
}

#[async_trait::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn add_user(&self, user: User) -> Result<User, UserRepositoryError> {
        validate_user(&user)?;
        let mut locked_users = self.users.write();
        if locked_users.contains_key(&user.id) {
            return Err(UserRepositoryError::AlreadyExists(user.id));
        }
        if email_taken(&locked_users, &user.email, &user.id) {
            return Err(UserRepositoryError::EmailAlreadyRegistered(user.email));
        }
        locked_users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, UserRepositoryError> {
        Ok(self.users.read().get(user_id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        Ok(self
            .users
            .read()
            .values()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Vec<User>, UserRepositoryError> {
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut users: Vec<User> = self
            .users
            .read()
            .values()
            .filter(|user| {
                needle
                    .as_ref()
                    .map(|needle| user.name.to_lowercase().contains(needle))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| compare_users(query.sort, a, b));
        Ok(users
            .into_iter()
            .skip(query.pagination.offset() as usize)
            .take(query.pagination.limit as usize)
            .collect())
    }

    async fn update_user(&self, user: &User) -> Result<bool, UserRepositoryError> {
        validate_user(user)?;
        let mut locked_users = self.users.write();
        if !locked_users.contains_key(&user.id) {
            return Ok(false);
        }
        if email_taken(&locked_users, &user.email, &user.id) {
            return Err(UserRepositoryError::EmailAlreadyRegistered(
                user.email.clone(),
            ));
        }
        locked_users.insert(user.id.clone(), user.clone());
        Ok(true)
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<bool, UserRepositoryError> {
        Ok(self.users.write().remove(user_id).is_some())
    }
}

#[cfg(test)]
mod tests_in_memory_users_repository {
    use chrono::Duration;

    use super::*;
    use crate::api::Pagination;
    use crate::test_support::sample_user;

    #[tokio::test]
    /// Simple test to cover user management
    /// 1. Creates user and gets it by id and email
    /// 2. Rejects duplicate email and invalid email
    /// 3. Updates and deletes user
    async fn test_user_management() {
        let repository = InMemoryUserRepository::default();
        assert_eq!(repository.get_user(&"1".to_string()).await.unwrap(), None);

        let user = sample_user("1", "first@mail.com");
        repository.add_user(user.clone()).await.unwrap();
        assert_eq!(
            repository.get_user(&user.id).await.unwrap(),
            Some(user.clone())
        );
        assert_eq!(
            repository.get_user_by_email("first@mail.com").await.unwrap(),
            Some(user.clone())
        );

        let duplicate_email = repository
            .add_user(sample_user("2", "first@mail.com"))
            .await;
        assert!(matches!(
            duplicate_email,
            Err(UserRepositoryError::EmailAlreadyRegistered(..))
        ));

        let invalid_email = repository.add_user(sample_user("3", "not-an-email")).await;
        assert!(matches!(
            invalid_email,
            Err(UserRepositoryError::Validation(..))
        ));

        let second = sample_user("2", "second@mail.com");
        repository.add_user(second.clone()).await.unwrap();

        let stealing_email = User {
            email: "second@mail.com".to_string(),
            ..user.clone()
        };
        assert!(matches!(
            repository.update_user(&stealing_email).await,
            Err(UserRepositoryError::EmailAlreadyRegistered(..))
        ));

        let mut updated = user.clone();
        updated.details.balance = 12.5;
        assert!(repository.update_user(&updated).await.unwrap());
        assert_eq!(
            repository.get_user(&user.id).await.unwrap().unwrap().details.balance,
            12.5
        );
        assert!(!repository
            .update_user(&sample_user("404", "missing@mail.com"))
            .await
            .unwrap());

        assert!(repository.delete_user(&user.id).await.unwrap());
        assert!(!repository.delete_user(&user.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_users() {
        let repository = InMemoryUserRepository::default();
        let mut alice = sample_user("1", "alice@mail.com");
        alice.name = "Alice".to_string();
        alice.details.books_sold = 3;
        let mut bob = sample_user("2", "bob@mail.com");
        bob.name = "Bob".to_string();
        bob.details.dates.joined += Duration::days(1);
        bob.details.books_sold = 7;
        repository.add_user(alice.clone()).await.unwrap();
        repository.add_user(bob.clone()).await.unwrap();

        let recent = repository.list_users(&UserQuery::default()).await.unwrap();
        assert_eq!(recent, vec![bob.clone(), alice.clone()]);

        let famous = repository
            .list_users(&UserQuery {
                sort: UserSort::Famous,
                ..UserQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(famous[0].id, bob.id);

        let searched = repository
            .list_users(&UserQuery {
                search: Some("ALI".to_string()),
                ..UserQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(searched, vec![alice]);

        let paged = repository
            .list_users(&UserQuery {
                pagination: Pagination::new(Some(2), Some(1)),
                ..UserQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
    }
}
