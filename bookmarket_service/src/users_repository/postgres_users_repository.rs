use anyhow::Context;
use serde_json::json;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{User, UserId, UserQuery, UserSort};
use crate::users_repository::{UserRepository, UserRepositoryError};
use crate::validation::validate_user;

pub struct PostgresUsersRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

pub struct PostgresUsersRepository {
    client: Client,
}

impl PostgresUsersRepository {
    pub async fn init(config: PostgresUsersRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!("Postgres users repository host: {}", config.hostname);
        let (client, connection) = tokio_postgres::connect(&connection_str, NoTls)
            .await
            .context("Failed to start postgres")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Postgres connection error: {}", e);
            }
        });

        client
            .batch_execute(
                "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            params          JSONB NOT NULL
            );
        CREATE UNIQUE INDEX IF NOT EXISTS users_email_idx ON users ((params->>'email'));
        ",
            )
            .await
            .context("Failed to setup users table")?;

        Ok(Self { client })
    }
}

fn order_by_clause(sort: UserSort) -> &'static str {
    match sort {
        UserSort::Recent => "(params->'details'->'dates'->>'joined')::timestamptz DESC, id",
        UserSort::LastSeen => "(params->'details'->'dates'->>'lastSeen')::timestamptz DESC, id",
        UserSort::Famous => "(params->'details'->>'booksSold')::bigint DESC, id",
    }
}

fn rows_to_users(rows: &[Row]) -> Result<Vec<User>, UserRepositoryError> {
    rows.iter()
        .map(|row| {
            let params: serde_json::Value = row.try_get(0)?;
            Ok(serde_json::from_value(params)?)
        })
        .collect()
}

fn is_unique_violation(err: &tokio_postgres::Error) -> bool {
    err.as_db_error()
        // This is unique constraint validation error
        .map(|db_err| db_err.code() == &SqlState::UNIQUE_VIOLATION)
        .unwrap_or_default()
}

fn is_email_constraint(err: &tokio_postgres::Error) -> bool {
    err.as_db_error()
        .and_then(|db_err| db_err.constraint())
        .map(|constraint| constraint == "users_email_idx")
        .unwrap_or_default()
}

#[async_trait::async_trait]
impl UserRepository for PostgresUsersRepository {
    async fn add_user(&self, user: User) -> Result<User, UserRepositoryError> {
        validate_user(&user)?;
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO users (id, params) VALUES ($1, $2)")
            .await?;

        match self.client.execute(&stmt, &[&user.id, &json!(user)]).await {
            Ok(_) => Ok(user),
            Err(err) if is_unique_violation(&err) && is_email_constraint(&err) => {
                Err(UserRepositoryError::EmailAlreadyRegistered(user.email))
            }
            Err(err) if is_unique_violation(&err) => {
                Err(UserRepositoryError::AlreadyExists(user.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, UserRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT params FROM users WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[user_id]).await?;
        Ok(rows_to_users(&rows)?.into_iter().next())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT params FROM users WHERE params->>'email' = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[&email]).await?;
        Ok(rows_to_users(&rows)?.into_iter().next())
    }

    async fn list_users(&self, query: &UserQuery) -> Result<Vec<User>, UserRepositoryError> {
        let limit = query.pagination.limit as i64;
        let offset = query.pagination.offset() as i64;
        let order_by = order_by_clause(query.sort);

        let rows = match &query.search {
            Some(search) => {
                let pattern = format!(
                    "%{}%",
                    search
                        .replace('\\', "\\\\")
                        .replace('%', "\\%")
                        .replace('_', "\\_")
                );
                let stmt: Statement = self
                    .client
                    .prepare(&format!(
                        "SELECT params FROM users WHERE params->>'name' ILIKE $1
                         ORDER BY {order_by} LIMIT $2 OFFSET $3"
                    ))
                    .await?;
                self.client
                    .query(&stmt, &[&pattern, &limit, &offset])
                    .await?
            }
            None => {
                let stmt: Statement = self
                    .client
                    .prepare(&format!(
                        "SELECT params FROM users ORDER BY {order_by} LIMIT $1 OFFSET $2"
                    ))
                    .await?;
                self.client.query(&stmt, &[&limit, &offset]).await?
            }
        };

        rows_to_users(&rows)
    }

    async fn update_user(&self, user: &User) -> Result<bool, UserRepositoryError> {
        validate_user(user)?;
        let stmt: Statement = self
            .client
            .prepare("UPDATE users SET params = ($1) WHERE id = ($2)")
            .await?;

        match self.client.execute(&stmt, &[&json!(user), &user.id]).await {
            Ok(updated) => Ok(updated > 0),
            Err(err) if is_unique_violation(&err) => Err(
                UserRepositoryError::EmailAlreadyRegistered(user.email.clone()),
            ),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_user(&self, user_id: &UserId) -> Result<bool, UserRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM users WHERE id = ($1)")
            .await?;

        Ok(self.client.execute(&stmt, &[user_id]).await? > 0)
    }
}

#[cfg(test)]
mod postgres_users_repository_tests {
    use serial_test::file_serial;
    use testcontainers::core::IntoContainerPort;
    use testcontainers::runners::AsyncRunner;
    use testcontainers::{ContainerAsync, GenericImage, ImageExt};

    use super::*;
    use crate::test_support::sample_user;

    async fn start_postgres_container_and_init_repo(
    ) -> (ContainerAsync<GenericImage>, PostgresUsersRepository) {
        let pg_container = GenericImage::new("postgres", "latest")
            .with_mapped_port(5432, 5432.tcp())
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .start()
            .await
            .expect("Failed to start postgres");

        for _ in 0..10 {
            if let Ok(repo) = PostgresUsersRepository::init(PostgresUsersRepositoryConfig {
                hostname: "127.0.0.1".to_string(),
                username: "postgres".to_string(),
                password: "postgres".to_string(),
            })
            .await
            {
                return (pg_container, repo);
            }
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        }
        panic!("Failed to setup postgres container")
    }

    #[tokio::test]
    #[file_serial(key, path => "../.pgtestslock")]
    /// Covers user management against a real database
    /// for the sake of not starting container multiple times it tests everything in one testcase
    async fn test_user_management() {
        let (_container, repo) = start_postgres_container_and_init_repo().await;

        let user = sample_user("1", "first@mail.com");
        repo.add_user(user.clone()).await.unwrap();
        assert_eq!(repo.get_user(&user.id).await.unwrap(), Some(user.clone()));
        assert_eq!(
            repo.get_user_by_email(&user.email).await.unwrap(),
            Some(user.clone())
        );

        assert!(matches!(
            repo.add_user(sample_user("2", "first@mail.com")).await,
            Err(UserRepositoryError::EmailAlreadyRegistered(..))
        ));
        assert!(matches!(
            repo.add_user(sample_user("1", "other@mail.com")).await,
            Err(UserRepositoryError::AlreadyExists(..))
        ));

        let mut seller = sample_user("2", "second@mail.com");
        seller.details.books_sold = 4;
        repo.add_user(seller.clone()).await.unwrap();

        let famous = repo
            .list_users(&UserQuery {
                sort: UserSort::Famous,
                ..UserQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(famous[0].id, seller.id);

        let mut updated = user.clone();
        updated.details.purchased_books.push("book-1".to_string());
        assert!(repo.update_user(&updated).await.unwrap());
        assert_eq!(repo.get_user(&user.id).await.unwrap(), Some(updated));

        assert!(repo.delete_user(&user.id).await.unwrap());
        assert_eq!(repo.get_user(&user.id).await.unwrap(), None);
    }
}
