use anyhow::Context;
use serde_json::json;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, Row, Statement};

use crate::api::{Book, BookId, BookPatch, BookQuery, BookSort, Pagination, UserId};
use crate::books_repository::{apply_patch, BookRepository, BookRepositoryError};
use crate::validation::validate_book;

pub struct PostgresBooksRepository {
    client: Client,
}

pub struct PostgresBooksRepositoryConfig {
    pub hostname: String,
    pub username: String,
    pub password: String,
}

impl PostgresBooksRepository {
    pub async fn init(config: PostgresBooksRepositoryConfig) -> anyhow::Result<Self> {
        let connection_str = format!(
            "postgresql://{}:{}@{}",
            config.username, config.password, config.hostname
        );
        tracing::info!("Postgres books repository host: {}", config.hostname);
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
        CREATE TABLE IF NOT EXISTS books (
            id              TEXT PRIMARY KEY,
            params          JSONB NOT NULL
            );
        CREATE INDEX IF NOT EXISTS books_seller_idx ON books ((params->>'seller'));
        ",
            )
            .await
            .context("Failed to setup books table")?;
        Ok(Self { client })
    }
}

fn order_by_clause(sort: BookSort) -> &'static str {
    match sort {
        BookSort::Recent => "(params->>'publicationDate')::timestamptz DESC, id",
        BookSort::Smallest => "(params->>'pages')::integer ASC, id",
        BookSort::Biggest => "(params->>'pages')::integer DESC, id",
        BookSort::Cheapest => "(params->>'price')::float8 ASC, id",
        BookSort::MostExpensive => "(params->>'price')::float8 DESC, id",
    }
}

/// Builds ILIKE pattern matching the search term literally
fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn rows_to_books(rows: &[Row]) -> Result<Vec<Book>, BookRepositoryError> {
    rows.iter()
        .map(|row| {
            let params: serde_json::Value = row.try_get(0)?;
            Ok(serde_json::from_value(params)?)
        })
        .collect()
}

fn limit_and_offset(pagination: Pagination) -> (i64, i64) {
    (pagination.limit as i64, pagination.offset() as i64)
}

#[async_trait::async_trait]
impl BookRepository for PostgresBooksRepository {
    async fn add_book(&self, book: Book) -> Result<Book, BookRepositoryError> {
        validate_book(&book)?;
        let stmt: Statement = self
            .client
            .prepare("INSERT INTO books (id, params) VALUES ($1, $2)")
            .await?;

        match self.client.execute(&stmt, &[&book.id, &json!(book)]).await {
            Ok(_) => Ok(book),
            Err(err)
                if err
                    .as_db_error()
                    .map(|db_err| db_err.code() == &SqlState::UNIQUE_VIOLATION)
                    .unwrap_or_default() =>
            {
                Err(BookRepositoryError::AlreadyExists(book.id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_books(&self, query: &BookQuery) -> Result<Vec<Book>, BookRepositoryError> {
        let (limit, offset) = limit_and_offset(query.pagination);
        let order_by = order_by_clause(query.sort);

        let rows = match &query.search {
            Some(search) => {
                let stmt: Statement = self
                    .client
                    .prepare(&format!(
                        "SELECT params FROM books
                         WHERE params->>'title' ILIKE $1
                            OR params->>'authors' ILIKE $1
                            OR params->>'publisher' ILIKE $1
                            OR params->>'price' ILIKE $1
                            OR params->>'seller' ILIKE $1
                         ORDER BY {order_by} LIMIT $2 OFFSET $3"
                    ))
                    .await?;
                self.client
                    .query(&stmt, &[&like_pattern(search), &limit, &offset])
                    .await?
            }
            None => {
                let stmt: Statement = self
                    .client
                    .prepare(&format!(
                        "SELECT params FROM books ORDER BY {order_by} LIMIT $1 OFFSET $2"
                    ))
                    .await?;
                self.client.query(&stmt, &[&limit, &offset]).await?
            }
        };

        rows_to_books(&rows)
    }

    async fn list_books_by_seller(
        &self,
        seller_id: &UserId,
        pagination: Option<Pagination>,
    ) -> Result<Vec<Book>, BookRepositoryError> {
        let order_by = order_by_clause(BookSort::Recent);
        let rows = match pagination {
            Some(pagination) => {
                let (limit, offset) = limit_and_offset(pagination);
                let stmt: Statement = self
                    .client
                    .prepare(&format!(
                        "SELECT params FROM books WHERE params->>'seller' = $1
                         ORDER BY {order_by} LIMIT $2 OFFSET $3"
                    ))
                    .await?;
                self.client
                    .query(&stmt, &[seller_id, &limit, &offset])
                    .await?
            }
            None => {
                let stmt: Statement = self
                    .client
                    .prepare(&format!(
                        "SELECT params FROM books WHERE params->>'seller' = $1 ORDER BY {order_by}"
                    ))
                    .await?;
                self.client.query(&stmt, &[seller_id]).await?
            }
        };

        rows_to_books(&rows)
    }

    async fn get_book(&self, book_id: &BookId) -> Result<Option<Book>, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("SELECT params FROM books WHERE id = ($1)")
            .await?;

        let rows = self.client.query(&stmt, &[book_id]).await?;
        Ok(rows_to_books(&rows)?.into_iter().next())
    }

    async fn update_book(
        &self,
        book_id: &BookId,
        patch: BookPatch,
    ) -> Result<Option<Book>, BookRepositoryError> {
        let Some(book) = self.get_book(book_id).await? else {
            return Ok(None);
        };
        let patched = apply_patch(&book, &patch)?;
        validate_book(&patched)?;

        let stmt: Statement = self
            .client
            .prepare("UPDATE books SET params = ($1) WHERE id = ($2) RETURNING id")
            .await?;

        let rows = self
            .client
            .query(&stmt, &[&json!(patched), book_id])
            .await?;
        Ok((!rows.is_empty()).then_some(patched))
    }

    async fn delete_book(&self, book_id: &BookId) -> Result<bool, BookRepositoryError> {
        let stmt: Statement = self
            .client
            .prepare("DELETE FROM books WHERE id = ($1)")
            .await?;

        Ok(self.client.execute(&stmt, &[book_id]).await? > 0)
    }
}
