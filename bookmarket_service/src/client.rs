use anyhow::{bail, Context};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_tracing::TracingMiddleware;

use crate::api::{
    Book, BookId, BookPatch, ListingParams, LoginRequest, NewBook, ProfilePatch, RegisterRequest,
    Role, RoleChangeRequest, StatusResponse, TokenResponse, UserId, UserView,
};

/// How a purchase attempt ended, other failures are errors
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PurchaseOutcome {
    Purchased,
    Declined,
    AlreadyPurchased,
}

pub struct BookMarketClient {
    url: String,
    client: ClientWithMiddleware,
    /// Retries transient failures, only used for GET requests
    read_client: ClientWithMiddleware,
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    match response.json::<StatusResponse>().await {
        Ok(body) => format!("{} {}", status, body.message),
        Err(_) => status.to_string(),
    }
}

impl BookMarketClient {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let reqwest_client = reqwest::Client::builder()
            .build()
            .context("Failed to build reqwest client")?;
        let client = ClientBuilder::new(reqwest_client.clone())
            // Insert the tracing middleware
            .with(TracingMiddleware::default())
            .build();
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let read_client = ClientBuilder::new(reqwest_client)
            .with(TracingMiddleware::default())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            url: url.to_string(),
            client,
            read_client,
        })
    }

    /// Calls POST /api/auth/register endpoint
    /// Returns the token of the new user
    pub async fn register(&self, name: &str, email: &str, password: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .post(format!("{}/api/auth/register", self.url))
            .json(&RegisterRequest {
                name: Some(name.to_string()),
                email: Some(email.to_string()),
                password: Some(password.to_string()),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to register {}", error_message(response).await)
        }
        Ok(response.json::<TokenResponse>().await?.token)
    }

    /// Calls POST /api/auth/login endpoint
    pub async fn login(&self, email: &str, password: &str) -> anyhow::Result<String> {
        let response = self
            .client
            .post(format!("{}/api/auth/login", self.url))
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to login {}", error_message(response).await)
        }
        Ok(response.json::<TokenResponse>().await?.token)
    }

    /// Calls GET /api/auth/@me endpoint
    pub async fn me(&self, token: &str) -> anyhow::Result<UserView> {
        let response = self
            .read_client
            .get(format!("{}/api/auth/@me", self.url))
            .bearer_auth(token)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to get current user {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /api/users endpoint
    pub async fn list_users(
        &self,
        token: &str,
        params: &ListingParams,
    ) -> anyhow::Result<Vec<UserView>> {
        let response = self
            .read_client
            .get(format!("{}/api/users", self.url))
            .bearer_auth(token)
            .query(params)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to list users {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /api/users/{user_id} endpoint
    /// None if user does not exist
    pub async fn get_user(&self, token: &str, user_id: &UserId) -> anyhow::Result<Option<UserView>> {
        let response = self
            .read_client
            .get(format!("{}/api/users/{}", self.url, user_id))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to get user {}", error_message(response).await)
        }
    }

    /// Calls GET /api/users/{user_id}/books endpoint
    pub async fn get_user_books(
        &self,
        user_id: &UserId,
        params: &ListingParams,
    ) -> anyhow::Result<Vec<Book>> {
        let response = self
            .read_client
            .get(format!("{}/api/users/{}/books", self.url, user_id))
            .query(params)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to list user books {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls PATCH /api/users/@me endpoint
    /// Returns a fresh token reflecting the changes
    pub async fn update_me(&self, token: &str, patch: &ProfilePatch) -> anyhow::Result<String> {
        let response = self
            .client
            .patch(format!("{}/api/users/@me", self.url))
            .bearer_auth(token)
            .json(patch)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to update profile {}", error_message(response).await)
        }
        Ok(response.json::<TokenResponse>().await?.token)
    }

    /// Calls PATCH /api/users/{user_id} endpoint
    pub async fn change_role(
        &self,
        token: &str,
        user_id: &UserId,
        role: Role,
    ) -> anyhow::Result<UserView> {
        let response = self
            .client
            .patch(format!("{}/api/users/{}", self.url, user_id))
            .bearer_auth(token)
            .json(&RoleChangeRequest { role })
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to change role {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls DELETE /api/users/{user_id} endpoint
    /// Returns false if user did not exist
    pub async fn delete_user(&self, token: &str, user_id: &UserId) -> anyhow::Result<bool> {
        let response = self
            .client
            .delete(format!("{}/api/users/{}", self.url, user_id))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            bail!("Failed to delete user {}", error_message(response).await)
        }
    }

    /// Calls GET /api/books endpoint
    pub async fn list_books(&self, params: &ListingParams) -> anyhow::Result<Vec<Book>> {
        let response = self
            .read_client
            .get(format!("{}/api/books", self.url))
            .query(params)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to list books {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls POST /api/books endpoint
    /// Returns the created books with their ids
    pub async fn add_books(&self, token: &str, books: &[NewBook]) -> anyhow::Result<Vec<Book>> {
        let response = self
            .client
            .post(format!("{}/api/books", self.url))
            .bearer_auth(token)
            .json(books)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to add books {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls GET /api/books/{book_id} endpoint
    /// Returns the book with resolved seller, None if book does not exist
    pub async fn get_book(&self, book_id: &BookId) -> anyhow::Result<Option<Book>> {
        let response = self
            .read_client
            .get(format!("{}/api/books/{}", self.url, book_id))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.json().await?))
        } else {
            bail!("Failed to get book {}", error_message(response).await)
        }
    }

    /// Calls PATCH /api/books/{book_id} endpoint
    pub async fn update_book(
        &self,
        token: &str,
        book_id: &BookId,
        patch: &BookPatch,
    ) -> anyhow::Result<Book> {
        let response = self
            .client
            .patch(format!("{}/api/books/{}", self.url, book_id))
            .bearer_auth(token)
            .json(patch)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to update book {}", error_message(response).await)
        }
        Ok(response.json().await?)
    }

    /// Calls POST /api/books/{book_id} endpoint with the PDF as body
    pub async fn upload_book_pdf(
        &self,
        token: &str,
        book_id: &BookId,
        pdf: Vec<u8>,
    ) -> anyhow::Result<()> {
        let response = self
            .client
            .post(format!("{}/api/books/{}", self.url, book_id))
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/pdf")
            .body(pdf)
            .send()
            .await?;
        if !response.status().is_success() {
            bail!("Failed to upload pdf {}", error_message(response).await)
        }
        Ok(())
    }

    /// Calls DELETE /api/books/{book_id} endpoint
    /// Returns false if book did not exist
    pub async fn delete_book(&self, token: &str, book_id: &BookId) -> anyhow::Result<bool> {
        let response = self
            .client
            .delete(format!("{}/api/books/{}", self.url, book_id))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(false)
        } else if response.status().is_success() {
            Ok(true)
        } else {
            bail!("Failed to delete book {}", error_message(response).await)
        }
    }

    /// Calls POST /api/books/{book_id}/buy endpoint
    pub async fn buy_book(&self, token: &str, book_id: &BookId) -> anyhow::Result<PurchaseOutcome> {
        let response = self
            .client
            .post(format!("{}/api/books/{}/buy", self.url, book_id))
            .bearer_auth(token)
            .send()
            .await?;
        match response.status() {
            status if status.is_success() => Ok(PurchaseOutcome::Purchased),
            StatusCode::PAYMENT_REQUIRED => Ok(PurchaseOutcome::Declined),
            StatusCode::CONFLICT => Ok(PurchaseOutcome::AlreadyPurchased),
            _ => bail!("Failed to buy book {}", error_message(response).await),
        }
    }

    /// Calls GET /api/books/{book_id}/download endpoint
    /// None if the book or its PDF does not exist
    pub async fn download_book(&self, token: &str, book_id: &BookId) -> anyhow::Result<Option<Vec<u8>>> {
        let response = self
            .read_client
            .get(format!("{}/api/books/{}/download", self.url, book_id))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            Ok(None)
        } else if response.status().is_success() {
            Ok(Some(response.bytes().await?.to_vec()))
        } else {
            bail!("Failed to download book {}", error_message(response).await)
        }
    }
}
