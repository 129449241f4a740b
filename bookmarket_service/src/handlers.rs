use std::fmt::Display;

use actix_web::http::StatusCode;
use actix_web::{Error, HttpResponse};
use paperclip::actix::api_v2_operation;

use crate::api::StatusResponse;
use crate::inventory::InventoryError;
use crate::books_repository::BookRepositoryError;
use crate::pdf_metadata::PdfMetadataError;
use crate::users_repository::UserRepositoryError;

pub mod auth_handlers;
pub mod book_handlers;
pub mod user_handlers;


#[api_v2_operation]
pub async fn health() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok().finish())
}

fn success(status: StatusCode, message: &str) -> HttpResponse {
    HttpResponse::build(status).json(StatusResponse::ok(message))
}

fn failure(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    HttpResponse::build(status).json(StatusResponse::failure(message))
}

fn access_denied() -> HttpResponse {
    failure(StatusCode::FORBIDDEN, "Access Denied")
}

/// Logs the full error, the caller only learns that something failed
fn internal_error(operation: &str, err: impl Display) -> HttpResponse {
    tracing::error!("{} failed {}", operation, err);
    failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
}

fn user_store_failure(operation: &str, err: UserRepositoryError) -> HttpResponse {
    match err {
        UserRepositoryError::Validation(err) => failure(StatusCode::BAD_REQUEST, err.to_string()),
        UserRepositoryError::EmailAlreadyRegistered(_) => {
            failure(StatusCode::CONFLICT, "Email already registered")
        }
        err => internal_error(operation, err),
    }
}

fn inventory_failure(operation: &str, err: InventoryError) -> HttpResponse {
    match err {
        InventoryError::Books(BookRepositoryError::Validation(err)) => {
            failure(StatusCode::BAD_REQUEST, err.to_string())
        }
        InventoryError::Pdf(PdfMetadataError::InvalidFile(reason)) => {
            tracing::info!("Rejected pdf upload: {}", reason);
            failure(StatusCode::BAD_REQUEST, "Invalid file")
        }
        InventoryError::Pdf(PdfMetadataError::ContentMismatch) => {
            failure(StatusCode::BAD_REQUEST, PdfMetadataError::ContentMismatch.to_string())
        }
        InventoryError::Users(err) => user_store_failure(operation, err),
        err => internal_error(operation, err),
    }
}
