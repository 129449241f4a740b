use std::future::Future;
use std::pin::Pin;

use actix_web::dev::Payload;
use actix_web::error::InternalError;
use actix_web::http::header::{
    ContentDisposition, DispositionParam, DispositionType, CONTENT_TYPE,
};
use actix_web::http::StatusCode;
use actix_web::web::{Bytes, Data};
use actix_web::{Error, FromRequest, HttpRequest, HttpResponse};
use paperclip::actix::{api_v2_operation, web};

use crate::api::{Book, BookId, BookPatch, ListingParams, NewBook, Role};
use crate::auth::AuthenticatedUser;
use crate::handlers::{access_denied, failure, internal_error, inventory_failure, success};
use crate::inventory::BookInventory;
use crate::purchase::{PurchaseError, PurchaseWorkflow};
use crate::validation::validate_book;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Raw request body of a PDF upload. The size limit comes from the
/// `PayloadConfig` registered on the app.
pub struct PdfBody {
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl PdfBody {
    fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(|mime| mime.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
            .unwrap_or(false)
    }
}

impl FromRequest for PdfBody {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = Bytes::from_request(req, payload);
        Box::pin(async move {
            match bytes.await {
                Ok(bytes) => Ok(PdfBody {
                    content_type,
                    bytes,
                }),
                Err(err) => {
                    let status = err.as_response_error().status_code();
                    let response = if status == StatusCode::PAYLOAD_TOO_LARGE {
                        failure(status, "File too large")
                    } else {
                        failure(StatusCode::BAD_REQUEST, "Invalid request body")
                    };
                    Err(InternalError::from_response(err, response).into())
                }
            }
        })
    }
}

impl paperclip::v2::schema::Apiv2Schema for PdfBody {}
impl paperclip::actix::OperationModifier for PdfBody {}

/// Loads the book or answers 404
async fn find_book(inventory: &BookInventory, book_id: &BookId) -> Result<Book, HttpResponse> {
    match inventory.get_book_by_id(book_id, false).await {
        Ok(Some(book)) => Ok(book),
        Ok(None) => Err(failure(StatusCode::NOT_FOUND, "Book Not Found")),
        Err(err) => Err(inventory_failure("Get book", err)),
    }
}

#[api_v2_operation]
pub async fn get_books(
    inventory: Data<BookInventory>,
    params: web::Query<ListingParams>,
) -> Result<HttpResponse, Error> {
    Ok(match inventory.list_books(&params.book_query()).await {
        Ok(books) => HttpResponse::Ok().json(books),
        Err(err) => inventory_failure("List books", err),
    })
}

#[api_v2_operation]
/// Lists new books for sale by the caller. Nothing is created unless every book is valid.
pub async fn add_books(
    caller: AuthenticatedUser,
    inventory: Data<BookInventory>,
    books: web::Json<Vec<NewBook>>,
) -> Result<HttpResponse, Error> {
    if caller.role() < Role::Seller {
        return Ok(access_denied());
    }
    let books = books.into_inner();
    if books.is_empty() {
        return Ok(failure(StatusCode::BAD_REQUEST, "No books provided"));
    }
    for (index, book) in books.iter().enumerate() {
        let candidate = book.clone().into_book(index.to_string(), caller.id().clone());
        if let Err(err) = validate_book(&candidate) {
            return Ok(failure(
                StatusCode::BAD_REQUEST,
                format!("Book {index}: {err}"),
            ));
        }
    }

    let mut created = Vec::with_capacity(books.len());
    for book in books {
        match inventory.create_book(caller.id(), book).await {
            Ok(book) => created.push(book),
            Err(err) => return Ok(inventory_failure("Add books", err)),
        }
    }
    Ok(HttpResponse::Created().json(created))
}

#[api_v2_operation]
/// Book with its seller resolved to id and name
pub async fn get_book(
    inventory: Data<BookInventory>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    Ok(match inventory.get_book_by_id(&book_id, true).await {
        Ok(Some(book)) => HttpResponse::Ok().json(book),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Book Not Found"),
        Err(err) => inventory_failure("Get book", err),
    })
}

#[api_v2_operation]
pub async fn update_book(
    caller: AuthenticatedUser,
    inventory: Data<BookInventory>,
    book_id: web::Path<BookId>,
    patch: web::Json<BookPatch>,
) -> Result<HttpResponse, Error> {
    let book = match find_book(&inventory, &book_id).await {
        Ok(book) => book,
        Err(response) => return Ok(response),
    };
    if !caller.can_manage(book.seller.id()) {
        return Ok(access_denied());
    }
    Ok(match inventory.update_book(&book.id, patch.into_inner()).await {
        Ok(Some(book)) => HttpResponse::Ok().json(book),
        Ok(None) => failure(StatusCode::NOT_FOUND, "Book Not Found"),
        Err(err) => inventory_failure("Update book", err),
    })
}

#[api_v2_operation]
/// Stores the PDF of a book once its metadata matches the book
pub async fn upload_book_pdf(
    caller: AuthenticatedUser,
    inventory: Data<BookInventory>,
    book_id: web::Path<BookId>,
    body: PdfBody,
) -> Result<HttpResponse, Error> {
    let book = match find_book(&inventory, &book_id).await {
        Ok(book) => book,
        Err(response) => return Ok(response),
    };
    if !caller.can_manage(book.seller.id()) {
        return Ok(access_denied());
    }
    if body.bytes.is_empty() {
        return Ok(failure(StatusCode::BAD_REQUEST, "No file uploaded"));
    }
    if !body.is_pdf() {
        return Ok(failure(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Only PDF files are accepted",
        ));
    }

    Ok(match inventory.upload_book_pdf(&book, &body.bytes).await {
        Ok(_) => success(StatusCode::CREATED, "File uploaded"),
        Err(err) => inventory_failure("Upload pdf", err),
    })
}

#[api_v2_operation]
pub async fn delete_book(
    caller: AuthenticatedUser,
    inventory: Data<BookInventory>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book = match find_book(&inventory, &book_id).await {
        Ok(book) => book,
        Err(response) => return Ok(response),
    };
    if !caller.can_manage(book.seller.id()) {
        return Ok(access_denied());
    }
    Ok(match inventory.delete_book(&book.id).await {
        Ok(true) => success(StatusCode::OK, "Book deleted"),
        Ok(false) => failure(StatusCode::NOT_FOUND, "Book Not Found"),
        Err(err) => inventory_failure("Delete book", err),
    })
}

#[api_v2_operation]
/// Buys the book for the caller, only books with a stored PDF can be bought
pub async fn buy_book(
    caller: AuthenticatedUser,
    inventory: Data<BookInventory>,
    purchases: Data<PurchaseWorkflow>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book = match find_book(&inventory, &book_id).await {
        Ok(book) => book,
        Err(response) => return Ok(response),
    };
    match inventory.get_book_pdf_path(&book).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return Ok(failure(
                StatusCode::NOT_FOUND,
                "Book not found, purchase cancelled",
            ))
        }
        Err(err) => return Ok(inventory_failure("Buy book", err)),
    }

    let mut buyer = caller.user;
    Ok(match purchases.process_purchase(&mut buyer, &book).await {
        Ok(()) => success(StatusCode::OK, "Book purchased"),
        Err(err @ PurchaseError::PaymentDeclined) => {
            failure(StatusCode::PAYMENT_REQUIRED, err.to_string())
        }
        Err(err @ PurchaseError::AlreadyPurchased) => failure(StatusCode::CONFLICT, err.to_string()),
        Err(err @ (PurchaseError::SellerNotFound | PurchaseError::BuyerNotFound)) => {
            failure(StatusCode::NOT_FOUND, err.to_string())
        }
        Err(err) => internal_error("Buy book", err),
    })
}

#[api_v2_operation]
/// Sends the PDF to buyers of the book, its seller and admins
pub async fn download_book(
    caller: AuthenticatedUser,
    inventory: Data<BookInventory>,
    book_id: web::Path<BookId>,
) -> Result<HttpResponse, Error> {
    let book = match find_book(&inventory, &book_id).await {
        Ok(book) => book,
        Err(response) => return Ok(response),
    };
    let allowed = caller.user.details.owns_book(&book.id) || caller.can_manage(book.seller.id());
    if !allowed {
        return Ok(access_denied());
    }

    Ok(match inventory.get_book_pdf(&book).await {
        Ok(Some(pdf)) => HttpResponse::Ok()
            .content_type(PDF_CONTENT_TYPE)
            .insert_header(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(format!("{}.pdf", book.title))],
            })
            .body(pdf.bytes),
        Ok(None) => failure(StatusCode::NOT_FOUND, "File Not Found"),
        Err(err) => inventory_failure("Download book", err),
    })
}
