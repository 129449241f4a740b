use actix_web::error::InternalError;
use actix_web::HttpResponse;
use paperclip::actix::web;

use crate::api::StatusResponse;
use crate::handlers::{self, auth_handlers, book_handlers, user_handlers};

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api")
                .service(
                    web::scope("/auth")
                        .service(
                            web::resource("/register")
                                .route(web::post().to(auth_handlers::register)),
                        )
                        .service(
                            web::resource("/login").route(web::post().to(auth_handlers::login)),
                        )
                        .service(web::resource("/@me").route(web::get().to(auth_handlers::me))),
                )
                .service(
                    web::scope("/users")
                        .service(
                            web::resource("").route(web::get().to(user_handlers::list_users)),
                        )
                        // Registered before "/{user_id}" so "@me" is not taken for an id
                        .service(
                            web::resource("/@me")
                                .route(web::patch().to(user_handlers::update_me)),
                        )
                        .service(
                            web::resource("/{user_id}")
                                .route(web::get().to(user_handlers::get_user))
                                .route(web::patch().to(user_handlers::change_role))
                                .route(web::delete().to(user_handlers::delete_user)),
                        )
                        .service(
                            web::resource("/{user_id}/books")
                                .route(web::get().to(user_handlers::get_user_books)),
                        ),
                )
                .service(
                    web::scope("/books")
                        .service(
                            web::resource("")
                                .route(web::get().to(book_handlers::get_books))
                                .route(web::post().to(book_handlers::add_books)),
                        )
                        .service(
                            web::resource("/{book_id}")
                                .route(web::get().to(book_handlers::get_book))
                                .route(web::patch().to(book_handlers::update_book))
                                .route(web::post().to(book_handlers::upload_book_pdf))
                                .route(web::delete().to(book_handlers::delete_book)),
                        )
                        .service(
                            web::resource("/{book_id}/buy")
                                .route(web::post().to(book_handlers::buy_book)),
                        )
                        .service(
                            web::resource("/{book_id}/download")
                                .route(web::get().to(book_handlers::download_book)),
                        ),
                ),
        );
}

/// Malformed JSON bodies answer with the same `{success, message}` shape as every other failure
pub fn json_config() -> actix_web::web::JsonConfig {
    actix_web::web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(StatusResponse::failure(err.to_string()));
        InternalError::from_response(err, response).into()
    })
}

/// Query strings that do not deserialize answer with the `{success, message}` shape too
pub fn query_config() -> actix_web::web::QueryConfig {
    actix_web::web::QueryConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(StatusResponse::failure(err.to_string()));
        InternalError::from_response(err, response).into()
    })
}

/// Upper bound for raw request bodies, i.e. uploaded PDFs
pub fn payload_config(max_pdf_bytes: usize) -> actix_web::web::PayloadConfig {
    actix_web::web::PayloadConfig::new(max_pdf_bytes)
}
