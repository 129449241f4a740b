pub mod api;

#[cfg(any(feature = "client", test))]
pub mod client;

#[cfg(any(feature = "server", test))]
pub mod app_config;
#[cfg(any(feature = "server", test))]
pub mod auth;
#[cfg(any(feature = "server", test))]
pub mod book_content_store;
#[cfg(any(feature = "server", test))]
pub mod books_repository;
#[cfg(any(feature = "server", test))]
mod handlers;
#[cfg(any(feature = "server", test))]
pub mod id_generator;
#[cfg(any(feature = "server", test))]
pub mod inventory;
#[cfg(any(feature = "server", test))]
pub mod pdf_metadata;
#[cfg(any(feature = "server", test))]
pub mod purchase;
#[cfg(any(feature = "server", test))]
pub mod settings;
#[cfg(any(feature = "server", test))]
pub mod users_repository;
#[cfg(any(feature = "server", test))]
pub mod validation;

#[cfg(test)]
mod test_support;
