use chrono::{DateTime, Utc};
use paperclip::actix::Apiv2Schema;
use serde::{Deserialize, Serialize};

pub type UserId = String;
pub type BookId = String;

/// Page size used when the caller does not ask for one, also the upper bound
pub const MAX_PAGE_LIMIT: u32 = 10;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash, Apiv2Schema,
)]
#[serde(rename_all = "lowercase")]
/// Authority level of a user. Declaration order is the authority order,
/// so checks are written as `role >= Role::Seller`.
pub enum Role {
    #[default]
    User,
    Seller,
    Adm,
    Owner,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct UserDates {
    pub last_seen: DateTime<Utc>,
    pub joined: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    pub role: Role,
    pub balance: f64,
    pub books_sold: u64,
    /// Ids of owned books, never contains duplicates
    pub purchased_books: Vec<BookId>,
    pub dates: UserDates,
}

impl UserDetails {
    /// Zero valued details of a freshly registered user
    pub fn new_at(now: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            balance: 0.0,
            books_sold: 0,
            purchased_books: vec![],
            dates: UserDates {
                last_seen: now,
                joined: now,
            },
        }
    }

    pub fn owns_book(&self, book_id: &str) -> bool {
        self.purchased_books.iter().any(|id| id == book_id)
    }

    /// Records the book as purchased, returns false if it was already owned
    pub fn add_purchased_book(&mut self, book_id: &str) -> bool {
        if self.owns_book(book_id) {
            return false;
        }
        self.purchased_books.push(book_id.to_string());
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
/// User record as kept by the store. `password` holds the credential hash,
/// it is never sent back to clients, see [`UserView`].
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub details: UserDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct UserDetailsView {
    pub role: Role,
    pub balance: Option<f64>,
    pub books_sold: u64,
    pub purchased_books: Vec<BookId>,
    pub dates: UserDates,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Projection of a user returned by the API.
/// Private fields are only filled when `show_private` was requested.
pub struct UserView {
    pub id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub details: UserDetailsView,
}

impl UserView {
    pub fn from_user(user: User, show_private: bool) -> Self {
        let User {
            id,
            name,
            email,
            phone,
            details,
            ..
        } = user;
        Self {
            id,
            name,
            email: show_private.then_some(email),
            phone: if show_private { phone } else { None },
            details: UserDetailsView {
                role: details.role,
                balance: show_private.then_some(details.balance),
                books_sold: details.books_sold,
                purchased_books: details.purchased_books,
                dates: details.dates,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct SellerSummary {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(untagged)]
/// Reference from a book to the user selling it.
/// Stored books always hold `Unresolved`, reads may resolve it to the seller's id and name.
pub enum SellerRef {
    Unresolved(UserId),
    Resolved(SellerSummary),
}

impl SellerRef {
    pub fn id(&self) -> &str {
        match self {
            SellerRef::Unresolved(id) => id,
            SellerRef::Resolved(summary) => &summary.id,
        }
    }
}

impl paperclip::v2::schema::Apiv2Schema for SellerRef {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub authors: String,
    pub pages: u32,
    pub publication_date: DateTime<Utc>,
    pub publisher: String,
    pub price: f64,
    pub seller: SellerRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Book as submitted by a seller, id and seller are assigned by the service
pub struct NewBook {
    pub title: String,
    pub authors: String,
    pub pages: u32,
    pub publication_date: DateTime<Utc>,
    pub publisher: String,
    pub price: f64,
}

impl NewBook {
    pub fn into_book(self, id: BookId, seller: UserId) -> Book {
        Book {
            id,
            title: self.title,
            authors: self.authors,
            pages: self.pages,
            publication_date: self.publication_date,
            publisher: self.publisher,
            price: self.price,
            seller: SellerRef::Unresolved(seller),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Apiv2Schema)]
#[serde(rename_all = "camelCase")]
/// Patch to book details. Allows to specify only a few fields and patch the current details.
/// The seller of a book can not be changed.
pub struct BookPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// Effective page window of a listing
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: MAX_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    /// Clamps requested values: page to at least 1, limit to [1, 10]
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Self {
        let page = page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let limit = limit
            .unwrap_or(MAX_PAGE_LIMIT as i64)
            .clamp(1, MAX_PAGE_LIMIT as i64) as u32;
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum BookSort {
    /// Newest publication first
    #[default]
    Recent,
    /// Fewest pages first
    Smallest,
    /// Most pages first
    Biggest,
    /// Lowest price first
    Cheapest,
    /// Highest price first
    MostExpensive,
}

impl BookSort {
    /// Unrecognized or missing values fall back to `Recent`
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("smallest") => BookSort::Smallest,
            Some("biggest") => BookSort::Biggest,
            Some("cheapest") => BookSort::Cheapest,
            Some("mostExpensive") => BookSort::MostExpensive,
            _ => BookSort::Recent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookQuery {
    pub search: Option<String>,
    pub sort: BookSort,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum UserSort {
    /// Most recently joined first
    #[default]
    Recent,
    LastSeen,
    /// Most books sold first
    Famous,
}

impl UserSort {
    pub fn from_query(value: Option<&str>) -> Self {
        match value {
            Some("lastSeen") => UserSort::LastSeen,
            Some("famous") => UserSort::Famous,
            _ => UserSort::Recent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserQuery {
    pub search: Option<String>,
    pub sort: UserSort,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Apiv2Schema)]
/// Query string of listing endpoints
pub struct ListingParams {
    pub search: Option<String>,
    pub sort: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(i64),
    Text(String),
}

/// Query values that are not integers count as absent
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(
        match Option::<NumberOrText>::deserialize(deserializer).unwrap_or(None) {
            Some(NumberOrText::Number(number)) => Some(number),
            Some(NumberOrText::Text(text)) => text.trim().parse().ok(),
            None => None,
        },
    )
}

impl ListingParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit)
    }

    /// Pagination only when the caller asked for a page or a limit
    pub fn requested_pagination(&self) -> Option<Pagination> {
        (self.page.is_some() || self.limit.is_some()).then(|| self.pagination())
    }

    pub fn book_query(&self) -> BookQuery {
        BookQuery {
            search: self.search.clone().filter(|s| !s.is_empty()),
            sort: BookSort::from_query(self.sort.as_deref()),
            pagination: self.pagination(),
        }
    }

    pub fn user_query(&self) -> UserQuery {
        UserQuery {
            search: self.search.clone().filter(|s| !s.is_empty()),
            sort: UserSort::from_query(self.sort.as_deref()),
            pagination: self.pagination(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Fields a user may change on their own profile
pub struct ProfilePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct RoleChangeRequest {
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
pub struct TokenResponse {
    pub auth: bool,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Apiv2Schema)]
/// Body of every response that carries no payload
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
}

impl StatusResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
