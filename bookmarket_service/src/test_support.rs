use chrono::{DateTime, TimeZone, Utc};
use lopdf::{dictionary, Document, Object};

use crate::api::{Book, Role, SellerRef, User, UserDetails};

pub fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn sample_book(id: &str, seller_id: &str) -> Book {
    Book {
        id: id.to_string(),
        title: format!("Title {id}"),
        authors: "Author".to_string(),
        pages: 100,
        publication_date: date(2020, 1, 1),
        publisher: "Publisher".to_string(),
        price: 10.0,
        seller: SellerRef::Unresolved(seller_id.to_string()),
    }
}

pub fn sample_user(id: &str, email: &str) -> User {
    User {
        id: id.to_string(),
        name: format!("user{id}"),
        email: email.to_string(),
        password: "hashed-password".to_string(),
        phone: None,
        details: UserDetails::new_at(date(2022, 5, 1)),
    }
}

pub fn sample_seller(id: &str, email: &str) -> User {
    let mut user = sample_user(id, email);
    user.details.role = Role::Seller;
    user
}

/// Metadata written into generated test PDFs
pub struct TestPdfInfo<'a> {
    pub author: &'a str,
    pub title: &'a str,
    pub pages: u32,
    pub producer: &'a str,
    /// PDF date string, e.g. `D:20200101083000Z`
    pub creation_date: &'a str,
}

impl<'a> TestPdfInfo<'a> {
    /// Info exactly describing the book, created at 08:30 on the publication day
    pub fn matching(book: &'a Book) -> Self {
        Self {
            author: &book.authors,
            title: &book.title,
            pages: book.pages,
            producer: &book.publisher,
            creation_date: "D:20200101083000Z",
        }
    }
}

pub fn build_pdf(info: &TestPdfInfo) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let kids: Vec<Object> = (0..info.pages)
        .map(|_| {
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
            }))
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => info.pages as i64,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let info_id = doc.add_object(dictionary! {
        "Author" => Object::string_literal(info.author),
        "Title" => Object::string_literal(info.title),
        "Producer" => Object::string_literal(info.producer),
        "CreationDate" => Object::string_literal(info.creation_date),
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Failed to serialize pdf");
    bytes
}

pub fn pdf_for_book(book: &Book) -> Vec<u8> {
    build_pdf(&TestPdfInfo::matching(book))
}
