//! Reads the document information of uploaded PDFs and decides whether a
//! PDF belongs to the book it is uploaded for.

use chrono::{DateTime, NaiveDate, Utc};
use lopdf::{Dictionary, Document, Object};

use crate::api::Book;

#[derive(thiserror::Error, Debug, Clone, Eq, PartialEq)]
pub enum PdfMetadataError {
    #[error("Invalid file: {0}")]
    InvalidFile(String),

    /// Deliberately does not tell which field differs
    #[error("informations don't match")]
    ContentMismatch,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfMetadata {
    pub author: Option<String>,
    pub title: Option<String>,
    pub num_pages: u32,
    pub producer: Option<String>,
    pub creation_date: Option<DateTime<Utc>>,
}

impl PdfMetadata {
    pub fn parse(bytes: &[u8]) -> Result<Self, PdfMetadataError> {
        let document =
            Document::load_mem(bytes).map_err(|e| PdfMetadataError::InvalidFile(e.to_string()))?;
        let num_pages = document.get_pages().len() as u32;

        let Some(info) = info_dictionary(&document) else {
            return Ok(Self {
                num_pages,
                ..Self::default()
            });
        };

        Ok(Self {
            author: text_entry(&document, info, b"Author"),
            title: text_entry(&document, info, b"Title"),
            num_pages,
            producer: text_entry(&document, info, b"Producer"),
            creation_date: text_entry(&document, info, b"CreationDate")
                .as_deref()
                .and_then(parse_pdf_date),
        })
    }

    /// Accepts the PDF only when author, title, page count, producer and the
    /// calendar day of creation all agree with the book
    pub fn validate_against(&self, book: &Book) -> Result<(), PdfMetadataError> {
        let same_day = self
            .creation_date
            .map(|created| created.date_naive() == book.publication_date.date_naive())
            .unwrap_or(false);

        let matches = self.author.as_deref() == Some(book.authors.as_str())
            && self.title.as_deref() == Some(book.title.as_str())
            && self.num_pages == book.pages
            && self.producer.as_deref() == Some(book.publisher.as_str())
            && same_day;

        if matches {
            Ok(())
        } else {
            Err(PdfMetadataError::ContentMismatch)
        }
    }
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn info_dictionary(document: &Document) -> Option<&Dictionary> {
    let info = document.trailer.get(b"Info").ok()?;
    resolve(document, info)?.as_dict().ok()
}

fn text_entry(document: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    match resolve(document, info.get(key).ok()?)? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

/// Decodes a PDF text string: UTF-16BE when it carries a byte order mark,
/// otherwise UTF-8 with a single byte fallback
fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Parses `D:YYYYMMDDHHmmSS` dates. Missing trailing components default to
/// the start of the period and any timezone suffix is ignored, the value is
/// read as UTC.
pub fn parse_pdf_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let digits: String = value
        .strip_prefix("D:")
        .unwrap_or(value)
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .take(14)
        .collect();
    if digits.len() < 4 {
        return None;
    }

    let component = |range: std::ops::Range<usize>, default: u32| -> Option<u32> {
        match digits.get(range) {
            Some(part) => part.parse().ok(),
            None => Some(default),
        }
    };

    let year: i32 = digits[0..4].parse().ok()?;
    let month = component(4..6, 1)?;
    let day = component(6..8, 1)?;
    let hour = component(8..10, 0)?;
    let minute = component(10..12, 0)?;
    let second = component(12..14, 0)?;

    NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod pdf_metadata_tests {
    use chrono::TimeZone;

    use super::*;
    use crate::test_support::{build_pdf, pdf_for_book, sample_book, TestPdfInfo};

    fn book() -> Book {
        let mut book = sample_book("1", "seller");
        book.authors = "A".to_string();
        book.title = "T".to_string();
        book.pages = 10;
        book.publisher = "P".to_string();
        book.publication_date = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        book
    }

    #[test]
    fn reads_document_information() {
        let book = book();
        let metadata = PdfMetadata::parse(&pdf_for_book(&book)).unwrap();
        assert_eq!(metadata.author.as_deref(), Some("A"));
        assert_eq!(metadata.title.as_deref(), Some("T"));
        assert_eq!(metadata.num_pages, 10);
        assert_eq!(metadata.producer.as_deref(), Some("P"));
        assert_eq!(
            metadata.creation_date,
            Some(Utc.with_ymd_and_hms(2020, 1, 1, 8, 30, 0).unwrap())
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            PdfMetadata::parse(b"This is not a PDF"),
            Err(PdfMetadataError::InvalidFile(..))
        ));
    }

    #[test]
    /// Only the calendar day of the creation date is compared
    fn accepts_same_day_different_time() {
        let book = book();
        let info = TestPdfInfo {
            creation_date: "D:20200101235959+03'00'",
            ..TestPdfInfo::matching(&book)
        };
        let metadata = PdfMetadata::parse(&build_pdf(&info)).unwrap();
        assert_eq!(metadata.validate_against(&book), Ok(()));
    }

    #[test]
    fn rejects_any_differing_field() {
        let book = book();
        let variants = [
            TestPdfInfo {
                author: "B",
                ..TestPdfInfo::matching(&book)
            },
            TestPdfInfo {
                title: "Other",
                ..TestPdfInfo::matching(&book)
            },
            TestPdfInfo {
                pages: 11,
                ..TestPdfInfo::matching(&book)
            },
            TestPdfInfo {
                producer: "Q",
                ..TestPdfInfo::matching(&book)
            },
            TestPdfInfo {
                creation_date: "D:20200102000000Z",
                ..TestPdfInfo::matching(&book)
            },
        ];
        for info in variants {
            let metadata = PdfMetadata::parse(&build_pdf(&info)).unwrap();
            assert_eq!(
                metadata.validate_against(&book),
                Err(PdfMetadataError::ContentMismatch)
            );
        }
        assert_eq!(
            PdfMetadataError::ContentMismatch.to_string(),
            "informations don't match"
        );
    }

    #[test]
    fn missing_metadata_is_a_mismatch() {
        let metadata = PdfMetadata {
            num_pages: 10,
            ..PdfMetadata::default()
        };
        assert_eq!(
            metadata.validate_against(&book()),
            Err(PdfMetadataError::ContentMismatch)
        );
    }

    #[test]
    fn parses_partial_and_odd_dates() {
        assert_eq!(
            parse_pdf_date("D:2006"),
            Some(Utc.with_ymd_and_hms(2006, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_pdf_date("20060916030000Z"),
            Some(Utc.with_ymd_and_hms(2006, 9, 16, 3, 0, 0).unwrap())
        );
        assert_eq!(parse_pdf_date("D:20061399"), None);
        assert_eq!(parse_pdf_date("D:20"), None);
    }

    #[test]
    fn decodes_utf16_strings() {
        let encoded = [0xFE, 0xFF, 0x00, b'G', 0x00, 0xE9];
        assert_eq!(decode_text_string(&encoded), "Gé");
        assert_eq!(decode_text_string("Grandpré".as_bytes()), "Grandpré");
    }
}
