use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

/// A PDF read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPdf {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

#[derive(thiserror::Error, Debug)]
pub enum ContentStoreError {
    #[error("Invalid storage key segment '{0}'")]
    InvalidKey(String),

    #[error("Storage failure for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ContentStoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Keeps at most one PDF per book on disk.
///
/// Layout is `{root}/books/{seller_id}/{book_id}/{title}.pdf`, download and
/// admin tooling rely on it.
#[derive(Debug, Clone)]
pub struct BookContentStore {
    root: PathBuf,
}

fn checked_segment(segment: &str) -> Result<&str, ContentStoreError> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0'])
    {
        Err(ContentStoreError::InvalidKey(segment.to_string()))
    } else {
        Ok(segment)
    }
}

/// Turns a book title into a file name that stays inside the book directory
fn file_name_for_title(title: &str) -> String {
    let sanitized: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = sanitized.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        "book.pdf".to_string()
    } else {
        format!("{trimmed}.pdf")
    }
}

impl BookContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory owned by a single `(seller, book)` key
    pub fn book_dir(&self, seller_id: &str, book_id: &str) -> Result<PathBuf, ContentStoreError> {
        Ok(self
            .root
            .join("books")
            .join(checked_segment(seller_id)?)
            .join(checked_segment(book_id)?))
    }

    /// Replaces whatever is stored for the book with the given PDF
    pub async fn write_book_pdf(
        &self,
        seller_id: &str,
        book_id: &str,
        title: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, ContentStoreError> {
        let dir = self.book_dir(seller_id, book_id)?;
        remove_dir_if_present(&dir).await?;
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ContentStoreError::io(&dir, e))?;

        let path = dir.join(file_name_for_title(title));
        fs::write(&path, bytes)
            .await
            .map_err(|e| ContentStoreError::io(&path, e))?;
        tracing::info!(
            "Stored pdf for book {} of seller {} at {}",
            book_id,
            seller_id,
            path.display()
        );
        Ok(path)
    }

    /// Removes the book's directory. Never fails: a missing directory is
    /// already the wanted state and other failures are only logged.
    pub async fn delete_book_pdf(&self, seller_id: &str, book_id: &str) {
        let result = match self.book_dir(seller_id, book_id) {
            Ok(dir) => remove_dir_if_present(&dir).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::error!(
                "Failed to delete pdf of book {} of seller {}: {}",
                book_id,
                seller_id,
                err
            );
        }
    }

    /// Path of the stored PDF, None when nothing is stored for the book
    pub async fn get_book_pdf_path(
        &self,
        seller_id: &str,
        book_id: &str,
    ) -> Result<Option<PathBuf>, ContentStoreError> {
        let dir = self.book_dir(seller_id, book_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No pdf directory for book {}", book_id);
                return Ok(None);
            }
            Err(e) => return Err(ContentStoreError::io(&dir, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ContentStoreError::io(&dir, e))?
        {
            let is_file = entry
                .file_type()
                .await
                .map_err(|e| ContentStoreError::io(&entry.path(), e))?
                .is_file();
            if is_file {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    /// Reads the stored PDF into memory, None when nothing is stored for the book
    pub async fn get_book_pdf(
        &self,
        seller_id: &str,
        book_id: &str,
    ) -> Result<Option<StoredPdf>, ContentStoreError> {
        let Some(path) = self.get_book_pdf_path(seller_id, book_id).await? else {
            return Ok(None);
        };
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(StoredPdf { path, bytes })),
            // Replaced by a concurrent upload between listing and reading
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ContentStoreError::io(&path, e)),
        }
    }
}

async fn remove_dir_if_present(dir: &Path) -> Result<(), ContentStoreError> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!("Nothing stored at {}", dir.display());
            Ok(())
        }
        Err(e) => Err(ContentStoreError::io(dir, e)),
    }
}

#[cfg(test)]
mod book_content_store_tests {
    use super::*;

    async fn files_in(dir: &Path) -> Vec<PathBuf> {
        let mut entries = fs::read_dir(dir).await.unwrap();
        let mut files = vec![];
        while let Some(entry) = entries.next_entry().await.unwrap() {
            files.push(entry.path());
        }
        files
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = BookContentStore::new(tmp.path());

        assert_eq!(store.get_book_pdf_path("s1", "b1").await.unwrap(), None);
        assert_eq!(store.get_book_pdf("s1", "b1").await.unwrap(), None);

        let path = store
            .write_book_pdf("s1", "b1", "Dune", b"%PDF-1.5 first")
            .await
            .unwrap();
        assert_eq!(path, tmp.path().join("books/s1/b1/Dune.pdf"));

        assert_eq!(
            store.get_book_pdf_path("s1", "b1").await.unwrap(),
            Some(path.clone())
        );
        let stored = store.get_book_pdf("s1", "b1").await.unwrap().unwrap();
        assert_eq!(stored.path, path);
        assert_eq!(stored.bytes, b"%PDF-1.5 first".to_vec());
    }

    #[tokio::test]
    /// Rewrites under a different title still leave exactly one file
    async fn test_at_most_one_pdf_per_book() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = BookContentStore::new(tmp.path());

        store.write_book_pdf("s1", "b1", "Old title", b"one").await.unwrap();
        store.write_book_pdf("s1", "b1", "New title", b"two").await.unwrap();
        store.write_book_pdf("s1", "b1", "New title", b"three").await.unwrap();

        let dir = store.book_dir("s1", "b1").unwrap();
        let files = files_in(&dir).await;
        assert_eq!(files, vec![dir.join("New title.pdf")]);
        let stored = store.get_book_pdf("s1", "b1").await.unwrap().unwrap();
        assert_eq!(stored.bytes, b"three".to_vec());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = BookContentStore::new(tmp.path());

        store.write_book_pdf("s1", "b1", "Dune", b"pdf").await.unwrap();
        store.write_book_pdf("s1", "b2", "Emma", b"pdf").await.unwrap();

        store.delete_book_pdf("s1", "b1").await;
        store.delete_book_pdf("s1", "b1").await;
        store.delete_book_pdf("never", "stored").await;

        assert_eq!(store.get_book_pdf_path("s1", "b1").await.unwrap(), None);
        assert!(!store.book_dir("s1", "b1").unwrap().exists());
        assert!(store.get_book_pdf_path("s1", "b2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_keys_and_titles_stay_inside_book_dir() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = BookContentStore::new(tmp.path());

        assert!(matches!(
            store.write_book_pdf("..", "b1", "t", b"x").await,
            Err(ContentStoreError::InvalidKey(..))
        ));
        assert!(matches!(
            store.get_book_pdf_path("s1", "a/b").await,
            Err(ContentStoreError::InvalidKey(..))
        ));

        let path = store
            .write_book_pdf("s1", "b1", "../../escape", b"x")
            .await
            .unwrap();
        assert_eq!(path.parent().unwrap(), store.book_dir("s1", "b1").unwrap());
        assert_eq!(file_name_for_title("  "), "book.pdf");
    }
}
