//! Error types for Arbor.

use thiserror::Error;

/// Result type alias using ArborError.
pub type Result<T> = std::result::Result<T, ArborError>;

/// Errors that can occur in Arbor operations.
#[derive(Debug, Error)]
pub enum ArborError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Paged file errors
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Page {page_no} does not exist in {file}")]
    PageNotFound { file: String, page_no: u32 },

    // Buffer manager errors
    #[error("Buffer pool full, unable to allocate frame")]
    BufferPoolFull,

    #[error("No file registered for id {0}")]
    FileNotRegistered(u32),

    // Index errors
    #[error("Index metadata mismatch: {0}")]
    BadIndexInfo(String),

    // Relation scan errors
    #[error("End of file reached")]
    EndOfFile,

    // Index scan errors
    #[error("Unsupported comparison operator for scan bound")]
    BadOpcodes,

    #[error("Scan range low bound exceeds high bound")]
    BadScanrange,

    #[error("No key found in the scan range")]
    NoSuchKeyFound,

    #[error("Scan has not been initialized")]
    ScanNotInitialized,

    #[error("Index scan completed")]
    IndexScanCompleted,
}
