use std::fmt;

/// Failure reported by the document-to-text extraction step.
#[derive(Debug)]
pub enum ExtractionFailure {
    /// The bytes are not a readable PDF.
    Malformed(String),
    /// The document is image-only; there is no text layer to read.
    ScannedImage,
    /// The PDF parsed, but text extraction itself failed.
    Text(String),
    /// Reading the source file failed.
    Io(String),
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "failed to parse PDF: {msg}"),
            Self::ScannedImage => write!(f, "document is scanned / image-only, no text layer"),
            Self::Text(msg) => write!(f, "text extraction failed: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ExtractionFailure {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No product group with at least one lot could be extracted.
    NoRecordsFound,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRecordsFound => write!(f, "no manifest records found in document"),
        }
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Json(serde_json::Error),
    /// Stored payload no longer matches its recorded digest.
    Corrupt { key: String },
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite(e) => write!(f, "sqlite error: {e}"),
            Self::Json(e) => write!(f, "result encoding error: {e}"),
            Self::Corrupt { key } => write!(f, "stored result '{key}' failed digest check"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
