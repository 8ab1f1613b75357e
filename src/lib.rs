//! Shipment manifest ("romaneio") conference: parse the manifest text into
//! product/lot records, then reconcile barcode scans against them.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod manifest;
pub mod normalize;
pub mod pdf_extract;
pub mod reconcile;
pub mod result_store;
pub mod scan;

pub use aggregate::{ReconciliationResult, UnmatchedScan, summarize};
pub use error::{ExtractionFailure, ParseError, StoreError};
pub use manifest::{LotRecord, LotStatus, ManifestParser, ProductGroup};
pub use normalize::{NormalizedText, PageFragment, normalize_pages};
pub use reconcile::{ScanOutcome, Session};
