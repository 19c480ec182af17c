//! Record extraction.
//!
//! Defines the `Extractor` trait that turns a loaded page into one of the
//! two raw record shapes. Site-specific selectors live behind this trait;
//! the crate ships a generic embedded-JSON implementation.

pub mod embedded;

use crate::acquisition::Page;
use crate::types::{AcquisitionError, FormCard, PriceCard};

/// Why a page could not be turned into records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    /// The expected structure is absent; usually a layout change or a
    /// challenge page.
    #[error("structure not found: {0}")]
    NotFound(String),

    /// The structure is present but holds no rows.
    #[error("extraction yielded no records")]
    Empty,

    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A defect in the extractor itself. Never retried.
    #[error("extractor bug: {0}")]
    Bug(String),
}

impl From<ExtractError> for AcquisitionError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::NotFound(what) => AcquisitionError::StructureNotFound(what),
            ExtractError::Malformed(what) => AcquisitionError::StructureNotFound(what),
            ExtractError::Empty => AcquisitionError::Blocked("empty extraction result".to_string()),
            ExtractError::Bug(what) => AcquisitionError::Extraction(what),
        }
    }
}

/// Turns pages from the two source shapes into raw records.
#[cfg_attr(test, mockall::automock)]
pub trait Extractor: Send + Sync {
    /// Price-comparison page → bookmaker quotes per runner.
    fn extract_prices(&self, page: &Page) -> Result<PriceCard, ExtractError>;

    /// Expert form page → attributes per runner.
    fn extract_form(&self, page: &Page) -> Result<FormCard, ExtractError>;
}
