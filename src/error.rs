//! Error types for the central repository and cross-case searches.

use crate::model::{AttributeType, CaseId, DataSourceId};
use thiserror::Error;

/// Failures raised by an attribute store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store cannot be reached or is in an unusable state.
    #[error("central repository unavailable: {0}")]
    Unavailable(String),

    #[error("case {0} not found in central repository")]
    CaseNotFound(CaseId),

    #[error("data source {0} not found in central repository")]
    DataSourceNotFound(DataSourceId),

    #[error("invalid {attribute_type} value '{value}': {reason}")]
    InvalidValue {
        attribute_type: AttributeType,
        value: String,
        reason: String,
    },

    #[error("repository I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("repository format error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures of a common attribute search.
///
/// Every variant is surfaced to the caller of the search; none is retried.
#[derive(Debug, Error)]
pub enum SearchError {
    /// No working case is open.
    #[error("no current case is open")]
    NoCurrentCase,

    /// The referenced case is not (or no longer) in the central repository.
    #[error("case {case_id} is no longer available in the central repository")]
    InvalidCaseReference { case_id: CaseId },

    /// The other case named for a single-case search is the current case itself.
    #[error("case {0} is the current case; choose a different case to correlate with")]
    SelfReference(CaseId),

    #[error("central repository unavailable: {0}")]
    StoreUnavailable(String),

    #[error("frequency filtering is not supported for {0}")]
    UnsupportedAttributeType(AttributeType),

    #[error("search was cancelled")]
    Cancelled,
}

impl From<StoreError> for SearchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::CaseNotFound(case_id) => SearchError::InvalidCaseReference { case_id },
            other => SearchError::StoreUnavailable(other.to_string()),
        }
    }
}
