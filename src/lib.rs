//! casecorr - cross-case common attribute search.
//!
//! Files, email addresses, phone numbers and other attributes extracted from
//! a forensic case are correlated in a central repository shared by many
//! cases. A search takes the currently open case and finds the attribute
//! values it shares with one named case or with every other case, optionally
//! restricted to media or document files and to values that are rare across
//! the repository.
//!
//! ```no_run
//! use casecorr::{
//!     CentralRepository, CommonAttributeSearcher, SearchFilters, SearchScope, StaticCaseContext,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let repo = CentralRepository::load(std::path::Path::new(".casecorr/repository.json"))?;
//! let current = repo.add_case("2024-017 Burglary");
//! let cases = StaticCaseContext::open(current);
//! let searcher = CommonAttributeSearcher::new(&repo, &cases, SearchFilters::default());
//! let results = searcher.find_matches(SearchScope::AllOtherCases)?;
//! println!("{}", results.title());
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod engine;
pub mod error;
pub mod frequency;
pub mod ingest;
pub mod mime;
pub mod model;
pub mod normalize;
pub mod search;
pub mod store;

pub use aggregate::{
    CommonAttributeSearchResults, CommonAttributeValue, CommonAttributeValueList, MatchRow,
    ResultAggregator, SearchTarget,
};
pub use config::{Config, ConfigError};
pub use engine::{spawn_search, CancelFlag, CorrelationQueryEngine, SearchFilters, SearchHandle, SearchScope};
pub use error::{SearchError, StoreError};
pub use frequency::{FrequencyIndex, FrequencyThreshold};
pub use ingest::{ingest_directory, record_attribute, AttributeObservation, IngestError, IngestOptions, IngestReport};
pub use mime::MimeFilter;
pub use model::{
    AttributeInstance, AttributeType, CaseHandle, CaseId, CorrelationCase, DataSource, DataSourceRef,
    FileRef, KnownStatus, UnknownAttributeType, UnknownKnownStatus,
};
pub use search::CommonAttributeSearcher;
pub use store::{
    AttributeStore, CaseContext, CentralRepository, InstanceRecord, StaticCaseContext, StoreSession,
};
