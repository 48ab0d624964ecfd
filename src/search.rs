//! The search entry point front ends call with the open case.

use crate::aggregate::CommonAttributeSearchResults;
use crate::engine::{CorrelationQueryEngine, SearchFilters, SearchScope};
use crate::error::SearchError;
use crate::store::{AttributeStore, CaseContext};

/// Entry point used by front ends: resolves the open case, then runs the
/// engine with a fixed set of filters.
///
/// The resolved target case travels inside the returned results, so nothing
/// about a search is observable before it has finished.
pub struct CommonAttributeSearcher<'a> {
    store: &'a dyn AttributeStore,
    cases: &'a dyn CaseContext,
    filters: SearchFilters,
}

impl<'a> CommonAttributeSearcher<'a> {
    pub fn new(store: &'a dyn AttributeStore, cases: &'a dyn CaseContext, filters: SearchFilters) -> Self {
        Self { store, cases, filters }
    }

    pub fn find_matches(&self, scope: SearchScope) -> Result<CommonAttributeSearchResults, SearchError> {
        let current = self.cases.current_case()?;
        CorrelationQueryEngine::new(self.store).find(&current, scope, &self.filters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::SearchTarget;
    use crate::store::{CentralRepository, StaticCaseContext};

    #[test]
    fn test_no_current_case() {
        let repo = CentralRepository::new();
        let cases = StaticCaseContext::closed();
        let searcher = CommonAttributeSearcher::new(&repo, &cases, SearchFilters::default());
        let err = searcher.find_matches(SearchScope::AllOtherCases).unwrap_err();
        assert!(matches!(err, SearchError::NoCurrentCase));
        assert_eq!(repo.open_session_count(), 0);
    }

    #[test]
    fn test_target_resolved_with_results() {
        let repo = CentralRepository::new();
        let current = repo.add_case("Current");
        let other = repo.add_case("Suspect Laptop");
        let cases = StaticCaseContext::open(current);
        let searcher = CommonAttributeSearcher::new(&repo, &cases, SearchFilters::default());

        let results = searcher.find_matches(SearchScope::SpecificCase(other.id)).unwrap();
        assert!(results.is_empty());
        assert_eq!(results.target(), &SearchTarget::Case(other));
        assert_eq!(
            results.title(),
            "Common Properties (Central Repository Case: Suspect Laptop, Files, no threshold)"
        );
    }
}
