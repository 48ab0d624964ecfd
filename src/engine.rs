//! Cross-case matching: values present in the current case that recur in
//! one other case or in any other case.

use crate::aggregate::{CommonAttributeSearchResults, MatchRow, ResultAggregator, SearchTarget};
use crate::error::SearchError;
use crate::frequency::{FrequencyIndex, FrequencyThreshold};
use crate::mime::MimeFilter;
use crate::model::{AttributeInstance, AttributeType, CaseHandle, CaseId};
use crate::store::AttributeStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchFilters {
    pub attribute_type: AttributeType,
    pub mime: MimeFilter,
    pub threshold: FrequencyThreshold,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            attribute_type: AttributeType::Files,
            mime: MimeFilter::none(),
            threshold: FrequencyThreshold::Disabled,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    AllOtherCases,
    SpecificCase(CaseId),
}

/// Shared flag a running search polls between store queries.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct CorrelationQueryEngine<'a> {
    store: &'a dyn AttributeStore,
    cancel: CancelFlag,
}

impl<'a> CorrelationQueryEngine<'a> {
    pub fn new(store: &'a dyn AttributeStore) -> Self {
        Self { store, cancel: CancelFlag::new() }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn find_in_all_other_cases(
        &self,
        current: &CaseHandle,
        filters: &SearchFilters,
    ) -> Result<CommonAttributeSearchResults, SearchError> {
        self.find(current, SearchScope::AllOtherCases, filters)
    }

    pub fn find_in_specific_other_case(
        &self,
        current: &CaseHandle,
        other: CaseId,
        filters: &SearchFilters,
    ) -> Result<CommonAttributeSearchResults, SearchError> {
        self.find(current, SearchScope::SpecificCase(other), filters)
    }

    /// Run one search. The store session opened here is dropped on every
    /// return path; a cancelled search returns `Cancelled` and no rows.
    pub fn find(
        &self,
        current: &CaseHandle,
        scope: SearchScope,
        filters: &SearchFilters,
    ) -> Result<CommonAttributeSearchResults, SearchError> {
        let start = Instant::now();
        let attribute_type = filters.attribute_type;
        let threshold = filters.threshold.resolve(attribute_type)?;

        if let SearchScope::SpecificCase(other_id) = scope {
            if other_id == current.id() {
                return Err(SearchError::SelfReference(other_id));
            }
        }

        let session = self.store.open_session()?;
        self.check_cancelled()?;

        let current_case = session.lookup_case_by_id(current.id())?;
        let other_case = match scope {
            SearchScope::AllOtherCases => None,
            SearchScope::SpecificCase(other_id) => Some(session.lookup_case_by_id(other_id)?),
        };

        // MIME filtering happens before the cross-case check, so an excluded
        // file can never anchor a match.
        let candidates = session.instances_in_case(current_case.id, attribute_type)?;
        let scanned = candidates.len();
        let mut anchors: BTreeMap<String, Vec<AttributeInstance>> = BTreeMap::new();
        for inst in candidates {
            if filters.mime.admits(&inst.file.mime_types) {
                anchors.entry(inst.value.clone()).or_default().push(inst);
            }
        }
        debug!(
            scanned,
            anchored_values = anchors.len(),
            "filtered current case '{}' to {}",
            current_case.display_name,
            filters.mime.describe()
        );

        let anchor_case = other_case.clone().unwrap_or_else(|| current_case.clone());
        let mut frequency = FrequencyIndex::new();
        let mut rows = Vec::new();
        let mut too_common = 0usize;

        for (value, current_instances) in anchors {
            self.check_cancelled()?;

            let matches: Vec<AttributeInstance> = session.instances_with_value(attribute_type, &value)?
                .into_iter()
                .filter(|i| i.case.id != current_case.id)
                .filter(|i| other_case.as_ref().map_or(true, |o| i.case.id == o.id))
                .collect();
            if matches.is_empty() {
                continue;
            }

            if !frequency.retains(&*session, attribute_type, &value, threshold)? {
                too_common += 1;
                continue;
            }

            let mut instances = current_instances;
            instances.extend(matches);
            rows.push(MatchRow {
                anchor: anchor_case.clone(),
                attribute_type,
                value,
                instances,
            });
        }

        // The other case may have been removed while the rows were read
        if let Some(other) = &other_case {
            session.lookup_case_by_id(other.id)?;
        }
        drop(session);

        let target = match other_case {
            Some(case) => SearchTarget::Case(case),
            None => SearchTarget::AllOtherCases,
        };
        info!(
            matches = rows.len(),
            too_common,
            "searched '{}' against {} in {:.2?}",
            current_case.display_name,
            target.label(),
            start.elapsed()
        );

        Ok(ResultAggregator::new(target, attribute_type, threshold).aggregate(rows))
    }

    fn check_cancelled(&self) -> Result<(), SearchError> {
        if self.cancel.is_cancelled() {
            debug!("search cancelled, discarding partial rows");
            return Err(SearchError::Cancelled);
        }
        Ok(())
    }
}

/// A search running on a worker thread. Dropping the handle abandons the
/// search: the worker stops at its next store query and releases its session.
pub struct SearchHandle {
    cancel: CancelFlag,
    worker: Option<JoinHandle<Result<CommonAttributeSearchResults, SearchError>>>,
}

pub fn spawn_search(
    store: Arc<dyn AttributeStore>,
    current: CaseHandle,
    scope: SearchScope,
    filters: SearchFilters,
) -> SearchHandle {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    let worker = thread::spawn(move || {
        CorrelationQueryEngine::new(&*store)
            .with_cancel_flag(flag)
            .find(&current, scope, &filters)
    });
    SearchHandle { cancel, worker: Some(worker) }
}

impl SearchHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the search finishes. A panic on the worker is resumed here.
    pub fn wait(mut self) -> Result<CommonAttributeSearchResults, SearchError> {
        match self.worker.take() {
            Some(worker) => match worker.join() {
                Ok(result) => result,
                Err(payload) => panic::resume_unwind(payload),
            },
            None => Err(SearchError::Cancelled),
        }
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.cancel.cancel();
        }
    }
}
