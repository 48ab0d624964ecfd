//! The attribute store boundary and an in-memory central repository that
//! persists to a JSON file.

use crate::error::{SearchError, StoreError};
use crate::model::{
    AttributeInstance, AttributeType, CaseHandle, CaseId, CorrelationCase, DataSource,
    DataSourceId, DataSourceRef, FileRef, KnownStatus,
};
use crate::normalize::normalize;
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

pub const REPOSITORY_VERSION: u32 = 2;

/// A queryable source of correlated attribute instances.
pub trait AttributeStore: Send + Sync {
    /// Acquire a scoped query session. The session is released when dropped.
    fn open_session(&self) -> Result<Box<dyn StoreSession + '_>, StoreError>;
}

/// Read-only queries available for the lifetime of one session.
pub trait StoreSession {
    /// Fails with `StoreError::CaseNotFound` if the case does not exist.
    fn lookup_case_by_id(&self, id: CaseId) -> Result<CorrelationCase, StoreError>;

    fn find_case_by_name(&self, name: &str) -> Result<Option<CorrelationCase>, StoreError>;

    fn instances_in_case(
        &self,
        case_id: CaseId,
        attribute_type: AttributeType,
    ) -> Result<Vec<AttributeInstance>, StoreError>;

    fn instances_with_value(
        &self,
        attribute_type: AttributeType,
        value: &str,
    ) -> Result<Vec<AttributeInstance>, StoreError>;

    fn count_data_sources(&self) -> Result<usize, StoreError>;

    /// Number of distinct (case, data source) pairs holding the value.
    fn count_data_sources_with_value(
        &self,
        attribute_type: AttributeType,
        value: &str,
    ) -> Result<usize, StoreError>;
}

/// Supplies the working case that anchors every search.
pub trait CaseContext {
    fn current_case(&self) -> Result<CaseHandle, SearchError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCaseContext {
    current: Option<CaseHandle>,
}

impl StaticCaseContext {
    pub fn open(case: CorrelationCase) -> Self {
        Self { current: Some(CaseHandle::new(case)) }
    }

    pub fn closed() -> Self {
        Self { current: None }
    }
}

impl CaseContext for StaticCaseContext {
    fn current_case(&self) -> Result<CaseHandle, SearchError> {
        self.current.clone().ok_or(SearchError::NoCurrentCase)
    }
}

// Persistent structures

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct StoredInstance {
    case_id: CaseId,
    data_source_id: DataSourceId,
    attribute_type: AttributeType,
    value: String,
    file: FileRef,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    known_status: Option<KnownStatus>,
}

#[derive(Serialize, Deserialize, Debug)]
struct RepositoryData {
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    cases: BTreeMap<CaseId, CorrelationCase>,
    #[serde(default)]
    data_sources: BTreeMap<DataSourceId, DataSource>,
    #[serde(default)]
    instances: Vec<StoredInstance>,
    #[serde(skip)]
    by_value: AHashMap<(AttributeType, String), Vec<usize>>,
    #[serde(skip)]
    by_case: AHashMap<(CaseId, AttributeType), Vec<usize>>,
}

impl RepositoryData {
    fn empty() -> Self {
        Self {
            version: REPOSITORY_VERSION,
            updated_at: Utc::now(),
            cases: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            instances: Vec::new(),
            by_value: AHashMap::new(),
            by_case: AHashMap::new(),
        }
    }

    fn rebuild_indexes(&mut self) {
        self.by_value.clear();
        self.by_case.clear();
        for idx in 0..self.instances.len() {
            self.index_instance(idx);
        }
    }

    fn index_instance(&mut self, idx: usize) {
        let inst = &self.instances[idx];
        self.by_value
            .entry((inst.attribute_type, inst.value.clone()))
            .or_default()
            .push(idx);
        self.by_case
            .entry((inst.case_id, inst.attribute_type))
            .or_default()
            .push(idx);
    }

    fn resolve(&self, stored: &StoredInstance) -> Result<AttributeInstance, StoreError> {
        let case = self.cases.get(&stored.case_id)
            .ok_or(StoreError::CaseNotFound(stored.case_id))?;
        let ds = self.data_sources.get(&stored.data_source_id)
            .ok_or(StoreError::DataSourceNotFound(stored.data_source_id))?;
        Ok(AttributeInstance {
            case: case.clone(),
            data_source: DataSourceRef { id: ds.id, name: ds.name.clone() },
            file: stored.file.clone(),
            attribute_type: stored.attribute_type,
            value: stored.value.clone(),
            comment: stored.comment.clone(),
            known_status: stored.known_status,
        })
    }

    fn resolve_all(&self, indexes: Option<&Vec<usize>>) -> Result<Vec<AttributeInstance>, StoreError> {
        indexes
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| self.resolve(&self.instances[i]))
                    .collect::<Result<Vec<_>, _>>()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// A new attribute occurrence to correlate into the repository.
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub case_id: CaseId,
    pub data_source_id: DataSourceId,
    pub attribute_type: AttributeType,
    pub value: String,
    pub file: FileRef,
    pub comment: Option<String>,
    pub known_status: Option<KnownStatus>,
}

#[derive(Serialize, Debug, Clone)]
pub struct CaseSummary {
    pub case: CorrelationCase,
    pub data_sources: usize,
    pub instances: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct RepositoryStats {
    pub version: u32,
    pub updated_at: DateTime<Utc>,
    pub cases: usize,
    pub data_sources: usize,
    pub instances: usize,
    pub distinct_values: usize,
    pub instances_by_type: BTreeMap<AttributeType, usize>,
}

/// In-memory central repository.
///
/// Readers share the data through sessions; recording new instances takes the
/// write lock and so waits for open sessions to be released.
pub struct CentralRepository {
    data: RwLock<RepositoryData>,
    open_sessions: AtomicUsize,
}

impl Default for CentralRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl CentralRepository {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(RepositoryData::empty()),
            open_sessions: AtomicUsize::new(0),
        }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = fs::read_to_string(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::Unavailable(format!(
                "repository not found at {}. Run 'casecorr ingest' first.",
                path.display()
            )),
            _ => StoreError::Io(e),
        })?;
        let mut data: RepositoryData = serde_json::from_str(&content)?;
        if data.version > REPOSITORY_VERSION {
            return Err(StoreError::Unavailable(format!(
                "repository version {} is newer than supported version {}",
                data.version, REPOSITORY_VERSION
            )));
        }
        data.version = REPOSITORY_VERSION;
        data.rebuild_indexes();
        debug!(
            cases = data.cases.len(),
            instances = data.instances.len(),
            "loaded central repository from {}",
            path.display()
        );
        Ok(Self {
            data: RwLock::new(data),
            open_sessions: AtomicUsize::new(0),
        })
    }

    pub fn load_or_create(path: &Path) -> Result<Self, StoreError> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("creating new central repository at {}", path.display());
            Ok(Self::new())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut data = self.data.write();
        data.updated_at = Utc::now();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(&*data)?)?;
        Ok(())
    }

    /// Register a case, returning the existing record if the name is taken.
    pub fn add_case(&self, display_name: &str) -> CorrelationCase {
        let mut data = self.data.write();
        if let Some(existing) = data.cases.values().find(|c| c.display_name == display_name) {
            return existing.clone();
        }
        let id = data.cases.keys().next_back().map(|id| id + 1).unwrap_or(1);
        let case = CorrelationCase {
            id,
            display_name: display_name.to_string(),
            created_at: Some(Utc::now()),
        };
        data.cases.insert(id, case.clone());
        debug!(case_id = id, "registered case '{}'", display_name);
        case
    }

    /// Register a data source under a case, returning the existing one if the
    /// case already has a data source with that name.
    pub fn add_data_source(
        &self,
        case_id: CaseId,
        name: &str,
        device_id: &str,
    ) -> Result<DataSource, StoreError> {
        let mut data = self.data.write();
        if !data.cases.contains_key(&case_id) {
            return Err(StoreError::CaseNotFound(case_id));
        }
        if let Some(existing) = data.data_sources.values()
            .find(|ds| ds.case_id == case_id && ds.name == name)
        {
            return Ok(existing.clone());
        }
        let id = data.data_sources.keys().next_back().map(|id| id + 1).unwrap_or(1);
        let ds = DataSource {
            id,
            case_id,
            name: name.to_string(),
            device_id: device_id.to_string(),
        };
        data.data_sources.insert(id, ds.clone());
        Ok(ds)
    }

    /// Normalize and record an instance. Returns `false` if an identical
    /// occurrence (same case, data source, file, type and value) already exists.
    pub fn record_instance(&self, record: InstanceRecord) -> Result<bool, StoreError> {
        let value = normalize(record.attribute_type, &record.value)?;

        let mut data = self.data.write();
        if !data.cases.contains_key(&record.case_id) {
            return Err(StoreError::CaseNotFound(record.case_id));
        }
        match data.data_sources.get(&record.data_source_id) {
            Some(ds) if ds.case_id == record.case_id => {}
            _ => return Err(StoreError::DataSourceNotFound(record.data_source_id)),
        }

        let key = (record.attribute_type, value.clone());
        let duplicate = data.by_value.get(&key).is_some_and(|idxs| {
            idxs.iter().any(|&i| {
                let existing = &data.instances[i];
                existing.case_id == record.case_id
                    && existing.data_source_id == record.data_source_id
                    && existing.file.path == record.file.path
            })
        });
        if duplicate {
            return Ok(false);
        }

        data.instances.push(StoredInstance {
            case_id: record.case_id,
            data_source_id: record.data_source_id,
            attribute_type: record.attribute_type,
            value,
            file: record.file,
            comment: record.comment,
            known_status: record.known_status,
        });
        let idx = data.instances.len() - 1;
        data.index_instance(idx);
        Ok(true)
    }

    /// Sessions currently holding the repository open.
    pub fn open_session_count(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    pub fn cases(&self) -> Vec<CaseSummary> {
        let data = self.data.read();
        let mut ds_counts: AHashMap<CaseId, usize> = AHashMap::new();
        for ds in data.data_sources.values() {
            *ds_counts.entry(ds.case_id).or_insert(0) += 1;
        }
        let mut inst_counts: AHashMap<CaseId, usize> = AHashMap::new();
        for inst in &data.instances {
            *inst_counts.entry(inst.case_id).or_insert(0) += 1;
        }
        data.cases.values()
            .map(|case| CaseSummary {
                case: case.clone(),
                data_sources: ds_counts.get(&case.id).copied().unwrap_or(0),
                instances: inst_counts.get(&case.id).copied().unwrap_or(0),
            })
            .collect()
    }

    pub fn stats(&self) -> RepositoryStats {
        let data = self.data.read();
        let mut instances_by_type = BTreeMap::new();
        for inst in &data.instances {
            *instances_by_type.entry(inst.attribute_type).or_insert(0) += 1;
        }
        RepositoryStats {
            version: data.version,
            updated_at: data.updated_at,
            cases: data.cases.len(),
            data_sources: data.data_sources.len(),
            instances: data.instances.len(),
            distinct_values: data.by_value.len(),
            instances_by_type,
        }
    }
}

impl AttributeStore for CentralRepository {
    fn open_session(&self) -> Result<Box<dyn StoreSession + '_>, StoreError> {
        let guard = self.data.read();
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RepositorySession {
            data: guard,
            open_sessions: &self.open_sessions,
        }))
    }
}

struct RepositorySession<'a> {
    data: RwLockReadGuard<'a, RepositoryData>,
    open_sessions: &'a AtomicUsize,
}

impl Drop for RepositorySession<'_> {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StoreSession for RepositorySession<'_> {
    fn lookup_case_by_id(&self, id: CaseId) -> Result<CorrelationCase, StoreError> {
        self.data.cases.get(&id).cloned().ok_or(StoreError::CaseNotFound(id))
    }

    fn find_case_by_name(&self, name: &str) -> Result<Option<CorrelationCase>, StoreError> {
        Ok(self.data.cases.values().find(|c| c.display_name == name).cloned())
    }

    fn instances_in_case(
        &self,
        case_id: CaseId,
        attribute_type: AttributeType,
    ) -> Result<Vec<AttributeInstance>, StoreError> {
        if !self.data.cases.contains_key(&case_id) {
            return Err(StoreError::CaseNotFound(case_id));
        }
        self.data.resolve_all(self.data.by_case.get(&(case_id, attribute_type)))
    }

    fn instances_with_value(
        &self,
        attribute_type: AttributeType,
        value: &str,
    ) -> Result<Vec<AttributeInstance>, StoreError> {
        self.data.resolve_all(self.data.by_value.get(&(attribute_type, value.to_string())))
    }

    fn count_data_sources(&self) -> Result<usize, StoreError> {
        Ok(self.data.data_sources.len())
    }

    fn count_data_sources_with_value(
        &self,
        attribute_type: AttributeType,
        value: &str,
    ) -> Result<usize, StoreError> {
        let Some(idxs) = self.data.by_value.get(&(attribute_type, value.to_string())) else {
            return Ok(0);
        };
        let distinct: AHashSet<(CaseId, DataSourceId)> = idxs.iter()
            .map(|&i| {
                let inst = &self.data.instances[i];
                (inst.case_id, inst.data_source_id)
            })
            .collect();
        Ok(distinct.len())
    }
}
