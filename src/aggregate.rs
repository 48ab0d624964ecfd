//! Turns raw cross-case matches into the ordered, read-only result structure
//! handed to presentation.

use crate::frequency::describe_threshold;
use crate::model::{AttributeInstance, AttributeType, CaseId, CorrelationCase};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::warn;

/// One value found in the current case and in the searched scope, with every
/// instance that contributed to the match.
#[derive(Debug, Clone)]
pub struct MatchRow {
    /// Case whose result list the value belongs to.
    pub anchor: CorrelationCase,
    pub attribute_type: AttributeType,
    pub value: String,
    pub instances: Vec<AttributeInstance>,
}

/// What a search correlated the current case against.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "case", rename_all = "snake_case")]
pub enum SearchTarget {
    AllOtherCases,
    Case(CorrelationCase),
}

impl SearchTarget {
    pub fn label(&self) -> String {
        match self {
            SearchTarget::AllOtherCases => "all other cases".to_string(),
            SearchTarget::Case(case) => case.display_name.clone(),
        }
    }
}

/// An attribute value and the instances sharing it.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CommonAttributeValue {
    value: String,
    attribute_type: AttributeType,
    instances: Vec<AttributeInstance>,
}

impl CommonAttributeValue {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    pub fn instances(&self) -> &[AttributeInstance] {
        &self.instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Distinct case names in instance order.
    pub fn case_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for inst in &self.instances {
            if !names.contains(&inst.case.display_name.as_str()) {
                names.push(&inst.case.display_name);
            }
        }
        names
    }

    pub fn data_source_count(&self) -> usize {
        let mut seen: Vec<(CaseId, i64)> = self.instances.iter()
            .map(|i| (i.case.id, i.data_source.id))
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

/// Values grouped under the case that anchors them.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CommonAttributeValueList {
    case_id: CaseId,
    case_name: String,
    values: Vec<CommonAttributeValue>,
}

impl CommonAttributeValueList {
    pub fn case_id(&self) -> CaseId {
        self.case_id
    }

    pub fn case_name(&self) -> &str {
        &self.case_name
    }

    pub fn values(&self) -> &[CommonAttributeValue] {
        &self.values
    }

    pub fn total_instances(&self) -> usize {
        self.values.iter().map(|v| v.instance_count()).sum()
    }
}

/// Final, immutable outcome of one search.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CommonAttributeSearchResults {
    title: String,
    target: SearchTarget,
    attribute_type: AttributeType,
    threshold: Option<u8>,
    lists: Vec<CommonAttributeValueList>,
}

impl CommonAttributeSearchResults {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn target(&self) -> &SearchTarget {
        &self.target
    }

    pub fn attribute_type(&self) -> AttributeType {
        self.attribute_type
    }

    /// Effective frequency cut-off, `None` if nothing was filtered.
    pub fn threshold(&self) -> Option<u8> {
        self.threshold
    }

    pub fn lists(&self) -> &[CommonAttributeValueList] {
        &self.lists
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn value_count(&self) -> usize {
        self.lists.iter().map(|l| l.values.len()).sum()
    }

    pub fn instance_count(&self) -> usize {
        self.lists.iter().map(|l| l.total_instances()).sum()
    }
}

pub fn build_title(target: &SearchTarget, attribute_type: AttributeType, threshold: Option<u8>) -> String {
    let scope = match target {
        SearchTarget::AllOtherCases => "All Central Repository Cases".to_string(),
        SearchTarget::Case(case) => format!("Central Repository Case: {}", case.display_name),
    };
    format!(
        "Common Properties ({}, {}, {})",
        scope,
        attribute_type.display_name(),
        describe_threshold(threshold)
    )
}

pub struct ResultAggregator {
    target: SearchTarget,
    attribute_type: AttributeType,
    threshold: Option<u8>,
}

impl ResultAggregator {
    pub fn new(target: SearchTarget, attribute_type: AttributeType, threshold: Option<u8>) -> Self {
        Self { target, attribute_type, threshold }
    }

    pub fn aggregate(self, rows: Vec<MatchRow>) -> CommonAttributeSearchResults {
        struct Group {
            anchors: BTreeMap<CaseId, CorrelationCase>,
            instances: Vec<AttributeInstance>,
        }

        // Merge rows sharing a value
        let mut groups: BTreeMap<String, Group> = BTreeMap::new();
        for row in rows {
            if row.attribute_type != self.attribute_type {
                warn!("dropping {} row for a {} search", row.attribute_type, self.attribute_type);
                continue;
            }
            let group = groups.entry(row.value.clone()).or_insert_with(|| Group {
                anchors: BTreeMap::new(),
                instances: Vec::new(),
            });
            group.anchors.insert(row.anchor.id, row.anchor);
            group.instances.extend(
                row.instances.into_iter()
                    .filter(|i| i.value == row.value && i.attribute_type == row.attribute_type),
            );
        }

        let mut by_anchor: BTreeMap<CaseId, (String, Vec<CommonAttributeValue>)> = BTreeMap::new();
        for (value, mut group) in groups {
            group.instances.sort_by(compare_instances);
            group.instances.dedup_by(|a, b| {
                a.case.id == b.case.id && a.data_source.id == b.data_source.id && a.file.path == b.file.path
            });

            let common = CommonAttributeValue {
                value,
                attribute_type: self.attribute_type,
                instances: group.instances,
            };
            for (case_id, case) in group.anchors {
                by_anchor
                    .entry(case_id)
                    .or_insert_with(|| (case.display_name.clone(), Vec::new()))
                    .1
                    .push(common.clone());
            }
        }

        let mut lists: Vec<CommonAttributeValueList> = by_anchor.into_iter()
            .map(|(case_id, (case_name, mut values))| {
                values.sort_by(|a, b| {
                    b.instance_count().cmp(&a.instance_count()).then_with(|| a.value.cmp(&b.value))
                });
                CommonAttributeValueList { case_id, case_name, values }
            })
            .collect();

        // Most shared first
        lists.sort_by(|a, b| {
            b.total_instances().cmp(&a.total_instances()).then_with(|| a.case_id.cmp(&b.case_id))
        });

        CommonAttributeSearchResults {
            title: build_title(&self.target, self.attribute_type, self.threshold),
            target: self.target,
            attribute_type: self.attribute_type,
            threshold: self.threshold,
            lists,
        }
    }
}

/// Case name, then data source, then path; ids settle the remaining ties.
fn compare_instances(a: &AttributeInstance, b: &AttributeInstance) -> Ordering {
    a.case.display_name.cmp(&b.case.display_name)
        .then_with(|| a.data_source.name.cmp(&b.data_source.name))
        .then_with(|| a.file.path.cmp(&b.file.path))
        .then_with(|| a.case.id.cmp(&b.case.id))
        .then_with(|| a.data_source.id.cmp(&b.data_source.id))
        .then_with(|| a.file.object_id.cmp(&b.file.object_id))
}
