//! How common an attribute value is across the central repository.
//!
//! Frequency is the share of all known data sources that hold a value. Values
//! found almost everywhere (operating system files, popular domains) are
//! noise for cross-case work, so searches may drop anything above a
//! percentage threshold.

use crate::error::SearchError;
use crate::model::AttributeType;
use crate::store::StoreSession;
use ahash::AHashMap;
use serde::Serialize;
use tracing::debug;

/// A frequency cut-off and whether the caller insisted on it.
///
/// `Default` thresholds come from configuration and are dropped for attribute
/// types without frequency support. `Required` thresholds were asked for
/// explicitly and fail the search instead.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrequencyThreshold {
    #[default]
    Disabled,
    Default(u8),
    Required(u8),
}

impl FrequencyThreshold {
    pub fn from_config(percent: u8) -> Self {
        if percent == 0 {
            FrequencyThreshold::Disabled
        } else {
            FrequencyThreshold::Default(percent)
        }
    }

    pub fn explicit(percent: u8) -> Self {
        if percent == 0 {
            FrequencyThreshold::Disabled
        } else {
            FrequencyThreshold::Required(percent)
        }
    }

    /// The effective cut-off for `attribute_type`; `None` means no filtering.
    pub fn resolve(self, attribute_type: AttributeType) -> Result<Option<u8>, SearchError> {
        match self {
            FrequencyThreshold::Disabled => Ok(None),
            FrequencyThreshold::Default(p) | FrequencyThreshold::Required(p) if p >= 100 => Ok(None),
            FrequencyThreshold::Default(p) => {
                if attribute_type.supports_frequency() {
                    Ok(Some(p))
                } else {
                    debug!(
                        "ignoring default {}% threshold: {} has no frequency",
                        p, attribute_type
                    );
                    Ok(None)
                }
            }
            FrequencyThreshold::Required(p) => {
                if attribute_type.supports_frequency() {
                    Ok(Some(p))
                } else {
                    Err(SearchError::UnsupportedAttributeType(attribute_type))
                }
            }
        }
    }
}

/// Human-readable threshold, e.g. `≤5% frequency`.
pub fn describe_threshold(threshold: Option<u8>) -> String {
    match threshold {
        Some(p) => format!("≤{}% frequency", p),
        None => "no threshold".to_string(),
    }
}

/// Per-search frequency lookups with a cache, so a value shared by many
/// rows is only counted once.
#[derive(Debug, Default)]
pub struct FrequencyIndex {
    cache: AHashMap<(AttributeType, String), f64>,
    total_data_sources: Option<usize>,
}

impl FrequencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Percentage in `[0, 100]` of data sources holding `value`.
    pub fn frequency_percentage_of(
        &mut self,
        session: &dyn StoreSession,
        attribute_type: AttributeType,
        value: &str,
    ) -> Result<f64, SearchError> {
        if !attribute_type.supports_frequency() {
            return Err(SearchError::UnsupportedAttributeType(attribute_type));
        }

        let key = (attribute_type, value.to_string());
        if let Some(&pct) = self.cache.get(&key) {
            return Ok(pct);
        }

        let total = match self.total_data_sources {
            Some(total) => total,
            None => {
                let total = session.count_data_sources()?;
                self.total_data_sources = Some(total);
                total
            }
        };

        let pct = if total == 0 {
            0.0
        } else {
            let holding = session.count_data_sources_with_value(attribute_type, value)?;
            (holding as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
        };

        self.cache.insert(key, pct);
        Ok(pct)
    }

    /// Filter predicate: keep values at or below `threshold` percent.
    pub fn retains(
        &mut self,
        session: &dyn StoreSession,
        attribute_type: AttributeType,
        value: &str,
        threshold: Option<u8>,
    ) -> Result<bool, SearchError> {
        match threshold {
            None => Ok(true),
            Some(limit) => {
                let pct = self.frequency_percentage_of(session, attribute_type, value)?;
                Ok(pct <= f64::from(limit))
            }
        }
    }

    pub fn cached_values(&self) -> usize {
        self.cache.len()
    }
}
