//! `.casecorr.toml` settings.

use crate::frequency::FrequencyThreshold;
use crate::mime::MimeFilter;
use crate::model::{AttributeType, UnknownAttributeType};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    InvalidAttributeType(#[from] UnknownAttributeType),

    #[error("threshold must be between 0 and 100, got {0}")]
    InvalidThreshold(u8),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub repository: PathBuf,
    pub current_case: Option<String>,
    pub search: SearchDefaults,
    pub ingest: IngestDefaults,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SearchDefaults {
    pub attribute_type: String,
    pub threshold: u8,
    pub media: bool,
    pub documents: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct IngestDefaults {
    pub exclude: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repository: PathBuf::from(".casecorr/repository.json"),
            current_case: None,
            search: SearchDefaults::default(),
            ingest: IngestDefaults::default(),
        }
    }
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            attribute_type: AttributeType::Files.key().to_string(),
            threshold: 0,
            media: false,
            documents: false,
        }
    }
}

impl Config {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn attribute_type(&self) -> Result<AttributeType, ConfigError> {
        Ok(self.search.attribute_type.parse()?)
    }

    /// Configured thresholds are defaults, never hard requirements.
    pub fn threshold(&self) -> Result<FrequencyThreshold, ConfigError> {
        if self.search.threshold > 100 {
            return Err(ConfigError::InvalidThreshold(self.search.threshold));
        }
        Ok(FrequencyThreshold::from_config(self.search.threshold))
    }

    pub fn mime_filter(&self) -> MimeFilter {
        MimeFilter {
            media: self.search.media,
            documents: self.search.documents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_when_missing() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(&dir.path().join(".casecorr.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.attribute_type().unwrap(), AttributeType::Files);
        assert_eq!(config.threshold().unwrap(), FrequencyThreshold::Disabled);
        assert!(!config.mime_filter().is_active());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
repository = "/srv/cr/repository.json"
current_case = "2024-017 Burglary"

[search]
attribute_type = "email"
threshold = 5
media = true

[ingest]
exclude = ["*.tmp", "pagefile.sys"]
"#,
        )
        .unwrap();

        assert_eq!(config.repository, PathBuf::from("/srv/cr/repository.json"));
        assert_eq!(config.current_case.as_deref(), Some("2024-017 Burglary"));
        assert_eq!(config.attribute_type().unwrap(), AttributeType::Email);
        assert_eq!(config.threshold().unwrap(), FrequencyThreshold::Default(5));
        assert_eq!(config.mime_filter(), MimeFilter::media_only());
        assert_eq!(config.ingest.exclude.len(), 2);
    }

    #[test]
    fn test_invalid_values() {
        let config = Config::parse("[search]\nattribute_type = \"shoe_size\"\n").unwrap();
        assert!(config.attribute_type().is_err());

        let config = Config::parse("[search]\nthreshold = 150\n").unwrap();
        assert!(matches!(config.threshold(), Err(ConfigError::InvalidThreshold(150))));

        assert!(Config::parse("repository = [").is_err());
    }

    #[test]
    fn test_unreadable_config_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".casecorr.toml");
        fs::write(&path, "current_case = 7").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }
}
