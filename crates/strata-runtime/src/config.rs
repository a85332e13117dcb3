use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_merge::DefaultDocument;
use strata_types::{MergeBehavior, OnError};

use crate::error::{RuntimeError, RuntimeResult};

/// A default document and the behavior it is merged under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultDocumentConfig {
    pub location: String,
    #[serde(default)]
    pub behavior: MergeBehavior,
}

impl From<&DefaultDocumentConfig> for DefaultDocument {
    fn from(config: &DefaultDocumentConfig) -> Self {
        DefaultDocument::new(config.location.clone(), config.behavior)
    }
}

/// Configuration of the refresh pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How tolerable errors in documents and elements are handled.
    pub on_error: OnError,
    /// How long a refresh waits for change notifications before moving on.
    #[serde(with = "duration_serde")]
    pub notification_timeout: Duration,
    /// Location of the root document.
    pub root_document: String,
    /// Documents loaded before the root.
    pub default_documents: Vec<DefaultDocumentConfig>,
    /// Explicit variables; these outrank every document.
    pub variables: BTreeMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            on_error: OnError::Warn,
            notification_timeout: Duration::from_secs(30),
            root_document: "server.json".into(),
            default_documents: Vec::new(),
            variables: BTreeMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// A configuration for `root_document` with every other setting at its default.
    pub fn for_root(root_document: impl Into<String>) -> Self {
        Self {
            root_document: root_document.into(),
            ..Default::default()
        }
    }

    pub fn from_toml_str(text: &str) -> RuntimeResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML configuration file.
    pub fn load(path: &Path) -> RuntimeResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| RuntimeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub(crate) fn default_documents(&self) -> Vec<DefaultDocument> {
        self.default_documents.iter().map(DefaultDocument::from).collect()
    }
}

/// Durations written the way configuration documents write them: `30s`,
/// `1m30s`, `500ms`, or a bare number of milliseconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{de, Deserialize, Deserializer, Serializer};
    use strata_schema::TimeUnit;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let millis = strata_eval::parse_duration(&text, TimeUnit::Milliseconds).map_err(de::Error::custom)?;
        u64::try_from(millis)
            .map(Duration::from_millis)
            .map_err(|_| de::Error::custom(format!("negative duration: {}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.on_error, OnError::Warn);
        assert_eq!(config.notification_timeout, Duration::from_secs(30));
        assert!(config.default_documents.is_empty());
    }

    #[test]
    fn parses_toml() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            on_error = "FAIL"
            notification_timeout = "1m30s"
            root_document = "conf/server.json"

            [[default_documents]]
            location = "defaults/logging.json"
            behavior = "MERGE_WHEN_MISSING"

            [variables]
            httpPort = "9443"
            "#,
        )
        .unwrap();
        assert_eq!(config.on_error, OnError::Fail);
        assert_eq!(config.notification_timeout, Duration::from_secs(90));
        assert_eq!(config.root_document, "conf/server.json");
        assert_eq!(config.default_documents[0].behavior, MergeBehavior::MergeWhenMissing);
        assert_eq!(config.variables["httpPort"], "9443");
    }

    #[test]
    fn missing_keys_take_defaults() {
        let config = RuntimeConfig::from_toml_str(r#"root_document = "a.json""#).unwrap();
        assert_eq!(config.notification_timeout, Duration::from_secs(30));
        assert_eq!(config.on_error, OnError::Warn);
    }

    #[test]
    fn rejects_bad_duration() {
        assert!(matches!(
            RuntimeConfig::from_toml_str(r#"notification_timeout = "soon""#),
            Err(RuntimeError::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        std::fs::write(&path, "on_error = \"IGNORE\"\n").unwrap();
        assert_eq!(RuntimeConfig::load(&path).unwrap().on_error, OnError::Ignore);
        assert!(matches!(
            RuntimeConfig::load(&dir.path().join("missing.toml")),
            Err(RuntimeError::Io { .. })
        ));
    }
}
