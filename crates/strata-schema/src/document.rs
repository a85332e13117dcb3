use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entry::RegistryEntry;
use crate::error::{SchemaError, SchemaResult};

/// On-disk schema description: a flat list of registry entries.
///
/// ```json
/// { "entries": [ { "pid": "httpEndpoint", "factory": true,
///                  "attributes": [ { "id": "port", "type": "integer", "default": ["80"] } ] } ] }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub entries: Vec<RegistryEntry>,
}

impl SchemaDocument {
    pub fn from_json_str(location: &str, text: &str) -> SchemaResult<Self> {
        serde_json::from_str(text).map_err(|e| SchemaError::Parse {
            location: location.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn from_toml_str(location: &str, text: &str) -> SchemaResult<Self> {
        toml::from_str(text).map_err(|e| SchemaError::Parse {
            location: location.to_string(),
            reason: e.to_string(),
        })
    }

    /// Read a schema file, choosing the format by extension (`.toml` or JSON).
    pub fn load(path: &Path) -> SchemaResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let location = path.display().to_string();
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&location, &text)
        } else {
            Self::from_json_str(&location, &text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::AttributeType;

    #[test]
    fn parses_json() {
        let doc = SchemaDocument::from_json_str(
            "schema.json",
            r#"{"entries":[{"pid":"logging","attributes":[{"id":"maxFiles","type":"integer","default":["2"]}]}]}"#,
        )
        .unwrap();
        assert_eq!(doc.entries.len(), 1);
        let ad = doc.entries[0].attributes.get("maxfiles").unwrap();
        assert_eq!(ad.attr_type, AttributeType::Integer);
    }

    #[test]
    fn parses_toml() {
        let doc = SchemaDocument::from_toml_str(
            "schema.toml",
            r#"
[[entries]]
pid = "httpEndpoint"
factory = true

[[entries.attributes]]
id = "port"
type = "integer"
default = ["9080"]
"#,
        )
        .unwrap();
        assert!(doc.entries[0].factory);
        assert_eq!(
            doc.entries[0].attributes.get("port").unwrap().default_values,
            Some(vec!["9080".to_string()])
        );
    }

    #[test]
    fn reports_parse_location() {
        match SchemaDocument::from_json_str("bad.json", "{") {
            Err(SchemaError::Parse { location, .. }) => assert_eq!(location, "bad.json"),
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    #[test]
    fn load_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.toml");
        std::fs::write(&path, "[[entries]]\npid = \"a\"\n").unwrap();
        let doc = SchemaDocument::load(&path).unwrap();
        assert_eq!(doc.entries[0].pid, "a");
    }
}
