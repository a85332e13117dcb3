//! Document format.
//!
//! A document is an ordered list of entries. Order matters: it fixes the
//! global sequence numbers the merge engine sorts candidates by, and an
//! include is processed at the position it appears.
//!
//! ```json
//! { "entries": [
//!     { "variable": { "name": "httpPort", "value": "9080" } },
//!     { "include":  { "location": "extra.json", "onConflict": "REPLACE" } },
//!     { "element":  { "name": "httpEndpoint",
//!                     "attributes": { "id": "default", "port": "${httpPort}" },
//!                     "children": [ { "name": "sslOptions", "attributes": { "ref": "ssl" } } ] } }
//! ] }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strata_types::{AttributeOp, MergeBehavior};

use crate::error::ParseError;

/// A decoded document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub entries: Vec<DocumentEntry>,
}

/// One top-level entry of a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentEntry {
    Element(RawElement),
    Include(RawInclude),
    Variable(RawVariable),
}

/// An attribute value as written: a string, a number, a boolean or a list of strings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAttribute {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
    List(Vec<String>),
}

impl fmt::Display for RawAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawAttribute::Text(s) => f.write_str(s),
            RawAttribute::Number(n) => write!(f, "{}", n),
            RawAttribute::Bool(b) => write!(f, "{}", b),
            RawAttribute::List(items) => f.write_str(&items.join(",")),
        }
    }
}

/// An element with its attributes and nested children.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    pub name: String,
    #[serde(default)]
    pub attributes: IndexMap<String, RawAttribute>,
    /// Explicit per-attribute override operations.
    #[serde(default)]
    pub ops: BTreeMap<String, AttributeOp>,
    #[serde(default)]
    pub children: Vec<RawElement>,
    #[serde(default)]
    pub text: Option<String>,
}

impl RawElement {
    /// A child written only as `{ "ref": "<id>" }` is a reference, not an element.
    pub fn reference_target(&self) -> Option<&str> {
        if self.children.is_empty() && self.text.is_none() && self.attributes.len() == 1 {
            match self.attributes.get("ref") {
                Some(RawAttribute::Text(target)) => Some(target),
                _ => None,
            }
        } else {
            None
        }
    }
}

/// An include directive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInclude {
    pub location: String,
    #[serde(default)]
    pub on_conflict: MergeBehavior,
    /// A missing optional include is skipped without an error.
    #[serde(default)]
    pub optional: bool,
}

/// A variable declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVariable {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
}

/// Decodes document bytes.
pub trait DocumentParser: Send + Sync {
    fn parse(&self, location: &str, bytes: &[u8]) -> Result<RawDocument, ParseError>;
}

/// Parser for the JSON document format.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDocumentParser;

impl DocumentParser for JsonDocumentParser {
    fn parse(&self, location: &str, bytes: &[u8]) -> Result<RawDocument, ParseError> {
        serde_json::from_slice(bytes).map_err(|e| ParseError::new(location, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_entry_kinds() {
        let doc = JsonDocumentParser
            .parse(
                "server.json",
                br#"{"entries":[
                    {"variable":{"name":"p","defaultValue":"80"}},
                    {"include":{"location":"a.json","onConflict":"REPLACE","optional":true}},
                    {"element":{"name":"e","attributes":{"id":"x","port":8080,"on":true,"hosts":["a","b"]},"ops":{"hosts":"SET"}}}
                ]}"#,
            )
            .unwrap();
        assert_eq!(doc.entries.len(), 3);
        match &doc.entries[1] {
            DocumentEntry::Include(inc) => {
                assert_eq!(inc.on_conflict, MergeBehavior::Replace);
                assert!(inc.optional);
            }
            other => panic!("expected include, got {:?}", other),
        }
        match &doc.entries[2] {
            DocumentEntry::Element(el) => {
                assert_eq!(el.attributes["port"].to_string(), "8080");
                assert_eq!(el.attributes["on"].to_string(), "true");
                assert_eq!(el.ops["hosts"], AttributeOp::Set);
            }
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn include_defaults_to_merge() {
        let doc = JsonDocumentParser
            .parse("s", br#"{"entries":[{"include":{"location":"a"}}]}"#)
            .unwrap();
        match &doc.entries[0] {
            DocumentEntry::Include(inc) => {
                assert_eq!(inc.on_conflict, MergeBehavior::Merge);
                assert!(!inc.optional);
            }
            other => panic!("expected include, got {:?}", other),
        }
    }

    #[test]
    fn malformed_document_reports_location() {
        let err = JsonDocumentParser.parse("broken.json", b"{").unwrap_err();
        assert_eq!(err.location, "broken.json");
    }

    #[test]
    fn ref_only_child_is_reference() {
        let el: RawElement =
            serde_json::from_str(r#"{"name":"ssl","attributes":{"ref":"defaultSSL"}}"#).unwrap();
        assert_eq!(el.reference_target(), Some("defaultSSL"));
        let full: RawElement =
            serde_json::from_str(r#"{"name":"ssl","attributes":{"ref":"x","id":"y"}}"#).unwrap();
        assert_eq!(full.reference_target(), None);
    }
}
