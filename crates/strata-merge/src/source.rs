use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use walkdir::WalkDir;

use crate::error::{MergeError, MergeResult};

/// Supplies document bytes.
///
/// A location names either one document or a directory of documents. A
/// directory resolves to its documents ordered by case-insensitive file name,
/// which fixes their traversal (and therefore sequence) order.
pub trait DocumentSource: Send + Sync {
    /// Resolve `location`, written inside the document at `relative_to`, to
    /// concrete document locations. Returns [`MergeError::NotFound`] when
    /// nothing exists there.
    fn resolve(&self, location: &str, relative_to: Option<&str>) -> MergeResult<Vec<String>>;

    /// Read one resolved document.
    fn read(&self, location: &str) -> MergeResult<Vec<u8>>;
}

fn sort_case_insensitive(locations: &mut [String]) {
    locations.sort_by(|a, b| {
        file_name(a)
            .to_lowercase()
            .cmp(&file_name(b).to_lowercase())
            .then_with(|| a.cmp(b))
    });
}

fn file_name(location: &str) -> &str {
    location.rsplit(['/', '\\']).next().unwrap_or(location)
}

/// Spell `path` one way only: canonical when it exists, otherwise with `.`
/// dropped and `..` folded into its parent.
fn normalize_path(path: PathBuf) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(&path) {
        return canonical;
    }
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir if matches!(out.components().next_back(), Some(Component::Normal(_))) => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// In-memory counterpart of [`normalize_path`] for `/`-separated locations.
fn normalize_location(location: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in location.split('/') {
        match part {
            "." => {}
            ".." if parts.last().is_some_and(|p| !p.is_empty() && *p != "..") => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    let mut normalized = parts.join("/");
    if location.ends_with('/') && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Documents on the local file system.
#[derive(Clone, Debug, Default)]
pub struct FsDocumentSource {
    base: Option<PathBuf>,
}

impl FsDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative root locations against `base`.
    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn candidate_path(&self, location: &str, relative_to: Option<&str>) -> PathBuf {
        let path = Path::new(location);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match relative_to.and_then(|r| Path::new(r).parent()) {
            Some(dir) => dir.join(path),
            None => match &self.base {
                Some(base) => base.join(path),
                None => path.to_path_buf(),
            },
        }
    }
}

impl DocumentSource for FsDocumentSource {
    fn resolve(&self, location: &str, relative_to: Option<&str>) -> MergeResult<Vec<String>> {
        let path = normalize_path(self.candidate_path(location, relative_to));
        if path.is_file() {
            return Ok(vec![path.display().to_string()]);
        }
        if path.is_dir() {
            let mut files: Vec<String> = WalkDir::new(&path)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .filter(|e| {
                    e.path()
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
                })
                .map(|e| e.path().display().to_string())
                .collect();
            sort_case_insensitive(&mut files);
            return Ok(files);
        }
        Err(MergeError::NotFound(path.display().to_string()))
    }

    fn read(&self, location: &str) -> MergeResult<Vec<u8>> {
        std::fs::read(location).map_err(|source| MergeError::Io {
            location: location.to_string(),
            source,
        })
    }
}

/// Documents held in memory, keyed by location. A location ending in `/`
/// (or any prefix of stored locations followed by `/`) acts as a directory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentSource {
    documents: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a document.
    pub fn insert(&self, location: impl Into<String>, text: impl Into<String>) {
        let text: String = text.into();
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(location.into(), text.into_bytes());
    }

    pub fn remove(&self, location: &str) -> bool {
        self.documents
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(location)
            .is_some()
    }

    fn qualify(location: &str, relative_to: Option<&str>) -> String {
        if location.starts_with('/') {
            return location.to_string();
        }
        match relative_to.and_then(|r| r.rfind('/').map(|i| &r[..=i])) {
            Some(dir) => format!("{}{}", dir, location),
            None => location.to_string(),
        }
    }
}

impl DocumentSource for InMemoryDocumentSource {
    fn resolve(&self, location: &str, relative_to: Option<&str>) -> MergeResult<Vec<String>> {
        let qualified = normalize_location(&Self::qualify(location, relative_to));
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        if documents.contains_key(&qualified) {
            return Ok(vec![qualified]);
        }
        let prefix = if qualified.ends_with('/') {
            qualified.clone()
        } else {
            format!("{}/", qualified)
        };
        let mut children: Vec<String> = documents
            .keys()
            .filter(|k| k.starts_with(&prefix) && !k[prefix.len()..].contains('/'))
            .cloned()
            .collect();
        if children.is_empty() {
            return Err(MergeError::NotFound(qualified));
        }
        sort_case_insensitive(&mut children);
        Ok(children)
    }

    fn read(&self, location: &str) -> MergeResult<Vec<u8>> {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(location)
            .cloned()
            .ok_or_else(|| MergeError::NotFound(location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::JsonDocumentParser;
    use crate::loader::ConfigLoader;

    #[test]
    fn memory_resolves_relative_includes() {
        let source = InMemoryDocumentSource::new();
        source.insert("conf/server.json", "{}");
        source.insert("conf/extra.json", "{}");
        let resolved = source.resolve("extra.json", Some("conf/server.json")).unwrap();
        assert_eq!(resolved, vec!["conf/extra.json"]);
    }

    #[test]
    fn memory_directory_sorted_case_insensitively() {
        let source = InMemoryDocumentSource::new();
        source.insert("dropins/b.json", "{}");
        source.insert("dropins/A.json", "{}");
        source.insert("dropins/c.json", "{}");
        source.insert("dropins/nested/d.json", "{}");
        let resolved = source.resolve("dropins", None).unwrap();
        assert_eq!(
            resolved,
            vec!["dropins/A.json", "dropins/b.json", "dropins/c.json"]
        );
    }

    #[test]
    fn memory_missing_is_not_found() {
        let source = InMemoryDocumentSource::new();
        assert!(matches!(
            source.resolve("nope.json", None),
            Err(MergeError::NotFound(_))
        ));
        assert!(matches!(source.read("nope.json"), Err(MergeError::NotFound(_))));
    }

    #[test]
    fn memory_locations_are_normalized() {
        let source = InMemoryDocumentSource::new();
        source.insert("conf/server.json", "{}");
        source.insert("shared/extra.json", "{}");
        assert_eq!(
            source.resolve("./server.json", Some("conf/server.json")).unwrap(),
            vec!["conf/server.json"]
        );
        assert_eq!(
            source.resolve("../shared/./extra.json", Some("conf/server.json")).unwrap(),
            vec!["shared/extra.json"]
        );
        assert_eq!(normalize_location("dropins/./"), "dropins/");
        assert_eq!(normalize_location("../a.json"), "../a.json");
    }

    #[test]
    fn fs_spellings_of_one_file_resolve_alike() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("conf")).unwrap();
        let server = dir.path().join("conf").join("server.json");
        std::fs::write(&server, "{}").unwrap();
        let source = FsDocumentSource::new();
        let from = server.display().to_string();
        let plain = source.resolve("server.json", Some(&from)).unwrap();
        let dotted = source.resolve("./server.json", Some(&from)).unwrap();
        let around = source.resolve("../conf/server.json", Some(&from)).unwrap();
        assert_eq!(plain, dotted);
        assert_eq!(plain, around);
    }

    #[test]
    fn fs_self_include_through_dot_path_loads_once() {
        let dir = tempfile::tempdir().unwrap();
        let server = dir.path().join("server.json");
        std::fs::write(
            &server,
            r#"{"entries":[
                {"include":{"location":"./server.json"}},
                {"element":{"name":"x","attributes":{"tags":"a"}}}
            ]}"#,
        )
        .unwrap();
        let source = FsDocumentSource::new();
        let snapshot = ConfigLoader::new(&source, &JsonDocumentParser)
            .load(&server.display().to_string(), &[])
            .unwrap();
        assert_eq!(snapshot.candidates("x").len(), 1);
    }

    #[test]
    fn lexical_normalization_folds_parent_dirs() {
        assert_eq!(
            normalize_path(PathBuf::from("missing/./a/../b.json")),
            PathBuf::from("missing/b.json")
        );
        assert_eq!(normalize_path(PathBuf::from("../b.json")), PathBuf::from("../b.json"));
    }

    #[test]
    fn fs_directory_sorted_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("A.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let source = FsDocumentSource::new();
        let resolved = source
            .resolve(&dir.path().display().to_string(), None)
            .unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved[0].ends_with("A.json"));
        assert!(resolved[1].ends_with("b.json"));
    }

    #[test]
    fn fs_relative_to_including_document() {
        let dir = tempfile::tempdir().unwrap();
        let server = dir.path().join("server.json");
        std::fs::write(&server, "{}").unwrap();
        std::fs::write(dir.path().join("inc.json"), "{\"entries\":[]}").unwrap();
        let source = FsDocumentSource::new();
        let resolved = source
            .resolve("inc.json", Some(&server.display().to_string()))
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(source.read(&resolved[0]).unwrap(), b"{\"entries\":[]}");
    }
}
