use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{VariableError, VariableResult};

/// Read access to environment variables.
pub trait EnvironmentSource: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

/// The environment of the running process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnvironment;

impl EnvironmentSource for ProcessEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed environment.
#[derive(Clone, Debug, Default)]
pub struct MapEnvironment {
    values: BTreeMap<String, String>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl EnvironmentSource for MapEnvironment {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Layered variable values.
///
/// Lookup order is explicit values, then file-level values. Declared default
/// values and the environment are consulted separately by the resolver,
/// after the attributes of the element under evaluation.
#[derive(Clone)]
pub struct VariableRegistry {
    explicit: BTreeMap<String, String>,
    file: BTreeMap<String, String>,
    defaults: BTreeMap<String, String>,
    environment: Arc<dyn EnvironmentSource>,
}

impl fmt::Debug for VariableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableRegistry")
            .field("explicit", &self.explicit)
            .field("file", &self.file)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl Default for VariableRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(name: &str) -> VariableResult<()> {
    if name.trim().is_empty() || name.contains('}') || name.contains("${") {
        return Err(VariableError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl VariableRegistry {
    /// A registry reading the process environment.
    pub fn new() -> Self {
        Self::with_environment(Arc::new(ProcessEnvironment))
    }

    pub fn with_environment(environment: Arc<dyn EnvironmentSource>) -> Self {
        Self {
            explicit: BTreeMap::new(),
            file: BTreeMap::new(),
            defaults: BTreeMap::new(),
            environment,
        }
    }

    /// Set a value that outranks every document.
    pub fn set_explicit(&mut self, name: impl Into<String>, value: impl Into<String>) -> VariableResult<()> {
        let name = name.into();
        validate(&name)?;
        self.explicit.insert(name, value.into());
        Ok(())
    }

    pub fn remove_explicit(&mut self, name: &str) -> Option<String> {
        self.explicit.remove(name)
    }

    /// Set a value declared in a configuration document.
    pub fn set_file_value(&mut self, name: impl Into<String>, value: impl Into<String>) -> VariableResult<()> {
        let name = name.into();
        validate(&name)?;
        self.file.insert(name, value.into());
        Ok(())
    }

    /// Set the value used when nothing else defines `name`.
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Into<String>) -> VariableResult<()> {
        let name = name.into();
        validate(&name)?;
        self.defaults.insert(name, value.into());
        Ok(())
    }

    /// Forget every document-declared value and default, keeping explicit values.
    pub fn clear_file_level(&mut self) {
        self.file.clear();
        self.defaults.clear();
    }

    /// Raw value of `name`: explicit, then file-level.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.explicit
            .get(name)
            .or_else(|| self.file.get(name))
            .map(String::as_str)
    }

    /// Declared default of `name`.
    pub fn default_value(&self, name: &str) -> Option<&str> {
        self.defaults.get(name).map(String::as_str)
    }

    /// Environment fallback for `name`.
    ///
    /// An `env.` prefix is stripped. The remaining name is tried as written,
    /// then with every non-alphanumeric character replaced by `_`, then that
    /// form upper-cased.
    pub fn environment(&self, name: &str) -> Option<String> {
        let key = name.strip_prefix("env.").unwrap_or(name);
        if let Some(value) = self.environment.get(key) {
            return Some(value);
        }
        let normalized: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if normalized != key {
            if let Some(value) = self.environment.get(&normalized) {
                return Some(value);
            }
        }
        let upper = normalized.to_ascii_uppercase();
        if upper != normalized {
            return self.environment.get(&upper);
        }
        None
    }

    /// Every name with an explicit, file-level or default value.
    pub fn names(&self) -> BTreeSet<String> {
        self.explicit
            .keys()
            .chain(self.file.keys())
            .chain(self.defaults.keys())
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.explicit.is_empty() && self.file.is_empty() && self.defaults.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_outranks_file_level() {
        let mut vars = VariableRegistry::with_environment(Arc::new(MapEnvironment::new()));
        vars.set_file_value("port", "80").unwrap();
        assert_eq!(vars.value("port"), Some("80"));
        vars.set_explicit("port", "8080").unwrap();
        assert_eq!(vars.value("port"), Some("8080"));
        vars.remove_explicit("port");
        assert_eq!(vars.value("port"), Some("80"));
    }

    #[test]
    fn defaults_are_separate() {
        let mut vars = VariableRegistry::with_environment(Arc::new(MapEnvironment::new()));
        vars.set_default("port", "9080").unwrap();
        assert_eq!(vars.value("port"), None);
        assert_eq!(vars.default_value("port"), Some("9080"));
        assert!(vars.names().contains("port"));
        vars.clear_file_level();
        assert!(vars.is_empty());
    }

    #[test]
    fn environment_name_variants() {
        let env = MapEnvironment::new()
            .with("plain", "p")
            .with("my_var", "normalized")
            .with("OTHER_VAR", "upper");
        let vars = VariableRegistry::with_environment(Arc::new(env));
        assert_eq!(vars.environment("env.plain").as_deref(), Some("p"));
        assert_eq!(vars.environment("my.var").as_deref(), Some("normalized"));
        assert_eq!(vars.environment("other-var").as_deref(), Some("upper"));
        assert_eq!(vars.environment("missing"), None);
    }

    #[test]
    fn rejects_unreferenceable_names() {
        let mut vars = VariableRegistry::default();
        assert!(matches!(vars.set_explicit("", "x"), Err(VariableError::InvalidName(_))));
        assert!(matches!(vars.set_explicit("a}b", "x"), Err(VariableError::InvalidName(_))));
    }
}
