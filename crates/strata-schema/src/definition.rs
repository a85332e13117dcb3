use serde::{Deserialize, Serialize};

/// Value type of an attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    #[default]
    String,
    Boolean,
    Byte,
    Char,
    Short,
    Integer,
    Long,
    Float,
    Double,
    /// Duration with unit suffixes, stored in [`AttributeDefinition::duration_unit`].
    Duration,
    Password,
    HashedPassword,
    /// One of `IGNORE`, `WARN`, `FAIL`.
    OnError,
    /// Trimmed string.
    Token,
    /// Reference to another configuration object, resolved to its pid.
    Pid,
    /// File system path, normalized.
    Location,
}

/// Unit a duration attribute is expressed in after conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    #[default]
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl TimeUnit {
    /// Length of one unit in milliseconds.
    pub fn millis(self) -> i64 {
        match self {
            TimeUnit::Milliseconds => 1,
            TimeUnit::Seconds => 1_000,
            TimeUnit::Minutes => 60_000,
            TimeUnit::Hours => 3_600_000,
        }
    }
}

/// Declared bound on the number of values an attribute may carry.
///
/// - `0`: exactly one value, not a collection
/// - `1` / `-1`: at most one value, collection-typed (array / vector)
/// - `n > 1` / `n < -1`: bounded array / vector of `|n|` values
/// - `i32::MAX` / `i32::MIN`: unbounded array / vector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cardinality(i32);

impl Cardinality {
    pub const SINGLE: Cardinality = Cardinality(0);
    pub const UNBOUNDED_ARRAY: Cardinality = Cardinality(i32::MAX);
    pub const UNBOUNDED_VECTOR: Cardinality = Cardinality(i32::MIN);

    pub fn new(value: i32) -> Self {
        Self(value)
    }

    pub fn value(self) -> i32 {
        self.0
    }

    /// Exactly one, non-collection value.
    pub fn is_single(self) -> bool {
        self.0 == 0
    }

    /// At most one value but collection-typed.
    pub fn is_optional_collection(self) -> bool {
        self.0 == 1 || self.0 == -1
    }

    /// Negative cardinalities produce vectors.
    pub fn is_vector(self) -> bool {
        self.0 < 0
    }

    /// Maximum number of values permitted; `0` counts as one.
    pub fn max_values(self) -> usize {
        match self.0 {
            0 => 1,
            i32::MIN => i32::MAX as usize,
            n => n.unsigned_abs() as usize,
        }
    }
}

/// One permitted value of an enumerated attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub value: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Schema definition of one attribute.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDefinition {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub attr_type: AttributeType,
    #[serde(default)]
    pub cardinality: Cardinality,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "final", default)]
    pub is_final: bool,
    /// Values are assembled from nested elements of the referenced type and
    /// its extenders, flattened into `id.N.*` properties.
    #[serde(default)]
    pub flat: bool,
    /// This attribute replaces the inherited attribute of the given id.
    #[serde(default)]
    pub rename: Option<String>,
    /// Variable consulted when the attribute is not configured.
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(rename = "default", default)]
    pub default_values: Option<Vec<String>>,
    /// Type referenced by a `pid` attribute.
    #[serde(default)]
    pub reference_pid: Option<String>,
    /// Service referenced by a `pid` attribute.
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub options: Vec<AttributeOption>,
    #[serde(default)]
    pub min: Option<String>,
    #[serde(default)]
    pub max: Option<String>,
    #[serde(default)]
    pub duration_unit: TimeUnit,
    /// When `false`, `${...}` tokens are kept literally.
    #[serde(default = "default_true")]
    pub resolve_variables: bool,
    /// Copy the evaluated value of another attribute.
    #[serde(default)]
    pub copy_of: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Wildcard default meaning "every known instance".
pub const WILDCARD: &str = "*";

impl AttributeDefinition {
    pub fn new(id: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            id: id.into(),
            description: None,
            attr_type,
            cardinality: Cardinality::SINGLE,
            required: false,
            is_final: false,
            flat: false,
            rename: None,
            variable: None,
            default_values: None,
            reference_pid: None,
            service: None,
            options: Vec::new(),
            min: None,
            max: None,
            duration_unit: TimeUnit::Milliseconds,
            resolve_variables: true,
            copy_of: None,
        }
    }

    pub fn with_default<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_cardinality(mut self, cardinality: i32) -> Self {
        self.cardinality = Cardinality::new(cardinality);
        self
    }

    pub fn with_reference(mut self, pid: impl Into<String>) -> Self {
        self.reference_pid = Some(pid.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>) -> Self {
        self.variable = Some(name.into());
        self
    }

    pub fn with_options<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = values
            .into_iter()
            .map(|v| AttributeOption {
                value: v.into(),
                label: None,
            })
            .collect();
        self
    }

    pub fn with_range(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min = min.map(str::to_string);
        self.max = max.map(str::to_string);
        self
    }

    pub fn with_unit(mut self, unit: TimeUnit) -> Self {
        self.duration_unit = unit;
        self
    }

    pub fn with_rename(mut self, renamed: impl Into<String>) -> Self {
        self.rename = Some(renamed.into());
        self
    }

    pub fn with_copy_of(mut self, source: impl Into<String>) -> Self {
        self.copy_of = Some(source.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn final_value(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn flat(mut self) -> Self {
        self.flat = true;
        self
    }

    pub fn unresolved_variables(mut self) -> Self {
        self.resolve_variables = false;
        self
    }

    fn has_wildcard_default(&self) -> bool {
        matches!(self.default_values.as_deref(), Some([d]) if d == WILDCARD)
    }

    /// A pid attribute whose default `*` means every instance of the referenced type.
    pub fn is_wildcard_reference(&self) -> bool {
        self.attr_type == AttributeType::Pid
            && self.reference_pid.is_some()
            && self.has_wildcard_default()
    }

    /// A pid attribute whose default `*` means every exposer of the referenced service.
    pub fn is_wildcard_service(&self) -> bool {
        self.attr_type == AttributeType::Pid && self.service.is_some() && self.has_wildcard_default()
    }

    /// Returns `true` if the definition carries a usable default.
    pub fn has_default(&self) -> bool {
        self.default_values.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_bounds() {
        assert_eq!(Cardinality::SINGLE.max_values(), 1);
        assert_eq!(Cardinality::new(-5).max_values(), 5);
        assert_eq!(Cardinality::UNBOUNDED_VECTOR.max_values(), i32::MAX as usize);
        assert!(Cardinality::new(-1).is_optional_collection());
        assert!(Cardinality::new(-3).is_vector());
        assert!(!Cardinality::new(3).is_vector());
    }

    #[test]
    fn wildcard_reference_detection() {
        let ad = AttributeDefinition::new("targets", AttributeType::Pid)
            .with_reference("endpoint")
            .with_default(["*"]);
        assert!(ad.is_wildcard_reference());
        assert!(!ad.is_wildcard_service());

        let svc = AttributeDefinition::new("svc", AttributeType::Pid)
            .with_service("com.example.Service")
            .with_default(["*"]);
        assert!(svc.is_wildcard_service());
    }

    #[test]
    fn serde_defaults() {
        let ad: AttributeDefinition =
            serde_json::from_str(r#"{"id":"port","type":"integer","default":["80"]}"#).unwrap();
        assert_eq!(ad.attr_type, AttributeType::Integer);
        assert!(ad.resolve_variables);
        assert!(ad.cardinality.is_single());
        assert_eq!(ad.default_values, Some(vec!["80".to_string()]));
    }

    #[test]
    fn time_unit_millis() {
        assert_eq!(TimeUnit::Minutes.millis(), 60_000);
    }
}
