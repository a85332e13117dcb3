use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Conflict policy attached to every candidate by the include that pulled
/// its document in. Elements of the root document carry [`MergeBehavior::Merge`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeBehavior {
    /// Attributes of the later candidate override; lists concatenate.
    #[default]
    Merge,
    /// Attributes of the later candidate fully replace the earlier ones.
    Replace,
    /// The candidate is dropped when it conflicts with an earlier definition
    /// from another document.
    Ignore,
    /// Default configuration that only applies when a primary definition of
    /// the same identity exists.
    MergeWhenExists,
    /// Default configuration that only applies when no primary definition of
    /// the same identity exists.
    MergeWhenMissing,
}

impl MergeBehavior {
    /// The per-attribute operation used when an attribute carries no explicit one.
    pub fn default_op(self) -> AttributeOp {
        match self {
            MergeBehavior::Replace => AttributeOp::Set,
            _ => AttributeOp::Append,
        }
    }

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            MergeBehavior::Merge => "MERGE",
            MergeBehavior::Replace => "REPLACE",
            MergeBehavior::Ignore => "IGNORE",
            MergeBehavior::MergeWhenExists => "MERGE_WHEN_EXISTS",
            MergeBehavior::MergeWhenMissing => "MERGE_WHEN_MISSING",
        }
    }
}

impl FromStr for MergeBehavior {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "MERGE" => Ok(MergeBehavior::Merge),
            "REPLACE" => Ok(MergeBehavior::Replace),
            "IGNORE" => Ok(MergeBehavior::Ignore),
            "MERGE_WHEN_EXISTS" => Ok(MergeBehavior::MergeWhenExists),
            "MERGE_WHEN_MISSING" => Ok(MergeBehavior::MergeWhenMissing),
            _ => Err(TypeError::UnknownBehavior(s.to_string())),
        }
    }
}

impl fmt::Display for MergeBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-attribute override operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributeOp {
    /// Concatenate when both sides are lists, replace otherwise.
    Append,
    /// Always replace.
    Set,
}

impl FromStr for AttributeOp {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("append") {
            Ok(AttributeOp::Append)
        } else if s.eq_ignore_ascii_case("set") {
            Ok(AttributeOp::Set)
        } else {
            Err(TypeError::UnknownOperation(s.to_string()))
        }
    }
}

/// Global policy for tolerable errors during a refresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnError {
    /// Skip the offending contribution silently.
    Ignore,
    /// Skip the offending contribution and log a warning.
    #[default]
    Warn,
    /// Abort the whole refresh, keeping the previous snapshot.
    Fail,
}

impl OnError {
    /// Returns `true` when tolerable errors abort the refresh.
    pub fn is_fatal(self) -> bool {
        self == OnError::Fail
    }
}

impl FromStr for OnError {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IGNORE" => Ok(OnError::Ignore),
            "WARN" => Ok(OnError::Warn),
            "FAIL" => Ok(OnError::Fail),
            _ => Err(TypeError::UnknownOnError(s.to_string())),
        }
    }
}

impl fmt::Display for OnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OnError::Ignore => "IGNORE",
            OnError::Warn => "WARN",
            OnError::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_defaults_to_set() {
        assert_eq!(MergeBehavior::Replace.default_op(), AttributeOp::Set);
        assert_eq!(MergeBehavior::Merge.default_op(), AttributeOp::Append);
        assert_eq!(MergeBehavior::Ignore.default_op(), AttributeOp::Append);
    }

    #[test]
    fn behavior_parses_any_case() {
        assert_eq!("replace".parse::<MergeBehavior>().unwrap(), MergeBehavior::Replace);
        assert_eq!(
            "merge-when-missing".parse::<MergeBehavior>().unwrap(),
            MergeBehavior::MergeWhenMissing
        );
        assert!("bogus".parse::<MergeBehavior>().is_err());
    }

    #[test]
    fn behavior_serde_uses_upper_snake() {
        let json = serde_json::to_string(&MergeBehavior::MergeWhenExists).unwrap();
        assert_eq!(json, "\"MERGE_WHEN_EXISTS\"");
    }

    #[test]
    fn on_error_parse_and_display() {
        let policy: OnError = "fail".parse().unwrap();
        assert!(policy.is_fatal());
        assert_eq!(policy.to_string(), "FAIL");
        assert_eq!(OnError::default(), OnError::Warn);
    }

    #[test]
    fn attribute_op_parse() {
        assert_eq!("SET".parse::<AttributeOp>().unwrap(), AttributeOp::Set);
        assert_eq!(
            "bad".parse::<AttributeOp>(),
            Err(TypeError::UnknownOperation("bad".into()))
        );
    }
}
