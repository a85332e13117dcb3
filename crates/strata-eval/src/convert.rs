//! Conversion of resolved attribute text into typed property values.
//!
//! Every function here is pure. Failures carry a human readable reason; the
//! evaluator decides whether a failure falls back to the unconfigured value
//! or fails the attribute.

use strata_schema::{AttributeDefinition, AttributeType, TimeUnit};
use strata_types::{OnError, PropertyValue, ProtectedString};

/// Split `text` on commas that are not escaped with a backslash.
///
/// `\,` yields a literal comma. Items are trimmed; empty items are dropped.
pub fn parse_value(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                chars.next();
                current.push(',');
            }
            ',' => items.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    items.push(current);
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Forward slashes only, no repeated separators. URLs are left alone and a
/// leading `//` survives.
pub fn normalize_location(text: &str) -> String {
    if text.contains("://") {
        return text.to_string();
    }
    let replaced = text.replace('\\', "/");
    let (mut out, rest) = match replaced.strip_prefix("//") {
        Some(rest) => (String::from("//"), rest),
        None => (String::new(), replaced.as_str()),
    };
    let mut previous_slash = !out.is_empty();
    for c in rest.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        out.push(c);
    }
    out
}

/// Parse a duration into `unit`.
///
/// A bare integer is already in `unit`. Otherwise the text is a sequence of
/// `<digits><suffix>` parts with suffixes `d`, `h`, `m`, `s` and `ms`, for
/// example `1h30m`. Fractions of the target unit are truncated.
pub fn parse_duration(text: &str, unit: TimeUnit) -> Result<i64, String> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if let Ok(amount) = compact.parse::<i64>() {
        return Ok(amount);
    }
    if compact.is_empty() {
        return Err("empty duration".to_string());
    }

    let invalid = || format!("invalid duration {:?}", text);
    let mut total: i64 = 0;
    let mut rest = compact.as_str();
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let amount: i64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];
        let suffix = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let factor: i64 = match &rest[..suffix] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            _ => return Err(invalid()),
        };
        rest = &rest[suffix..];
        total = amount
            .checked_mul(factor)
            .and_then(|millis| total.checked_add(millis))
            .ok_or_else(invalid)?;
    }
    Ok(total / unit.millis())
}

/// `true` or `false` in any case, nothing else.
pub fn parse_boolean(text: &str) -> Result<bool, String> {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Ok(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Ok(false)
    } else {
        Err(format!("{:?} is not a boolean", text))
    }
}

/// The canonical option value matching `text` by value or label, ignoring case.
fn canonical_option(def: &AttributeDefinition, text: &str) -> Result<String, String> {
    if def.options.is_empty() {
        return Ok(text.to_string());
    }
    let trimmed = text.trim();
    def.options
        .iter()
        .find(|o| {
            o.value.eq_ignore_ascii_case(trimmed)
                || o.label.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(trimmed))
        })
        .map(|o| o.value.clone())
        .ok_or_else(|| {
            let allowed: Vec<&str> = def.options.iter().map(|o| o.value.as_str()).collect();
            format!("{:?} is not one of [{}]", text, allowed.join(", "))
        })
}

fn parse_number<T: std::str::FromStr>(text: &str, kind: &str) -> Result<T, String> {
    text.trim()
        .parse()
        .map_err(|_| format!("{:?} is not a valid {}", text, kind))
}

/// Numeric measure checked against `min`/`max`: the value itself for
/// numbers, the length for strings.
fn measure(value: &PropertyValue) -> Option<f64> {
    match value {
        PropertyValue::String(s) => Some(s.chars().count() as f64),
        PropertyValue::Password(p) => Some(p.expose().chars().count() as f64),
        PropertyValue::Float(v) => Some(f64::from(*v)),
        PropertyValue::Double(v) => Some(*v),
        other => other.as_i64().map(|v| v as f64),
    }
}

fn check_range(def: &AttributeDefinition, value: &PropertyValue) -> Result<(), String> {
    let Some(actual) = measure(value) else {
        return Ok(());
    };
    let bound = |text: &str| -> Result<f64, String> {
        text.trim()
            .parse::<f64>()
            .map_err(|_| format!("unusable bound {:?}", text))
    };
    if let Some(min) = &def.min {
        if actual < bound(min)? {
            return Err(format!("{} is below the minimum {}", value, min));
        }
    }
    if let Some(max) = &def.max {
        if actual > bound(max)? {
            return Err(format!("{} is above the maximum {}", value, max));
        }
    }
    Ok(())
}

/// Convert one resolved string according to `def`.
///
/// `pid` attributes are not handled here; they need the store.
pub fn convert_value(def: &AttributeDefinition, text: &str) -> Result<PropertyValue, String> {
    let text = match def.attr_type {
        AttributeType::Location => normalize_location(text),
        _ => text.to_string(),
    };
    let text = canonical_option(def, &text)?;
    let value = match def.attr_type {
        AttributeType::String | AttributeType::Location | AttributeType::Pid => PropertyValue::String(text),
        AttributeType::Token => PropertyValue::String(text.trim().to_string()),
        AttributeType::Boolean => PropertyValue::Boolean(parse_boolean(&text)?),
        AttributeType::Byte => PropertyValue::Byte(parse_number(&text, "byte")?),
        AttributeType::Short => PropertyValue::Short(parse_number(&text, "short")?),
        AttributeType::Integer => PropertyValue::Integer(parse_number(&text, "integer")?),
        AttributeType::Long => PropertyValue::Long(parse_number(&text, "long")?),
        AttributeType::Float => PropertyValue::Float(parse_number(&text, "float")?),
        AttributeType::Double => PropertyValue::Double(parse_number(&text, "double")?),
        AttributeType::Char => {
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => PropertyValue::Char(c),
                _ => return Err(format!("{:?} is not a single character", text)),
            }
        }
        AttributeType::Duration => PropertyValue::Duration(parse_duration(&text, def.duration_unit)?),
        AttributeType::Password | AttributeType::HashedPassword => {
            PropertyValue::Password(ProtectedString::new(text))
        }
        AttributeType::OnError => PropertyValue::OnError(text.parse::<OnError>().map_err(|e| e.to_string())?),
    };
    check_range(def, &value)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_value_honors_escapes() {
        assert_eq!(parse_value("a, b ,,c"), vec!["a", "b", "c"]);
        assert_eq!(parse_value(r"x\,y,z"), vec!["x,y", "z"]);
        assert!(parse_value("  ").is_empty());
    }

    #[test]
    fn locations_are_normalized() {
        assert_eq!(normalize_location(r"C:\logs\\app"), "C:/logs/app");
        assert_eq!(normalize_location("/var//log///x"), "/var/log/x");
        assert_eq!(normalize_location("//server//share"), "//server/share");
        assert_eq!(normalize_location("http://host//path"), "http://host//path");
    }

    #[test]
    fn durations_with_units() {
        assert_eq!(parse_duration("1h30m", TimeUnit::Minutes), Ok(90));
        assert_eq!(parse_duration("2s 500ms", TimeUnit::Milliseconds), Ok(2500));
        assert_eq!(parse_duration("1d", TimeUnit::Hours), Ok(24));
        assert_eq!(parse_duration("45", TimeUnit::Seconds), Ok(45));
        assert_eq!(parse_duration("90s", TimeUnit::Minutes), Ok(1));
        assert!(parse_duration("5 weeks", TimeUnit::Seconds).is_err());
        assert!(parse_duration("m", TimeUnit::Seconds).is_err());
    }

    #[test]
    fn booleans_are_strict() {
        let def = AttributeDefinition::new("enabled", AttributeType::Boolean);
        assert_eq!(convert_value(&def, "TRUE"), Ok(PropertyValue::Boolean(true)));
        assert_eq!(convert_value(&def, "false"), Ok(PropertyValue::Boolean(false)));
        assert!(convert_value(&def, "yes").is_err());
    }

    #[test]
    fn options_are_canonicalized() {
        let def = AttributeDefinition::new("level", AttributeType::String).with_options(["INFO", "DEBUG"]);
        assert_eq!(convert_value(&def, "debug"), Ok(PropertyValue::String("DEBUG".into())));
        let err = convert_value(&def, "verbose").unwrap_err();
        assert!(err.contains("INFO, DEBUG"), "{}", err);
    }

    #[test]
    fn ranges_apply_to_numbers_and_lengths() {
        let port = AttributeDefinition::new("port", AttributeType::Integer).with_range(Some("-1"), Some("65535"));
        assert_eq!(convert_value(&port, " 8080 "), Ok(PropertyValue::Integer(8080)));
        assert!(convert_value(&port, "70000").is_err());

        let name = AttributeDefinition::new("name", AttributeType::String).with_range(Some("2"), None);
        assert!(convert_value(&name, "a").is_err());
        assert!(convert_value(&name, "ab").is_ok());
    }

    #[test]
    fn typed_conversions() {
        let cases = [
            (AttributeType::Byte, "-5", PropertyValue::Byte(-5)),
            (AttributeType::Short, "300", PropertyValue::Short(300)),
            (AttributeType::Long, "9000000000", PropertyValue::Long(9_000_000_000)),
            (AttributeType::Double, "1.5", PropertyValue::Double(1.5)),
            (AttributeType::Char, "x", PropertyValue::Char('x')),
            (AttributeType::Token, "  tok  ", PropertyValue::String("tok".into())),
            (AttributeType::OnError, "fail", PropertyValue::OnError(OnError::Fail)),
        ];
        for (attr_type, text, expected) in cases {
            let def = AttributeDefinition::new("a", attr_type);
            assert_eq!(convert_value(&def, text), Ok(expected), "{:?}", attr_type);
        }
        let byte = AttributeDefinition::new("b", AttributeType::Byte);
        assert!(convert_value(&byte, "300").is_err());
    }

    #[test]
    fn passwords_are_protected() {
        let def = AttributeDefinition::new("password", AttributeType::Password);
        match convert_value(&def, "secret") {
            Ok(PropertyValue::Password(p)) => {
                assert_eq!(p.expose(), "secret");
                assert!(!format!("{:?}", p).contains("secret"));
            }
            other => panic!("expected Password, got {:?}", other),
        }
    }
}
