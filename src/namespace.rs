//! Dotted key handling
//!
//! Keys are dot-separated identifiers (`f1.micro`). They are parsed once
//! into a [`Key`] `(namespace, name)` pair; nested observation batches are
//! flattened into one entry per dotted path before logging.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::value::LogValue;
use crate::{Error, Result};

/// Separator between key segments.
pub const SEPARATOR: &str = ".";

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z_0-9]*(\.[A-Za-z_][A-Za-z_0-9]*)*$")
        .unwrap_or_else(|e| unreachable!("static key pattern: {e}"))
});

/// Check a dotted key.
///
/// # Errors
///
/// Returns [`Error::Validation`] when `key` does not match
/// `^[A-Za-z_][A-Za-z_0-9]*(\.[A-Za-z_][A-Za-z_0-9]*)*$`.
pub fn validate_key(key: &str) -> Result<()> {
    if KEY_PATTERN.is_match(key) {
        Ok(())
    } else {
        Err(Error::validation(format!("invalid key '{key}'")))
    }
}

/// A validated key split into its namespace and final segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    namespace: String,
    name: String,
}

impl Key {
    /// Parse a dotted key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for malformed keys.
    pub fn parse(key: &str) -> Result<Self> {
        validate_key(key)?;
        let (namespace, name) = key
            .rsplit_once(SEPARATOR)
            .map_or(("", key), |(ns, name)| (ns, name));
        Ok(Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    /// Build from parts, validating the joined result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the joined key is malformed.
    pub fn new(namespace: &str, name: &str) -> Result<Self> {
        Self::parse(&join([namespace, name], SEPARATOR))
    }

    /// Namespace (everything before the last separator), possibly empty.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Final segment.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full dotted form.
    #[must_use]
    pub fn as_dotted(&self) -> String {
        join([self.namespace.as_str(), self.name.as_str()], SEPARATOR)
    }

    /// Key nested one level deeper.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `name` is not a valid segment.
    pub fn child(&self, name: &str) -> Result<Self> {
        Self::new(&self.as_dotted(), name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}{SEPARATOR}{}", self.namespace, self.name)
        }
    }
}

/// Join non-empty segments with `separator`.
pub fn join<'a, I>(parts: I, separator: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

/// Flatten nested objects into dotted paths.
///
/// Non-object values are terminal. Empty nested objects produce no entry.
///
/// # Errors
///
/// Returns [`Error::Validation`] for an empty map key, or when two entries
/// flatten to the same path (`{"a": {"b": 1}, "a.b": 2}`).
pub fn flatten(
    map: &BTreeMap<String, LogValue>,
    separator: &str,
) -> Result<BTreeMap<String, LogValue>> {
    flatten_with_prefix(map, None, separator)
}

/// [`flatten`], then prepend `prefix` to every key.
///
/// # Errors
///
/// Same as [`flatten`].
pub fn flatten_with_prefix(
    map: &BTreeMap<String, LogValue>,
    prefix: Option<&str>,
    separator: &str,
) -> Result<BTreeMap<String, LogValue>> {
    let mut out = BTreeMap::new();
    flatten_into(prefix.unwrap_or(""), map, separator, &mut out)?;
    Ok(out)
}

fn flatten_into(
    prefix: &str,
    map: &BTreeMap<String, LogValue>,
    separator: &str,
    out: &mut BTreeMap<String, LogValue>,
) -> Result<()> {
    for (key, value) in map {
        if key.is_empty() {
            return Err(Error::validation(format!(
                "empty key segment under '{prefix}'"
            )));
        }
        let path = join([prefix, key.as_str()], separator);
        match value {
            LogValue::Object(inner) => flatten_into(&path, inner, separator, out)?,
            terminal => {
                if out.insert(path.clone(), terminal.clone()).is_some() {
                    return Err(Error::validation(format!(
                        "key '{path}' appears more than once after flattening"
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Rebuild nested objects from dotted paths.
///
/// Inverse of [`flatten`] for inputs whose paths do not collide (no path is
/// a prefix of another). On collision the deeper path wins.
#[must_use]
pub fn unflatten(flat: &BTreeMap<String, LogValue>, separator: &str) -> BTreeMap<String, LogValue> {
    let mut root = BTreeMap::new();
    for (path, value) in flat {
        let segments: Vec<&str> = path.split(separator).collect();
        insert_path(&mut root, &segments, value.clone());
    }
    root
}

fn insert_path(node: &mut BTreeMap<String, LogValue>, segments: &[&str], value: LogValue) {
    match segments {
        [] => {}
        [last] => {
            let slot = node.entry((*last).to_string()).or_insert(LogValue::Null);
            if slot.as_object().is_none() {
                *slot = value;
            }
        }
        [head, rest @ ..] => {
            let slot = node
                .entry((*head).to_string())
                .or_insert_with(|| LogValue::Object(BTreeMap::new()));
            if slot.as_object().is_none() {
                *slot = LogValue::Object(BTreeMap::new());
            }
            if let LogValue::Object(inner) = slot {
                insert_path(inner, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(json: serde_json::Value) -> BTreeMap<String, LogValue> {
        match LogValue::from(json) {
            LogValue::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_validate_key() {
        for good in ["lr", "_x", "f1.micro", "a.b_2.C"] {
            assert!(validate_key(good).is_ok(), "{good}");
        }
        for bad in ["", "1a", "a.", ".a", "a..b", "a-b", "a b", "a.1"] {
            assert!(matches!(validate_key(bad), Err(Error::Validation(_))), "{bad}");
        }
    }

    #[test]
    fn test_key_parse() {
        let key = Key::parse("model.optim.lr").unwrap();
        assert_eq!(key.namespace(), "model.optim");
        assert_eq!(key.name(), "lr");
        assert_eq!(key.to_string(), "model.optim.lr");

        let bare = Key::parse("lr").unwrap();
        assert_eq!(bare.namespace(), "");
        assert_eq!(bare.as_dotted(), "lr");
    }

    #[test]
    fn test_key_child() {
        let key = Key::parse("f1").unwrap().child("micro").unwrap();
        assert_eq!(key.as_dotted(), "f1.micro");
        assert!(Key::parse("f1").unwrap().child("9").is_err());
    }

    #[test]
    fn test_flatten_nested() {
        let flat = flatten(&obj(serde_json::json!({"f1": {"micro": 0.1, "macro": 0.2}, "acc": 0.9})), SEPARATOR).unwrap();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat["f1.micro"], LogValue::from(0.1));
        assert_eq!(flat["f1.macro"], LogValue::from(0.2));
        assert_eq!(flat["acc"], LogValue::from(0.9));
    }

    #[test]
    fn test_flatten_with_prefix() {
        let flat = flatten_with_prefix(&obj(serde_json::json!({"a": {"b": 1}})), Some("train"), SEPARATOR).unwrap();
        assert_eq!(flat.keys().collect::<Vec<_>>(), vec!["train.a.b"]);
    }

    #[test]
    fn test_flatten_keeps_arrays_terminal() {
        let flat = flatten(&obj(serde_json::json!({"layers": [64, 32]})), SEPARATOR).unwrap();
        assert_eq!(flat["layers"], LogValue::from(vec![64_i64, 32]));
    }

    #[test]
    fn test_unflatten_inverse() {
        let nested = obj(serde_json::json!({"f1": {"micro": 0.1, "macro": 0.2}, "acc": 0.9}));
        assert_eq!(unflatten(&flatten(&nested, SEPARATOR).unwrap(), SEPARATOR), nested);
    }

    #[test]
    fn test_flatten_rejects_empty_segment() {
        let err = flatten(&obj(serde_json::json!({"a": {"": 1}})), SEPARATOR).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("empty key segment under 'a'")));
        assert!(flatten(&obj(serde_json::json!({"": 1})), SEPARATOR).is_err());
    }

    #[test]
    fn test_flatten_rejects_colliding_paths() {
        let err = flatten(&obj(serde_json::json!({"a": {"b": 1}, "a.b": 2})), SEPARATOR).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m.contains("'a.b'")));
    }
}
