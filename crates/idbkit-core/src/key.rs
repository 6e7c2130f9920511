//! Record keys and key paths
//!
//! A record's identity is the value found at its store's key path. Only
//! numbers, strings and arrays of keys are valid keys, and they sort the way
//! IndexedDB sorts them: numbers before strings before arrays.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

/// A valid record key.
#[derive(Debug, Clone)]
pub enum Key {
    Number(f64),
    String(String),
    Array(Vec<Key>),
}

impl Key {
    /// Interpret a JSON value as a key. Returns `None` for values that
    /// cannot be keys (null, booleans, objects, non-finite numbers).
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Number(n) => n.as_f64().filter(|f| f.is_finite()).map(Key::number),
            Value::String(s) => Some(Key::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            Value::Null | Value::Bool(_) | Value::Object(_) => None,
        }
    }

    /// Convert back into a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Key::String(s) => Value::String(s.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    fn number(n: f64) -> Key {
        // -0 and 0 are the same key
        Key::Number(if n == 0.0 { 0.0 } else { n })
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::String(_) => 1,
            Key::Array(_) => 2,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{}", n),
            Key::String(s) => write!(f, "{}", s),
            Key::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<&String> for Key {
    fn from(s: &String) -> Self {
        Key::String(s.clone())
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::number(n as f64)
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Key::number(n as f64)
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::number(n as f64)
    }
}

impl From<u64> for Key {
    fn from(n: u64) -> Self {
        Key::number(n as f64)
    }
}

impl From<f64> for Key {
    fn from(n: f64) -> Self {
        Key::number(n)
    }
}

impl From<Vec<Key>> for Key {
    fn from(items: Vec<Key>) -> Self {
        Key::Array(items)
    }
}

/// Dot-separated path to the field holding a record's key, e.g. `"id"` or
/// `"meta.uuid"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    raw: String,
    segments: Vec<String>,
}

impl KeyPath {
    /// Default key path used when a store does not declare one.
    pub const DEFAULT: &'static str = "id";

    /// Parse a dot path. Returns `None` if the path or any segment is empty.
    pub fn parse(path: &str) -> Option<KeyPath> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return None;
        }
        Some(KeyPath {
            raw: path.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The value at this path, if present.
    pub fn lookup<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(record, |current, segment| current.get(segment))
    }

    /// The key at this path, if present and valid.
    pub fn extract(&self, record: &Value) -> Option<Key> {
        self.lookup(record).and_then(Key::from_value)
    }
}

impl Default for KeyPath {
    fn default() -> Self {
        KeyPath {
            raw: Self::DEFAULT.to_string(),
            segments: vec![Self::DEFAULT.to_string()],
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_from_value() {
        assert_eq!(Key::from_value(&json!("a")), Some(Key::from("a")));
        assert_eq!(Key::from_value(&json!(3)), Some(Key::from(3)));
        assert_eq!(
            Key::from_value(&json!([1, "x"])),
            Some(Key::Array(vec![Key::from(1), Key::from("x")]))
        );
        assert_eq!(Key::from_value(&json!(null)), None);
        assert_eq!(Key::from_value(&json!(true)), None);
        assert_eq!(Key::from_value(&json!({"a": 1})), None);
        assert_eq!(Key::from_value(&json!([1, null])), None);
    }

    #[test]
    fn test_key_ordering() {
        let mut keys = vec![
            Key::from(vec![Key::from(1)]),
            Key::from("b"),
            Key::from(10),
            Key::from("a"),
            Key::from(-2.5),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::from(-2.5),
                Key::from(10),
                Key::from("a"),
                Key::from("b"),
                Key::from(vec![Key::from(1)]),
            ]
        );
    }

    #[test]
    fn test_negative_zero_is_zero() {
        assert_eq!(Key::from(-0.0), Key::from(0));
    }

    #[test]
    fn test_key_path_extract() {
        let record = json!({"id": "a", "meta": {"uuid": 7}});
        assert_eq!(
            KeyPath::default().extract(&record),
            Some(Key::from("a"))
        );
        assert_eq!(
            KeyPath::parse("meta.uuid").unwrap().extract(&record),
            Some(Key::from(7))
        );
        assert_eq!(KeyPath::parse("meta.missing").unwrap().extract(&record), None);
    }

    #[test]
    fn test_key_path_parse_rejects_empty_segments() {
        assert!(KeyPath::parse("").is_none());
        assert!(KeyPath::parse("a..b").is_none());
        assert!(KeyPath::parse(".a").is_none());
    }

    #[test]
    fn test_key_round_trips_through_value() {
        let key = Key::Array(vec![Key::from("x"), Key::from(2)]);
        assert_eq!(Key::from_value(&key.to_value()), Some(key));
    }
}
