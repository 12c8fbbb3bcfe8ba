//! Ordered field storage shared by requests, forms and replies.
//!
//! A [`FieldSet`] keeps one slot per field name in the order the slots were
//! declared. A slot can be *absent* (`None`), which is not the same thing as
//! holding an empty string: absent slots are skipped entirely when a
//! checksum is computed and when a payload is rendered.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

/// A single field value as sent to or received from the gateway.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum FieldValue {
    /// Free text, sent verbatim
    Text(String),
    /// Integer, rendered in decimal
    Integer(i64),
}

impl FieldValue {
    /// Returns the value as text when it is a `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Integer(_) => None,
        }
    }

    /// Returns the value as an integer, parsing text when needed.
    ///
    /// Empty or non-numeric text yields `None`.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            FieldValue::Text(s) => s.trim().parse().ok(),
        }
    }

    /// True for `Text("")`.
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        FieldValue::Text(value.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        // Out-of-range ids are kept as their decimal text so nothing is truncated.
        i64::try_from(value)
            .map(FieldValue::Integer)
            .unwrap_or_else(|_| FieldValue::Text(value.to_string()))
    }
}

/// Flags travel as `"1"` / `"0"`.
impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Text(if value { "1" } else { "0" }.to_string())
    }
}

/// An ordered mapping from field name to an optional value.
///
/// # Examples
///
/// ```
/// use quickpay::fields::{FieldSet, FieldValue};
///
/// let mut fields = FieldSet::declared(["merchant", "ordernumber", "amount"]);
/// fields.set("amount", 100).set("merchant", "12345");
///
/// assert_eq!(fields.get("amount"), Some(&FieldValue::Integer(100)));
/// assert_eq!(fields.get("ordernumber"), None);
/// assert_eq!(fields.to_pairs(), vec![
///     ("merchant".to_string(), "12345".to_string()),
///     ("amount".to_string(), "100".to_string()),
/// ]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    slots: Vec<(String, Option<FieldValue>)>,
}

impl FieldSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set with one absent slot per name, in the given order.
    pub fn declared<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            slots: names.into_iter().map(|name| (name.into(), None)).collect(),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|(key, _)| key == name)
    }

    /// Stores a value, overwriting any previous one.
    ///
    /// An existing slot keeps its position; a new name is appended.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> &mut Self {
        let value = Some(value.into());
        match self.position(name) {
            Some(idx) => self.slots[idx].1 = value,
            None => self.slots.push((name.to_string(), value)),
        }
        self
    }

    /// Stores `Some` values and clears the slot on `None`.
    pub fn set_opt(&mut self, name: &str, value: Option<impl Into<FieldValue>>) -> &mut Self {
        match value {
            Some(value) => self.set(name, value),
            None => self.unset(name),
        }
    }

    /// Marks a field absent again. The slot, if any, keeps its position.
    pub fn unset(&mut self, name: &str) -> &mut Self {
        if let Some(idx) = self.position(name) {
            self.slots[idx].1 = None;
        }
        self
    }

    /// Returns the stored value, or `None` when the field is absent.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.slots
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_ref())
    }

    /// Returns the stored value, or `default` when the field is absent.
    ///
    /// A stored empty string is returned as-is; only absence falls back.
    pub fn get_or<'a>(&'a self, name: &str, default: &'a FieldValue) -> &'a FieldValue {
        self.get(name).unwrap_or(default)
    }

    /// Returns the stored value as a string slice when it is text.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    /// True when the field holds a value, even an empty one.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Number of present fields.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// True when no field holds a value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over present fields in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.slots
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.as_str(), v)))
    }

    /// Present fields rendered to strings, in slot order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

/// Serializes as a map of the present fields, in slot order.
impl Serialize for FieldSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
