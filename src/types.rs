//! Core types for the live-value feed.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a record.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        RecordId(Uuid::new_v4())
    }

    /// Stable 64-bit fold of the identifier, used for shard selection.
    pub(crate) fn fold(&self) -> u64 {
        let v = self.0.as_u128();
        (v as u64) ^ ((v >> 64) as u64)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(RecordId)
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        RecordId(id)
    }
}

/// Microseconds since Unix epoch.
///
/// Serialized as an RFC 3339 string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_micros(self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_datetime() {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_i64(self.0),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Timestamp(dt.with_timezone(&Utc).timestamp_micros()))
            .map_err(serde::de::Error::custom)
    }
}

/// Outcome of looking up a string-typed tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagLookup<'a> {
    /// Tag present and string-typed.
    Found(&'a str),
    /// Tag absent.
    Missing,
    /// Tag present with a non-string value; carries the JSON type name.
    WrongType(&'static str),
}

impl<'a> TagLookup<'a> {
    pub fn found(self) -> Option<&'a str> {
        match self {
            TagLookup::Found(s) => Some(s),
            _ => None,
        }
    }
}

/// Typed tag bag attached to a record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, Value>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Look up `key` expecting a string value.
    pub fn lookup_str(&self, key: &str) -> TagLookup<'_> {
        match self.0.get(key) {
            None => TagLookup::Missing,
            Some(Value::String(s)) => TagLookup::Found(s),
            Some(other) => TagLookup::WrongType(json_type_name(other)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Tags {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Tags(iter.into_iter().collect())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A monitored entity supplied by the record directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,

    #[serde(default)]
    pub tags: Tags,

    /// Display name.
    #[serde(default)]
    pub dis: Option<String>,

    #[serde(default)]
    pub unit: Option<String>,
}

impl Record {
    pub fn new(id: RecordId) -> Self {
        Self {
            id,
            tags: Tags::new(),
            dis: None,
            unit: None,
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key, value);
        self
    }

    pub fn with_dis(mut self, dis: impl Into<String>) -> Self {
        self.dis = Some(dis.into());
        self
    }
}

/// Last observed value for a record.
///
/// Both fields are `None` for a record that has never been written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentValue {
    pub ts: Option<Timestamp>,
    pub value: Option<f64>,
}

impl CurrentValue {
    pub fn observed(ts: Timestamp, value: Option<f64>) -> Self {
        Self {
            ts: Some(ts),
            value,
        }
    }

    /// True for the never-written default.
    pub fn is_empty(&self) -> bool {
        self.ts.is_none() && self.value.is_none()
    }
}

/// Body of a manual current-value write.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentInput {
    #[serde(default)]
    pub value: Option<f64>,
}
