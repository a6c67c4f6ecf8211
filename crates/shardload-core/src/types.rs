//! Domain types shared by the loader, the orchestrator and the store backends.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// A scalar value of a flat source record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Converts one JSON value. Arrays and objects are not scalar and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// One source document: an open mapping from field name to scalar value.
///
/// Only the fields named by a [`ValidationSchema`] are checked; anything else
/// is carried through to the store untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, field: &str) -> Option<&FieldValue> { self.fields.get(field) }

    pub fn insert(&mut self, field: impl Into<String>, value: FieldValue) -> Option<FieldValue> {
        self.fields.insert(field.into(), value)
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> { self.fields.remove(field) }

    pub fn len(&self) -> usize { self.fields.len() }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> { self.fields.iter() }

    /// Builds a record from a JSON object, naming the first non-scalar field on failure.
    pub fn from_json_object(
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, String> {
        let mut record = Self::new();
        for (key, value) in object {
            let scalar = FieldValue::from_json(value)
                .ok_or_else(|| format!("field '{}' is not a scalar value", key))?;
            record.insert(key.clone(), scalar);
        }
        Ok(record)
    }
}

impl<K: Into<String>> FromIterator<(K, FieldValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, FieldValue)>>(iter: I) -> Self {
        Self { fields: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}

/// Primitive type tags understood by the store-side validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Double,
    Long,
    Number,
    Bool,
    Null,
}

impl FieldType {
    pub fn bson_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Double => "double",
            Self::Long => "long",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Null => "null",
        }
    }

    pub fn matches(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (Self::String, FieldValue::Text(_))
                | (Self::Double, FieldValue::Float(_))
                | (Self::Long, FieldValue::Int(_))
                | (Self::Number, FieldValue::Int(_) | FieldValue::Float(_))
                | (Self::Bool, FieldValue::Bool(_))
                | (Self::Null, FieldValue::Null)
        )
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.bson_type()) }
}

/// Validator attached to a collection. Deliberately permissive: fields not
/// listed in `field_types` are never constrained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationSchema {
    pub required_fields: BTreeSet<String>,
    pub field_types: BTreeMap<String, FieldType>,
}

impl ValidationSchema {
    /// Every field is both required and typed.
    pub fn required<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, FieldType)>,
        S: Into<String>,
    {
        let field_types: BTreeMap<String, FieldType> =
            fields.into_iter().map(|(name, ty)| (name.into(), ty)).collect();
        let required_fields = field_types.keys().cloned().collect();
        Self { required_fields, field_types }
    }

    /// Returns the first violation, the same way a strict store validator
    /// would refuse the document.
    pub fn check(&self, record: &Record) -> Result<(), String> {
        for field in &self.required_fields {
            if record.get(field).is_none() {
                return Err(format!("missing required field '{}'", field));
            }
        }
        for (field, ty) in &self.field_types {
            if let Some(value) = record.get(field) {
                if !ty.matches(value) {
                    return Err(format!("field '{}' must be of type {}", field, ty));
                }
            }
        }
        Ok(())
    }
}

/// How writes that fail validation are treated by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnforcementLevel {
    /// Any non-conforming insert or update is rejected.
    #[default]
    Strict,
    /// Existing non-conforming documents may still be updated.
    Moderate,
}

impl EnforcementLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Moderate => "moderate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyingStrategy {
    #[default]
    Hashed,
    Ranged,
}

/// Catalog entry for one logical dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSpec {
    pub name: String,
    pub source_path: PathBuf,
    pub index_fields: Vec<String>,
    pub shard_key_field: String,
}

/// Result of an idempotent provisioning step that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Applied(String),
    AlreadySatisfied(String),
}

impl StepOutcome {
    pub fn note(&self) -> &str {
        match self {
            Self::Applied(note) | Self::AlreadySatisfied(note) => note,
        }
    }

    pub fn is_noop(&self) -> bool { matches!(self, Self::AlreadySatisfied(_)) }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCredential {
    pub user: String,
    pub password: String,
    pub role: String,
    pub auth_database: String,
}

impl fmt::Debug for AdminCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("auth_database", &self.auth_database)
            .finish()
    }
}
