//! Untyped vendor records and the payload shapes they arrive in.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A decoded vendor row: string keys to scalar JSON values, insertion ordered.
pub type Record = serde_json::Map<String, Value>;

/// Request parameters keyed by placeholder name.
pub type Params = BTreeMap<String, String>;

/// A decoded response body: one object or an ordered list of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Single(Record),
    Many(Vec<Record>),
}

impl Payload {
    /// Classify a decoded JSON value. Anything other than an object or an
    /// array of objects is a decode failure.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::Single(map)),
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(PipelineError::Decode(format!(
                        "element {i} is {}, expected an object",
                        json_type(&other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Self::Many),
            other => Err(PipelineError::Decode(format!(
                "expected an object or an array of objects, got {}",
                json_type(&other)
            ))),
        }
    }

    /// Apply `f` to every record, preserving shape and order.
    pub fn map_records(self, mut f: impl FnMut(Record) -> Record) -> Self {
        match self {
            Self::Single(record) => Self::Single(f(record)),
            Self::Many(records) => Self::Many(records.into_iter().map(f).collect()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Single(record) => vec![record],
            Self::Many(records) => records,
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
