// Copyright 2025 The Drasi Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Payload mapping utilities for converting raw MQTT payloads to point fields.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Field name used when the payload is not a JSON object.
pub const VALUE_FIELD: &str = "value";

/// A single point field: numeric when the source value parses as a number.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Float(_) => None,
            FieldValue::Str(s) => Some(s),
        }
    }
}

/// Field name to value, ordered by name.
pub type NormalizedFields = BTreeMap<String, FieldValue>;

/// A raw payload after a single parse attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Valid JSON whose top level is an object.
    Object(Map<String, Value>),
    /// Valid JSON of any other shape (number, string, array, bool, null).
    Scalar(Value),
    /// Not JSON at all.
    Opaque(String),
}

impl Payload {
    pub fn classify(raw: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(map)) => Payload::Object(map),
            Ok(other) => Payload::Scalar(other),
            Err(_) => Payload::Opaque(String::from_utf8_lossy(raw).into_owned()),
        }
    }
}

/// Parse standard decimal/float syntax, ignoring surrounding whitespace.
///
/// Non-finite results (`nan`, `inf`) are rejected since InfluxDB cannot
/// store them as float fields.
pub fn try_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert a JSON object member to a field value.
fn value_to_field(value: Value) -> FieldValue {
    match value {
        Value::Number(n) => match n.as_f64().filter(|v| v.is_finite()) {
            Some(v) => FieldValue::Float(v),
            None => FieldValue::Str(n.to_string()),
        },
        Value::String(s) => match try_number(&s) {
            Some(v) => FieldValue::Float(v),
            None => FieldValue::Str(s),
        },
        Value::Bool(b) => FieldValue::Float(if b { 1.0 } else { 0.0 }),
        // Nested values and null keep their JSON text.
        other => FieldValue::Str(other.to_string()),
    }
}

/// Converts a raw MQTT payload into point fields.
///
/// JSON objects contribute one field per key. Anything else becomes a single
/// `value` field, numeric if the whole payload parses as a number.
pub fn normalize(raw: &[u8]) -> NormalizedFields {
    let mut fields = NormalizedFields::new();

    match Payload::classify(raw) {
        Payload::Object(map) => {
            for (key, value) in map {
                fields.insert(key, value_to_field(value));
            }
        }
        Payload::Scalar(Value::Number(n)) => {
            let text = String::from_utf8_lossy(raw);
            let value = match n.as_f64().filter(|v| v.is_finite()) {
                Some(v) => FieldValue::Float(v),
                None => FieldValue::Str(text.trim().to_string()),
            };
            fields.insert(VALUE_FIELD.to_string(), value);
        }
        // Other JSON is not numeric as a whole; keep the raw text.
        Payload::Scalar(_) => {
            let text = String::from_utf8_lossy(raw).into_owned();
            fields.insert(VALUE_FIELD.to_string(), FieldValue::Str(text));
        }
        Payload::Opaque(text) => {
            let value = match try_number(&text) {
                Some(v) => FieldValue::Float(v),
                None => FieldValue::Str(text),
            };
            fields.insert(VALUE_FIELD.to_string(), value);
        }
    }

    fields
}
