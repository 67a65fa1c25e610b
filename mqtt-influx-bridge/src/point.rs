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

//! Time-series points and their InfluxDB line-protocol encoding.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::mapper::{FieldValue, NormalizedFields};

/// Measurement every point is written to.
pub const MEASUREMENT: &str = "mqtt2influx";

/// Tag carrying the MQTT topic a point was received on.
pub const TOPIC_TAG: &str = "topic";

/// A single point, built once per received message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub measurement: &'static str,
    pub tags: BTreeMap<String, String>,
    #[serde(rename = "time", serialize_with = "serialize_time")]
    pub timestamp: DateTime<Utc>,
    pub fields: NormalizedFields,
}

fn serialize_time<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_time(ts))
}

/// ISO-8601 UTC with microseconds and a literal `Z`, e.g.
/// `2024-05-01T12:30:00.000250Z`.
pub fn format_time(ts: &DateTime<Utc>) -> String {
    format!("{}Z", ts.format("%Y-%m-%dT%H:%M:%S%.6f"))
}

impl DataPoint {
    /// Assemble a point for `topic` stamped with `now`.
    pub fn build(topic: &str, fields: NormalizedFields, now: DateTime<Utc>) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(TOPIC_TAG.to_string(), topic.to_string());

        Self {
            measurement: MEASUREMENT,
            tags,
            timestamp: now,
            fields,
        }
    }

    pub fn topic(&self) -> &str {
        self.tags.get(TOPIC_TAG).map(String::as_str).unwrap_or_default()
    }

    pub fn time(&self) -> String {
        format_time(&self.timestamp)
    }

    /// Encode as one line-protocol line with a microsecond timestamp
    /// (write with `precision=u`).
    pub fn to_line_protocol(&self) -> String {
        let mut line = String::new();
        line.push_str(&escape_key(self.measurement, false));

        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_key(key, true));
            line.push('=');
            line.push_str(&escape_key(value, true));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key, true));
            line.push('=');
            match value {
                FieldValue::Float(v) => line.push_str(&format_float(*v)),
                FieldValue::Str(s) => {
                    line.push('"');
                    line.push_str(&escape_string_field(s));
                    line.push('"');
                }
            }
        }

        line.push(' ');
        line.push_str(&self.timestamp.timestamp_micros().to_string());
        line
    }
}

/// Measurements escape commas and spaces; tag keys, tag values and field
/// keys also escape `=`.
fn escape_key(value: &str, escape_equals: bool) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            ' ' | ',' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '=' if escape_equals => {
                escaped.push('\\');
                escaped.push(ch);
            }
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn escape_string_field(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn format_float(value: f64) -> String {
    let mut text = value.to_string();
    if !text.contains('.') && !text.contains('e') && !text.contains('E') {
        text.push_str(".0");
    }
    text
}
