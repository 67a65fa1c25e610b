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

//! MQTT to InfluxDB bridge.
//!
//! Subscribes to the MQTT topics listed in a YAML file, normalizes every
//! received payload into a field set, and writes it as a point tagged with
//! its topic to each InfluxDB target listed in a second YAML file. Both files
//! are reloaded when their modification time changes.
//!
//! # Example
//!
//! ```ignore
//! use mqtt_influx_bridge::{Bridge, BridgeConfig, ConfigStore, HttpSink};
//!
//! let config = BridgeConfig::builder("broker.local")
//!     .port(1883)
//!     .client_id("mqtt2influx-lab")
//!     .build();
//!
//! let store = ConfigStore::open("topics.yml", "influx_config.yml")?;
//! let bridge = Bridge::new(config, store, HttpSink::new(Duration::from_secs(10))?);
//! bridge.run(shutdown).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod mapper;
pub mod point;
pub mod sink;
pub mod store;
pub mod subscription;
pub mod writer;

pub use bridge::Bridge;
pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use mapper::{normalize, FieldValue, NormalizedFields, Payload};
pub use point::{DataPoint, MEASUREMENT};
pub use sink::{HttpSink, PointSink, WriteError};
pub use store::{ConfigError, ConfigStore, DatabaseTarget, TopicSubscription};
pub use subscription::{SubscribeError, SubscriptionManager, Subscriber};
pub use writer::{FailurePolicy, MultiWriter, TargetOutcome, WriteReport};
