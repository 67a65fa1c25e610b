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

//! Broker and runtime settings for the bridge.
//!
//! Topic subscriptions and database targets are not part of this config; they
//! live in the hot-reloaded files owned by [`ConfigStore`](crate::ConfigStore).

use std::time::Duration;

use crate::writer::FailurePolicy;

/// Largest remaining length an MQTT packet can encode.
pub const MQTT_MAX_PACKET_SIZE: usize = 268_435_455;

/// Configuration for the MQTT side of the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// MQTT broker hostname or IP.
    pub broker_host: String,
    /// MQTT broker port (default: 1883).
    pub port: u16,
    /// MQTT client ID. Defaults to `"mqtt2influx-{uuid}"`.
    pub client_id: String,
    /// Optional MQTT username for authentication.
    pub username: Option<String>,
    /// Optional MQTT password for authentication.
    pub password: Option<String>,
    /// MQTT keep-alive interval (default: 60s).
    pub keep_alive: Duration,
    /// Capacity of the client's request queue (default: 100).
    pub request_capacity: usize,
    /// Largest MQTT packet accepted or sent, in bytes (default: the
    /// protocol maximum, 256 MiB).
    pub max_packet_size: usize,
    /// What to do with the remaining targets when one write fails.
    pub failure_policy: FailurePolicy,
}

impl BridgeConfig {
    /// Start building a new config for the given broker.
    pub fn builder(broker_host: impl Into<String>) -> BridgeConfigBuilder {
        BridgeConfigBuilder {
            broker_host: broker_host.into(),
            port: 1883,
            client_id: format!("mqtt2influx-{}", uuid::Uuid::new_v4()),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(60),
            request_capacity: 100,
            max_packet_size: MQTT_MAX_PACKET_SIZE,
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Builder for [`BridgeConfig`].
pub struct BridgeConfigBuilder {
    broker_host: String,
    port: u16,
    client_id: String,
    username: Option<String>,
    password: Option<String>,
    keep_alive: Duration,
    request_capacity: usize,
    max_packet_size: usize,
    failure_policy: FailurePolicy,
}

impl BridgeConfigBuilder {
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn request_capacity(mut self, capacity: usize) -> Self {
        self.request_capacity = capacity.max(1);
        self
    }

    pub fn max_packet_size(mut self, bytes: usize) -> Self {
        self.max_packet_size = bytes.clamp(1, MQTT_MAX_PACKET_SIZE);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Build the config.
    pub fn build(self) -> BridgeConfig {
        BridgeConfig {
            broker_host: self.broker_host,
            port: self.port,
            client_id: self.client_id,
            username: self.username,
            password: self.password,
            keep_alive: self.keep_alive,
            request_capacity: self.request_capacity,
            max_packet_size: self.max_packet_size,
            failure_policy: self.failure_policy,
        }
    }
}
