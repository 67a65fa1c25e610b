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

//! (Re)subscription to the configured topics on every broker connect.

use log::{error, info, warn};
use rumqttc::{AsyncClient, ClientError, ConnectReturnCode, QoS, SubscribeFilter};
use thiserror::Error;

use crate::store::ConfigStore;

#[derive(Debug, Error)]
pub enum SubscribeError {
    #[error("invalid QoS level {0}")]
    InvalidQos(u8),
    #[error("MQTT subscribe failed: {0}")]
    Client(#[from] ClientError),
}

/// Issues one subscribe request covering every filter, in order.
pub trait Subscriber {
    fn subscribe_topics(&self, filters: Vec<SubscribeFilter>) -> Result<(), SubscribeError>;
}

impl Subscriber for AsyncClient {
    /// Queues a single SUBSCRIBE without waiting, so the number of topics is
    /// not bounded by the request queue; the event loop sends it on its next
    /// poll.
    fn subscribe_topics(&self, filters: Vec<SubscribeFilter>) -> Result<(), SubscribeError> {
        self.try_subscribe_many(filters)?;
        Ok(())
    }
}

pub fn qos_from_level(level: u8) -> Result<QoS, SubscribeError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(SubscribeError::InvalidQos(other)),
    }
}

/// Reacts to connection acknowledgements by subscribing to every topic in
/// the current topic list. Nothing is diffed: a reconnect resubscribes all.
pub struct SubscriptionManager {
    id: String,
}

impl SubscriptionManager {
    /// `id` prefixes log lines.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Handle a connect result. Returns how many topics were subscribed.
    pub fn on_connect<S: Subscriber + ?Sized>(
        &self,
        code: ConnectReturnCode,
        store: &mut ConfigStore,
        subscriber: &S,
    ) -> usize {
        info!("[{}] MQTT Connected with result code: {code:?}", self.id);

        if code != ConnectReturnCode::Success {
            error!("[{}] MQTT connection refused ({code:?}), not subscribing", self.id);
            return 0;
        }

        let mut filters = Vec::new();
        for topic in store.topics() {
            match qos_from_level(topic.qos) {
                Ok(qos) => filters.push(SubscribeFilter::new(topic.topic.clone(), qos)),
                Err(e) => warn!("[{}] Skipping topic '{}': {e}", self.id, topic.topic),
            }
        }
        if filters.is_empty() {
            warn!("[{}] No topics to subscribe to", self.id);
            return 0;
        }

        let topics: Vec<String> = filters.iter().map(|f| f.path.clone()).collect();
        match subscriber.subscribe_topics(filters) {
            Ok(()) => {
                for topic in &topics {
                    info!("[{}] Subscribe topic: {topic}", self.id);
                }
                topics.len()
            }
            Err(e) => {
                error!("[{}] Failed to subscribe {} topic(s): {e}", self.id, topics.len());
                0
            }
        }
    }
}
