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

//! The MQTT event loop driving the bridge.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use rumqttc::{AsyncClient, ConnectReturnCode, ConnectionError, Event, Incoming, MqttOptions};

use crate::config::BridgeConfig;
use crate::mapper;
use crate::point::DataPoint;
use crate::sink::PointSink;
use crate::store::ConfigStore;
use crate::subscription::{Subscriber, SubscriptionManager};
use crate::writer::{MultiWriter, WriteReport};

/// Connects to the broker, subscribes on every connect, and writes every
/// received message to the configured databases.
///
/// Events are handled one at a time, to completion, on the task calling
/// [`Bridge::run`]; a slow database write delays the next event.
pub struct Bridge<S> {
    config: BridgeConfig,
    store: ConfigStore,
    writer: MultiWriter<S>,
    subscriptions: SubscriptionManager,
}

impl<S: PointSink> Bridge<S> {
    pub fn new(config: BridgeConfig, store: ConfigStore, sink: S) -> Self {
        let writer = MultiWriter::new(sink, config.failure_policy);
        let subscriptions = SubscriptionManager::new(config.client_id.clone());
        Self {
            config,
            store,
            writer,
            subscriptions,
        }
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut mqtt_opts = MqttOptions::new(
            &self.config.client_id,
            &self.config.broker_host,
            self.config.port,
        );
        mqtt_opts.set_keep_alive(self.config.keep_alive);
        mqtt_opts.set_max_packet_size(self.config.max_packet_size, self.config.max_packet_size);

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            mqtt_opts.set_credentials(user, pass);
        }
        mqtt_opts
    }

    /// Normalize one message received at `now` and write it to every target.
    pub async fn handle_message(
        &mut self,
        topic: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> WriteReport {
        let fields = mapper::normalize(payload);
        let point = DataPoint::build(topic, fields, now);
        debug!(
            "[{}] {}",
            self.config.client_id,
            serde_json::to_string(&point).unwrap_or_default()
        );

        let targets = self.store.targets();
        self.writer.write(&point, targets).await
    }

    /// Subscribe to the current topic list if the broker accepted us.
    pub fn handle_connect<C: Subscriber + ?Sized>(
        &mut self,
        code: ConnectReturnCode,
        subscriber: &C,
    ) -> usize {
        self.subscriptions.on_connect(code, &mut self.store, subscriber)
    }

    /// Run until `shutdown` resolves.
    pub async fn run<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let id = self.config.client_id.clone();
        info!(
            "[{id}] Starting MQTT bridge (broker={}:{}, policy={:?})",
            self.config.broker_host,
            self.config.port,
            self.writer.policy()
        );

        let (client, mut eventloop) =
            AsyncClient::new(self.mqtt_options(), self.config.request_capacity);

        tokio::pin!(shutdown);
        info!("[{id}] MQTT event loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("[{id}] Shutdown signal received");
                    break;
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Incoming::ConnAck(ack))) => {
                            self.handle_connect(ack.code, &client);
                        }
                        Ok(Event::Incoming(Incoming::Publish(publish))) => {
                            let now = Utc::now();
                            self.handle_message(&publish.topic, &publish.payload, now).await;
                        }
                        Ok(_) => {} // Ignore other events (SubAck, PingResp, etc.)
                        Err(ConnectionError::ConnectionRefused(code)) => {
                            self.handle_connect(code, &client);
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        Err(e) => {
                            error!("[{id}] MQTT connection error (will reconnect): {e}");
                            // rumqttc reconnects on the next poll()
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        let _ = client.try_disconnect();
        info!("[{id}] MQTT bridge stopped");
        Ok(())
    }
}
