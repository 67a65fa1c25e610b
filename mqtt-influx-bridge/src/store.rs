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

//! Hot-reloaded topic and database target lists.
//!
//! Each list is backed by a YAML file and re-read only when the file's
//! modification time differs from the one seen at the last successful load.
//! A reload that fails keeps the previous list and the previous marker, so
//! the next access tries again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{info, warn};
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// An MQTT topic filter to subscribe to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopicSubscription {
    pub topic: String,
    /// Display label.
    pub name: String,
    /// Subscription QoS (0, 1 or 2). Defaults to 0.
    #[serde(default)]
    pub qos: u8,
}

/// An InfluxDB database to write every point to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseTarget {
    pub host: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    /// Display label.
    pub name: String,
}

#[derive(Deserialize)]
struct TopicsFile {
    topics: Vec<TopicSubscription>,
}

#[derive(Deserialize)]
struct TargetsFile {
    influxdb: Vec<DatabaseTarget>,
}

fn parse_topics(text: &str) -> Result<Vec<TopicSubscription>, serde_yaml::Error> {
    serde_yaml::from_str::<TopicsFile>(text).map(|file| file.topics)
}

fn parse_targets(text: &str) -> Result<Vec<DatabaseTarget>, serde_yaml::Error> {
    serde_yaml::from_str::<TargetsFile>(text).map(|file| file.influxdb)
}

/// Ports are written both as `8086` and `"8086"`.
fn deserialize_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {text:?}"))),
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

type Parser<T> = fn(&str) -> Result<Vec<T>, serde_yaml::Error>;

/// One YAML-backed list and its staleness marker.
struct WatchedFile<T> {
    label: &'static str,
    path: PathBuf,
    parse: Parser<T>,
    items: Vec<T>,
    /// Modification time at the last successful load.
    last_modified: Option<SystemTime>,
}

impl<T> WatchedFile<T> {
    /// Load the file for the first time. Any failure is fatal.
    fn open(label: &'static str, path: &Path, parse: Parser<T>) -> Result<Self, ConfigError> {
        let mut file = Self {
            label,
            path: path.to_path_buf(),
            parse,
            items: Vec::new(),
            last_modified: None,
        };
        let modified = file.modified()?;
        file.reload(modified)?;
        Ok(file)
    }

    fn modified(&self) -> Result<SystemTime, ConfigError> {
        let metadata = fs::metadata(&self.path).map_err(|e| self.io_error(e))?;
        metadata.modified().map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: io::Error) -> ConfigError {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::Missing(self.path.clone())
        } else {
            ConfigError::Io {
                path: self.path.clone(),
                source,
            }
        }
    }

    fn reload(&mut self, modified: SystemTime) -> Result<(), ConfigError> {
        info!("Reloading {} as file changed ({})", self.label, self.path.display());
        let text = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        let items = (self.parse)(&text).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;
        self.items = items;
        self.last_modified = Some(modified);
        Ok(())
    }

    /// Return the cached list, reloading it first if the file changed.
    fn current(&mut self) -> &[T] {
        match self.modified() {
            Ok(modified) if Some(modified) == self.last_modified => {}
            Ok(modified) => {
                if let Err(e) = self.reload(modified) {
                    warn!("Failed to re-load {}, going on with the old one: {e}", self.label);
                }
            }
            Err(e) => {
                warn!("Failed to check {}, going on with the old one: {e}", self.label);
            }
        }
        &self.items
    }
}

/// Owns the topic and database target lists.
pub struct ConfigStore {
    topics: WatchedFile<TopicSubscription>,
    targets: WatchedFile<DatabaseTarget>,
}

impl ConfigStore {
    /// Load both files. Fails if either is missing or malformed.
    pub fn open(
        topics_path: impl AsRef<Path>,
        targets_path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let targets = WatchedFile::open("InfluxDB map", targets_path.as_ref(), parse_targets)?;
        info!("InfluxDB:");
        for target in &targets.items {
            info!("\t {} <--> {}", target.host, target.name);
        }

        let topics = WatchedFile::open("topics", topics_path.as_ref(), parse_topics)?;
        info!("Topics:");
        for topic in &topics.items {
            info!("\t {} <--> {}", topic.topic, topic.name);
        }

        Ok(Self { topics, targets })
    }

    /// Topics to subscribe to.
    pub fn topics(&mut self) -> &[TopicSubscription] {
        self.topics.current()
    }

    /// Databases to write to.
    pub fn targets(&mut self) -> &[DatabaseTarget] {
        self.targets.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    const TOPICS: &str = "topics:\n  - topic: sensors/temp\n    name: Temperature\n  - topic: sensors/hum\n    name: Humidity\n    qos: 1\n";
    const TARGETS: &str = "influxdb:\n  - host: localhost\n    port: 8086\n    user: root\n    password: root\n    dbname: mqtt\n    name: local\n";

    /// Write `content` and pin the mtime so changes never depend on
    /// filesystem timestamp resolution.
    fn write_at(path: &Path, content: &str, secs: u64) {
        fs::write(path, content).unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let topics = dir.path().join("topics.yml");
        let targets = dir.path().join("influx_config.yml");
        write_at(&topics, TOPICS, 100);
        write_at(&targets, TARGETS, 100);
        (dir, topics, targets)
    }

    #[test]
    fn test_open_loads_both_files() {
        let (_dir, topics, targets) = setup();
        let mut store = ConfigStore::open(&topics, &targets).unwrap();

        let loaded = store.topics().to_vec();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].topic, "sensors/temp");
        assert_eq!(loaded[0].qos, 0);
        assert_eq!(loaded[1].qos, 1);

        let targets = store.targets().to_vec();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].port, 8086);
        assert_eq!(targets[0].dbname, "mqtt");
    }

    #[test]
    fn test_missing_file_is_fatal() {
        let (dir, topics, _) = setup();
        let err = ConfigStore::open(&topics, dir.path().join("nope.yml")).err().unwrap();
        assert!(matches!(err, ConfigError::Missing(_)));
    }

    #[test]
    fn test_malformed_file_is_fatal_at_startup() {
        let (_dir, topics, targets) = setup();
        write_at(&topics, "topics: [unterminated", 100);
        let err = ConfigStore::open(&topics, &targets).err().unwrap();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_port_as_string() {
        let (_dir, topics, targets) = setup();
        write_at(&targets, &TARGETS.replace("8086", "\"8087\""), 100);
        let mut store = ConfigStore::open(&topics, &targets).unwrap();
        assert_eq!(store.targets()[0].port, 8087);
    }

    #[test]
    fn test_unchanged_mtime_skips_reload() {
        let (_dir, topics, targets) = setup();
        let mut store = ConfigStore::open(&topics, &targets).unwrap();

        // Same mtime, different content: the cache wins.
        write_at(&topics, "topics:\n  - topic: other\n    name: Other\n", 100);
        assert_eq!(store.topics().len(), 2);
        assert_eq!(store.topics()[0].topic, "sensors/temp");
    }

    #[test]
    fn test_changed_file_is_reloaded() {
        let (_dir, topics, targets) = setup();
        let mut store = ConfigStore::open(&topics, &targets).unwrap();

        write_at(&topics, "topics:\n  - topic: other\n    name: Other\n", 200);
        let loaded = store.topics();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].topic, "other");
        assert_eq!(
            store.topics.last_modified,
            Some(UNIX_EPOCH + Duration::from_secs(200))
        );
    }

    #[test]
    fn test_invalid_reload_keeps_old_list_and_retries() {
        let (_dir, topics, targets) = setup();
        let mut store = ConfigStore::open(&topics, &targets).unwrap();

        write_at(&targets, "influxdb: {{ broken", 200);
        assert_eq!(store.targets().len(), 1);
        assert_eq!(store.targets()[0].name, "local");
        assert_eq!(
            store.targets.last_modified,
            Some(UNIX_EPOCH + Duration::from_secs(100))
        );

        // Fixed with the same mtime as the broken edit: picked up because the
        // marker was never advanced.
        let fixed = TARGETS.replace("name: local", "name: fixed");
        write_at(&targets, &fixed, 200);
        assert_eq!(store.targets()[0].name, "fixed");
        assert_eq!(
            store.targets.last_modified,
            Some(UNIX_EPOCH + Duration::from_secs(200))
        );
    }

    #[test]
    fn test_missing_key_on_reload_keeps_old_list() {
        let (_dir, topics, targets) = setup();
        let mut store = ConfigStore::open(&topics, &targets).unwrap();

        write_at(&topics, "subscriptions: []\n", 200);
        assert_eq!(store.topics().len(), 2);
    }

    #[test]
    fn test_vanished_file_keeps_old_list() {
        let (_dir, topics, targets) = setup();
        let mut store = ConfigStore::open(&topics, &targets).unwrap();

        fs::remove_file(&topics).unwrap();
        assert_eq!(store.topics().len(), 2);
    }
}
