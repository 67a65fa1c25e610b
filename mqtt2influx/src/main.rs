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

use std::fs::File;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use mqtt_influx_bridge::config::MQTT_MAX_PACKET_SIZE;
use mqtt_influx_bridge::{Bridge, BridgeConfig, ConfigStore, FailurePolicy, HttpSink};

/// Store MQTT messages in InfluxDB databases.
#[derive(Debug, Parser)]
#[command(name = "mqtt2influx", version)]
struct Args {
    /// MQTT host.
    #[arg(long, default_value = "localhost")]
    mqtt_host: String,

    /// MQTT port.
    #[arg(long, default_value_t = 1883)]
    mqtt_port: u16,

    /// Startup delay in seconds, giving the databases time to come up.
    #[arg(long, default_value_t = 60)]
    delay: u64,

    /// YAML file containing the topics to subscribe to.
    #[arg(long, default_value = "topics.yml")]
    topics: PathBuf,

    /// YAML file containing the InfluxDB targets (host, port, user, ...).
    #[arg(long, default_value = "influx_config.yml")]
    influxdb: PathBuf,

    /// Log level: DEBUG, INFO, WARNING, ERROR or CRITICAL.
    #[arg(long, default_value = "ERROR")]
    log: String,

    /// Log file. Logs go to the console if empty.
    #[arg(long, default_value = "")]
    logfile: String,

    /// MQTT client ID. Defaults to `mqtt2influx-<uuid>`.
    #[arg(long)]
    client_id: Option<String>,

    /// MQTT username.
    #[arg(long)]
    mqtt_username: Option<String>,

    /// MQTT password.
    #[arg(long)]
    mqtt_password: Option<String>,

    /// MQTT keep-alive in seconds.
    #[arg(long, default_value_t = 60)]
    keep_alive: u64,

    /// Largest MQTT packet accepted, in bytes.
    #[arg(long, default_value_t = MQTT_MAX_PACKET_SIZE)]
    max_packet_size: usize,

    /// Timeout for each database write, in seconds.
    #[arg(long, default_value_t = 10)]
    write_timeout: u64,

    /// Stop writing a message to the remaining databases after the first
    /// failed write.
    #[arg(long)]
    fail_fast: bool,
}

fn parse_level(level: &str) -> Result<LevelFilter> {
    let filter = match level.trim().to_ascii_uppercase().as_str() {
        "TRACE" => LevelFilter::Trace,
        "DEBUG" => LevelFilter::Debug,
        "INFO" => LevelFilter::Info,
        "WARNING" | "WARN" => LevelFilter::Warn,
        "ERROR" | "CRITICAL" => LevelFilter::Error,
        "OFF" => LevelFilter::Off,
        other => bail!("unknown log level: {other}"),
    };
    Ok(filter)
}

/// Only the bridge's own crates log at `level`; dependencies stay quiet.
fn init_logging(level: &str, logfile: &str) -> Result<()> {
    let level = parse_level(level)?;
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Off)
        .filter_module("mqtt_influx_bridge", level)
        .filter_module("mqtt2influx", level);

    if !logfile.is_empty() {
        let file = File::create(logfile)
            .with_context(|| format!("failed to create log file {logfile}"))?;
        builder
            .target(env_logger::Target::Pipe(Box::new(file)))
            .format(|buf, record| {
                writeln!(buf, "{} - {} - {}", buf.timestamp(), record.level(), record.args())
            });
    }

    builder.try_init()?;
    Ok(())
}

fn bridge_config(args: &Args) -> BridgeConfig {
    let mut builder = BridgeConfig::builder(&args.mqtt_host)
        .port(args.mqtt_port)
        .keep_alive(Duration::from_secs(args.keep_alive))
        .max_packet_size(args.max_packet_size);

    if let Some(client_id) = &args.client_id {
        builder = builder.client_id(client_id);
    }
    if let Some(username) = &args.mqtt_username {
        builder = builder.username(username);
    }
    if let Some(password) = &args.mqtt_password {
        builder = builder.password(password);
    }
    if args.fail_fast {
        builder = builder.failure_policy(FailurePolicy::FailFast);
    }
    builder.build()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log, &args.logfile)?;

    info!("Sleep {} seconds for booting", args.delay);
    tokio::time::sleep(Duration::from_secs(args.delay)).await;
    info!("Started app");

    let store = ConfigStore::open(&args.topics, &args.influxdb)?;
    let sink = HttpSink::new(Duration::from_secs(args.write_timeout))?;
    let bridge = Bridge::new(bridge_config(&args), store, sink);

    bridge
        .run(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    shutdown_on(tokio::signal::ctrl_c()).await
}

/// Resolves when `signal` fires. If the handler cannot be installed the
/// bridge keeps running rather than stopping straight away.
async fn shutdown_on<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("Failed to listen for Ctrl-C, running until killed: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["mqtt2influx"]);

        assert_eq!(args.mqtt_host, "localhost");
        assert_eq!(args.mqtt_port, 1883);
        assert_eq!(args.delay, 60);
        assert_eq!(args.topics, PathBuf::from("topics.yml"));
        assert_eq!(args.influxdb, PathBuf::from("influx_config.yml"));
        assert!(args.logfile.is_empty());

        let config = bridge_config(&args);
        assert_eq!(config.failure_policy, FailurePolicy::Isolate);
        assert_eq!(config.max_packet_size, MQTT_MAX_PACKET_SIZE);
        assert!(config.client_id.starts_with("mqtt2influx-"));
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "mqtt2influx",
            "--mqtt-host",
            "broker",
            "--mqtt-port",
            "1884",
            "--delay",
            "0",
            "--client-id",
            "bridge-1",
            "--mqtt-username",
            "u",
            "--mqtt-password",
            "p",
            "--fail-fast",
            "--max-packet-size",
            "65536",
        ]);
        let config = bridge_config(&args);

        assert_eq!(config.broker_host, "broker");
        assert_eq!(config.port, 1884);
        assert_eq!(config.client_id, "bridge-1");
        assert_eq!(config.username.as_deref(), Some("u"));
        assert_eq!(config.password.as_deref(), Some("p"));
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.max_packet_size, 65536);
    }

    #[tokio::test]
    async fn test_failed_signal_handler_keeps_running() {
        let failing = async { Err(io::Error::new(io::ErrorKind::Other, "no signal support")) };
        let waited = tokio::time::timeout(Duration::from_millis(50), shutdown_on(failing)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_signal_resolves_shutdown() {
        let waited =
            tokio::time::timeout(Duration::from_millis(50), shutdown_on(async { Ok(()) })).await;
        assert!(waited.is_ok());
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(parse_level("critical").unwrap(), LevelFilter::Error);
        assert_eq!(parse_level("WARNING").unwrap(), LevelFilter::Warn);
        assert_eq!(parse_level("debug").unwrap(), LevelFilter::Debug);
        assert!(parse_level("loud").is_err());
    }
}
