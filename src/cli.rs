//! Command-line and environment configuration for the server binary.

use clap::Parser;
use live_current::{FeedConfig, DEFAULT_CHANNEL_TAG};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "live-current", about = "Live current-value API fed by pub/sub")]
pub struct Args {
    /// Broker URL, credentials included
    #[arg(long, env = "LIVE_BROKER_URL", default_value = "redis://127.0.0.1:6379/")]
    pub broker_url: String,

    /// Record tag naming the channel to track
    #[arg(long, env = "LIVE_CHANNEL_TAG", default_value = DEFAULT_CHANNEL_TAG)]
    pub channel_tag: String,

    /// JSON file holding the record directory
    #[arg(long, env = "LIVE_RECORDS_FILE", default_value = "records.json")]
    pub records_file: PathBuf,

    /// Seconds between scheduled refreshes
    #[arg(long, env = "LIVE_REFRESH_SECS", default_value_t = 30)]
    pub refresh_secs: u64,

    /// Initial broker connection timeout in milliseconds
    #[arg(long, env = "LIVE_CONNECT_TIMEOUT_MS", default_value_t = 5000)]
    pub connect_timeout_ms: u64,

    /// Subscribe/unsubscribe acknowledgment timeout in milliseconds
    #[arg(long, env = "LIVE_OPERATION_TIMEOUT_MS", default_value_t = 5000)]
    pub operation_timeout_ms: u64,

    /// Per-channel delivery queue capacity
    #[arg(long, env = "LIVE_DELIVERY_BUFFER", default_value_t = 1024)]
    pub delivery_buffer: usize,

    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,
}

impl Args {
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            broker_url: self.broker_url.clone(),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
            channel_tag: self.channel_tag.clone(),
            refresh_interval: Duration::from_secs(self.refresh_secs),
            delivery_buffer: self.delivery_buffer,
            ..Default::default()
        }
    }
}
