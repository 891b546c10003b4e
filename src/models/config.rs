use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_item_delay_ms")]
    pub item_delay_ms: u64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_location_code")]
    pub default_location_code: u32,
    #[serde(default = "default_device")]
    pub default_device: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_language_code")]
    pub language_code: String,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5050
}

fn default_batch_size() -> usize {
    5
}

fn default_item_delay_ms() -> u64 {
    1_000
}

fn default_batch_delay_ms() -> u64 {
    5_000
}

fn default_location_code() -> u32 {
    2356 // India
}

fn default_device() -> String {
    "desktop".to_string()
}

fn default_api_base_url() -> String {
    "https://api.dataforseo.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_language_code() -> String {
    "en".to_string()
}

fn default_broadcast_capacity() -> usize {
    1024
}

impl ServiceConfig {
    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: None,
            batch_size: default_batch_size(),
            item_delay_ms: default_item_delay_ms(),
            batch_delay_ms: default_batch_delay_ms(),
            default_location_code: default_location_code(),
            default_device: default_device(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            language_code: default_language_code(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}
