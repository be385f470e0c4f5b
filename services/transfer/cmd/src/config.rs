//! Configuration handling for the transfer node.
//!
//! This module reads configuration from a YAML file and applies environment
//! variable overrides on top of it.

use anyhow::Result;
use msf_directory::DirectoryConfig;
use msf_wire::ClientIdentity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default cap on the size of a file read for upload (64 MiB)
pub const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;

/// Transfer node configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Identity used for uploads and directory lookups
    pub identity: ClientIdentity,
    /// Directory endpoint settings
    pub directory: DirectoryConfig,
    /// Upload settings
    pub upload: UploadConfig,
}

/// Upload settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Upload command id written into every chunk header
    pub command_id: u32,
    /// Deadline for a whole upload (seconds)
    pub timeout_secs: u64,
    /// Files of this size or larger are rejected
    pub max_file_bytes: u64,
    /// Buffer acknowledgements are read into
    pub ack_buffer_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            command_id: 2,
            timeout_secs: 60,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            ack_buffer_size: 1024,
        }
    }
}

impl UploadConfig {
    /// Upload deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TransferConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<TransferConfig>(&content) {
                Ok(parsed) => {
                    info!("Loaded configuration from {:?}", path);
                    parsed
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_environment_overrides();

        info!(
            "Final transfer configuration: uin={}, sub_app_id={}, directory={}, command_id={}",
            config.identity.uin,
            config.identity.sub_app_id,
            config.directory.url,
            config.upload.command_id
        );

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_environment_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(uin) = lookup("MSF_UIN") {
            if let Ok(uin) = uin.parse::<u64>() {
                self.identity.uin = uin;
                info!("UIN overridden by environment: {}", uin);
            }
        }

        if let Some(sub_app_id) = lookup("MSF_SUB_APP_ID") {
            if let Ok(id) = sub_app_id.parse::<u32>() {
                self.identity.sub_app_id = id;
                info!("Sub app id overridden by environment: {}", id);
            }
        }

        if let Some(imei) = lookup("MSF_IMEI") {
            self.identity.imei = imei;
            info!("IMEI overridden by environment");
        }

        if let Some(url) = lookup("MSF_DIRECTORY_URL") {
            self.directory.url = url;
            info!("Directory URL overridden by environment: {}", self.directory.url);
        }

        if let Some(timeout) = lookup("MSF_DIRECTORY_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                self.directory.timeout_ms = ms;
                info!("Directory timeout overridden by environment: {}ms", ms);
            }
        }
    }
}
