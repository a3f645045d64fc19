//! Configuration Management
//!
//! Provides functionality for:
//! - Loading/saving configuration
//! - Configuration validation
//! - Default configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use crate::error::MemberlistError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// Namespace holding both the worker pods and the memberlist resource
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Name of the MemberList custom resource
    #[serde(default = "default_memberlist_name")]
    pub memberlist_name: String,
    /// Role label value selecting the worker pods
    #[serde(default = "default_member_type")]
    pub member_type: String,
    /// Role label key
    #[serde(default = "default_label_key")]
    pub label_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// First retry delay in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for a retry delay in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
    /// Retries per node before a failure is only logged
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// What a reconciliation cycle does when the memberlist resource is absent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMemberlistPolicy {
    /// Fail the cycle and retry later
    #[default]
    Fail,
    /// Create the resource holding only the reconciled node if it is ready
    Create,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for JSON log files; file logging is off when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
    /// Number of rotated log files to keep
    #[serde(default = "default_log_files")]
    pub files_to_keep: usize,
    #[serde(default = "default_true")]
    pub console: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub missing_memberlist: MissingMemberlistPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            memberlist_name: default_memberlist_name(),
            member_type: default_member_type(),
            label_key: default_label_key(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            files_to_keep: default_log_files(),
            console: default_true(),
        }
    }
}

// Default value functions
fn default_namespace() -> String { "chroma".to_string() }
fn default_memberlist_name() -> String { "worker-memberlist".to_string() }
fn default_member_type() -> String { "worker".to_string() }
fn default_label_key() -> String { "member-type".to_string() }
fn default_base_delay_ms() -> u64 { 5 }
fn default_max_delay_secs() -> u64 { 1000 }
fn default_max_retries() -> u32 { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_files() -> usize { 7 }
fn default_true() -> bool { true }

impl KubernetesConfig {
    /// Label selector used to watch worker pods, e.g. `member-type=worker`
    pub fn label_selector(&self) -> String {
        format!("{}={}", self.label_key, self.member_type)
    }
}

impl QueueConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if it is absent
    pub fn load(path: &Path) -> Result<Self, MemberlistError> {
        if !path.exists() {
            debug!("Configuration file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| MemberlistError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_yaml::from_str(&contents)
            .map_err(|e| MemberlistError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the first existing well-known location
    pub fn load_default() -> Result<Self, MemberlistError> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }
        debug!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("memberlist.yml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("memberlist").join("config.yml"));
        }
        paths.push(PathBuf::from("/etc/memberlist/config.yml"));
        paths
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), MemberlistError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| MemberlistError::Config(format!("Failed to create config directory: {}", e)))?;
        }
        let contents = serde_yaml::to_string(&self)
            .map_err(|e| MemberlistError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, contents)
            .map_err(|e| MemberlistError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), MemberlistError> {
        let k8s = &self.kubernetes;
        for (field, value) in [
            ("namespace", &k8s.namespace),
            ("memberlist_name", &k8s.memberlist_name),
            ("member_type", &k8s.member_type),
            ("label_key", &k8s.label_key),
        ] {
            if value.trim().is_empty() {
                return Err(MemberlistError::Config(format!("kubernetes.{} must not be empty", field)));
            }
        }
        if self.queue.base_delay() > self.queue.max_delay() {
            return Err(MemberlistError::Config(
                "queue.base_delay_ms must not exceed queue.max_delay_secs".to_string(),
            ));
        }
        Ok(())
    }
}
