//! Configuration for a blobnode instance

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Node configuration
///
/// `node_name` and `data_root` are required; everything else has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's identity, embedded in derived blob and tag URLs
    pub node_name: String,

    /// Root directory containing the storage volumes
    pub data_root: PathBuf,

    /// Secondary root handed to the external get listener
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_root: Option<PathBuf>,

    /// Max concurrent admitted puts
    #[serde(default = "default_put_max")]
    pub put_max: usize,

    /// Max concurrent admitted gets
    #[serde(default = "default_get_max")]
    pub get_max: usize,

    /// Port the external put listener binds
    #[serde(default = "default_put_port")]
    pub put_port: u16,

    /// Port the external get listener binds
    #[serde(default = "default_get_port")]
    pub get_port: u16,

    /// Whether the put listener should be started alongside this node
    #[serde(default = "default_true")]
    pub put_enabled: bool,

    /// Whether the get listener should be started alongside this node
    #[serde(default = "default_true")]
    pub get_enabled: bool,

    /// Max waiting requests per admission queue before refusal
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,

    /// Disk-space monitor period
    #[serde(default = "default_disk_interval")]
    pub disk_interval_secs: u64,

    /// Tag-index refresh period
    #[serde(default = "default_tag_interval")]
    pub tag_interval_secs: u64,

    /// Bound on init duration (volume discovery + initial tag scan)
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

fn default_put_max() -> usize {
    64
}
fn default_get_max() -> usize {
    128
}
fn default_put_port() -> u16 {
    8990
}
fn default_get_port() -> u16 {
    8991
}
fn default_true() -> bool {
    true
}
fn default_queue_length() -> usize {
    100
}
fn default_disk_interval() -> u64 {
    10
}
fn default_tag_interval() -> u64 {
    60
}
fn default_startup_timeout() -> u64 {
    60
}

impl NodeConfig {
    /// Minimal config with defaults for everything optional
    pub fn new(node_name: impl Into<String>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            node_name: node_name.into(),
            data_root: data_root.into(),
            read_root: None,
            put_max: default_put_max(),
            get_max: default_get_max(),
            put_port: default_put_port(),
            get_port: default_get_port(),
            put_enabled: true,
            get_enabled: true,
            queue_length: default_queue_length(),
            disk_interval_secs: default_disk_interval(),
            tag_interval_secs: default_tag_interval(),
            startup_timeout_secs: default_startup_timeout(),
        }
    }

    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = serde_json::from_str(&content)
            .map_err(|e| crate::Error::InvalidConfig(format!("failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Save to a JSON file
    pub fn to_file(&self, path: impl AsRef<std::path::Path>) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| crate::Error::InvalidConfig(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.node_name.is_empty() {
            return Err(crate::Error::InvalidConfig("node_name is required".into()));
        }
        if self.data_root.as_os_str().is_empty() {
            return Err(crate::Error::InvalidConfig("data_root is required".into()));
        }
        if self.put_max == 0 || self.get_max == 0 {
            return Err(crate::Error::InvalidConfig(
                "put_max and get_max must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn disk_interval(&self) -> Duration {
        Duration::from_secs(self.disk_interval_secs)
    }

    pub fn tag_interval(&self) -> Duration {
        Duration::from_secs(self.tag_interval_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::new("node1", "/srv/blobnode");
        assert_eq!(config.put_max, 64);
        assert_eq!(config.get_max, 128);
        assert_eq!(config.queue_length, 100);
        assert!(config.put_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_name() {
        let config = NodeConfig::new("", "/srv/blobnode");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = NodeConfig::new("node1", "/srv/blobnode");
        config.put_max = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_required_keys() {
        // node_name and data_root have no serde default: absence is fatal
        let parsed: Result<NodeConfig, _> = serde_json::from_str(r#"{"node_name": "n1"}"#);
        assert!(parsed.is_err());

        let parsed: Result<NodeConfig, _> =
            serde_json::from_str(r#"{"node_name": "n1", "data_root": "/data"}"#);
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");

        let mut config = NodeConfig::new("node1", "/srv/blobnode");
        config.put_max = 7;
        config.to_file(&path).unwrap();

        let loaded = NodeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.node_name, "node1");
        assert_eq!(loaded.put_max, 7);
    }
}
