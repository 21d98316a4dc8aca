//! The configured replica set.
//!
//! Both server and client processes load the same JSON document at startup:
//!
//! ```json
//! { "servers": [ { "host": "127.0.0.1", "port": 6000, "id": 1 } ] }
//! ```
//!
//! Ids must be unique; the election rule (lowest live id wins) makes them
//! the only ordering that matters.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// One replica's address and identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaDescriptor {
    pub host: String,
    pub port: u16,
    pub id: u32,
}

impl ReplicaDescriptor {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The full configured fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub servers: Vec<ReplicaDescriptor>,
}

impl ClusterConfig {
    pub fn replica(&self, id: u32) -> Option<&ReplicaDescriptor> {
        self.servers.iter().find(|replica| replica.id == id)
    }

    /// Every configured replica except `id`.
    pub fn peers_of(&self, id: u32) -> impl Iterator<Item = &ReplicaDescriptor> {
        self.servers.iter().filter(move |replica| replica.id != id)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Raw deserialization types; every field optional so that validation can
// produce a message naming what is missing.

#[derive(Debug, Deserialize)]
struct RawClusterConfig {
    servers: Option<Vec<RawReplicaDescriptor>>,
}

#[derive(Debug, Deserialize)]
struct RawReplicaDescriptor {
    host: Option<String>,
    port: Option<u16>,
    id: Option<u32>,
}

/// Load and validate a cluster config file.
pub fn load_config(path: &Path) -> Result<ClusterConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

/// Parse and validate a cluster config document.
pub fn parse_config(contents: &str) -> Result<ClusterConfig, ConfigError> {
    let raw: RawClusterConfig = serde_json::from_str(contents)?;
    let raw_servers = raw
        .servers
        .ok_or_else(|| ConfigError::Invalid("missing \"servers\" array".to_owned()))?;
    if raw_servers.is_empty() {
        return Err(ConfigError::Invalid("\"servers\" must not be empty".to_owned()));
    }

    let mut servers = Vec::with_capacity(raw_servers.len());
    for (index, raw) in raw_servers.into_iter().enumerate() {
        let host = raw
            .host
            .ok_or_else(|| ConfigError::Invalid(format!("servers[{index}]: missing host")))?;
        let port = raw
            .port
            .ok_or_else(|| ConfigError::Invalid(format!("servers[{index}]: missing port")))?;
        let id = raw
            .id
            .ok_or_else(|| ConfigError::Invalid(format!("servers[{index}]: missing id")))?;
        servers.push(ReplicaDescriptor { host, port, id });
    }

    for replica in &servers {
        if servers.iter().filter(|other| other.id == replica.id).count() > 1 {
            return Err(ConfigError::Invalid(format!("duplicate replica id {}", replica.id)));
        }
    }
    Ok(ClusterConfig { servers })
}
