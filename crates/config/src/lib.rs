// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_connect_attempts() -> u32 {
    50
}

fn default_retry_delay_ms() -> u64 {
    10
}

/// Number of VSI instances a platform exposes.
pub const MAX_VSI_INSTANCES: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Audio,
    Video,
    Sensor,
}

impl StreamKind {
    /// Endpoint the server for this kind listens on when nothing is configured.
    pub fn default_address(self) -> Option<&'static str> {
        match self {
            StreamKind::Audio => Some("127.0.0.1:6001"),
            StreamKind::Video => Some("127.0.0.1:6000"),
            StreamKind::Sensor => None,
        }
    }

    pub fn default_authkey(self) -> Option<&'static str> {
        match self {
            StreamKind::Audio => Some("vsi_audio"),
            StreamKind::Video => Some("vsi_video"),
            StreamKind::Sensor => None,
        }
    }

    /// Sensor instances replay local recordings and never talk to a server.
    pub fn uses_bridge(self) -> bool {
        !matches!(self, StreamKind::Sensor)
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Audio => write!(f, "audio"),
            StreamKind::Video => write!(f, "video"),
            StreamKind::Sensor => write!(f, "sensor"),
        }
    }
}

impl std::str::FromStr for StreamKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            "sensor" => Ok(Self::Sensor),
            _ => Err(format!(
                "unsupported stream kind '{}'; supported: audio, video, sensor",
                value
            )),
        }
    }
}

/// Endpoint and connection budget for one bridge client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub address: String,
    pub authkey: String,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl BridgeConfig {
    /// Default endpoint for `kind`; `None` for kinds without a server.
    pub fn for_kind(kind: StreamKind) -> Option<Self> {
        Some(Self {
            address: kind.default_address()?.to_string(),
            authkey: kind.default_authkey()?.to_string(),
            connect_attempts: default_connect_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        })
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.address
            .to_socket_addrs()
            .with_context(|| format!("Invalid bridge address '{}'", self.address))?
            .next()
            .with_context(|| format!("Bridge address '{}' did not resolve", self.address))
    }

    pub fn validate(&self) -> Result<()> {
        if self.connect_attempts == 0 {
            anyhow::bail!("Bridge 'connect_attempts' must be greater than zero");
        }
        if self.authkey.is_empty() {
            anyhow::bail!("Bridge 'authkey' cannot be empty");
        }
        self.socket_addr()?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InstanceConfig {
    pub id: String,
    /// VSI slot number (0..=7); selects base address and IRQ line.
    pub vsi: u8,
    pub kind: StreamKind,
    #[serde(default)]
    pub bridge: Option<BridgeConfig>,
    /// Directory relative file names are resolved against.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

impl InstanceConfig {
    /// Bridge settings for this instance, falling back to the per-kind defaults.
    pub fn bridge_or_default(&self) -> Option<BridgeConfig> {
        self.bridge
            .clone()
            .or_else(|| BridgeConfig::for_kind(self.kind))
    }

    pub fn work_dir_or_current(&self) -> PathBuf {
        self.work_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Top-level description of the streaming interfaces attached to a platform.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VsiManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

impl VsiManifest {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open VSI manifest at {:?}", path.as_ref()))?;
        let manifest: Self =
            serde_yaml::from_reader(f).context("Failed to parse VSI Manifest YAML")?;
        manifest.validate()?;
        tracing::debug!(
            "Loaded VSI manifest {:?} with {} instance(s)",
            path.as_ref(),
            manifest.instances.len()
        );
        Ok(manifest)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let manifest: Self =
            serde_yaml::from_str(yaml).context("Failed to parse VSI Manifest YAML")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != "1.0" {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        let mut ids = HashSet::new();
        let mut slots = HashSet::new();
        for instance in &self.instances {
            if !ids.insert(instance.id.as_str()) {
                anyhow::bail!("Duplicate VSI instance id '{}'", instance.id);
            }
            if instance.vsi >= MAX_VSI_INSTANCES {
                anyhow::bail!(
                    "Instance '{}' uses VSI slot {}; slots range from 0 to {}",
                    instance.id,
                    instance.vsi,
                    MAX_VSI_INSTANCES - 1
                );
            }
            if !slots.insert(instance.vsi) {
                anyhow::bail!("VSI slot {} is assigned more than once", instance.vsi);
            }
            if let Some(bridge) = &instance.bridge {
                if !instance.kind.uses_bridge() {
                    anyhow::bail!(
                        "Instance '{}' is a {} stream and takes no 'bridge' section",
                        instance.id,
                        instance.kind
                    );
                }
                bridge
                    .validate()
                    .with_context(|| format!("Invalid bridge for instance '{}'", instance.id))?;
            }
        }

        Ok(())
    }

    pub fn instance(&self, id: &str) -> Option<&InstanceConfig> {
        self.instances.iter().find(|i| i.id == id)
    }
}
