//! Provider-neutral data model: providers, nodes, node types and SSH keys.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The platform a node is spawned on. This is where user code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeProvider {
    LambdaLabs,
    Unweave,
}

impl RuntimeProvider {
    /// Every provider known to the control plane.
    pub const ALL: [Self; 2] = [Self::LambdaLabs, Self::Unweave];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LambdaLabs => "LambdaLabs",
            Self::Unweave => "Unweave",
        }
    }
}

impl fmt::Display for RuntimeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known provider.
#[derive(Debug, Clone, Error)]
#[error("invalid runtime provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for RuntimeProvider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// Lifecycle status shared by nodes and sessions.
///
/// Ordering follows the lifecycle, so `a < b` means `b` comes later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Initializing,
    Active,
    Terminated,
}

impl Status {
    /// Terminated is absorbing: nothing follows it.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SSH key as known to the control plane or a provider's key store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKey {
    /// Key name, unique per owner.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// OpenSSH authorized-key line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Only present right after generation. Never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl SshKey {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    /// Copy of this key with the private half removed.
    #[must_use]
    pub fn without_private_key(&self) -> Self {
        Self {
            private_key: None,
            ..self.clone()
        }
    }
}

/// Hardware specification of a node type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpecs {
    #[serde(rename = "vCPUs")]
    pub vcpus: u32,
    /// RAM in GiB.
    pub memory: u32,
    /// GPU RAM in GiB, when the provider reports it.
    pub gpu_memory: Option<u32>,
}

/// A provisionable hardware configuration from a provider's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeType {
    pub id: String,
    pub name: Option<String>,
    /// Price in cents per hour.
    pub price: Option<i64>,
    /// Regions currently reporting capacity. Advisory only.
    pub regions: Vec<String>,
    pub description: Option<String>,
    pub provider: RuntimeProvider,
    pub specs: NodeSpecs,
}

impl NodeType {
    pub fn is_available(&self) -> bool {
        !self.regions.is_empty()
    }
}

/// A provider-side compute resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(rename = "typeID")]
    pub type_id: String,
    pub region: String,
    #[serde(rename = "sshKeyPair")]
    pub ssh_key: SshKey,
    pub status: Status,
    pub provider: RuntimeProvider,
}
