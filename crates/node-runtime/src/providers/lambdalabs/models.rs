//! LambdaLabs Cloud API models.
//!
//! Every endpoint answers with either `{"data": ...}` or `{"error": {...}}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// Envelopes
// ============================================================================

/// Successful response wrapper.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Response data.
    pub data: T,
}

/// Error response wrapper.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// Error details returned by the API.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code (e.g. `global/invalid-api-key`).
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Remediation hint.
    #[serde(default)]
    pub suggestion: Option<String>,
}

// ============================================================================
// SSH keys
// ============================================================================

/// SSH key resource.
#[derive(Debug, Deserialize)]
pub struct SshKeyResource {
    /// Key ID.
    pub id: String,
    /// Key name.
    pub name: String,
    /// Public key.
    pub public_key: String,
    /// Private key, only returned when LambdaLabs generated the key.
    #[serde(default)]
    pub private_key: Option<String>,
}

/// Request body for adding an SSH key.
#[derive(Debug, Serialize)]
pub struct AddSshKeyBody {
    /// Key name.
    pub name: String,
    /// Public key. When omitted LambdaLabs generates a key pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

// ============================================================================
// Instance types
// ============================================================================

/// Catalog keyed by instance type name.
pub type InstanceTypes = BTreeMap<String, InstanceTypeEntry>;

/// One catalog entry.
#[derive(Debug, Deserialize)]
pub struct InstanceTypeEntry {
    /// Instance type details.
    pub instance_type: InstanceType,
    /// Regions that can currently launch this type.
    #[serde(default)]
    pub regions_with_capacity_available: Vec<Region>,
}

/// Instance type details.
#[derive(Debug, Deserialize)]
pub struct InstanceType {
    /// Type name (e.g. `gpu_1x_a100`).
    pub name: String,
    /// Description (e.g. `1x A100 (40 GB SXM4)`).
    #[serde(default)]
    pub description: String,
    /// Price in US cents per hour.
    pub price_cents_per_hour: i64,
    /// Hardware specs.
    pub specs: InstanceSpecs,
}

/// Instance hardware specs.
#[derive(Debug, Deserialize)]
pub struct InstanceSpecs {
    /// Number of virtual CPUs.
    pub vcpus: u32,
    /// RAM in GiB.
    pub memory_gib: u32,
    /// Local storage in GiB.
    #[serde(default)]
    pub storage_gib: Option<u32>,
    /// Number of GPUs.
    #[serde(default)]
    pub gpus: Option<u32>,
}

/// Region.
#[derive(Debug, Deserialize)]
pub struct Region {
    /// Region name (e.g. `us-east-1`).
    pub name: String,
    /// Region description.
    #[serde(default)]
    pub description: Option<String>,
}

// ============================================================================
// Instances
// ============================================================================

/// Request body for launching instances.
#[derive(Debug, Serialize)]
pub struct LaunchInstanceBody {
    /// Region to launch in.
    pub region_name: String,
    /// Instance type name.
    pub instance_type_name: String,
    /// Names of SSH keys to install.
    pub ssh_key_names: Vec<String>,
    /// Names of file systems to attach.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_system_names: Vec<String>,
    /// Number of instances to launch.
    pub quantity: u32,
    /// Instance name.
    pub name: String,
}

/// Launch response data.
#[derive(Debug, Deserialize)]
pub struct LaunchInstanceData {
    /// IDs of the launched instances.
    pub instance_ids: Vec<String>,
}

/// Request body for terminating instances.
#[derive(Debug, Serialize)]
pub struct TerminateInstanceBody {
    /// IDs of the instances to terminate.
    pub instance_ids: Vec<String>,
}

/// Terminate response data.
#[derive(Debug, Deserialize)]
pub struct TerminateInstanceData {
    /// Instances that were terminated.
    #[serde(default)]
    pub terminated_instances: Vec<InstanceResource>,
}

/// Instance resource.
#[derive(Debug, Deserialize)]
pub struct InstanceResource {
    /// Instance ID.
    pub id: String,
    /// Instance name.
    #[serde(default)]
    pub name: Option<String>,
    /// `booting`, `active`, `unhealthy`, `terminating` or `terminated`.
    pub status: String,
    /// Public IPv4 address.
    #[serde(default)]
    pub ip: Option<String>,
    /// Region the instance runs in.
    #[serde(default)]
    pub region: Option<Region>,
}
