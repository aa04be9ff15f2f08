//! LambdaLabs Cloud runtime.
//!
//! Implements [`Runtime`](crate::Runtime) on top of the LambdaLabs Cloud API:
//! bearer-token authenticated SSH key management, the instance type catalog
//! with per-region capacity, instance launch/terminate, and a polling status
//! feed over `GET /instances/{id}`.
//!
//! ## Example
//!
//! ```ignore
//! use node_runtime::providers::lambdalabs::LambdaLabs;
//! use node_runtime::{Runtime, SshKey};
//!
//! let runtime = LambdaLabs::new(api_key)?;
//!
//! let key = runtime.add_ssh_key(SshKey::named("laptop").with_public_key(pk)).await?;
//! let node = runtime.init_node(&key, "gpu_1x_a100", None).await?;
//!
//! runtime.terminate_node(&node.id).await?;
//! ```

mod client;
mod models;

pub use client::{LambdaLabs, API_BASE_URL, DEFAULT_POLL_INTERVAL};
