//! Provider-neutral runtime for GPU nodes.
//!
//! This crate defines the [`Runtime`] contract every cloud vendor adapter
//! implements, the common [`Error`] taxonomy adapters translate vendor failures
//! into, and the [`Initializer`] that picks an adapter for a provider.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐      ┌─────────────────┐      ┌──────────────────┐
//! │  control plane   │─────►│   Initializer   │─────►│ dyn Runtime      │
//! │  (sessions)      │      │ (per provider)  │      │  • LambdaLabs    │
//! └──────────────────┘      └─────────────────┘      └────────┬─────────┘
//!          ▲                                                  │
//!          │            WatchStream (Status | Error | Done)   │
//!          └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supported Providers
//!
//! - **LambdaLabs** - A10, A100, H100 GPU instances

pub mod error;
pub mod initializer;
pub mod names;
pub mod providers;
pub mod runtime;
pub mod types;

pub use error::{BoxError, Error, ErrorKind, Result, ResultExt};
pub use initializer::{EnvInitializer, Initializer, ProviderConfig};
pub use providers::lambdalabs;
pub use runtime::{Runtime, WatchEvent, WatchStream};
pub use types::{
    Node, NodeSpecs, NodeType, RuntimeProvider, SshKey, Status, UnknownProvider,
};
