//! Control plane for GPU node sessions.
//!
//! Sits between the HTTP API and the provider runtimes:
//!
//! - [`sessions`] - create, watch, list and terminate sessions
//! - [`credentials`] - resolve SSH keys and mirror them into provider key stores
//! - [`keys`] - account SSH key management
//! - [`providers`] - provider catalog queries
//! - [`builds`] - container image builds and their logs
//! - [`store`] - persistence port and the in-memory store
//! - [`server`] - axum routes

pub mod builds;
pub mod config;
pub mod credentials;
pub mod keys;
pub mod providers;
pub mod server;
pub mod sessions;
pub mod ssh;
pub mod store;

pub use config::{Config, LogFormat};
pub use server::{build_router, serve, AppState};
pub use sessions::{Session, SessionCreateParams, SessionService, WatchHandle};
pub use store::{MemoryStore, Store, StoreError};
