//! Runtime trait and the watch feed types.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::types::{Node, NodeType, RuntimeProvider, SshKey, Status};

/// One item of a node's status feed.
#[derive(Debug)]
pub enum WatchEvent {
    /// The node moved to a new status.
    Status(Status),
    /// Watching failed. The feed ends after this item.
    Error(Error),
    /// The feed is complete, either after a terminal status or cancellation.
    Done,
}

/// Lazy, finite feed of [`WatchEvent`]s for one node.
///
/// Nothing is polled until the stream is. Once it yields [`WatchEvent::Error`]
/// or [`WatchEvent::Done`] it yields nothing else.
pub type WatchStream = BoxStream<'static, WatchEvent>;

/// Capability interface implemented once per cloud vendor.
///
/// Callers never see vendor details: every failure comes back as the common
/// [`Error`] with the provider attached.
#[async_trait]
pub trait Runtime: Send + Sync {
    /// The vendor behind this runtime.
    fn provider(&self) -> RuntimeProvider;

    /// List the keys in the provider's own key store.
    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>>;

    /// Register a key with the provider.
    ///
    /// Idempotent: an existing key with the same name (and no conflicting public
    /// key) or with the same public key is returned instead of creating a new one.
    async fn add_ssh_key(&self, key: SshKey) -> Result<SshKey>;

    /// Query the live node type catalog.
    async fn list_node_types(&self) -> Result<Vec<NodeType>>;

    /// Provision a node.
    ///
    /// Without an explicit region, the first catalog region reporting capacity
    /// for `node_type_id` is used.
    async fn init_node(
        &self,
        key: &SshKey,
        node_type_id: &str,
        region: Option<&str>,
    ) -> Result<Node>;

    /// Tear down a node.
    async fn terminate_node(&self, node_id: &str) -> Result<()>;

    /// Open a status feed for a node.
    ///
    /// The feed stops polling once `cancel` fires.
    fn watch(&self, node_id: &str, cancel: CancellationToken) -> WatchStream;
}
