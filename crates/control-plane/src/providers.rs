//! Provider catalog queries.

use std::sync::Arc;

use node_runtime::{Initializer, NodeType, Result, ResultExt, RuntimeProvider};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct ProviderService {
    initializer: Arc<dyn Initializer>,
}

impl ProviderService {
    pub fn new(initializer: Arc<dyn Initializer>) -> Self {
        Self { initializer }
    }

    /// Live node type catalog for a provider.
    ///
    /// With `available_only`, node types without any region reporting capacity
    /// are dropped.
    pub async fn list_node_types(
        &self,
        account_id: Uuid,
        provider: RuntimeProvider,
        available_only: bool,
    ) -> Result<Vec<NodeType>> {
        let runtime = self
            .initializer
            .initialize(account_id, provider)
            .await
            .context("Failed to create runtime")?;
        let mut node_types = runtime
            .list_node_types()
            .await
            .context("Failed to list node types")?;

        if available_only {
            node_types.retain(NodeType::is_available);
        }
        info!(provider = %provider, count = node_types.len(), "Listed node types");
        Ok(node_types)
    }
}
