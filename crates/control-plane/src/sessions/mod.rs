//! Session lifecycle: create, watch, get, list and terminate.
//!
//! ```text
//! create ──► Initializing ──► Active ──► Terminated
//!                 │                          ▲
//!                 └──────── terminate ───────┘
//! ```
//!
//! Transitions after creation come from the watcher or from `terminate`.

mod watcher;

pub use watcher::WatchHandle;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use node_runtime::names::random_phrase;
use node_runtime::{
    Error, Initializer, Result, ResultExt, Runtime, RuntimeProvider, SshKey, Status, WatchStream,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::credentials::{register_credentials, CredentialResolver};
use crate::store::{NewSession, Pagination, SessionRecord, Store};

/// Page size used when listing a project's sessions.
const LIST_PAGE_SIZE: usize = 100;

/// User-facing view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "projectID")]
    pub project_id: Uuid,
    #[serde(rename = "nodeID")]
    pub node_id: String,
    #[serde(rename = "nodeTypeID")]
    pub node_type_id: String,
    pub region: String,
    pub provider: RuntimeProvider,
    pub ssh_key: SshKey,
    #[serde(rename = "runtimeStatus")]
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub exited_at: Option<DateTime<Utc>>,
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            project_id: record.project_id,
            node_id: record.node_id,
            node_type_id: record.node_type_id,
            region: record.region,
            provider: record.provider,
            ssh_key: record.ssh_key,
            status: record.status,
            created_at: record.created_at,
            ready_at: record.ready_at,
            exited_at: record.exited_at,
        }
    }
}

/// Inputs to [`SessionService::create`].
#[derive(Debug, Clone)]
pub struct SessionCreateParams {
    pub provider: RuntimeProvider,
    pub node_type_id: String,
    pub region: Option<String>,
    pub ssh_key_name: Option<String>,
    pub ssh_public_key: Option<String>,
}

/// Orchestrates runtimes, credentials and persistence for sessions.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn Store>,
    initializer: Arc<dyn Initializer>,
    credentials: CredentialResolver,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>, initializer: Arc<dyn Initializer>) -> Self {
        Self {
            credentials: CredentialResolver::new(Arc::clone(&store)),
            store,
            initializer,
        }
    }

    /// Provision a node and record a session for it.
    ///
    /// Nothing is persisted unless the node was provisioned.
    pub async fn create(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        params: SessionCreateParams,
    ) -> Result<Session> {
        let runtime = self
            .initializer
            .initialize(account_id, params.provider)
            .await
            .context("failed to create runtime")?;

        let ssh_key = self
            .credentials
            .fetch_credentials(
                account_id,
                params.ssh_key_name.as_deref(),
                params.ssh_public_key.as_deref(),
            )
            .await
            .context("failed to setup credentials")?;

        register_credentials(runtime.as_ref(), &ssh_key)
            .await
            .context("failed to register credentials")?;

        let node = runtime
            .init_node(&ssh_key, &params.node_type_id, params.region.as_deref())
            .await
            .context("failed to init node")?;
        info!(
            project_id = %project_id,
            provider = %node.provider,
            node_id = %node.id,
            region = %node.region,
            "Node initialized"
        );

        let new_session = NewSession {
            name: random_phrase(4, "-"),
            created_by: account_id,
            project_id,
            node_id: node.id.clone(),
            provider: node.provider,
            region: node.region,
            node_type_id: node.type_id,
            ssh_key: ssh_key.without_private_key(),
        };
        let record = match self.store.create_session(new_session).await {
            Ok(record) => record,
            Err(e) => {
                error!(
                    node_id = %node.id,
                    provider = %node.provider,
                    error = %e,
                    "Failed to persist session, node is running untracked"
                );
                return Err(Error::internal("Failed to create session").with_source(e));
            }
        };

        info!(session_id = %record.id, node_id = %record.node_id, "Session created");
        Ok(record.into())
    }

    pub async fn get(&self, session_id: Uuid) -> Result<Session> {
        self.load(session_id).await.map(Session::from)
    }

    /// Every session of a project, optionally including terminated ones.
    pub async fn list(&self, project_id: Uuid, include_terminated: bool) -> Result<Vec<Session>> {
        let mut sessions = Vec::new();
        let mut page = Pagination {
            offset: 0,
            limit: LIST_PAGE_SIZE,
        };

        loop {
            let batch = self
                .store
                .list_sessions(project_id, page)
                .await
                .map_err(|e| Error::internal("Failed to list sessions").with_source(e))?;
            let fetched = batch.len();

            sessions.extend(
                batch
                    .into_iter()
                    .filter(|s| include_terminated || !s.status.is_terminal())
                    .map(Session::from),
            );

            if fetched < page.limit {
                break;
            }
            page.offset += fetched;
        }

        Ok(sessions)
    }

    /// Tear the session's node down and mark the session terminated.
    ///
    /// The final status write is best effort: a failure is logged, not returned.
    pub async fn terminate(&self, session_id: Uuid) -> Result<()> {
        let record = self
            .store
            .get_session(session_id)
            .await
            .map_err(|e| Error::internal("Failed to get session").with_source(e))?
            .ok_or_else(|| {
                Error::not_found("Session not found")
                    .with_suggestion("Make sure the session id is valid")
            })?;

        let runtime = self
            .initializer
            .initialize(record.created_by, record.provider)
            .await
            .context(format!("failed to create runtime {}", record.provider))?;

        runtime
            .terminate_node(&record.node_id)
            .await
            .context("failed to terminate node")?;
        info!(session_id = %session_id, node_id = %record.node_id, "Node terminated");

        if let Err(e) = self
            .store
            .update_session_status(session_id, Status::Terminated)
            .await
        {
            error!(session_id = %session_id, error = %e, "Failed to set session as terminated");
        }
        Ok(())
    }

    /// Start a watcher for a session.
    ///
    /// Fails if the session does not exist or its runtime cannot be built.
    pub async fn watch(&self, session_id: Uuid) -> Result<WatchHandle> {
        let cancel = CancellationToken::new();
        let feed = self.open_feed(session_id, cancel.clone()).await?;
        let task = tokio::spawn(watcher::consume(
            Arc::clone(&self.store),
            session_id,
            feed,
            cancel.clone(),
        ));
        Ok(WatchHandle::new(session_id, cancel, task))
    }

    /// Start a watcher without waiting for it to load.
    ///
    /// Loading failures are logged from inside the task.
    pub fn spawn_watch(&self, session_id: Uuid) -> WatchHandle {
        let cancel = CancellationToken::new();
        let service = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            match service.open_feed(session_id, token.clone()).await {
                Ok(feed) => watcher::consume(service.store, session_id, feed, token).await,
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Failed to start session watcher");
                    token.cancel();
                }
            }
        });
        WatchHandle::new(session_id, cancel, task)
    }

    async fn open_feed(&self, session_id: Uuid, cancel: CancellationToken) -> Result<WatchStream> {
        let record = self.load(session_id).await?;
        let runtime: Box<dyn Runtime> = self
            .initializer
            .initialize(record.created_by, record.provider)
            .await
            .context("failed to initialize runtime")?;
        Ok(runtime.watch(&record.node_id, cancel))
    }

    async fn load(&self, session_id: Uuid) -> Result<SessionRecord> {
        self.store
            .get_session(session_id)
            .await
            .map_err(|e| Error::internal("Failed to get session").with_source(e))?
            .ok_or_else(|| Error::not_found("Session not found"))
    }
}
