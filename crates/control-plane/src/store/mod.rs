//! Persistence port.
//!
//! The control plane never talks to a database directly. Everything it needs is
//! behind [`Store`], injected as `Arc<dyn Store>`. [`MemoryStore`] is the
//! in-process implementation used by the server binary and the tests.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use node_runtime::{Error, RuntimeProvider, SshKey, Status};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use uuid::Uuid;

/// Persistence failure.
#[derive(Debug, ThisError)]
pub enum StoreError {
    /// A uniqueness constraint was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else the backend reports.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::internal("Internal storage error").with_source(err)
    }
}

/// Offset based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// Fields needed to persist a freshly provisioned session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub name: String,
    pub created_by: Uuid,
    pub project_id: Uuid,
    pub node_id: String,
    pub provider: RuntimeProvider,
    pub region: String,
    pub node_type_id: String,
    /// Public half only.
    pub ssh_key: SshKey,
}

/// Persisted session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub name: String,
    pub created_by: Uuid,
    pub project_id: Uuid,
    pub node_id: String,
    pub provider: RuntimeProvider,
    pub region: String,
    pub node_type_id: String,
    pub ssh_key: SshKey,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub exited_at: Option<DateTime<Utc>>,
}

/// Persisted SSH key row. Never carries a private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshKeyRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// Canonical `<algorithm> <base64>` form.
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

impl From<SshKeyRecord> for SshKey {
    fn from(record: SshKeyRecord) -> Self {
        Self {
            name: record.name,
            public_key: Some(record.public_key),
            private_key: None,
            created_at: Some(record.created_at),
        }
    }
}

/// A project groups sessions and builds under one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "ownerID")]
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Image build lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Initializing,
    Building,
    Success,
    Failed,
}

impl BuildStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Fields needed to persist a new build.
#[derive(Debug, Clone)]
pub struct NewBuild {
    pub project_id: Uuid,
    pub created_by: Uuid,
    pub builder: String,
}

/// Persisted build row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub created_by: Uuid,
    pub builder: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Narrow async persistence interface.
///
/// Every mutation is a targeted update by id. Implementations must ignore
/// status writes against a session that is already terminated.
#[async_trait]
pub trait Store: Send + Sync {
    // ========================================================================
    // Sessions
    // ========================================================================

    async fn create_session(&self, session: NewSession) -> StoreResult<SessionRecord>;

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<SessionRecord>>;

    /// Set a session's status, stamping `ready_at` on the move to Active and
    /// `exited_at` on the move to Terminated. Writes that do not advance the
    /// status are ignored.
    async fn update_session_status(&self, id: Uuid, status: Status) -> StoreResult<()>;

    /// Sessions of a project, oldest first.
    async fn list_sessions(
        &self,
        project_id: Uuid,
        page: Pagination,
    ) -> StoreResult<Vec<SessionRecord>>;

    // ========================================================================
    // SSH keys
    // ========================================================================

    /// Insert a key. Names and public keys are unique per owner.
    async fn add_ssh_key(
        &self,
        owner_id: Uuid,
        name: &str,
        public_key: &str,
    ) -> StoreResult<SshKeyRecord>;

    async fn get_ssh_key_by_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<SshKeyRecord>>;

    async fn get_ssh_key_by_public_key(
        &self,
        owner_id: Uuid,
        public_key: &str,
    ) -> StoreResult<Option<SshKeyRecord>>;

    async fn list_ssh_keys(&self, owner_id: Uuid) -> StoreResult<Vec<SshKeyRecord>>;

    // ========================================================================
    // Projects
    // ========================================================================

    async fn create_project(&self, owner_id: Uuid, name: &str) -> StoreResult<Project>;

    async fn get_project(&self, id: Uuid) -> StoreResult<Option<Project>>;

    // ========================================================================
    // Builds
    // ========================================================================

    async fn create_build(&self, build: NewBuild) -> StoreResult<BuildRecord>;

    async fn get_build(&self, id: Uuid) -> StoreResult<Option<BuildRecord>>;

    /// Set a build's status, stamping `started_at` on Building and
    /// `finished_at` on Success or Failed.
    async fn update_build_status(&self, id: Uuid, status: BuildStatus) -> StoreResult<()>;
}
