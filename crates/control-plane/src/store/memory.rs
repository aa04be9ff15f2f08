//! In-memory [`Store`] implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use node_runtime::Status;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    BuildRecord, BuildStatus, NewBuild, NewSession, Pagination, Project, SessionRecord,
    SshKeyRecord, Store, StoreError, StoreResult,
};

#[derive(Default)]
struct Tables {
    sessions: HashMap<Uuid, SessionRecord>,
    /// Insertion order, used for stable paging.
    session_order: Vec<Uuid>,
    ssh_keys: Vec<SshKeyRecord>,
    projects: HashMap<Uuid, Project>,
    builds: HashMap<Uuid, BuildRecord>,
}

/// Process-local store behind a single async lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_session(&self, session: NewSession) -> StoreResult<SessionRecord> {
        let record = SessionRecord {
            id: Uuid::new_v4(),
            name: session.name,
            created_by: session.created_by,
            project_id: session.project_id,
            node_id: session.node_id,
            provider: session.provider,
            region: session.region,
            node_type_id: session.node_type_id,
            ssh_key: session.ssh_key.without_private_key(),
            status: Status::Initializing,
            created_at: Utc::now(),
            ready_at: None,
            exited_at: None,
        };

        let mut tables = self.tables.write().await;
        tables.session_order.push(record.id);
        tables.sessions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<SessionRecord>> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn update_session_status(&self, id: Uuid, status: Status) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let session = tables
            .sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("session {id} does not exist")))?;

        // Status only moves forward; Terminated is absorbing.
        if status <= session.status {
            debug!(
                session_id = %id,
                current = %session.status,
                status = %status,
                "Ignoring status write that does not advance the session"
            );
            return Ok(());
        }

        let now = Utc::now();
        match status {
            Status::Active if session.ready_at.is_none() => session.ready_at = Some(now),
            Status::Terminated => session.exited_at = Some(now),
            _ => {}
        }
        session.status = status;
        Ok(())
    }

    async fn list_sessions(
        &self,
        project_id: Uuid,
        page: Pagination,
    ) -> StoreResult<Vec<SessionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .session_order
            .iter()
            .filter_map(|id| tables.sessions.get(id))
            .filter(|s| s.project_id == project_id)
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn add_ssh_key(
        &self,
        owner_id: Uuid,
        name: &str,
        public_key: &str,
    ) -> StoreResult<SshKeyRecord> {
        let mut tables = self.tables.write().await;
        let owned = tables.ssh_keys.iter().filter(|k| k.owner_id == owner_id);
        for key in owned {
            if key.name == name {
                return Err(StoreError::Conflict(format!("ssh key name {name} already exists")));
            }
            if key.public_key == public_key {
                return Err(StoreError::Conflict("ssh public key already exists".into()));
            }
        }

        let record = SshKeyRecord {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            public_key: public_key.to_string(),
            created_at: Utc::now(),
        };
        tables.ssh_keys.push(record.clone());
        Ok(record)
    }

    async fn get_ssh_key_by_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<SshKeyRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ssh_keys
            .iter()
            .find(|k| k.owner_id == owner_id && k.name == name)
            .cloned())
    }

    async fn get_ssh_key_by_public_key(
        &self,
        owner_id: Uuid,
        public_key: &str,
    ) -> StoreResult<Option<SshKeyRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ssh_keys
            .iter()
            .find(|k| k.owner_id == owner_id && k.public_key == public_key)
            .cloned())
    }

    async fn list_ssh_keys(&self, owner_id: Uuid) -> StoreResult<Vec<SshKeyRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .ssh_keys
            .iter()
            .filter(|k| k.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn create_project(&self, owner_id: Uuid, name: &str) -> StoreResult<Project> {
        let mut tables = self.tables.write().await;
        if tables
            .projects
            .values()
            .any(|p| p.owner_id == owner_id && p.name == name)
        {
            return Err(StoreError::Conflict(format!("project {name} already exists")));
        }

        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id,
            created_at: Utc::now(),
        };
        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn create_build(&self, build: NewBuild) -> StoreResult<BuildRecord> {
        let record = BuildRecord {
            id: Uuid::new_v4(),
            project_id: build.project_id,
            created_by: build.created_by,
            builder: build.builder,
            status: BuildStatus::Initializing,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        self.tables
            .write()
            .await
            .builds
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_build(&self, id: Uuid) -> StoreResult<Option<BuildRecord>> {
        Ok(self.tables.read().await.builds.get(&id).cloned())
    }

    async fn update_build_status(&self, id: Uuid, status: BuildStatus) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let build = tables
            .builds
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("build {id} does not exist")))?;

        let now = Utc::now();
        match status {
            BuildStatus::Building => build.started_at = Some(now),
            BuildStatus::Success | BuildStatus::Failed => build.finished_at = Some(now),
            BuildStatus::Initializing => {}
        }
        build.status = status;
        Ok(())
    }
}
