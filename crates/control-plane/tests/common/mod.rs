//! Shared fakes for control plane integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use control_plane::store::{
    BuildRecord, BuildStatus, MemoryStore, NewBuild, NewSession, Pagination, Project,
    SessionRecord, SshKeyRecord, Store, StoreError, StoreResult,
};
use futures::stream::{self, StreamExt};
use node_runtime::{
    Error, ErrorKind, Initializer, Node, NodeSpecs, NodeType, Result, Runtime, RuntimeProvider,
    SshKey, Status, WatchEvent, WatchStream,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const PUBLIC_KEY: &str =
    "ssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIOMqqnkVzrm0SdG6UOoqKLsabgH5C9okWi0dh2l9GKJl";

// ============================================================================
// Fake runtime
// ============================================================================

/// Scripted watch feed item.
#[derive(Debug, Clone)]
pub enum FeedItem {
    Status(Status),
    Error(&'static str),
    Done,
}

#[derive(Default)]
pub struct FakeState {
    pub provider_keys: Mutex<Vec<SshKey>>,
    pub node_types: Mutex<Vec<NodeType>>,
    pub init_error: Mutex<Option<ErrorKind>>,
    pub feed: Mutex<Vec<FeedItem>>,
    /// Keep the feed open after the script until cancelled.
    pub hold_feed_open: AtomicBool,
    pub add_key_calls: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub terminated: Mutex<Vec<String>>,
}

/// In-process runtime. Clones share state.
#[derive(Clone, Default)]
pub struct FakeRuntime {
    pub state: Arc<FakeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(self, items: Vec<FeedItem>) -> Self {
        *self.state.feed.lock().unwrap() = items;
        self
    }

    pub fn holding_feed_open(self) -> Self {
        self.state.hold_feed_open.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_init(self, kind: ErrorKind) -> Self {
        *self.state.init_error.lock().unwrap() = Some(kind);
        self
    }

    pub fn with_node_types(self, node_types: Vec<NodeType>) -> Self {
        *self.state.node_types.lock().unwrap() = node_types;
        self
    }

    pub fn add_key_calls(&self) -> usize {
        self.state.add_key_calls.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> Vec<String> {
        self.state.terminated.lock().unwrap().clone()
    }
}

pub fn node_type(id: &str, regions: &[&str]) -> NodeType {
    NodeType {
        id: id.to_string(),
        name: Some(id.to_string()),
        price: Some(110),
        regions: regions.iter().map(|r| (*r).to_string()).collect(),
        description: None,
        provider: RuntimeProvider::LambdaLabs,
        specs: NodeSpecs {
            vcpus: 30,
            memory: 200,
            gpu_memory: Some(24),
        },
    }
}

#[async_trait]
impl Runtime for FakeRuntime {
    fn provider(&self) -> RuntimeProvider {
        RuntimeProvider::LambdaLabs
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        Ok(self.state.provider_keys.lock().unwrap().clone())
    }

    async fn add_ssh_key(&self, key: SshKey) -> Result<SshKey> {
        self.state.add_key_calls.fetch_add(1, Ordering::SeqCst);
        self.state.provider_keys.lock().unwrap().push(key.clone());
        Ok(key)
    }

    async fn list_node_types(&self) -> Result<Vec<NodeType>> {
        Ok(self.state.node_types.lock().unwrap().clone())
    }

    async fn init_node(
        &self,
        key: &SshKey,
        node_type_id: &str,
        region: Option<&str>,
    ) -> Result<Node> {
        let n = self.state.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = *self.state.init_error.lock().unwrap() {
            return Err(Error::new(kind, "scripted init failure")
                .with_provider(RuntimeProvider::LambdaLabs));
        }
        Ok(Node {
            id: format!("node-{n}"),
            type_id: node_type_id.to_string(),
            region: region.unwrap_or("us-east-1").to_string(),
            ssh_key: key.clone(),
            status: Status::Initializing,
            provider: RuntimeProvider::LambdaLabs,
        })
    }

    async fn terminate_node(&self, node_id: &str) -> Result<()> {
        self.state.terminated.lock().unwrap().push(node_id.to_string());
        Ok(())
    }

    fn watch(&self, _node_id: &str, cancel: CancellationToken) -> WatchStream {
        let events: Vec<WatchEvent> = self
            .state
            .feed
            .lock()
            .unwrap()
            .iter()
            .map(|item| match item {
                FeedItem::Status(status) => WatchEvent::Status(*status),
                FeedItem::Error(message) => WatchEvent::Error(Error::internal(*message)),
                FeedItem::Done => WatchEvent::Done,
            })
            .collect();

        let head = stream::iter(events);
        if self.state.hold_feed_open.load(Ordering::SeqCst) {
            head.chain(stream::once(async move {
                cancel.cancelled().await;
                WatchEvent::Done
            }))
            .boxed()
        } else {
            head.boxed()
        }
    }
}

// ============================================================================
// Fake initializer
// ============================================================================

pub struct FakeInitializer {
    pub runtime: FakeRuntime,
    pub calls: AtomicUsize,
    pub fail: Option<ErrorKind>,
}

impl FakeInitializer {
    pub fn new(runtime: FakeRuntime) -> Self {
        Self {
            runtime,
            calls: AtomicUsize::new(0),
            fail: None,
        }
    }

    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            fail: Some(kind),
            ..Self::new(FakeRuntime::new())
        }
    }
}

#[async_trait]
impl Initializer for FakeInitializer {
    async fn initialize(
        &self,
        _account_id: Uuid,
        provider: RuntimeProvider,
    ) -> Result<Box<dyn Runtime>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(kind) = self.fail {
            return Err(Error::new(kind, "scripted initializer failure").with_provider(provider));
        }
        Ok(Box::new(self.runtime.clone()))
    }
}

// ============================================================================
// Recording store
// ============================================================================

/// [`MemoryStore`] wrapper that records session writes and key lookups.
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub status_updates: Mutex<Vec<(Uuid, Status)>>,
    pub status_attempts: AtomicUsize,
    pub public_key_lookups: AtomicUsize,
    pub fail_status_updates: AtomicBool,
    pub fail_create_session: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates_for(&self, session_id: Uuid) -> Vec<Status> {
        self.status_updates
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == session_id)
            .map(|(_, status)| *status)
            .collect()
    }

    pub fn public_key_lookups(&self) -> usize {
        self.public_key_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn create_session(&self, session: NewSession) -> StoreResult<SessionRecord> {
        if self.fail_create_session.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("scripted create failure".into()));
        }
        self.inner.create_session(session).await
    }

    async fn get_session(&self, id: Uuid) -> StoreResult<Option<SessionRecord>> {
        self.inner.get_session(id).await
    }

    async fn update_session_status(&self, id: Uuid, status: Status) -> StoreResult<()> {
        self.status_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_status_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("scripted update failure".into()));
        }
        self.inner.update_session_status(id, status).await?;
        self.status_updates.lock().unwrap().push((id, status));
        Ok(())
    }

    async fn list_sessions(
        &self,
        project_id: Uuid,
        page: Pagination,
    ) -> StoreResult<Vec<SessionRecord>> {
        self.inner.list_sessions(project_id, page).await
    }

    async fn add_ssh_key(
        &self,
        owner_id: Uuid,
        name: &str,
        public_key: &str,
    ) -> StoreResult<SshKeyRecord> {
        self.inner.add_ssh_key(owner_id, name, public_key).await
    }

    async fn get_ssh_key_by_name(
        &self,
        owner_id: Uuid,
        name: &str,
    ) -> StoreResult<Option<SshKeyRecord>> {
        self.inner.get_ssh_key_by_name(owner_id, name).await
    }

    async fn get_ssh_key_by_public_key(
        &self,
        owner_id: Uuid,
        public_key: &str,
    ) -> StoreResult<Option<SshKeyRecord>> {
        self.public_key_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_ssh_key_by_public_key(owner_id, public_key).await
    }

    async fn list_ssh_keys(&self, owner_id: Uuid) -> StoreResult<Vec<SshKeyRecord>> {
        self.inner.list_ssh_keys(owner_id).await
    }

    async fn create_project(&self, owner_id: Uuid, name: &str) -> StoreResult<Project> {
        self.inner.create_project(owner_id, name).await
    }

    async fn get_project(&self, id: Uuid) -> StoreResult<Option<Project>> {
        self.inner.get_project(id).await
    }

    async fn create_build(&self, build: NewBuild) -> StoreResult<BuildRecord> {
        self.inner.create_build(build).await
    }

    async fn get_build(&self, id: Uuid) -> StoreResult<Option<BuildRecord>> {
        self.inner.get_build(id).await
    }

    async fn update_build_status(&self, id: Uuid, status: BuildStatus) -> StoreResult<()> {
        self.inner.update_build_status(id, status).await
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
