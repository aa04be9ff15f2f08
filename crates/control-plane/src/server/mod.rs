//! HTTP API.
//!
//! Every route except `/health` requires an `X-Account-ID` header. Project
//! scoped routes only resolve projects owned by that account.

mod auth;
mod error;
mod handlers;

pub use auth::{AccountId, ACCOUNT_HEADER};
pub use error::{ApiError, ApiResult, ErrorBody};

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use node_runtime::Initializer;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::builds::{BuildService, LogDriver};
use crate::keys::SshKeyService;
use crate::providers::ProviderService;
use crate::sessions::SessionService;
use crate::store::Store;

/// Services shared by all handlers.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: SessionService,
    pub keys: SshKeyService,
    pub providers: ProviderService,
    pub builds: BuildService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        initializer: Arc<dyn Initializer>,
        log_driver: Arc<dyn LogDriver>,
    ) -> Self {
        Self {
            sessions: SessionService::new(Arc::clone(&store), Arc::clone(&initializer)),
            keys: SshKeyService::new(Arc::clone(&store)),
            providers: ProviderService::new(initializer),
            builds: BuildService::new(Arc::clone(&store), log_driver),
            store,
        }
    }

    /// Replace the build service, e.g. to register builders.
    #[must_use]
    pub fn with_builds(mut self, builds: BuildService) -> Self {
        self.builds = builds;
        self
    }
}

/// Build the API router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Projects
        .route("/projects", post(handlers::create_project))
        .route("/projects/{project}", get(handlers::get_project))
        // Providers
        .route(
            "/providers/{provider}/node-types",
            get(handlers::list_node_types),
        )
        // SSH keys
        .route(
            "/ssh-keys",
            get(handlers::list_ssh_keys).post(handlers::add_ssh_key),
        )
        .route("/ssh-keys/generate", post(handlers::generate_ssh_key))
        // Sessions
        .route(
            "/projects/{project}/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/projects/{project}/sessions/{session}",
            get(handlers::get_session),
        )
        .route(
            "/projects/{project}/sessions/{session}/terminate",
            put(handlers::terminate_session),
        )
        // Builds
        .route("/projects/{project}/builds", post(handlers::create_build))
        .route(
            "/projects/{project}/builds/{build}",
            get(handlers::get_build),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Control plane listening");
    }
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
