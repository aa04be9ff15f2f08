//! LambdaLabs Cloud API client implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::models::{
    AddSshKeyBody, ApiErrorBody, ApiErrorResponse, ApiResponse, InstanceResource,
    InstanceTypeEntry, InstanceTypes, LaunchInstanceBody, LaunchInstanceData, SshKeyResource,
    TerminateInstanceBody, TerminateInstanceData,
};
use crate::error::{Error, ErrorKind, Result};
use crate::names::random_phrase;
use crate::runtime::{Runtime, WatchEvent, WatchStream};
use crate::types::{Node, NodeSpecs, NodeType, RuntimeProvider, SshKey, Status};

/// Base URL for the LambdaLabs Cloud API.
pub const API_BASE_URL: &str = "https://cloud.lambdalabs.com/api/v1";

/// Default polling interval when watching an instance.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

const PROVIDER: RuntimeProvider = RuntimeProvider::LambdaLabs;

const CREDENTIALS_SUGGESTION: &str = "Make sure your LambdaLabs credentials are up to date";

const STATUS_PAGE_SUGGESTION: &str = "LambdaLabs might be experiencing issues. \
     Check the service status page at https://status.lambdalabs.com/";

/// LambdaLabs runtime.
///
/// `terminate_node` is not idempotent: LambdaLabs rejects terminating an
/// instance that is already gone, which surfaces as `NotFound` or `BadRequest`.
#[derive(Clone)]
pub struct LambdaLabs {
    /// HTTP client.
    client: Client,
    /// API key for bearer authentication.
    api_key: String,
    /// API base URL, without trailing slash.
    base_url: String,
    /// Interval between instance polls in `watch`.
    poll_interval: Duration,
}

impl LambdaLabs {
    /// Create a runtime talking to the public LambdaLabs API.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, API_BASE_URL)
    }

    /// Create a runtime talking to a custom API endpoint.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                Error::internal("Failed to create LambdaLabs client")
                    .with_provider(PROVIDER)
                    .with_source(e)
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the interval between polls in `watch`.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "GET request");
        self.send(self.client.get(&url)).await
    }

    /// Make an authenticated POST request.
    async fn post<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "POST request");
        self.send(self.client.post(&url).json(body)).await
    }

    /// Send a request and unwrap the `{data}` envelope.
    async fn send<T: serde::de::DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if status.is_success() {
            serde_json::from_str::<ApiResponse<T>>(&text)
                .map(|envelope| envelope.data)
                .map_err(|e| {
                    warn!(error = %e, body = %text, "Failed to parse response");
                    Error::internal("Unexpected response from LambdaLabs")
                        .with_provider(PROVIDER)
                        .with_source(e)
                })
        } else {
            let body = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|e| e.error)
                .unwrap_or_default();
            Err(api_error(status, body))
        }
    }

    async fn get_instance(&self, id: &str) -> Result<InstanceResource> {
        self.get(&format!("/instances/{id}")).await
    }

    /// Pick the first region with capacity for `node_type_id`.
    async fn find_region(&self, node_type_id: &str) -> Result<String> {
        let node_types = self
            .list_node_types()
            .await
            .map_err(|e| e.context("failed to list instance availability"))?;

        if let Some(region) = node_types
            .iter()
            .filter(|nt| nt.id == node_type_id)
            .find_map(|nt| nt.regions.first())
        {
            return Ok(region.clone());
        }

        let suggestion = serde_json::to_string(&node_types).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to marshal available instances to JSON");
            String::new()
        });
        Err(Error::capacity_exhausted(format!(
            "No region with available capacity for node type {node_type_id:?}"
        ))
        .with_provider(PROVIDER)
        .with_suggestion(suggestion))
    }

    /// Current catalog as pretty JSON. Best effort, empty on failure.
    async fn catalog_snapshot(&self) -> String {
        let node_types = match self.list_node_types().await {
            Ok(node_types) => node_types,
            Err(e) => {
                warn!(error = %e, "Failed to get a list of available instances");
                return String::new();
            }
        };
        serde_json::to_string_pretty(&node_types).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to marshal available instances to JSON");
            String::new()
        })
    }

    /// Convert a catalog entry to our `NodeType`.
    fn to_node_type(id: &str, entry: &InstanceTypeEntry) -> NodeType {
        let instance_type = &entry.instance_type;
        NodeType {
            id: id.to_string(),
            name: Some(instance_type.description.clone()).filter(|d| !d.is_empty()),
            price: Some(instance_type.price_cents_per_hour),
            regions: entry
                .regions_with_capacity_available
                .iter()
                .map(|r| r.name.clone())
                .collect(),
            description: None,
            provider: PROVIDER,
            specs: NodeSpecs {
                vcpus: instance_type.specs.vcpus,
                memory: instance_type.specs.memory_gib,
                gpu_memory: None,
            },
        }
    }

    fn to_ssh_key(resource: SshKeyResource) -> SshKey {
        SshKey {
            name: resource.name,
            public_key: Some(resource.public_key),
            private_key: resource.private_key,
            created_at: None,
        }
    }
}

#[async_trait]
impl Runtime for LambdaLabs {
    fn provider(&self) -> RuntimeProvider {
        PROVIDER
    }

    async fn list_ssh_keys(&self) -> Result<Vec<SshKey>> {
        info!("Listing SSH keys");
        let keys: Vec<SshKeyResource> = self.get("/ssh-keys").await?;
        Ok(keys.into_iter().map(Self::to_ssh_key).collect())
    }

    async fn add_ssh_key(&self, key: SshKey) -> Result<SshKey> {
        if key.name.is_empty() {
            return Err(Error::bad_request("SSH key name is required").with_provider(PROVIDER));
        }

        let existing = self
            .list_ssh_keys()
            .await
            .map_err(|e| e.context("failed to list ssh keys"))?;

        if let Some(found) = existing.iter().find(|k| k.name == key.name) {
            if let Some(wanted) = key.public_key.as_deref() {
                if !found.public_key.as_deref().is_some_and(|pk| same_public_key(pk, wanted)) {
                    return Err(Error::bad_request(
                        "SSH key with the same name already exists with a different public key",
                    )
                    .with_provider(PROVIDER));
                }
            }
            info!(ssh_key = %key.name, "SSH key already exists, using existing key");
            return Ok(found.clone());
        }

        if let Some(wanted) = key.public_key.as_deref() {
            if let Some(found) = existing.iter().find(|k| {
                k.public_key
                    .as_deref()
                    .is_some_and(|pk| same_public_key(pk, wanted))
            }) {
                info!(
                    ssh_key = %key.name,
                    existing = %found.name,
                    "Public key already registered, using existing key"
                );
                return Ok(found.clone());
            }
        }

        info!(ssh_key = %key.name, "Adding SSH key");
        let body = AddSshKeyBody {
            name: key.name,
            public_key: key.public_key,
        };
        let created: SshKeyResource = self.post("/ssh-keys", &body).await?;
        Ok(Self::to_ssh_key(created))
    }

    async fn list_node_types(&self) -> Result<Vec<NodeType>> {
        info!("Listing instance availability");
        let catalog: InstanceTypes = self.get("/instance-types").await?;
        Ok(catalog
            .iter()
            .map(|(id, entry)| Self::to_node_type(id, entry))
            .collect())
    }

    async fn init_node(
        &self,
        key: &SshKey,
        node_type_id: &str,
        region: Option<&str>,
    ) -> Result<Node> {
        info!(ssh_key = %key.name, node_type = %node_type_id, "Launching instance");

        let region = match region {
            Some(region) => region.to_string(),
            None => self.find_region(node_type_id).await?,
        };

        let body = LaunchInstanceBody {
            region_name: region.clone(),
            instance_type_name: node_type_id.to_string(),
            ssh_key_names: vec![key.name.clone()],
            file_system_names: Vec::new(),
            quantity: 1,
            name: format!("uw-{}", random_phrase(3, "-")),
        };

        let launched: LaunchInstanceData =
            match self.post("/instance-operations/launch", &body).await {
                Ok(data) => data,
                // LambdaLabs answers 400 when the type has no capacity left; attach
                // the current catalog so the caller can pick something else.
                Err(e)
                    if e.kind() == ErrorKind::BadRequest
                        && e.message().to_lowercase().contains("capacity") =>
                {
                    let message = e.message().to_string();
                    let suggestion = self.catalog_snapshot().await;
                    return Err(Error::capacity_exhausted(message)
                        .with_provider(PROVIDER)
                        .with_suggestion(suggestion)
                        .with_source(e));
                }
                Err(e) => return Err(e),
            };

        let id = launched.instance_ids.into_iter().next().ok_or_else(|| {
            Error::internal("Failed to launch instance").with_provider(PROVIDER)
        })?;

        info!(node_id = %id, region = %region, "Instance launched");
        Ok(Node {
            id,
            type_id: node_type_id.to_string(),
            region,
            ssh_key: key.without_private_key(),
            status: Status::Initializing,
            provider: PROVIDER,
        })
    }

    async fn terminate_node(&self, node_id: &str) -> Result<()> {
        info!(node_id = %node_id, "Terminating instance");
        let body = TerminateInstanceBody {
            instance_ids: vec![node_id.to_string()],
        };
        let _: TerminateInstanceData = self.post("/instance-operations/terminate", &body).await?;
        info!(node_id = %node_id, "Instance terminated");
        Ok(())
    }

    fn watch(&self, node_id: &str, cancel: CancellationToken) -> WatchStream {
        let state = WatchState {
            runtime: self.clone(),
            node_id: node_id.to_string(),
            cancel,
            last: None,
            phase: Phase::First,
        };
        stream::unfold(state, WatchState::next).fuse().boxed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Nothing polled yet; poll without waiting.
    First,
    Polling,
    /// A terminal status was emitted; `Done` is next.
    Draining,
    Finished,
}

/// Polling state behind `LambdaLabs::watch`.
struct WatchState {
    runtime: LambdaLabs,
    node_id: String,
    cancel: CancellationToken,
    last: Option<Status>,
    phase: Phase,
}

impl WatchState {
    async fn next(mut self) -> Option<(WatchEvent, Self)> {
        match self.phase {
            Phase::Finished => return None,
            Phase::Draining => return Some(self.finish(WatchEvent::Done)),
            Phase::First | Phase::Polling => {}
        }

        loop {
            if self.phase == Phase::Polling {
                let cancelled = tokio::select! {
                    () = self.cancel.cancelled() => true,
                    () = tokio::time::sleep(self.runtime.poll_interval) => false,
                };
                if cancelled {
                    return Some(self.finish(WatchEvent::Done));
                }
            }
            self.phase = Phase::Polling;

            let polled = tokio::select! {
                () = self.cancel.cancelled() => None,
                result = self.runtime.get_instance(&self.node_id) => Some(result),
            };
            let Some(result) = polled else {
                return Some(self.finish(WatchEvent::Done));
            };

            let status = match result {
                Ok(instance) => match instance_status(&instance.status) {
                    Some(status) => status,
                    None => {
                        debug!(
                            node_id = %self.node_id,
                            status = %instance.status,
                            "Ignoring instance status"
                        );
                        continue;
                    }
                },
                // LambdaLabs eventually forgets terminated instances.
                Err(e) if e.kind() == ErrorKind::NotFound => Status::Terminated,
                Err(e) => return Some(self.finish(WatchEvent::Error(e))),
            };

            if self.last == Some(status) {
                continue;
            }
            self.last = Some(status);
            if status.is_terminal() {
                self.phase = Phase::Draining;
            }
            debug!(node_id = %self.node_id, status = %status, "Instance status changed");
            return Some((WatchEvent::Status(status), self));
        }
    }

    fn finish(mut self, event: WatchEvent) -> (WatchEvent, Self) {
        self.phase = Phase::Finished;
        (event, self)
    }
}

/// Map a LambdaLabs instance status onto the lifecycle.
fn instance_status(status: &str) -> Option<Status> {
    match status {
        "booting" => Some(Status::Initializing),
        "active" => Some(Status::Active),
        "terminated" => Some(Status::Terminated),
        _ => None,
    }
}

/// Compare two authorized-key lines on algorithm and key material only.
fn same_public_key(a: &str, b: &str) -> bool {
    fn material(s: &str) -> Vec<&str> {
        s.split_whitespace().take(2).collect()
    }
    material(a) == material(b)
}

fn transport_error(e: reqwest::Error) -> Error {
    Error::internal("Failed to reach LambdaLabs")
        .with_provider(PROVIDER)
        .with_suggestion(STATUS_PAGE_SUGGESTION)
        .with_source(e)
}

/// Normalize a LambdaLabs error response into the common taxonomy.
fn api_error(status: StatusCode, body: ApiErrorBody) -> Error {
    let (kind, suggestion) = match status {
        StatusCode::BAD_REQUEST => (ErrorKind::BadRequest, None),
        StatusCode::UNAUTHORIZED => (ErrorKind::Unauthorized, Some(CREDENTIALS_SUGGESTION)),
        StatusCode::FORBIDDEN => (ErrorKind::Forbidden, Some(CREDENTIALS_SUGGESTION)),
        StatusCode::NOT_FOUND => (ErrorKind::NotFound, None),
        StatusCode::INTERNAL_SERVER_ERROR => (ErrorKind::Internal, Some(STATUS_PAGE_SUGGESTION)),
        other => (ErrorKind::Unknown(other.as_u16()), None),
    };

    let message = if body.message.is_empty() {
        "Unknown error".to_string()
    } else {
        body.message
    };
    let suggestion = suggestion
        .map(str::to_string)
        .or(body.suggestion)
        .unwrap_or_default();

    debug!(status = %status, code = ?body.code, "LambdaLabs API error");
    Error::new(kind, message)
        .with_provider(PROVIDER)
        .with_suggestion(suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_mapping() {
        let cases = [
            (StatusCode::BAD_REQUEST, ErrorKind::BadRequest),
            (StatusCode::UNAUTHORIZED, ErrorKind::Unauthorized),
            (StatusCode::FORBIDDEN, ErrorKind::Forbidden),
            (StatusCode::NOT_FOUND, ErrorKind::NotFound),
            (StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal),
            (StatusCode::IM_A_TEAPOT, ErrorKind::Unknown(418)),
        ];
        for (status, kind) in cases {
            let err = api_error(status, ApiErrorBody::default());
            assert_eq!(err.kind(), kind);
            assert_eq!(err.code(), status.as_u16());
            assert_eq!(err.provider(), Some(RuntimeProvider::LambdaLabs));
            assert_eq!(err.message(), "Unknown error");
        }
    }

    #[test]
    fn test_credential_errors_carry_suggestion() {
        let err = api_error(
            StatusCode::UNAUTHORIZED,
            ApiErrorBody {
                code: Some("global/invalid-api-key".into()),
                message: "API key was invalid, expired, or deleted.".into(),
                suggestion: None,
            },
        );
        assert_eq!(err.message(), "API key was invalid, expired, or deleted.");
        assert_eq!(err.suggestion(), Some(CREDENTIALS_SUGGESTION));
    }

    #[test]
    fn test_instance_status_mapping() {
        assert_eq!(instance_status("booting"), Some(Status::Initializing));
        assert_eq!(instance_status("active"), Some(Status::Active));
        assert_eq!(instance_status("terminated"), Some(Status::Terminated));
        assert_eq!(instance_status("unhealthy"), None);
        assert_eq!(instance_status("terminating"), None);
    }

    #[test]
    fn test_same_public_key_ignores_comment() {
        assert!(same_public_key(
            "ssh-ed25519 AAAAC3Nza alice@laptop",
            "ssh-ed25519 AAAAC3Nza"
        ));
        assert!(!same_public_key("ssh-ed25519 AAAAC3Nza", "ssh-ed25519 AAAAC3Nzb"));
    }
}
