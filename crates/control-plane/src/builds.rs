//! Container image builds.
//!
//! The actual image build is an external collaborator behind [`Builder`]; logs
//! are persisted through a [`LogDriver`] once a build finishes.
//! [`CommandBuilder`] runs a configured external program as a builder.

mod command;

pub use command::CommandBuilder;

use std::collections::BTreeMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use node_runtime::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::{BuildRecord, BuildStatus, NewBuild, Store};

/// Current version of the stored build log envelope.
pub const BUILD_LOGS_VERSION: i16 = 1;

/// One line of build output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub level: String,
}

/// Versioned envelope for stored build logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildLogsV1 {
    pub version: i16,
    pub logs: Vec<LogEntry>,
}

#[derive(Deserialize)]
struct VersionHeader {
    version: i16,
}

/// Serialize logs into the current envelope.
pub fn encode_logs(logs: &[LogEntry]) -> Result<Vec<u8>> {
    let envelope = BuildLogsV1 {
        version: BUILD_LOGS_VERSION,
        logs: logs.to_vec(),
    };
    serde_json::to_vec(&envelope)
        .map_err(|e| Error::internal("Failed to encode build logs").with_source(e))
}

/// Parse a stored envelope, rejecting versions this build does not know.
pub fn decode_logs(data: &[u8]) -> Result<Vec<LogEntry>> {
    let header: VersionHeader = serde_json::from_slice(data)
        .map_err(|e| Error::internal("Failed to decode build logs").with_source(e))?;
    if header.version != BUILD_LOGS_VERSION {
        return Err(Error::internal(format!(
            "Unsupported build logs version {}",
            header.version
        )));
    }

    let envelope: BuildLogsV1 = serde_json::from_slice(data)
        .map_err(|e| Error::internal("Failed to decode build logs").with_source(e))?;
    Ok(envelope.logs)
}

/// Long-term storage for build logs.
#[async_trait]
pub trait LogDriver: Send + Sync {
    async fn get_logs(&self, build_id: Uuid) -> Result<Vec<LogEntry>>;

    async fn save_logs(&self, build_id: Uuid, logs: &[LogEntry]) -> Result<()>;
}

/// Builds container images from an uploaded context.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Name used to select this builder.
    fn name(&self) -> &str;

    /// Build an image from a zipped build context.
    async fn build(&self, build_id: Uuid, context: Vec<u8>) -> Result<()>;

    /// Live logs for a build.
    async fn logs(&self, build_id: Uuid) -> Result<Vec<LogEntry>>;
}

/// [`LogDriver`] writing one JSON file per build.
#[derive(Debug, Clone)]
pub struct FsLogDriver {
    root: PathBuf,
}

impl FsLogDriver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, build_id: Uuid) -> PathBuf {
        self.root.join(format!("{build_id}.json"))
    }
}

#[async_trait]
impl LogDriver for FsLogDriver {
    async fn get_logs(&self, build_id: Uuid) -> Result<Vec<LogEntry>> {
        let data = match tokio::fs::read(self.path(build_id)).await {
            Ok(data) => data,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(Error::not_found("Build logs not found"));
            }
            Err(e) => return Err(Error::internal("Failed to read build logs").with_source(e)),
        };
        decode_logs(&data)
    }

    async fn save_logs(&self, build_id: Uuid, logs: &[LogEntry]) -> Result<()> {
        let data = encode_logs(logs)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::internal("Failed to create build log directory").with_source(e))?;
        tokio::fs::write(self.path(build_id), data)
            .await
            .map_err(|e| Error::internal("Failed to write build logs").with_source(e))
    }
}

/// User-facing view of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: Uuid,
    #[serde(rename = "projectID")]
    pub project_id: Uuid,
    pub builder: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<LogEntry>>,
}

impl From<BuildRecord> for Build {
    fn from(record: BuildRecord) -> Self {
        Self {
            id: record.id,
            project_id: record.project_id,
            builder: record.builder,
            status: record.status,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
            logs: None,
        }
    }
}

/// Runs builds in the background and serves their status and logs.
#[derive(Clone)]
pub struct BuildService {
    store: Arc<dyn Store>,
    log_driver: Arc<dyn LogDriver>,
    builders: BTreeMap<String, Arc<dyn Builder>>,
}

impl BuildService {
    pub fn new(store: Arc<dyn Store>, log_driver: Arc<dyn LogDriver>) -> Self {
        Self {
            store,
            log_driver,
            builders: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_builder(mut self, builder: Arc<dyn Builder>) -> Self {
        self.builders.insert(builder.name().to_string(), builder);
        self
    }

    fn builder(&self, name: &str) -> Result<Arc<dyn Builder>> {
        self.builders.get(name).cloned().ok_or_else(|| {
            let known: Vec<&str> = self.builders.keys().map(String::as_str).collect();
            Error::bad_request(format!("Unknown builder: {name}"))
                .with_suggestion(format!("Available builders: {}", known.join(", ")))
        })
    }

    /// Record a build and start it in the background.
    pub async fn create(
        &self,
        account_id: Uuid,
        project_id: Uuid,
        builder: &str,
        context: Vec<u8>,
    ) -> Result<Build> {
        let runner = self.builder(builder)?;
        let record = self
            .store
            .create_build(NewBuild {
                project_id,
                created_by: account_id,
                builder: runner.name().to_string(),
            })
            .await
            .map_err(|e| Error::internal("Failed to create build").with_source(e))?;
        info!(build_id = %record.id, builder = %record.builder, "Build created");

        let service = self.clone();
        let build_id = record.id;
        tokio::spawn(async move { service.run(runner, build_id, context).await });

        Ok(record.into())
    }

    async fn run(&self, builder: Arc<dyn Builder>, build_id: Uuid, context: Vec<u8>) {
        self.set_status(build_id, BuildStatus::Building).await;

        let status = match builder.build(build_id, context).await {
            Ok(()) => BuildStatus::Success,
            Err(e) => {
                warn!(build_id = %build_id, error = %e, "Build failed");
                BuildStatus::Failed
            }
        };

        match builder.logs(build_id).await {
            Ok(logs) => {
                if let Err(e) = self.log_driver.save_logs(build_id, &logs).await {
                    error!(build_id = %build_id, error = %e, "Failed to save build logs");
                }
            }
            Err(e) => error!(build_id = %build_id, error = %e, "Failed to fetch build logs"),
        }

        self.set_status(build_id, status).await;
        info!(build_id = %build_id, status = ?status, "Build finished");
    }

    async fn set_status(&self, build_id: Uuid, status: BuildStatus) {
        if let Err(e) = self.store.update_build_status(build_id, status).await {
            error!(build_id = %build_id, error = %e, "Failed to update build status");
        }
    }

    /// Build status, optionally with logs.
    ///
    /// Logs of finished builds come from the log driver; running builds are
    /// asked for their live logs.
    pub async fn get(&self, build_id: Uuid, with_logs: bool) -> Result<Build> {
        let record = self
            .store
            .get_build(build_id)
            .await
            .map_err(|e| Error::internal("Failed to get build").with_source(e))?
            .ok_or_else(|| Error::not_found("Build not found"))?;

        let logs = if !with_logs {
            None
        } else if record.status.is_finished() {
            Some(
                self.log_driver
                    .get_logs(build_id)
                    .await
                    .context("failed to get build logs")?,
            )
        } else {
            Some(
                self.builder(&record.builder)?
                    .logs(build_id)
                    .await
                    .context("failed to get live build logs")?,
            )
        };

        let mut build = Build::from(record);
        build.logs = logs;
        Ok(build)
    }
}
