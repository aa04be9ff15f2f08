//! [`Builder`] that shells out to an external program.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use node_runtime::{Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Builder, LogEntry};

/// Runs `program args... <context-path>` once per build.
///
/// The uploaded context is written to `{work_dir}/{build_id}.zip` for the
/// duration of the run and `BUILD_ID` is set in the child's environment.
/// Each stdout line is logged at `info`, each stderr line at `error`. A
/// non-zero exit fails the build.
pub struct CommandBuilder {
    name: String,
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    logs: Mutex<HashMap<Uuid, Vec<LogEntry>>>,
}

impl CommandBuilder {
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            logs: Mutex::new(HashMap::new()),
        }
    }

    fn push(&self, build_id: Uuid, level: &str, message: String) {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.entry(build_id).or_default().push(LogEntry {
            timestamp: Utc::now(),
            message,
            level: level.to_string(),
        });
    }

    async fn drain<R>(&self, build_id: Uuid, level: &str, stream: R)
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => self.push(build_id, level, line),
                Ok(None) => break,
                Err(e) => {
                    warn!(build_id = %build_id, error = %e, "Failed to read builder output");
                    break;
                }
            }
        }
    }

    async fn run(&self, build_id: Uuid, context_path: &Path) -> Result<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(context_path)
            .env("BUILD_ID", build_id.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::internal(format!("Failed to start builder '{}'", self.program))
                    .with_source(e)
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::internal("Failed to capture builder stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::internal("Failed to capture builder stderr"))?;

        tokio::join!(
            self.drain(build_id, "info", stdout),
            self.drain(build_id, "error", stderr),
        );

        let status = child
            .wait()
            .await
            .map_err(|e| Error::internal("Failed to wait for builder").with_source(e))?;
        debug!(build_id = %build_id, status = %status, "Builder exited");

        if status.success() {
            Ok(())
        } else {
            Err(Error::internal(format!("Builder exited with {status}")))
        }
    }
}

#[async_trait]
impl Builder for CommandBuilder {
    fn name(&self) -> &str {
        &self.name
    }

    async fn build(&self, build_id: Uuid, context: Vec<u8>) -> Result<()> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| Error::internal("Failed to create build work directory").with_source(e))?;
        let context_path = self.work_dir.join(format!("{build_id}.zip"));
        tokio::fs::write(&context_path, &context)
            .await
            .map_err(|e| Error::internal("Failed to write build context").with_source(e))?;

        info!(build_id = %build_id, program = %self.program, "Running builder");
        let result = self.run(build_id, &context_path).await;

        if let Err(e) = tokio::fs::remove_file(&context_path).await {
            warn!(build_id = %build_id, error = %e, "Failed to remove build context");
        }
        if let Err(e) = &result {
            self.push(build_id, "error", e.to_string());
        }
        result
    }

    async fn logs(&self, build_id: Uuid) -> Result<Vec<LogEntry>> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(logs.get(&build_id).cloned().unwrap_or_default())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(dir: &tempfile::TempDir, script: &str) -> CommandBuilder {
        CommandBuilder::new(
            "shell",
            "sh",
            vec!["-c".into(), script.into()],
            dir.path().join("work"),
        )
    }

    #[tokio::test]
    async fn test_captures_output_and_context() {
        let dir = tempfile::tempdir().unwrap();
        // The context path arrives as $0.
        let builder = shell(
            &dir,
            r#"echo "size $(wc -c < "$0" | tr -d ' ')"; echo "id $BUILD_ID"; echo careful >&2"#,
        );
        let build_id = Uuid::new_v4();

        builder.build(build_id, b"hello".to_vec()).await.unwrap();

        let logs = builder.logs(build_id).await.unwrap();
        let info: Vec<String> = logs
            .iter()
            .filter(|l| l.level == "info")
            .map(|l| l.message.clone())
            .collect();
        assert_eq!(info, vec!["size 5".to_string(), format!("id {build_id}")]);
        assert!(logs
            .iter()
            .any(|l| l.level == "error" && l.message == "careful"));

        let leftover = dir.path().join("work").join(format!("{build_id}.zip"));
        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let builder = shell(&dir, "echo broken; exit 3");
        let build_id = Uuid::new_v4();

        let err = builder.build(build_id, b"ctx".to_vec()).await.unwrap_err();
        assert!(err.message().contains("Builder exited"));

        let logs = builder.logs(build_id).await.unwrap();
        assert_eq!(logs[0].message, "broken");
        assert_eq!(logs.last().unwrap().level, "error");
    }

    #[tokio::test]
    async fn test_missing_program_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let builder = CommandBuilder::new(
            "missing",
            "definitely-not-a-real-builder",
            Vec::new(),
            dir.path(),
        );

        let err = builder.build(Uuid::new_v4(), b"ctx".to_vec()).await.unwrap_err();
        assert!(err.message().contains("Failed to start builder"));
    }

    #[tokio::test]
    async fn test_unknown_build_has_no_logs() {
        let dir = tempfile::tempdir().unwrap();
        let builder = shell(&dir, "true");
        assert!(builder.logs(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
