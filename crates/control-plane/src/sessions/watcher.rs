//! Background status watcher.
//!
//! One task per watched session. It drains the runtime's feed and writes each
//! transition into the store, in feed order, until the feed ends.

use std::sync::Arc;

use futures::StreamExt;
use node_runtime::{WatchEvent, WatchStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::store::Store;

/// Handle to a running watcher task.
///
/// Dropping the handle detaches the task; it keeps running until its feed ends.
#[derive(Debug)]
pub struct WatchHandle {
    session_id: Uuid,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub(crate) fn new(session_id: Uuid, cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            session_id,
            cancel,
            task,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Token that stops the watcher when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask the watcher to stop. Returns immediately.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the watcher task to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(session_id = %self.session_id, error = %e, "Watcher task did not exit cleanly");
        }
    }
}

/// Drain `feed` into the store.
///
/// Stops at the first persistence failure, feed error, terminal status, `Done`
/// or cancellation. The token is cancelled on exit so the feed stops polling.
pub(crate) async fn consume(
    store: Arc<dyn Store>,
    session_id: Uuid,
    mut feed: WatchStream,
    cancel: CancellationToken,
) {
    let _stop_feed = cancel.clone().drop_guard();
    info!(session_id = %session_id, "Starting to watch session");

    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!(session_id = %session_id, "Session watch cancelled");
                break;
            }
            event = feed.next() => event,
        };

        match event {
            Some(WatchEvent::Status(status)) => {
                info!(session_id = %session_id, status = %status, "Session status changed");
                if let Err(e) = store.update_session_status(session_id, status).await {
                    error!(session_id = %session_id, error = %e, "Failed to update session status");
                    break;
                }
                if status.is_terminal() {
                    break;
                }
            }
            Some(WatchEvent::Error(e)) => {
                error!(session_id = %session_id, error = %e, "Failed to watch session");
                break;
            }
            Some(WatchEvent::Done) | None => break,
        }
    }

    info!(session_id = %session_id, "Stopped watching session");
}
