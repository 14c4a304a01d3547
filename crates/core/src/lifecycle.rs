//! Session lifecycle coordination
//!
//! All session tasks run under one [`TaskGroup`]. The group derives a
//! child done token from the caller's cancellation token, so caller
//! cancellation fans out to every task automatically, and the first task
//! failure trips the same token to unwind the rest. The raw source pumps
//! are never part of the group: endpoint-owned ones follow the done token
//! on their own, host-owned ones are left to the host.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, Result};

pub(crate) struct TaskGroup {
    tasks: JoinSet<(&'static str, Result<()>)>,
    done: CancellationToken,
}

impl TaskGroup {
    pub(crate) fn new(cancel: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            done: cancel.child_token(),
        }
    }

    /// The session's done signal; cancelled when the session unwinds.
    pub(crate) fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    pub(crate) fn spawn<F>(&mut self, label: &'static str, task: F)
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(async move { (label, task.await) });
    }

    /// Join every task. The first failure wins and trips the done token;
    /// later failures are logged and suppressed so they cannot mask the
    /// cause. Caller cancellation takes precedence over teardown-race
    /// errors and surfaces as [`Error::Cancelled`].
    pub(crate) async fn join(mut self, cancel: &CancellationToken) -> Result<()> {
        let mut first: Option<(&'static str, Error)> = None;
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((label, Ok(()))) => debug!("task {} finished", label),
                Ok((label, Err(e))) => {
                    if first.is_none() {
                        self.done.cancel();
                        first = Some((label, e));
                    } else {
                        debug!("task {} failed during teardown: {}", label, e);
                    }
                }
                Err(join_error) => {
                    if first.is_none() {
                        self.done.cancel();
                        first = Some((
                            "join",
                            Error::Other(format!("session task panicked: {join_error}")),
                        ));
                    }
                }
            }
        }
        self.done.cancel();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some((label, e)) = first {
            warn!("session failed in {}: {}", label, e);
            return Err(e);
        }
        Ok(())
    }
}
