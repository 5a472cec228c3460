//! Install and activate.
//!
//! ```text
//! Parsed ──install──▶ Installing ──ok──▶ Installed ──activate──▶ Activating ──▶ Activated
//!                         │
//!                         └──err──▶ Redundant
//! ```
//!
//! A failed first install leaves the static partition untouched and the
//! worker `Redundant`; calling `install` again retries. A failed re-install
//! of an `Activated` worker puts it back in `Activated`.
//!
//! Interception follows [`Worker::is_serving`], not the state: once a
//! partition set has been activated it keeps answering requests while later
//! installs run.

use std::fmt;
use std::sync::atomic::Ordering;

use folio_core::{CacheEntry, Error};
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::Serialize;
use tokio::task::JoinSet;

use super::Worker;
use super::clients::ClientMessage;
use crate::request::WorkerRequest;

/// Meta key holding the fingerprint of the last activated partition set.
pub const ACTIVE_FINGERPRINT_KEY: &str = "active_fingerprint";

/// Message broadcast to pages once offline mode is ready.
pub const ACTIVATED_MESSAGE: &str = "Portfolio ready for offline use!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub precached: usize,
    pub analytics_initialized: bool,
    pub update_available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Stale partitions that were deleted.
    pub deleted: Vec<String>,
    pub claimed: usize,
}

impl Worker {
    /// Move to `next` if the current state is one of `from`. Returns the
    /// state moved out of.
    fn transition(&self, from: &[WorkerState], next: WorkerState) -> Result<WorkerState, Error> {
        let mut current = WorkerState::Parsed;
        let moved = self.state.send_if_modified(|state| {
            current = *state;
            if from.contains(state) {
                *state = next;
                true
            } else {
                false
            }
        });
        if moved {
            tracing::info!(from = %current, to = %next, "worker state");
            Ok(current)
        } else {
            Err(Error::InvalidState(format!("cannot move from {current} to {next}")))
        }
    }

    fn set_state(&self, next: WorkerState) {
        let previous = self.state.send_replace(next);
        tracing::info!(from = %previous, to = %next, "worker state");
    }

    /// Fetch every manifest entry. Any transport error or non-2xx status
    /// fails the whole batch.
    async fn precache(&self) -> Result<Vec<CacheEntry>, Error> {
        let mut tasks = JoinSet::new();
        for (index, url) in self.manifest.iter().enumerate() {
            let network = self.ctx.network.clone();
            let request = WorkerRequest { method: Method::GET, url: url.clone(), headers: HeaderMap::new() };
            tasks.spawn(async move {
                let result = network.fetch(&request).await;
                (index, request, result)
            });
        }

        let mut entries: Vec<Option<CacheEntry>> = vec![None; self.manifest.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, request, result) =
                joined.map_err(|e| Error::InstallFailed(format!("precache task failed: {e}")))?;
            let response = result.map_err(|e| Error::InstallFailed(format!("{}: {e}", request.url)))?;
            if !response.is_ok() {
                return Err(Error::InstallFailed(format!("{}: status {}", request.url, response.status)));
            }
            entries[index] = Some(response.to_entry(&request.url));
        }
        Ok(entries.into_iter().flatten().collect())
    }

    async fn populate(&self) -> Result<(usize, bool), Error> {
        let (precached, initialized) = tokio::join!(self.precache(), self.analytics.ensure_initialized());
        let entries = precached?;
        let initialized = initialized?;
        let count = entries.len();

        let partitions = &self.ctx.partitions;
        self.ctx.db.put_entries(&partitions.static_resources, entries).await?;
        self.ctx.db.open_partition(&partitions.dynamic).await?;
        Ok((count, initialized))
    }

    /// Pre-populate the static partition and initialize the analytics log.
    ///
    /// # Errors
    ///
    /// `INSTALL_FAILED` if any manifest entry cannot be fetched or stored;
    /// the worker is then `Redundant`, or `Activated` again if it was before.
    /// `INVALID_STATE` while another transition is in progress.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let previous = self.transition(
            &[WorkerState::Parsed, WorkerState::Installed, WorkerState::Activated, WorkerState::Redundant],
            WorkerState::Installing,
        )?;

        let (precached, analytics_initialized) = match self.populate().await {
            Ok(done) => done,
            Err(e) => {
                let e = match e {
                    Error::InstallFailed(_) => e,
                    other => Error::InstallFailed(other.to_string()),
                };
                tracing::error!(error = %e, "install failed");
                if previous == WorkerState::Activated {
                    tracing::warn!("keeping the active partitions");
                    self.set_state(WorkerState::Activated);
                } else {
                    self.set_state(WorkerState::Redundant);
                }
                return Err(e);
            }
        };
        self.set_state(WorkerState::Installed);

        let fingerprint = self.ctx.partitions.fingerprint();
        let update_available = match self.ctx.db.get_meta(ACTIVE_FINGERPRINT_KEY).await {
            Ok(Some(active)) => active != fingerprint,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(error = %e, "could not read active fingerprint");
                false
            }
        };
        if update_available {
            let notified = self.clients.broadcast(&ClientMessage::UpdateAvailable { version: fingerprint }, true);
            tracing::info!(notified, "update available");
        }

        tracing::info!(precached, analytics_initialized, "install complete");
        Ok(InstallReport { precached, analytics_initialized, update_available })
    }

    /// Delete stale partitions, claim clients and start intercepting.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        self.transition(&[WorkerState::Installed], WorkerState::Activating)?;

        let deleted = match self.collect_stale_partitions().await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(error = %e, "partition cleanup failed");
                self.set_state(WorkerState::Installed);
                return Err(e);
            }
        };

        let claimed = self.clients.claim_all();
        if let Err(e) = self.ctx.db.set_meta(ACTIVE_FINGERPRINT_KEY, &self.ctx.partitions.fingerprint()).await {
            tracing::warn!(error = %e, "could not record active fingerprint");
        }
        self.serving.store(true, Ordering::Release);
        self.set_state(WorkerState::Activated);

        let notified =
            self.clients.broadcast(&ClientMessage::SwActivated { message: ACTIVATED_MESSAGE.to_string() }, false);
        tracing::info!(deleted = deleted.len(), claimed, notified, "activation complete");
        Ok(ActivationReport { deleted, claimed })
    }

    async fn collect_stale_partitions(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.ctx.db.list_partitions().await? {
            if self.ctx.partitions.contains(&name) {
                continue;
            }
            if self.ctx.db.delete_partition(&name).await? {
                tracing::info!(partition = %name, "deleted stale partition");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    /// Resume a worker that an earlier process activated with the same
    /// partition names, without fetching anything.
    ///
    /// Returns false, leaving the state unchanged, when this partition set
    /// was never activated.
    pub async fn resume(&self) -> Result<bool, Error> {
        let fingerprint = self.ctx.partitions.fingerprint();
        if self.ctx.db.get_meta(ACTIVE_FINGERPRINT_KEY).await?.as_deref() != Some(fingerprint.as_str()) {
            return Ok(false);
        }
        self.transition(&[WorkerState::Parsed], WorkerState::Activated)?;
        self.serving.store(true, Ordering::Release);
        let claimed = self.clients.claim_all();
        tracing::info!(claimed, "resumed active worker");
        Ok(true)
    }

    /// Keep answering from whatever partition set an earlier process
    /// activated, after this worker's own install has failed.
    ///
    /// The state is left as it is, so `install` can be retried. Returns false
    /// when nothing was ever activated.
    pub async fn serve_previous(&self) -> Result<bool, Error> {
        if self.is_serving() {
            return Ok(true);
        }
        let Some(previous) = self.ctx.db.get_meta(ACTIVE_FINGERPRINT_KEY).await? else {
            return Ok(false);
        };
        self.serving.store(true, Ordering::Release);
        let claimed = self.clients.claim_all();
        tracing::warn!(previous = %previous, claimed, "serving previously activated partitions");
        Ok(true)
    }

    /// Install then activate.
    pub async fn start(&self) -> Result<(InstallReport, ActivationReport), Error> {
        let installed = self.install().await?;
        let activated = self.activate().await?;
        Ok((installed, activated))
    }
}
