//! Scoped tracking run

use super::store::{RunInfo, RunStatus, TrackingStore};
use crate::error::Result;
use tracing::warn;

/// An open run that is always terminated.
///
/// `finish` ends the run as `FINISHED`. Dropping the guard without
/// finishing ends it as `FAILED`, so every early return or `?` inside the
/// logging code still closes the run on the backend.
pub struct RunGuard<'a> {
    store: &'a dyn TrackingStore,
    info: RunInfo,
    closed: bool,
}

impl<'a> RunGuard<'a> {
    /// Create a run and take responsibility for ending it
    pub fn start(store: &'a dyn TrackingStore, experiment_id: &str, run_name: &str) -> Result<Self> {
        let info = store.create_run(experiment_id, run_name)?;
        Ok(Self {
            store,
            info,
            closed: false,
        })
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    /// End the run successfully and return its id
    pub fn finish(mut self) -> Result<String> {
        self.closed = true;
        self.store.end_run(&self.info.run_id, RunStatus::Finished)?;
        Ok(self.info.run_id.clone())
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.store.end_run(&self.info.run_id, RunStatus::Failed) {
            warn!(run_id = %self.info.run_id, error = %e, "Failed to close abandoned run");
        }
    }
}
