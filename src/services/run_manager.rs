use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use uuid::Uuid;

use crate::{
    configuration::{DirectorySettings, PageTimeouts},
    domain::{CompanyResult, Run, RunEvent, RunRequest, RunStateError, RunStatus},
    services::{
        orchestrator, ArtifactStore, PageConnector, Roaster, SessionProvider, UpdateBroadcaster,
    },
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RunError {
    #[error("run {0} not found")]
    NotFound(Uuid),
}

/// Returned to the caller as soon as a run is scheduled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunHandle {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub stream_url: String,
}

/// The collaborators and limits every run works with.
pub struct Pipeline {
    pub sessions: Arc<dyn SessionProvider>,
    pub connector: Arc<dyn PageConnector>,
    pub roaster: Roaster,
    pub storage: Arc<dyn ArtifactStore>,
    pub directory: DirectorySettings,
    pub timeouts: PageTimeouts,
}

/// Owns the registry of runs and the only way to change them.
///
/// Run tasks report progress exclusively through the methods below; every
/// change is applied to the registry first and then published to the run's
/// subscribers, so both see the same order.
#[derive(Clone)]
pub struct RunManager {
    inner: Arc<Inner>,
}

struct Inner {
    runs: DashMap<Uuid, Run>,
    broadcaster: UpdateBroadcaster,
    pipeline: Pipeline,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    runtime: Handle,
}

impl RunManager {
    /// Run tasks are spawned onto `runtime`, independent of whichever worker
    /// thread receives the request.
    pub fn new(pipeline: Pipeline, runtime: Handle) -> Self {
        RunManager {
            inner: Arc::new(Inner {
                runs: DashMap::new(),
                broadcaster: UpdateBroadcaster::new(),
                pipeline,
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
                runtime,
            }),
        }
    }

    /// Registers a new run and schedules it in the background.
    pub fn start_run(&self, request: RunRequest) -> RunHandle {
        let run_id = Uuid::new_v4();
        self.inner.runs.insert(run_id, Run::new(run_id, Utc::now()));
        log::info!(
            "Started roast run {} from {} source",
            run_id,
            request.source.mode()
        );

        self.mark_running(run_id);
        let status = match self.is_shutting_down() {
            true => {
                self.fail(run_id, "service is shutting down".to_string());
                RunStatus::Failed
            }
            false => {
                let manager = self.clone();
                self.inner.tasks.spawn_on(
                    orchestrator::execute_run(manager, run_id, request),
                    &self.inner.runtime,
                );
                RunStatus::Running
            }
        };

        RunHandle {
            run_id,
            status,
            stream_url: format!("/stream/{}", run_id),
        }
    }

    pub fn get_run(&self, run_id: Uuid) -> Result<Run, RunError> {
        self.inner
            .runs
            .get(&run_id)
            .map(|run| run.clone())
            .ok_or(RunError::NotFound(run_id))
    }

    pub fn broadcaster(&self) -> &UpdateBroadcaster {
        &self.inner.broadcaster
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.inner.pipeline
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stops runs from starting further targets and waits for every run task
    /// to finish.
    pub async fn shutdown(&self) {
        log::info!("Shutting down run manager");
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }

    fn mark_running(&self, run_id: Uuid) {
        self.apply(run_id, |run| run.start().map(|_| None));
    }

    pub(crate) fn set_total(&self, run_id: Uuid, total: usize) {
        self.apply(run_id, |run| run.set_total(total).map(|_| None));
    }

    pub(crate) fn record_result(&self, run_id: Uuid, result: CompanyResult) {
        self.apply(run_id, |run| {
            run.record(result.clone())?;
            Ok(Some(RunEvent::Company(result)))
        });
    }

    pub(crate) fn complete(&self, run_id: Uuid) {
        self.apply(run_id, |run| {
            run.complete(Utc::now())?;
            Ok(RunEvent::terminal(run))
        });
        log::info!("Completed roast run {}", run_id);
    }

    pub(crate) fn fail(&self, run_id: Uuid, message: String) {
        log::error!("Failed roast run {}: {}", run_id, message);
        self.apply(run_id, |run| {
            run.fail(message, Utc::now())?;
            Ok(RunEvent::terminal(run))
        });
    }

    fn apply<F>(&self, run_id: Uuid, change: F)
    where
        F: FnOnce(&mut Run) -> Result<Option<RunEvent>, RunStateError>,
    {
        let event = match self.inner.runs.get_mut(&run_id) {
            Some(mut run) => match change(&mut run) {
                Ok(event) => event,
                Err(e) => {
                    log::error!("Rejected update to run {}: {}", run_id, e);
                    None
                }
            },
            None => {
                log::error!("Update for unknown run {}", run_id);
                None
            }
        };

        if let Some(event) = event {
            self.inner.broadcaster.publish(run_id, &event);
        }
    }
}
