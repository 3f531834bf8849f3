//! Starting training runs in the background.
//!
//! [`TrainingService::start`] returns as soon as the run is spawned on the
//! `tokio` blocking pool. The caller keeps a [`RunHandle`] to stop the run
//! or wait for its [`RunReport`]; progress flows to the shared sink.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn};

use crate::algorithms::rl::{Method, Trainer, TrainerSetup, TrainingError, TrainingOutcome};
use crate::problem::{self, Problem, ProblemLoadError};
use crate::progress::{ChannelReporter, ProgressReporter, ProgressSink};
use crate::{generate_run_id, RunId};

pub use crate::algorithms::rl::StopSignal;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Load(#[from] ProblemLoadError),

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error("run task panicked: {0}")]
    Panicked(String),

    #[error("no tokio runtime to spawn the run on")]
    NoRuntime,

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize the run report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The problem a run trains on.
#[derive(Debug, Clone)]
pub enum ProblemRef {
    /// Instance document to load inside the run.
    Path(PathBuf),
    Loaded(Arc<Problem>),
}

impl From<PathBuf> for ProblemRef {
    fn from(path: PathBuf) -> Self {
        ProblemRef::Path(path)
    }
}

impl From<Arc<Problem>> for ProblemRef {
    fn from(problem: Arc<Problem>) -> Self {
        ProblemRef::Loaded(problem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
}

/// Immediate answer to a start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: RunStatus,
    pub run_id: RunId,
}

/// What a finished (or cancelled) run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub instance: String,
    pub method: Method,
    pub outcome: TrainingOutcome,
}

impl RunReport {
    /// `<output>/<instance>/<instance>.solution.json`
    pub fn solution_path(&self, output: &Path) -> PathBuf {
        output
            .join(&self.instance)
            .join(format!("{}.solution.json", self.instance))
    }

    /// Writes the report as pretty JSON and returns the file path.
    pub fn write_solution(&self, output: &Path) -> Result<PathBuf, RunError> {
        let path = self.solution_path(output);
        let write_err = |source: std::io::Error| RunError::Write {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(write_err)?;
        Ok(path)
    }
}

/// A run in progress.
#[derive(Debug)]
pub struct RunHandle {
    id: RunId,
    stop: StopSignal,
    join: JoinHandle<Result<RunReport, RunError>>,
    forwarder: JoinHandle<()>,
}

impl RunHandle {
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Asks the run to stop at the next epoch boundary.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Waits for the run and for its progress events to be delivered.
    pub async fn join(self) -> Result<RunReport, RunError> {
        let result = match self.join.await {
            Ok(result) => result,
            Err(e) => Err(RunError::Panicked(e.to_string())),
        };
        if let Err(e) = self.forwarder.await {
            warn!(run_id = %self.id, error = %e, "progress forwarder failed");
        }
        result
    }
}

/// Starts runs with a fixed trainer setup, all reporting to one sink.
pub struct TrainingService {
    setup: TrainerSetup,
    sink: Arc<dyn ProgressSink>,
}

impl TrainingService {
    pub fn new(setup: TrainerSetup, sink: Arc<dyn ProgressSink>) -> Self {
        Self { setup, sink }
    }

    pub fn setup(&self) -> &TrainerSetup {
        &self.setup
    }

    /// Spawns a run and returns immediately.
    ///
    /// Failures inside the run, including loading the problem, surface
    /// only through [`RunHandle::join`].
    ///
    /// # Errors
    ///
    /// `RunError::NoRuntime` when called outside a `tokio` runtime.
    pub fn start(&self, problem: impl Into<ProblemRef>) -> Result<(StartResponse, RunHandle), RunError> {
        let handle = Handle::try_current().map_err(|_| RunError::NoRuntime)?;
        let run_id = generate_run_id();
        let stop = StopSignal::new();
        let (reporter, forwarder) = ChannelReporter::spawn(run_id, self.sink.clone(), &handle);

        let problem = problem.into();
        let setup = self.setup.clone();
        let task_stop = stop.clone();
        info!(%run_id, method = %setup.method, "run started");
        let join = handle.spawn_blocking(move || execute(run_id, problem, setup, Arc::new(reporter), task_stop));

        Ok((
            StartResponse {
                status: RunStatus::Started,
                run_id,
            },
            RunHandle {
                id: run_id,
                stop,
                join,
                forwarder,
            },
        ))
    }
}

/// Body of a run on the blocking pool.
fn execute(
    run_id: RunId,
    problem: ProblemRef,
    setup: TrainerSetup,
    reporter: Arc<dyn ProgressReporter>,
    stop: StopSignal,
) -> Result<RunReport, RunError> {
    let method = setup.method;
    let span = info_span!("run", %run_id, %method, instance = tracing::field::Empty);
    let _enter = span.enter();

    let problem = match problem {
        ProblemRef::Loaded(problem) => problem,
        ProblemRef::Path(path) => match problem::load(&path) {
            Ok(problem) => Arc::new(problem),
            Err(e) => {
                error!(path = %path.display(), error = %e, "problem load failed");
                return Err(e.into());
            }
        },
    };
    span.record("instance", problem.name());
    info!(
        lessons = problem.lessons().len(),
        rooms = problem.rooms().len(),
        time_slots = problem.time_slots().len(),
        distributions = problem.distributions().len(),
        "problem ready"
    );

    let mut trainer = match Trainer::new(problem.clone(), setup, reporter, stop) {
        Ok(trainer) => trainer,
        Err(e) => {
            error!(error = %e, "trainer setup failed");
            return Err(e.into());
        }
    };
    let outcome = match trainer.run() {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "training aborted");
            return Err(e.into());
        }
    };

    Ok(RunReport {
        run_id,
        instance: problem.name().to_string(),
        method,
        outcome,
    })
}
