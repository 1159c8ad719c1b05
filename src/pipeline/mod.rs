//! Run orchestration: one concurrent worker per application.
//!
//! Each worker loads both sides of its application, matches and diffs
//! them and writes the result into its section of the shared
//! [`Message`]. Workers are bounded by a semaphore; applications
//! discovered while diffing are queued when the manifest source knows
//! them. Every application handed to the run ends up with a section,
//! including ones that failed, panicked or were cancelled.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::constants::{ERROR_MARKER, WARNING_MARKER};
use crate::diff::{DiffEngine, DiffError, DiffReport};
use crate::manifests::{ManifestError, ManifestSource};
use crate::matcher;
use crate::models::report::ReportCounts;
use crate::report::{Message, ReportError};

/// Errors while diffing a single application.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to load live manifests: {0}")]
    LoadLive(#[source] ManifestError),

    #[error("failed to load target manifests: {0}")]
    LoadTarget(#[source] ManifestError),

    #[error(transparent)]
    Diff(#[from] DiffError),
}

/// Error from a [`Summarizer`].
#[derive(Error, Debug)]
#[error("summary generation failed: {0}")]
pub struct SummaryError(pub String);

/// Produces a prose summary of an application's diff.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, app: &str, report: &DiffReport) -> Result<String, SummaryError>;
}

/// Receiving side of a run-wide cancellation flag.
#[derive(Debug, Clone)]
pub struct CancellationSignal(watch::Receiver<bool>);

/// Sending side; cancels every signal cloned from its pair.
#[derive(Debug)]
pub struct CancellationHandle(watch::Sender<bool>);

impl CancellationSignal {
    pub fn new() -> (CancellationHandle, CancellationSignal) {
        let (tx, rx) = watch::channel(false);
        (CancellationHandle(tx), CancellationSignal(rx))
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

impl CancellationHandle {
    pub fn cancel(&self) {
        // No receivers left just means nobody is listening anymore.
        let _ = self.0.send(true);
    }
}

/// How one application's worker finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppStatus {
    Diffed(ReportCounts),
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppOutcome {
    pub name: String,
    pub status: AppStatus,
    /// Discovered child applications the source can supply.
    pub queued_children: Vec<String>,
}

impl AppOutcome {
    fn failed(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: AppStatus::Failed(reason.into()),
            queued_children: Vec::new(),
        }
    }
}

/// Result of a whole run, in completion order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<AppOutcome>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, AppStatus::Failed(_)))
            .count()
    }

    pub fn totals(&self) -> ReportCounts {
        let mut totals = ReportCounts::default();
        for outcome in &self.outcomes {
            if let AppStatus::Diffed(c) = outcome.status {
                totals.added += c.added;
                totals.modified += c.modified;
                totals.removed += c.removed;
            }
        }
        totals
    }
}

/// Diffs applications and reports them into a [`Message`].
pub struct Pipeline {
    source: Arc<dyn ManifestSource>,
    engine: Arc<DiffEngine>,
    summarizer: Option<Arc<dyn Summarizer>>,
    max_concurrent: usize,
}

impl Pipeline {
    pub fn new(source: Arc<dyn ManifestSource>, engine: DiffEngine, max_concurrent: usize) -> Self {
        Self {
            source,
            engine: Arc::new(engine),
            summarizer: None,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Load, match and diff one application without touching any report.
    pub async fn diff_app(&self, app: &str) -> Result<DiffReport, PipelineError> {
        diff_app(self.source.as_ref(), &self.engine, app).await
    }

    /// Run every application in `apps` (and any children discovered along
    /// the way) and write their sections into `message`.
    pub async fn run(
        &self,
        message: Arc<Message>,
        apps: Vec<String>,
        cancel: CancellationSignal,
    ) -> RunSummary {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut join_set = JoinSet::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut summary = RunSummary::default();

        for app in apps {
            if seen.insert(app.clone()) {
                queue.push_back(app);
            }
        }

        loop {
            while let Some(app) = queue.pop_front() {
                if cancel.is_cancelled() {
                    summary.outcomes.push(cancelled(&message, &app).await);
                    continue;
                }
                let worker = Worker {
                    source: Arc::clone(&self.source),
                    engine: Arc::clone(&self.engine),
                    summarizer: self.summarizer.clone(),
                    message: Arc::clone(&message),
                };
                let sem = Arc::clone(&semaphore);
                let cancel = cancel.clone();
                join_set.spawn(async move {
                    let Ok(_permit) = sem.acquire_owned().await else {
                        return AppOutcome::failed(&app, "worker pool closed");
                    };
                    if cancel.is_cancelled() {
                        return cancelled(&worker.message, &app).await;
                    }
                    let message = Arc::clone(&worker.message);
                    // Run in a child task so a panic still yields a section.
                    let name = app.clone();
                    match tokio::spawn(async move { worker.process(&name).await }).await {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(app = %app, error = %err, "diff worker panicked");
                            let reason = format!("worker crashed: {err}");
                            publish(
                                &app,
                                message
                                    .add_to_app_message(&app, &format!("{ERROR_MARKER} {reason}"))
                                    .await,
                            );
                            AppOutcome::failed(&app, reason)
                        }
                    }
                });
            }

            let Some(joined) = join_set.join_next().await else {
                break;
            };
            // The outer task only awaits and never panics itself.
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(error = %err, "diff task failed");
                    continue;
                }
            };
            for child in &outcome.queued_children {
                if seen.insert(child.clone()) {
                    info!(parent = %outcome.name, app = %child, "queueing discovered application");
                    queue.push_back(child.clone());
                }
            }
            summary.outcomes.push(outcome);
        }

        summary
    }
}

struct Worker {
    source: Arc<dyn ManifestSource>,
    engine: Arc<DiffEngine>,
    summarizer: Option<Arc<dyn Summarizer>>,
    message: Arc<Message>,
}

impl Worker {
    async fn process(&self, app: &str) -> AppOutcome {
        publish(app, self.message.add_app(app).await);

        let report = match diff_app(self.source.as_ref(), &self.engine, app).await {
            Ok(report) => report,
            Err(err) => {
                warn!(app, error = %err, "diff failed");
                publish(
                    app,
                    self.message
                        .add_to_app_message(app, &format!("{ERROR_MARKER} {err}"))
                        .await,
                );
                return AppOutcome::failed(app, err.to_string());
            }
        };
        info!(app, summary = %report.summary, "diffed application");

        let fragment = format!(
            "{}\n\n```diff\n{}\n```",
            report.summary,
            report.diff_text.trim_end()
        );
        publish(app, self.message.add_to_app_message(app, &fragment).await);

        let mut queued_children = Vec::new();
        for child in &report.child_apps {
            if self.source.knows(&child.name) {
                queued_children.push(child.name.clone());
            } else {
                debug!(app, child = %child.name, "discovered application not yet available");
                let note = format!(
                    "Discovered application `{}`; it will be checked once it exists.",
                    child.name
                );
                publish(app, self.message.add_to_app_message(app, &note).await);
            }
        }

        if let Some(ref summarizer) = self.summarizer {
            if !report.counts.is_empty() {
                match summarizer.summarize(app, &report).await {
                    Ok(text) => publish(app, self.message.add_to_app_message(app, &text).await),
                    Err(err) => warn!(app, error = %err, "skipping summary"),
                }
            }
        }

        AppOutcome {
            name: app.to_string(),
            status: AppStatus::Diffed(report.counts),
            queued_children,
        }
    }
}

async fn diff_app(
    source: &dyn ManifestSource,
    engine: &DiffEngine,
    app: &str,
) -> Result<DiffReport, PipelineError> {
    let live = source.live_documents(app).await.map_err(PipelineError::LoadLive)?;
    let targets = source
        .target_documents(app)
        .await
        .map_err(PipelineError::LoadTarget)?;
    let triples = matcher::match_resources(targets, live, &source.default_namespace(app));
    debug!(app, resources = triples.len(), "matched resources");
    Ok(engine.diff_application(&triples).await?)
}

async fn cancelled(message: &Message, app: &str) -> AppOutcome {
    publish(
        app,
        message
            .add_to_app_message(app, &format!("{WARNING_MARKER} Run cancelled before this application was diffed."))
            .await,
    );
    AppOutcome {
        name: app.to_string(),
        status: AppStatus::Cancelled,
        queued_children: Vec::new(),
    }
}

/// Report push failures are logged; the section stays in the message and
/// goes out with the next successful push.
fn publish(app: &str, result: Result<(), ReportError>) {
    if let Err(err) = result {
        warn!(app, error = %err, "failed to update report comment");
    }
}
