//! Run coordinator: drives an explored tree through its runs.
//!
//! The coordinator owns the tree for the duration of [`Coordinator::run`].
//! A worker receives its run's input as JSON, builds an owned [`RunView`]
//! from it and sends the committed [`RunOutput`] back as JSON over a
//! channel, so every structural mutation (integrating results, hook-driven
//! expansion) happens on the coordinator thread.
//!
//! A run counts as done once its commit marker is in the store. Workers
//! commit before reporting, so a crash between commit and integration only
//! costs a reload on resume, never a re-run.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use traj_core::{RunOutput, RunView, Tree};
use traj_store::{LoadMode, RunStore};

use crate::admission::{AdmissionGate, ResourceProbe};
use crate::config::{ExecutionMode, RunnerConfig};
use crate::error::{CoordinatorError, Result, RunError, RunFailure};
use crate::events::{log_runner_error, log_runner_info};

#[path = "coordinator/resume.rs"]
mod resume;
#[path = "coordinator/worker.rs"]
mod worker;


use worker::{RunMessage, WorkerReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// What the post-run hook wants next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    Continue,
    /// Dispatch nothing further; runs already in flight still finish.
    Stop,
}

/// Cooperative stop signal for dispatch. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    /// Runs executed and committed by this call, in completion order.
    pub executed: Vec<usize>,
    /// Runs already in the ledger when the call started.
    pub skipped: Vec<usize>,
    pub failed: Vec<RunError>,
    pub cancelled: bool,
    pub stopped_by_hook: bool,
    states: BTreeMap<usize, RunState>,
}

impl RunReport {
    pub fn state(&self, run: usize) -> Option<RunState> {
        self.states.get(&run).copied()
    }

    pub fn pending_runs(&self) -> Vec<usize> {
        self.runs_in(RunState::Pending)
    }

    pub fn failed_runs(&self) -> Vec<usize> {
        self.runs_in(RunState::Failed)
    }

    /// Every run of the exploration is completed.
    pub fn is_complete(&self) -> bool {
        self.states
            .values()
            .all(|state| *state == RunState::Completed)
    }

    fn runs_in(&self, wanted: RunState) -> Vec<usize> {
        self.states
            .iter()
            .filter(|(_, state)| **state == wanted)
            .map(|(run, _)| *run)
            .collect()
    }
}

/// Called on the coordinator thread after each committed run.
///
/// The hook may mutate the tree; growing the exploration with
/// [`Tree::expand`] enqueues the new runs.
pub type PostRunHook<'a> =
    dyn FnMut(&mut Tree, &RunOutput) -> std::result::Result<HookAction, RunFailure> + 'a;

pub struct Coordinator<'a> {
    store: &'a dyn RunStore,
    config: RunnerConfig,
    gate: AdmissionGate,
    cancel: CancellationToken,
    hook: Option<Box<PostRunHook<'a>>>,
    load_mode: LoadMode,
}

impl<'a> Coordinator<'a> {
    pub fn new(store: &'a dyn RunStore, config: RunnerConfig) -> Self {
        let gate = AdmissionGate::from_config(&config);
        Self {
            store,
            config,
            gate,
            cancel: CancellationToken::new(),
            hook: None,
            load_mode: LoadMode::Lazy,
        }
    }

    pub fn with_gate(mut self, gate: AdmissionGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_probe(self, probe: impl ResourceProbe + 'static) -> Self {
        let poll = self.config.admission_poll();
        self.with_gate(AdmissionGate::new(probe, poll))
    }

    pub fn with_hook<H>(mut self, hook: H) -> Self
    where
        H: FnMut(&mut Tree, &RunOutput) -> std::result::Result<HookAction, RunFailure> + 'a,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    /// How results of previously committed runs are brought back on resume.
    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Executes every run of `tree` that is not yet in the store's ledger.
    ///
    /// Per-run failures are collected in the report; an `Err` means the
    /// exploration itself could not continue.
    pub fn run<F>(&mut self, tree: &mut Tree, callback: F) -> Result<RunReport>
    where
        F: Fn(&mut RunView) -> std::result::Result<(), RunFailure> + Send + Sync,
    {
        if !tree.is_explored() {
            return Err(CoordinatorError::NotExplored);
        }
        self.reconcile(tree)?;

        let mut session = Session::new(tree, self.config.progress);
        log_runner_info(
            "exploration_started",
            json!({
                "tree": tree.name(),
                "run_count": tree.run_count(),
                "pending": session.queue.len(),
                "skipped": session.report.skipped.len(),
                "mode": self.config.mode,
            }),
        );

        let outcome = match self.config.mode {
            ExecutionMode::Sequential => self.run_sequential(tree, &callback, &mut session),
            ExecutionMode::Pooled { .. } => {
                let workers = self.config.mode.worker_slots().max(1);
                self.run_pooled(tree, &callback, workers, &mut session)
            }
        };
        session.progress.finish_with_message("Completed");
        outcome?;

        if let Some(error) = session.halt.take() {
            return Err(error);
        }
        if self.hook.is_some() {
            // The hook may have added aggregate results.
            self.store.store_full(tree)?;
        }

        let report = session.report;
        log_runner_info(
            "exploration_finished",
            json!({
                "tree": tree.name(),
                "executed": report.executed.len(),
                "skipped": report.skipped.len(),
                "failed": report.failed.len(),
                "pending": report.pending_runs().len(),
                "cancelled": report.cancelled,
                "stopped_by_hook": report.stopped_by_hook,
            }),
        );
        Ok(report)
    }

    fn run_sequential<F>(&mut self, tree: &mut Tree, callback: &F, session: &mut Session) -> Result<()>
    where
        F: Fn(&mut RunView) -> std::result::Result<(), RunFailure> + Send + Sync,
    {
        while !session.halted() {
            if session.queue.is_empty() {
                break;
            }
            if self.cancel.is_cancelled() {
                session.report.cancelled = true;
                break;
            }
            let Some(run) = session.queue.pop_front() else {
                break;
            };
            let message = RunMessage::encode(&tree.run_input(run)?)?;
            session.start(run);
            let report = worker::execute(self.store, callback, message);
            self.settle(tree, report, session)?;
        }
        Ok(())
    }

    fn run_pooled<F>(
        &mut self,
        tree: &mut Tree,
        callback: &F,
        workers: usize,
        session: &mut Session,
    ) -> Result<()>
    where
        F: Fn(&mut RunView) -> std::result::Result<(), RunFailure> + Send + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("traj-worker-{index}"))
            .build()?;
        let (sender, receiver) = mpsc::channel::<WorkerReport>();
        let store = self.store;
        let poll = self.gate.poll_interval();

        pool.in_place_scope(|scope| -> Result<()> {
            let mut in_flight = 0usize;
            let mut waiting = false;
            loop {
                let mut deferred = false;
                while in_flight < workers && !session.halted() && !session.queue.is_empty() {
                    if self.cancel.is_cancelled() {
                        session.report.cancelled = true;
                        break;
                    }
                    if !self.gate.admits() {
                        if !waiting {
                            log_runner_info(
                                "admission_deferred",
                                json!({ "in_flight": in_flight, "queued": session.queue.len() }),
                            );
                        }
                        waiting = true;
                        deferred = true;
                        break;
                    }
                    waiting = false;
                    let Some(run) = session.queue.pop_front() else {
                        break;
                    };
                    let message = RunMessage::encode(&tree.run_input(run)?)?;
                    session.start(run);
                    let sender = sender.clone();
                    scope.spawn(move |_| {
                        // The coordinator only drops the receiver after the scope ends.
                        let _ = sender.send(worker::execute(store, callback, message));
                    });
                    in_flight += 1;
                }

                if in_flight == 0 {
                    if !deferred {
                        return Ok(());
                    }
                    thread::sleep(poll);
                    continue;
                }

                let report = if deferred {
                    match receiver.recv_timeout(poll) {
                        Ok(report) => report,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => {
                            return Err(CoordinatorError::WorkerChannel(in_flight))
                        }
                    }
                } else {
                    receiver
                        .recv()
                        .map_err(|_| CoordinatorError::WorkerChannel(in_flight))?
                };
                in_flight -= 1;
                self.settle(tree, report, session)?;
            }
        })
    }

    /// Folds one worker report into the tree, the report and the queue.
    fn settle(&mut self, tree: &mut Tree, report: WorkerReport, session: &mut Session) -> Result<()> {
        let run = report.run;
        let outcome = report.into_output()?;
        session.progress.inc(1);
        match outcome {
            Ok(output) => {
                tree.integrate_run(output.clone())?;
                session.complete(run);
                log_runner_info(
                    "run_completed",
                    json!({ "run": run, "duration_ms": output.duration_ms }),
                );
                if session.halted() {
                    return Ok(());
                }
                if let Some(hook) = self.hook.as_mut() {
                    let before = tree.run_count();
                    match hook(tree, &output) {
                        Ok(action) => {
                            let after = tree.run_count();
                            if after > before {
                                self.store.store_parameters(tree)?;
                                session.enqueue(before..after);
                                log_runner_info(
                                    "runs_added",
                                    json!({ "after_run": run, "added": after - before, "run_count": after }),
                                );
                            }
                            if action == HookAction::Stop {
                                session.report.stopped_by_hook = true;
                                log_runner_info("stopped_by_hook", json!({ "after_run": run }));
                            }
                        }
                        Err(failure) => {
                            log_runner_error(
                                "hook_failed",
                                json!({ "run": run, "error": failure.message() }),
                            );
                            session.halt = Some(CoordinatorError::Hook {
                                run,
                                message: failure.to_string(),
                            });
                        }
                    }
                }
            }
            Err(error) => {
                let message = error.to_string();
                session.fail(run);
                log_runner_error("run_failed", json!({ "run": run, "error": message }));
                if let Err(record_error) = self.store.record_failure(run, &message) {
                    log_runner_error(
                        "failure_not_recorded",
                        json!({ "run": run, "error": record_error.to_string() }),
                    );
                }
                if self.config.fail_fast && session.halt.is_none() {
                    session.halt = Some(CoordinatorError::FailFast { run, message });
                }
                session.report.failed.push(error);
            }
        }
        Ok(())
    }
}

/// Mutable state of one [`Coordinator::run`] call.
struct Session {
    queue: VecDeque<usize>,
    report: RunReport,
    progress: ProgressBar,
    /// Error to return once in-flight runs have drained.
    halt: Option<CoordinatorError>,
}

impl Session {
    fn new(tree: &Tree, show_progress: bool) -> Self {
        let mut report = RunReport::default();
        let mut queue = VecDeque::new();
        for run in 0..tree.run_count() {
            if tree.is_completed(run) {
                report.skipped.push(run);
                report.states.insert(run, RunState::Completed);
            } else {
                queue.push_back(run);
                report.states.insert(run, RunState::Pending);
            }
        }
        let progress = if show_progress && !queue.is_empty() {
            progress_bar(queue.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        Self {
            queue,
            report,
            progress,
            halt: None,
        }
    }

    fn halted(&self) -> bool {
        self.halt.is_some() || self.report.stopped_by_hook
    }

    fn enqueue(&mut self, runs: std::ops::Range<usize>) {
        self.progress.inc_length(runs.len() as u64);
        for run in runs {
            self.queue.push_back(run);
            self.report.states.insert(run, RunState::Pending);
        }
    }

    fn start(&mut self, run: usize) {
        self.report.states.insert(run, RunState::Running);
    }

    fn complete(&mut self, run: usize) {
        self.report.executed.push(run);
        self.report.states.insert(run, RunState::Completed);
    }

    fn fail(&mut self, run: usize) {
        self.report.states.insert(run, RunState::Failed);
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}
