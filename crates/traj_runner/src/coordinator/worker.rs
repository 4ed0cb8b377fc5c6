use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use traj_core::{RunInput, RunOutput, RunView};
use traj_store::RunStore;

use crate::error::{CoordinatorError, RunError, RunFailure};

/// A run's input as it travels to a worker: serialized JSON, so a worker
/// shares nothing with the tree it came from.
pub(super) struct RunMessage {
    pub run: usize,
    payload: Vec<u8>,
}

impl RunMessage {
    pub fn encode(input: &RunInput) -> Result<Self, CoordinatorError> {
        Ok(Self {
            run: input.run,
            payload: serde_json::to_vec(input)?,
        })
    }
}

/// Message a worker sends back; a committed output travels as JSON too.
pub(super) struct WorkerReport {
    pub run: usize,
    pub outcome: Result<Vec<u8>, RunError>,
}

impl WorkerReport {
    /// Decodes the committed output, or hands back the run's failure.
    pub fn into_output(self) -> Result<Result<RunOutput, RunError>, CoordinatorError> {
        match self.outcome {
            Ok(payload) => Ok(Ok(serde_json::from_slice(&payload)?)),
            Err(error) => Ok(Err(error)),
        }
    }
}

/// Decodes the input, runs the callback against an owned view and commits
/// the output.
///
/// Panics in the callback are caught and reported as failures.
pub(super) fn execute<F>(store: &dyn RunStore, callback: &F, message: RunMessage) -> WorkerReport
where
    F: Fn(&mut RunView) -> Result<(), RunFailure>,
{
    let run = message.run;
    WorkerReport {
        run,
        outcome: run_message(store, callback, message),
    }
}

fn run_message<F>(store: &dyn RunStore, callback: &F, message: RunMessage) -> Result<Vec<u8>, RunError>
where
    F: Fn(&mut RunView) -> Result<(), RunFailure>,
{
    let run = message.run;
    let codec = |error: serde_json::Error| RunError::Codec {
        run,
        message: error.to_string(),
    };
    let input: RunInput = serde_json::from_slice(&message.payload).map_err(codec)?;

    let started = Instant::now();
    let mut view = RunView::new(input);
    match panic::catch_unwind(AssertUnwindSafe(|| callback(&mut view))) {
        Ok(Ok(())) => {}
        Ok(Err(failure)) => {
            return Err(RunError::Callback {
                run,
                message: failure.to_string(),
            })
        }
        Err(payload) => {
            return Err(RunError::Panicked {
                run,
                message: panic_message(payload.as_ref()),
            })
        }
    }

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let output = view.into_output().with_duration_ms(duration_ms);
    let payload = serde_json::to_vec(&output).map_err(codec)?;
    store
        .store_run(&output)
        .map_err(|source| RunError::Store { run, source })?;
    Ok(payload)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
