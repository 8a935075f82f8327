//! Decides when the active module runs.
//!
//! Dragging a parameter only moves the displayed value. A commit (slider
//! released, discrete step, module or file picked) builds an
//! [`InvocationFingerprint`]; the module runs only when that fingerprint
//! differs from the last one recorded. The fingerprint is recorded whether
//! the run succeeds or fails, so a persistently failing input is not retried
//! on every commit. [`UpdateScheduler::invalidate`] forgets it, which is how
//! a reload forces the next commit through.

use std::panic::{catch_unwind, AssertUnwindSafe};

use sigbench_module_sdk::{panic_message, Figure, Invocation, PlaybackHandle, PARAM_MAX};
use tracing::{debug, error, info};

use crate::error::InvocationError;
use crate::loader::ActiveModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Dirty,
    Invoking,
}

/// Which of the two parameters an interaction refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSlot {
    First,
    Second,
}

/// The combination last handed to the module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationFingerprint {
    pub module: String,
    pub param1: u8,
    pub param2: u8,
    pub data_file: String,
}

/// Inputs of a commit. `module` and `data_file` are `None` when the
/// respective list is empty or nothing is loaded.
pub struct CommitRequest<'a> {
    pub module: Option<&'a ActiveModule>,
    pub param1: u8,
    pub param2: u8,
    pub data_file: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// No module loaded or no data file available.
    NothingToInvoke,
    /// Same fingerprint as the last invocation.
    Unchanged,
    Invoked(Result<(), InvocationError>),
}

impl CommitOutcome {
    pub fn invoked(&self) -> bool {
        matches!(self, CommitOutcome::Invoked(_))
    }
}

#[derive(Debug)]
pub struct UpdateScheduler {
    state: SchedulerState,
    displayed: [u8; 2],
    last: Option<InvocationFingerprint>,
    invocations: u64,
}

impl UpdateScheduler {
    pub fn new(param1: u8, param2: u8) -> Self {
        Self {
            state: SchedulerState::Idle,
            displayed: [param1.min(PARAM_MAX), param2.min(PARAM_MAX)],
            last: None,
            invocations: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Value shown for `slot`, including uncommitted drag positions.
    pub fn displayed(&self, slot: ParamSlot) -> u8 {
        self.displayed[slot_index(slot)]
    }

    /// Continuous change while the slider is held. Never schedules work.
    pub fn drag(&mut self, slot: ParamSlot, value: u8) -> u8 {
        let value = value.min(PARAM_MAX);
        self.displayed[slot_index(slot)] = value;
        value
    }

    pub fn last_fingerprint(&self) -> Option<&InvocationFingerprint> {
        self.last.as_ref()
    }

    /// Forget the last fingerprint so the next commit invokes.
    pub fn invalidate(&mut self) {
        debug!("fingerprint invalidated");
        self.last = None;
    }

    /// Total number of module invocations so far.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Evaluate a commit and, if warranted, run the module synchronously.
    pub fn commit(
        &mut self,
        request: CommitRequest<'_>,
        target: &mut Figure,
        playback: Option<&PlaybackHandle>,
    ) -> CommitOutcome {
        self.displayed = [request.param1, request.param2];
        let (Some(module), Some(data_file)) = (request.module, request.data_file) else {
            return CommitOutcome::NothingToInvoke;
        };
        let fingerprint = InvocationFingerprint {
            module: module.name().to_string(),
            param1: request.param1,
            param2: request.param2,
            data_file: data_file.to_string(),
        };
        if self.last.as_ref() == Some(&fingerprint) {
            debug!("fingerprint unchanged, skipping invocation");
            return CommitOutcome::Unchanged;
        }
        self.state = SchedulerState::Dirty;

        let result = self.invoke(module, &fingerprint, target, playback);
        self.last = Some(fingerprint);
        self.state = SchedulerState::Idle;
        CommitOutcome::Invoked(result)
    }

    fn invoke(
        &mut self,
        module: &ActiveModule,
        fingerprint: &InvocationFingerprint,
        target: &mut Figure,
        playback: Option<&PlaybackHandle>,
    ) -> Result<(), InvocationError> {
        self.state = SchedulerState::Invoking;
        self.invocations += 1;
        info!(
            "invoking `{}` with ({}, {}, {})",
            fingerprint.module, fingerprint.param1, fingerprint.param2, fingerprint.data_file
        );
        let invocation = Invocation {
            param1: fingerprint.param1,
            param2: fingerprint.param2,
            data_file: &fingerprint.data_file,
            playback,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| module.invoke(&invocation, target)))
            .unwrap_or_else(|payload| {
                Err(format!(
                    "module panicked: {}",
                    panic_message(payload.as_ref())
                ))
            });
        outcome.map_err(|detail| {
            let err = InvocationError {
                module: fingerprint.module.clone(),
                detail,
            };
            error!("{err}");
            err
        })
    }
}

fn slot_index(slot: ParamSlot) -> usize {
    match slot {
        ParamSlot::First => 0,
        ParamSlot::Second => 1,
    }
}
