//! Task runtime
//!
//! One May green thread per task. A task's life:
//!
//! - `submit` registers a [`TaskRecord`] (state `Waiting`) and spawns the
//!   coroutine; a fork delay is served by a timed receive on the task's
//!   wake channel, so a pending `kill_task` lands even before the body runs
//! - the body runs under a [`crate::vm::TaskCtx`] with tick and wall-clock
//!   budgets; `suspend` blocks on the wake channel, `resume` sends into it
//! - terminal tasks leave the registry; `queued_tasks` reports a snapshot
//!
//! Lock discipline: the registry mutex is never held while the store mutex
//! is held, and neither is held across a blocking receive.

pub mod scheduler;

pub use scheduler::Scheduler;

use byre_compiler::Stmt;
use byre_core::{Objid, Var};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type TaskId = i64;

/// How the task came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Dispatched from a player command.
    Input,
    /// A `fork` body.
    Forked,
    /// Top-level `eval` (the binary, tests).
    Eval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Scheduled for a future start (fork delay).
    Waiting,
    Running,
    /// Blocked in `suspend()`, waiting for resume or deadline.
    Suspended,
    Completed,
    Aborted,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Aborted)
    }
}

/// Messages on a task's wake channel.
#[derive(Debug, Clone)]
pub enum Wake {
    /// `resume(task, value)`: the value becomes `suspend`'s return value.
    Resume(Var),
    /// `kill_task`: abort at the next safe point.
    Kill,
}

/// What to run. The fork variant carries the deep-copied environment
/// (value-level COW makes the copy cheap and fully isolated).
pub enum TaskSpec {
    /// A command-matched verb call on an object.
    Command {
        player: Objid,
        this: Objid,
        verb: String,
        args: Vec<Var>,
        argstr: String,
        dobj: Objid,
        dobjstr: String,
        prepstr: String,
        iobj: Objid,
        iobjstr: String,
    },
    /// Evaluate source as a wizardly one-off.
    Eval {
        player: Objid,
        progr: Objid,
        source: String,
    },
    /// A fork body with its captured context.
    Fork {
        player: Objid,
        progr: Objid,
        this: Var,
        verb_name: String,
        verb_loc: Objid,
        line: usize,
        body: Arc<Vec<Stmt>>,
        env: HashMap<String, Var>,
    },
}

impl TaskSpec {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskSpec::Command { .. } => TaskKind::Input,
            TaskSpec::Eval { .. } => TaskKind::Eval,
            TaskSpec::Fork { .. } => TaskKind::Forked,
        }
    }

    pub fn player(&self) -> Objid {
        match self {
            TaskSpec::Command { player, .. }
            | TaskSpec::Eval { player, .. }
            | TaskSpec::Fork { player, .. } => *player,
        }
    }
}

/// A submission: the spec plus when it should start.
pub struct Submission {
    pub spec: TaskSpec,
    pub delay: Duration,
}

/// Cooperatively wait for a wake message. `None` timeout blocks forever.
/// Returns `None` on timeout (or a dropped sender, which we treat the
/// same: the registry owns the sender for as long as the task lives).
pub fn wait_wake(
    rx: &may::sync::mpmc::Receiver<Wake>,
    timeout: Option<Duration>,
) -> Option<Wake> {
    match timeout {
        Some(d) => rx.recv_timeout(d).ok(),
        None => rx.recv().ok(),
    }
}
