//! The evaluator's working state
//!
//! [`TaskCtx`] is one task's execution context: budgets, permissions, the
//! wake channel, and the activation-stack mirror. [`Activation`] is one
//! in-flight verb call: locals, context variables, the active index-length
//! stack for `^`/`$`.
//!
//! Errors come in two shapes. [`Exception`] is a MOO-level error: first
//! class, catchable by `try`/`except` and catch expressions. [`Abort`] is
//! resource exhaustion or `kill_task`: never catchable, only `finally`
//! cleanup runs (under a bounded tick allowance) before the task dies.

pub mod eval;

use crate::tasks::{Scheduler, TaskId, TaskKind, TaskSpec, Wake};
use crate::world::World;
use byre_core::{Error, Objid, Var, NOTHING};
use byre_db::Store;
use may::sync::mpmc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Non-catchable task termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abort {
    Ticks,
    Seconds,
    Kill,
}

impl Abort {
    pub fn player_message(&self) -> String {
        match self {
            Abort::Ticks => "Task ran out of ticks (aborted).".to_string(),
            Abort::Seconds => "Task ran out of seconds (aborted).".to_string(),
            Abort::Kill => "Task killed.".to_string(),
        }
    }
}

/// A raised MOO error in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub code: Error,
    pub msg: String,
    pub value: Var,
    /// One line per unwound frame, innermost first.
    pub traceback: Vec<String>,
}

impl Exception {
    pub fn new(code: Error) -> Exception {
        Exception {
            code,
            msg: code.message().to_string(),
            value: Var::Int(0),
            traceback: Vec::new(),
        }
    }

    pub fn with_msg(code: Error, msg: impl Into<String>) -> Exception {
        Exception {
            code,
            msg: msg.into(),
            value: Var::Int(0),
            traceback: Vec::new(),
        }
    }

    /// The lines printed to the player when the error reaches the root.
    pub fn traceback_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.traceback.len() + 2);
        lines.push(format!("{}: {}", self.code.name(), self.msg));
        lines.extend(self.traceback.iter().cloned());
        lines.push("(End of traceback)".to_string());
        lines
    }
}

/// The `Err` side of every evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Raise {
    Moo(Exception),
    Abort(Abort),
}

impl Raise {
    pub fn error(code: Error) -> Raise {
        Raise::Moo(Exception::new(code))
    }

    pub fn error_msg(code: Error, msg: impl Into<String>) -> Raise {
        Raise::Moo(Exception::with_msg(code, msg))
    }
}

impl From<Error> for Raise {
    fn from(code: Error) -> Raise {
        Raise::error(code)
    }
}

/// One entry in the activation-stack mirror: what `callers()`, traces and
/// `task_stack` report about a frame.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub this: Var,
    pub verb: String,
    pub progr: Objid,
    pub verb_loc: Objid,
    pub player: Objid,
    pub line: usize,
    pub debug: bool,
}

impl FrameInfo {
    /// The `callers()` tuple: 6 elements with the line number, 5 without.
    pub fn as_var(&self, with_line: bool) -> Var {
        let mut items = vec![
            self.this.clone(),
            Var::str(&self.verb),
            Var::Obj(self.progr),
            Var::Obj(self.verb_loc),
            Var::Obj(self.player),
        ];
        if with_line {
            items.push(Var::Int(self.line as i64));
        }
        Var::list(items)
    }
}

/// Parsed-command context carried by input tasks and rebound read-only on
/// every activation.
#[derive(Debug, Clone)]
pub struct CommandCtx {
    pub argstr: String,
    pub dobj: Objid,
    pub dobjstr: String,
    pub prepstr: String,
    pub iobj: Objid,
    pub iobjstr: String,
}

impl Default for CommandCtx {
    fn default() -> Self {
        CommandCtx {
            argstr: String::new(),
            dobj: NOTHING,
            dobjstr: String::new(),
            prepstr: String::new(),
            iobj: NOTHING,
            iobjstr: String::new(),
        }
    }
}

/// One verb call in flight.
pub struct Activation {
    pub this: Var,
    pub caller: Var,
    pub verb_name: String,
    pub verb_definer: Objid,
    pub debug: bool,
    /// Function-scoped variable environment.
    pub env: HashMap<String, Var>,
    /// Lengths of the containers whose index brackets we are inside, for
    /// `^` and `$`.
    pub index_lens: Vec<i64>,
    /// The caller's programmer identity, restored when this frame pops.
    pub saved_progr: Objid,
}

/// Everything a running task carries.
pub struct TaskCtx {
    pub world: Arc<World>,
    pub sched: Arc<Scheduler>,
    pub task_id: TaskId,
    pub kind: TaskKind,
    pub player: Objid,
    /// The task's programmer identity (`set_task_perms` target).
    pub progr: Objid,
    pub ticks_left: i64,
    deadline: Instant,
    deadline_poll: u32,
    pub wake: mpmc::Receiver<Wake>,
    pub kill: Arc<AtomicBool>,
    /// Mirror shared with the scheduler record (see `task_stack`).
    pub stack: Arc<Mutex<Vec<FrameInfo>>>,
    pub command: CommandCtx,
    pub task_local: Var,
    /// Inside `finally` cleanup after an abort: kill checks are off and the
    /// budget is the cleanup allowance.
    pub in_cleanup: bool,
}

impl TaskCtx {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        world: Arc<World>,
        sched: Arc<Scheduler>,
        task_id: TaskId,
        kind: TaskKind,
        player: Objid,
        ticks: i64,
        wall: Duration,
        wake: mpmc::Receiver<Wake>,
        kill: Arc<AtomicBool>,
        stack: Arc<Mutex<Vec<FrameInfo>>>,
    ) -> TaskCtx {
        TaskCtx {
            world,
            sched,
            task_id,
            kind,
            player,
            progr: player,
            ticks_left: ticks,
            deadline: Instant::now() + wall,
            deadline_poll: 0,
            wake,
            kill,
            stack,
            command: CommandCtx::default(),
            task_local: Var::Int(0),
            in_cleanup: false,
        }
    }

    /// Charge one tick; the per-node scheduling point. Checks the kill
    /// flag, the tick budget, and (sampled) the wall clock.
    pub fn charge(&mut self) -> Result<(), Raise> {
        if !self.in_cleanup && self.kill.load(Ordering::Acquire) {
            return Err(Raise::Abort(Abort::Kill));
        }
        self.ticks_left -= 1;
        if self.ticks_left < 0 {
            self.ticks_left = 0;
            return Err(Raise::Abort(Abort::Ticks));
        }
        self.deadline_poll += 1;
        if self.deadline_poll >= 256 {
            self.deadline_poll = 0;
            if !self.in_cleanup && Instant::now() >= self.deadline {
                return Err(Raise::Abort(Abort::Seconds));
            }
        }
        Ok(())
    }

    /// Remaining wall-clock seconds (0.0 when exhausted).
    pub fn seconds_left(&self) -> f64 {
        self.deadline
            .saturating_duration_since(Instant::now())
            .as_secs_f64()
    }

    /// Refresh the tick budget (suspend wake-up, `yin`). The wall deadline
    /// is deliberately left alone by `yin`; suspension resets it because a
    /// resumed task is a fresh scheduling unit.
    pub fn refresh_ticks(&mut self) {
        self.ticks_left = self.world.config.background_ticks;
    }

    pub fn refresh_deadline(&mut self) {
        self.deadline =
            Instant::now() + Duration::from_secs(self.world.config.background_seconds);
    }

    /// Is `progr` a wizard right now?
    pub fn wizardly(&self) -> bool {
        let progr = self.progr;
        self.world
            .with_store(|s| s.find(progr).map(|o| o.is_wizard()).unwrap_or(false))
    }

    /// Run `finally` cleanup after an abort: bounded ticks, kill checks
    /// suppressed so cleanup can finish.
    pub fn enter_cleanup(&mut self) -> (i64, bool) {
        let saved = (self.ticks_left, self.in_cleanup);
        self.ticks_left = self.world.config.cleanup_ticks;
        self.in_cleanup = true;
        saved
    }

    pub fn leave_cleanup(&mut self, saved: (i64, bool)) {
        self.ticks_left = saved.0;
        self.in_cleanup = saved.1;
    }

    // --------------------------------------------------------------
    // Frame mirror
    // --------------------------------------------------------------

    pub fn push_frame(&self, info: FrameInfo) {
        self.stack
            .lock()
            .expect("task stack mirror poisoned")
            .push(info);
    }

    pub fn pop_frame(&self) {
        self.stack
            .lock()
            .expect("task stack mirror poisoned")
            .pop();
    }

    pub fn frame_depth(&self) -> usize {
        self.stack.lock().expect("task stack mirror poisoned").len()
    }

    pub fn set_frame_line(&self, line: usize) {
        let mut guard = self.stack.lock().expect("task stack mirror poisoned");
        if let Some(top) = guard.last_mut() {
            top.line = line;
        }
    }

    pub fn set_frame_progr(&self, progr: Objid) {
        let mut guard = self.stack.lock().expect("task stack mirror poisoned");
        if let Some(top) = guard.last_mut() {
            top.progr = progr;
        }
    }

    /// `callers()`: outer frames, innermost first, excluding the current
    /// one. Frames without the 'd' bit hide their line number behind 0.
    pub fn callers(&self, with_line: bool) -> Var {
        let guard = self.stack.lock().expect("task stack mirror poisoned");
        let mut frames: Vec<Var> = Vec::new();
        if guard.len() > 1 {
            for f in guard[..guard.len() - 1].iter().rev() {
                let mut info = f.clone();
                if !info.debug {
                    info.line = 0;
                }
                frames.push(info.as_var(with_line));
            }
        }
        Var::list(frames)
    }

    /// Previous frame's programmer, `#-1` at the root.
    pub fn caller_perms(&self) -> Objid {
        let guard = self.stack.lock().expect("task stack mirror poisoned");
        if guard.len() > 1 {
            guard[guard.len() - 2].progr
        } else {
            NOTHING
        }
    }

    /// Enforce the configured ceilings on constructed values (E_QUOTA).
    pub fn check_limits(&self, v: &Var) -> Result<(), Raise> {
        let config = &self.world.config;
        let over = match v {
            Var::Str(s) => s.len() > config.max_string_length,
            Var::List(_) => v.value_bytes() > config.max_list_value_bytes,
            Var::Map(_) => v.value_bytes() > config.max_map_value_bytes,
            _ => false,
        };
        if over {
            Err(Raise::error_msg(Error::Quota, "value too large"))
        } else {
            Ok(())
        }
    }
}

/// Wizard check against an already-locked store.
pub fn is_wizard(store: &Store, progr: Objid) -> bool {
    store.find(progr).map(|o| o.is_wizard()).unwrap_or(false)
}

/// Entry point from the scheduler: run a task spec to completion.
pub fn run_spec(ctx: &mut TaskCtx, spec: TaskSpec) -> Result<Var, Raise> {
    match spec {
        TaskSpec::Command {
            player,
            this,
            verb,
            args,
            argstr,
            dobj,
            dobjstr,
            prepstr,
            iobj,
            iobjstr,
        } => {
            ctx.player = player;
            ctx.command = CommandCtx {
                argstr,
                dobj,
                dobjstr,
                prepstr,
                iobj,
                iobjstr,
            };
            eval::call_command_verb(ctx, this, &verb, args)
        }
        TaskSpec::Eval { player, progr, source } => {
            ctx.player = player;
            ctx.progr = progr;
            let program = byre_compiler::compile(&source).map_err(|problems| {
                Raise::error_msg(Error::InvArg, problems.join("; "))
            })?;
            eval::run_eval_program(ctx, &program)
        }
        TaskSpec::Fork {
            player,
            progr,
            this,
            verb_name,
            verb_loc,
            line,
            body,
            env,
        } => {
            ctx.player = player;
            ctx.progr = progr;
            eval::run_fork_body(ctx, this, verb_name, verb_loc, line, &body, env)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use byre_db::Store;

    fn test_ctx(ticks: i64) -> TaskCtx {
        let world = Arc::new(crate::world::World::new(Store::minimal(), Config::default()));
        let sched = Arc::new(Scheduler::new());
        let (_tx, rx) = mpmc::channel();
        TaskCtx::new(
            world,
            sched,
            1,
            TaskKind::Eval,
            Objid(1),
            ticks,
            Duration::from_secs(5),
            rx,
            Arc::new(AtomicBool::new(false)),
            Arc::new(Mutex::new(Vec::new())),
        )
    }

    #[test]
    fn charge_exhausts_to_a_tick_abort() {
        let mut ctx = test_ctx(3);
        assert!(ctx.charge().is_ok());
        assert!(ctx.charge().is_ok());
        assert!(ctx.charge().is_ok());
        assert_eq!(ctx.charge(), Err(Raise::Abort(Abort::Ticks)));
        assert_eq!(ctx.ticks_left, 0);
    }

    #[test]
    fn kill_flag_preempts_before_ticks() {
        let ctx = test_ctx(100);
        ctx.kill.store(true, std::sync::atomic::Ordering::Release);
        let mut ctx = ctx;
        assert_eq!(ctx.charge(), Err(Raise::Abort(Abort::Kill)));
    }

    #[test]
    fn cleanup_allowance_is_bounded_and_ignores_kill() {
        let mut ctx = test_ctx(0);
        ctx.kill.store(true, std::sync::atomic::Ordering::Release);
        let saved = ctx.enter_cleanup();
        // Kill checks are off during cleanup; the allowance still runs out.
        for _ in 0..ctx.world.config.cleanup_ticks {
            assert!(ctx.charge().is_ok());
        }
        assert_eq!(ctx.charge(), Err(Raise::Abort(Abort::Ticks)));
        ctx.leave_cleanup(saved);
        assert!(!ctx.in_cleanup);
    }

    #[test]
    fn frame_mirror_drives_callers_and_caller_perms() {
        let ctx = test_ctx(100);
        assert_eq!(ctx.caller_perms(), NOTHING);
        ctx.push_frame(FrameInfo {
            this: Var::obj(0),
            verb: "outer".into(),
            progr: Objid(2),
            verb_loc: Objid(0),
            player: Objid(1),
            line: 3,
            debug: true,
        });
        ctx.push_frame(FrameInfo {
            this: Var::obj(0),
            verb: "inner".into(),
            progr: Objid(3),
            verb_loc: Objid(0),
            player: Objid(1),
            line: 7,
            debug: true,
        });
        assert_eq!(ctx.caller_perms(), Objid(2));
        let Var::List(frames) = ctx.callers(true) else {
            panic!("callers must be a list")
        };
        assert_eq!(frames.len(), 1, "the current frame is excluded");
        let Var::List(entry) = &frames[0] else { panic!() };
        assert_eq!(entry.len(), 6);
        assert_eq!(entry[1], Var::str("outer"));
        assert_eq!(entry[5], Var::Int(3));
        let Var::List(frames) = ctx.callers(false) else { panic!() };
        let Var::List(entry) = &frames[0] else { panic!() };
        assert_eq!(entry.len(), 5);
        ctx.pop_frame();
        ctx.pop_frame();
    }

    #[test]
    fn frames_without_debug_hide_their_line() {
        let ctx = test_ctx(100);
        ctx.push_frame(FrameInfo {
            this: Var::obj(0),
            verb: "secret".into(),
            progr: Objid(2),
            verb_loc: Objid(0),
            player: Objid(1),
            line: 42,
            debug: false,
        });
        ctx.push_frame(FrameInfo {
            this: Var::obj(0),
            verb: "top".into(),
            progr: Objid(2),
            verb_loc: Objid(0),
            player: Objid(1),
            line: 1,
            debug: true,
        });
        let Var::List(frames) = ctx.callers(true) else { panic!() };
        let Var::List(entry) = &frames[0] else { panic!() };
        assert_eq!(entry[5], Var::Int(0), "no 'd' bit, no line number");
    }
}
