//! The scheduler
//!
//! Task lifecycle bookkeeping around May coroutines: a registry of live
//! tasks behind one mutex, lock-free lifecycle counters for diagnostics,
//! and condvar-based idle detection for shutdown. Wake channels double as
//! the delivery path for `resume` values and kill requests.

use crate::tasks::{Submission, TaskId, TaskKind, TaskSpec, TaskState, Wake};
use crate::vm::{self, FrameInfo, Raise, TaskCtx};
use crate::world::World;
use byre_core::{Error, Objid, Var};
use may::coroutine;
use may::sync::mpmc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registry entry for a live (non-terminal) task.
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub state: TaskState,
    pub player: Objid,
    pub progr: Objid,
    /// Unix seconds at submission.
    pub start_time: i64,
    pub verb_name: String,
    pub verb_loc: Objid,
    pub this: Var,
    pub line: usize,
    pub sender: mpmc::Sender<Wake>,
    pub kill: Arc<AtomicBool>,
    /// Mirror of the task's activation stack, shared with its `TaskCtx` so
    /// `task_stack` can inspect suspended tasks.
    pub stack: Arc<Mutex<Vec<FrameInfo>>>,
}

pub struct Scheduler {
    tasks: Mutex<HashMap<TaskId, TaskRecord>>,
    next_id: AtomicI64,

    // Lifecycle statistics, lock-free for the hot path. ACTIVE drives the
    // idle condvar; the totals are diagnostics only.
    pub active: AtomicUsize,
    pub total_spawned: AtomicU64,
    pub total_completed: AtomicU64,

    idle_mutex: Mutex<()>,
    idle_condvar: Condvar,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            active: AtomicUsize::new(0),
            total_spawned: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            idle_mutex: Mutex::new(()),
            idle_condvar: Condvar::new(),
        }
    }

    /// Submit a task; it runs (after its delay) on its own green thread.
    pub fn submit(self: &Arc<Scheduler>, world: &Arc<World>, submission: Submission) -> TaskId {
        let Submission { spec, delay } = submission;
        self.submit_with(world, delay, move |_| spec)
    }

    /// Like [`Scheduler::submit`], but the spec is built after the id is
    /// allocated: `fork var` needs the child's id inside the child's own
    /// environment snapshot.
    pub fn submit_with(
        self: &Arc<Scheduler>,
        world: &Arc<World>,
        delay: Duration,
        build: impl FnOnce(TaskId) -> TaskSpec,
    ) -> TaskId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let spec = build(id);
        let (tx, rx) = mpmc::channel();
        let kill = Arc::new(AtomicBool::new(false));
        let stack = Arc::new(Mutex::new(Vec::new()));

        let (verb_name, verb_loc, this) = match &spec {
            TaskSpec::Command { verb, this, .. } => (verb.clone(), *this, Var::Obj(*this)),
            TaskSpec::Eval { .. } => ("eval".to_string(), byre_core::NOTHING, Var::obj(-1)),
            TaskSpec::Fork {
                verb_name,
                verb_loc,
                this,
                ..
            } => (verb_name.clone(), *verb_loc, this.clone()),
        };
        let line = match &spec {
            TaskSpec::Fork { line, .. } => *line,
            _ => 1,
        };
        let progr = match &spec {
            TaskSpec::Eval { progr, .. } | TaskSpec::Fork { progr, .. } => *progr,
            // Command tasks run as the verb owner, known after resolution;
            // until then the record shows the player.
            TaskSpec::Command { player, .. } => *player,
        };

        let record = TaskRecord {
            id,
            kind: spec.kind(),
            state: TaskState::Waiting,
            player: spec.player(),
            progr,
            start_time: now_secs(),
            verb_name,
            verb_loc,
            this,
            line,
            sender: tx,
            kill: kill.clone(),
            stack: stack.clone(),
        };
        self.tasks
            .lock()
            .expect("task registry lock poisoned")
            .insert(id, record);
        self.active.fetch_add(1, Ordering::Release);
        self.total_spawned.fetch_add(1, Ordering::Relaxed);

        let sched = self.clone();
        let world = world.clone();
        unsafe {
            coroutine::spawn(move || {
                task_main(sched, world, id, spec, delay, rx, kill, stack);
            });
        }
        debug!(task = id, "task submitted");
        id
    }

    /// Block until every task has finished. Event-driven via condvar, no
    /// polling.
    pub fn wait_idle(&self) {
        let mut guard = self.idle_mutex.lock().expect("idle mutex poisoned");
        while self.active.load(Ordering::Acquire) > 0 {
            guard = self
                .idle_condvar
                .wait(guard)
                .expect("idle condvar wait failed");
        }
    }

    pub fn set_state(&self, id: TaskId, state: TaskState) {
        let mut guard = self.tasks.lock().expect("task registry lock poisoned");
        if let Some(rec) = guard.get_mut(&id) {
            rec.state = state;
        }
    }

    pub fn set_progr(&self, id: TaskId, progr: Objid) {
        let mut guard = self.tasks.lock().expect("task registry lock poisoned");
        if let Some(rec) = guard.get_mut(&id) {
            rec.progr = progr;
        }
    }

    /// Terminal transition: drop the record, settle the counters, and wake
    /// anyone in `wait_idle` if we were the last.
    fn finish(&self, id: TaskId, state: TaskState) {
        debug_assert!(state.is_terminal());
        self.tasks
            .lock()
            .expect("task registry lock poisoned")
            .remove(&id);
        let prev = self.active.fetch_sub(1, Ordering::AcqRel);
        self.total_completed.fetch_add(1, Ordering::Release);
        if prev == 1 {
            let _guard = self.idle_mutex.lock().expect("idle mutex poisoned");
            self.idle_condvar.notify_all();
        }
    }

    /// `resume(task_id, value)`. Exactly one resume wins: the state flips
    /// to Running under the registry lock, so a second resume (or a racing
    /// timeout) sees a non-Suspended task.
    pub fn resume(
        &self,
        id: TaskId,
        value: Var,
        progr: Objid,
        wizard: bool,
    ) -> Result<(), Error> {
        let mut guard = self.tasks.lock().expect("task registry lock poisoned");
        let rec = guard.get_mut(&id).ok_or(Error::InvArg)?;
        if !(wizard || progr == rec.progr || progr == rec.player) {
            return Err(Error::Perm);
        }
        if rec.state != TaskState::Suspended {
            return Err(Error::InvArg);
        }
        rec.state = TaskState::Running;
        let _ = rec.sender.send(Wake::Resume(value));
        Ok(())
    }

    /// `kill_task(task_id)`: schedule abortion at the next safe point. The
    /// caller handles self-kill before getting here.
    pub fn kill(&self, id: TaskId, progr: Objid, wizard: bool) -> Result<(), Error> {
        let mut guard = self.tasks.lock().expect("task registry lock poisoned");
        let rec = guard.get_mut(&id).ok_or(Error::InvArg)?;
        if !(wizard || progr == rec.progr || progr == rec.player) {
            return Err(Error::Perm);
        }
        rec.kill.store(true, Ordering::Release);
        let _ = rec.sender.send(Wake::Kill);
        Ok(())
    }

    /// `queued_tasks()`: a snapshot of non-running, non-terminal tasks
    /// visible to the caller. Mutations after the call do not touch the
    /// returned list.
    pub fn queued_tasks(&self, progr: Objid, wizard: bool) -> Var {
        let guard = self.tasks.lock().expect("task registry lock poisoned");
        let mut entries: Vec<&TaskRecord> = guard
            .values()
            .filter(|r| matches!(r.state, TaskState::Waiting | TaskState::Suspended))
            .filter(|r| wizard || r.progr == progr || r.player == progr)
            .collect();
        entries.sort_by_key(|r| r.id);
        Var::list(
            entries
                .into_iter()
                .map(|r| {
                    Var::list(vec![
                        Var::Int(r.id),
                        Var::Int(r.start_time),
                        Var::Int(0),
                        Var::Int(0),
                        Var::Obj(r.progr),
                        Var::Obj(r.verb_loc),
                        Var::str(&r.verb_name),
                        Var::Int(r.line as i64),
                        r.this.clone(),
                    ])
                })
                .collect(),
        )
    }

    /// `task_stack(id)`: the mirrored activation stack of a waiting or
    /// suspended task, innermost first.
    pub fn task_stack(&self, id: TaskId, progr: Objid, wizard: bool) -> Result<Var, Error> {
        let guard = self.tasks.lock().expect("task registry lock poisoned");
        let rec = guard.get(&id).ok_or(Error::InvArg)?;
        if !(wizard || progr == rec.progr || progr == rec.player) {
            return Err(Error::Perm);
        }
        if rec.state == TaskState::Running {
            return Err(Error::InvArg);
        }
        let stack = rec.stack.lock().expect("task stack mirror poisoned");
        Ok(Var::list(
            stack
                .iter()
                .rev()
                .map(|f| f.as_var(true))
                .collect(),
        ))
    }
}

#[allow(clippy::too_many_arguments)]
fn task_main(
    sched: Arc<Scheduler>,
    world: Arc<World>,
    id: TaskId,
    spec: TaskSpec,
    delay: Duration,
    wake: mpmc::Receiver<Wake>,
    kill: Arc<AtomicBool>,
    stack: Arc<Mutex<Vec<FrameInfo>>>,
) {
    // Serve the fork delay on the wake channel so a kill lands during it.
    // Resume of a Waiting task is rejected up front, so the only message
    // that can arrive is a kill; anything else means the delay elapsed.
    if delay > Duration::ZERO {
        if let Some(Wake::Kill) = crate::tasks::wait_wake(&wake, Some(delay)) {
            debug!(task = id, "killed before start");
            sched.finish(id, TaskState::Aborted);
            return;
        }
    }
    if kill.load(Ordering::Acquire) {
        sched.finish(id, TaskState::Aborted);
        return;
    }
    sched.set_state(id, TaskState::Running);

    let kind = spec.kind();
    let config = &world.config;
    let (ticks, seconds) = match kind {
        TaskKind::Input => (config.input_ticks, config.input_seconds),
        TaskKind::Forked | TaskKind::Eval => {
            (config.background_ticks, config.background_seconds)
        }
    };
    let mut ctx = TaskCtx::new(
        world.clone(),
        sched.clone(),
        id,
        kind,
        spec.player(),
        ticks,
        Duration::from_secs(seconds),
        wake,
        kill,
        stack,
    );

    let result = vm::run_spec(&mut ctx, spec);
    match result {
        Ok(value) => {
            debug!(task = id, ticks_left = ctx.ticks_left, "task completed");
            // Eval results go back to the player, the way `;expr` echoes.
            if kind == TaskKind::Eval {
                let literal = byre_core::literal::to_literal(&value);
                world
                    .sessions
                    .notify(ctx.player, &format!("=> {}", literal.to_string_lossy()));
            }
            sched.finish(id, TaskState::Completed);
        }
        Err(Raise::Moo(e)) => {
            warn!(task = id, code = e.code.name(), msg = %e.msg, "task aborted by exception");
            for line in e.traceback_lines() {
                world.sessions.notify(ctx.player, &line);
            }
            sched.finish(id, TaskState::Aborted);
        }
        Err(Raise::Abort(a)) => {
            info!(task = id, reason = ?a, "task aborted");
            world.sessions.notify(ctx.player, &a.player_message());
            sched.finish(id, TaskState::Aborted);
        }
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use byre_db::Store;
    use serial_test::serial;
    use std::time::Duration;

    fn harness() -> (Arc<World>, Arc<Scheduler>) {
        let world = Arc::new(World::new(Store::minimal(), Config::default()));
        (world, Arc::new(Scheduler::new()))
    }

    fn eval_spec(source: &str) -> Submission {
        Submission {
            spec: TaskSpec::Eval {
                player: Objid(1),
                progr: Objid(1),
                source: source.to_string(),
            },
            delay: Duration::ZERO,
        }
    }

    #[test]
    #[serial]
    fn submit_runs_to_completion() {
        let (world, sched) = harness();
        let before = sched.total_completed.load(Ordering::Relaxed);
        sched.submit(&world, eval_spec("return 1 + 1;"));
        sched.wait_idle();
        assert_eq!(sched.active.load(Ordering::Acquire), 0);
        assert!(sched.total_completed.load(Ordering::Relaxed) > before);
    }

    #[test]
    #[serial]
    fn task_ids_are_unique_and_positive() {
        let (world, sched) = harness();
        let mut ids = Vec::new();
        for _ in 0..20 {
            ids.push(sched.submit(&world, eval_spec("return 0;")));
        }
        sched.wait_idle();
        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
        assert!(ids.iter().all(|&id| id > 0));
    }

    #[test]
    #[serial]
    fn killing_a_waiting_task_prevents_it_from_running() {
        let (world, sched) = harness();
        let id = sched.submit(
            &world,
            Submission {
                spec: TaskSpec::Eval {
                    player: Objid(1),
                    progr: Objid(1),
                    source: "return 1;".to_string(),
                },
                delay: Duration::from_secs(30),
            },
        );
        sched.kill(id, Objid(1), true).expect("kill waiting task");
        sched.wait_idle();
        // Terminal tasks leave the registry; a second kill cannot find it.
        assert_eq!(sched.kill(id, Objid(1), true), Err(Error::InvArg));
    }

    #[test]
    #[serial]
    fn queued_tasks_respects_visibility() {
        let (world, sched) = harness();
        let id = sched.submit(
            &world,
            Submission {
                spec: TaskSpec::Eval {
                    player: Objid(1),
                    progr: Objid(1),
                    source: "return 1;".to_string(),
                },
                delay: Duration::from_secs(30),
            },
        );
        let visible = sched.queued_tasks(Objid(1), false);
        let hidden = sched.queued_tasks(Objid(9), false);
        let all = sched.queued_tasks(Objid(9), true);
        let count = |v: &Var| match v {
            Var::List(l) => l.len(),
            _ => 0,
        };
        assert_eq!(count(&visible), 1);
        assert_eq!(count(&hidden), 0);
        assert_eq!(count(&all), 1, "wizards see everything");
        sched.kill(id, Objid(1), true).unwrap();
        sched.wait_idle();
    }

    #[test]
    #[serial]
    fn resume_requires_a_suspended_task() {
        let (world, sched) = harness();
        let id = sched.submit(
            &world,
            Submission {
                spec: TaskSpec::Eval {
                    player: Objid(1),
                    progr: Objid(1),
                    source: "return 1;".to_string(),
                },
                delay: Duration::from_secs(30),
            },
        );
        // Waiting-for-delay is not Suspended.
        assert_eq!(
            sched.resume(id, Var::Int(0), Objid(1), true),
            Err(Error::InvArg)
        );
        // Non-owners are rejected before state is considered.
        assert_eq!(
            sched.resume(id, Var::Int(0), Objid(9), false),
            Err(Error::Perm)
        );
        sched.kill(id, Objid(1), true).unwrap();
        sched.wait_idle();
    }
}
