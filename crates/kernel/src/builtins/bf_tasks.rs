//! Task, scheduler and server builtins.
//!
//! `suspend` is where the CSP model shows: the builtin cooperatively
//! blocks on the task's own wake channel, with `resume` racing the
//! deadline under the scheduler's registry lock. The loser of that race
//! finds the state already flipped and reports E_INVARG.

use super::{need_args, want_int, want_obj, want_str, BfFn};
use crate::tasks::{wait_wake, TaskKind, TaskState, Wake};
use crate::vm::{Abort, Activation, Exception, Raise, TaskCtx};
use byre_core::{Error, Var};
use std::collections::HashMap;
use std::time::Duration;

pub fn register(map: &mut HashMap<&'static str, BfFn>) {
    map.insert("task_id", bf_task_id);
    map.insert("queued_tasks", bf_queued_tasks);
    map.insert("task_stack", bf_task_stack);
    map.insert("callers", bf_callers);
    map.insert("suspend", bf_suspend);
    map.insert("resume", bf_resume);
    map.insert("kill_task", bf_kill_task);
    map.insert("yin", bf_yin);
    map.insert("ticks_left", bf_ticks_left);
    map.insert("seconds_left", bf_seconds_left);
    map.insert("set_task_perms", bf_set_task_perms);
    map.insert("caller_perms", bf_caller_perms);
    map.insert("set_task_local", bf_set_task_local);
    map.insert("task_local", bf_task_local);
    map.insert("raise", bf_raise);
    map.insert("notify", bf_notify);
    map.insert("connected_players", bf_connected_players);
}

fn bf_task_id(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    Ok(Var::Int(ctx.task_id))
}

/// `queued_tasks()` takes no arguments, period.
fn bf_queued_tasks(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    let progr = ctx.progr;
    let wizard = ctx.wizardly();
    Ok(ctx.sched.queued_tasks(progr, wizard))
}

fn bf_task_stack(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let id = want_int(&args[0])?;
    let progr = ctx.progr;
    let wizard = ctx.wizardly();
    Ok(ctx.sched.task_stack(id, progr, wizard)?)
}

/// `callers()` -> 6-tuples with line numbers; `callers(0)`-style argument
/// drops them to 5-tuples.
fn bf_callers(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(1))?;
    let with_line = match args.first() {
        None => true,
        Some(v) => v.is_truthy(),
    };
    Ok(ctx.callers(with_line))
}

/// `suspend([seconds])`.
fn bf_suspend(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(1))?;
    let timeout = match args.first() {
        None => None,
        Some(Var::Int(n)) if *n >= 0 => Some(Duration::from_secs(*n as u64)),
        Some(Var::Float(f)) if *f >= 0.0 => Some(Duration::from_secs_f64(*f)),
        Some(Var::Int(_) | Var::Float(_)) => return Err(Raise::error(Error::InvArg)),
        Some(_) => return Err(Raise::error(Error::Type)),
    };

    ctx.sched.set_state(ctx.task_id, TaskState::Suspended);
    let woke = wait_wake(&ctx.wake, timeout);
    match woke {
        Some(Wake::Kill) => Err(Raise::Abort(Abort::Kill)),
        Some(Wake::Resume(v)) => {
            // resume() already flipped us to Running.
            ctx.refresh_ticks();
            ctx.refresh_deadline();
            Ok(v)
        }
        None => {
            // Timed out. A racing resume may have flipped the state and
            // left its value in the channel; honor it if so.
            match ctx.wake.try_recv() {
                Ok(Wake::Resume(v)) => {
                    ctx.refresh_ticks();
                    ctx.refresh_deadline();
                    Ok(v)
                }
                Ok(Wake::Kill) => Err(Raise::Abort(Abort::Kill)),
                Err(_) => {
                    ctx.sched.set_state(ctx.task_id, TaskState::Running);
                    if timeout == Some(Duration::ZERO) {
                        // suspend(0): yield to the next scheduler tick.
                        may::coroutine::yield_now();
                    }
                    ctx.refresh_ticks();
                    ctx.refresh_deadline();
                    // Indistinguishable from resume(task, 0).
                    Ok(Var::Int(0))
                }
            }
        }
    }
}

fn bf_resume(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let id = want_int(&args[0])?;
    let value = args.get(1).cloned().unwrap_or(Var::Int(0));
    if id == ctx.task_id {
        return Err(Raise::error(Error::InvArg));
    }
    let progr = ctx.progr;
    let wizard = ctx.wizardly();
    ctx.sched.resume(id, value, progr, wizard)?;
    Ok(Var::Int(0))
}

/// `kill_task(task_id)`: on self, never returns (finally blocks run).
fn bf_kill_task(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let id = want_int(&args[0])?;
    if id == ctx.task_id {
        return Err(Raise::Abort(Abort::Kill));
    }
    let progr = ctx.progr;
    let wizard = ctx.wizardly();
    ctx.sched.kill(id, progr, wizard)?;
    Ok(Var::Int(0))
}

/// `yin([threshold])`: yield-if-needed. Refreshes ticks via a zero-length
/// suspension; never the wall deadline.
fn bf_yin(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(1))?;
    let threshold = match args.first() {
        Some(v) => want_int(v)?,
        None => 2_000,
    };
    if ctx.ticks_left >= threshold {
        return Ok(Var::Int(0));
    }
    // A zero-length yield: requeue immediately with a fresh tick budget.
    // The task never becomes resumable, so there is no state to race.
    may::coroutine::yield_now();
    ctx.refresh_ticks();
    Ok(Var::Int(1))
}

/// Both budget probes report empty in a top-level eval context.
fn bf_ticks_left(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    if ctx.kind == TaskKind::Eval {
        return Ok(Var::Int(0));
    }
    Ok(Var::Int(ctx.ticks_left.max(0)))
}

fn bf_seconds_left(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    if ctx.kind == TaskKind::Eval {
        return Ok(Var::Float(0.0));
    }
    Ok(Var::Float(ctx.seconds_left()))
}

/// `set_task_perms(obj)`: permanently changes the task's programmer; the
/// change survives until an enclosing verb-call frame pops.
fn bf_set_task_perms(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let who = want_obj(&args[0])?;
    if !(ctx.wizardly() || who == ctx.progr) {
        return Err(Raise::error(Error::Perm));
    }
    ctx.progr = who;
    ctx.set_frame_progr(who);
    ctx.sched.set_progr(ctx.task_id, who);
    Ok(Var::Int(0))
}

fn bf_caller_perms(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    Ok(Var::Obj(ctx.caller_perms()))
}

/// Task-local value; not inherited by forks.
fn bf_set_task_local(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    ctx.task_local = args.into_iter().next().expect("arity checked");
    Ok(Var::Int(0))
}

fn bf_task_local(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    Ok(ctx.task_local.clone())
}

/// `raise(code [, msg [, value]])`.
fn bf_raise(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(3))?;
    let Var::Err(code) = &args[0] else {
        return Err(Raise::error(Error::Type));
    };
    let msg = match args.get(1) {
        Some(v) => want_str(v)?.to_string_lossy(),
        None => code.message().to_string(),
    };
    let value = args.get(2).cloned().unwrap_or(Var::Int(0));
    Err(Raise::Moo(Exception {
        code: *code,
        msg,
        value,
        traceback: Vec::new(),
    }))
}

/// `notify(player, message)`: queue a line for the player's connection.
fn bf_notify(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 2, Some(2))?;
    let player = want_obj(&args[0])?;
    let msg = want_str(&args[1])?;
    if !(ctx.wizardly() || player == ctx.player || player == ctx.progr) {
        return Err(Raise::error(Error::Perm));
    }
    ctx.world.sessions.notify(player, &msg.to_string_lossy());
    Ok(Var::Int(1))
}

fn bf_connected_players(
    ctx: &mut TaskCtx,
    _act: &mut Activation,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    let players = ctx.world.sessions.connected_players();
    Ok(Var::list(players.into_iter().map(Var::Obj).collect()))
}
