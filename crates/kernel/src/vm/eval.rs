//! The tree-walking evaluator
//!
//! One tick is charged per statement and per expression node; the charge
//! point is also where kill requests and budget exhaustion preempt the
//! task. Control flow (break/continue/return) travels as a `Flow` value so
//! every enclosing `finally` on the way out gets to run.

use super::{Activation, CommandCtx, FrameInfo, Raise, TaskCtx};
use crate::builtins;
use crate::tasks::TaskSpec;
use byre_compiler::ast::BinaryOp;
use byre_compiler::{Arg, Codes, Expr, Program, ScatterKind, ScatterTarget, Stmt, StmtKind};
use byre_core::value::WaifRef;
use byre_core::{list, map, ops, Error, Objid, Var, NOTHING};
use byre_db::store::ObjRef;
use byre_db::{props, verbs};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Statement-level control flow.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,
    Break(Option<String>),
    Continue(Option<String>),
    Return(Var),
}

// ----------------------------------------------------------------------
// Entry points
// ----------------------------------------------------------------------

/// Root of an input task: dispatch a command-matched verb. Command
/// dispatch does not consult the 'x' bit.
pub fn call_command_verb(
    ctx: &mut TaskCtx,
    this: Objid,
    verb: &str,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    let (program, owner, debug, definer, name) = ctx.world.with_store(|store| {
        let objref = ObjRef::Obj(this);
        store.get(this)?;
        let loc = verbs::resolve(store, &objref, verb)?;
        let program = verbs::program_for(store, loc)?;
        let v = &store.get(loc.definer)?.verbs[loc.index];
        Ok::<_, Error>((program, v.owner, v.perms.debug, loc.definer, verb.to_string()))
    })?;
    ctx.sched.set_progr(ctx.task_id, owner);
    run_verb_program(
        ctx,
        VerbRun {
            this: Var::Obj(this),
            caller: Var::Obj(ctx.player),
            verb_name: name,
            definer,
            debug,
            progr: owner,
            program,
            args,
        },
    )
}

/// Root of an eval task.
pub fn run_eval_program(ctx: &mut TaskCtx, program: &Program) -> Result<Var, Raise> {
    let mut act = Activation {
        this: Var::obj(-1),
        caller: Var::obj(-1),
        verb_name: "eval".to_string(),
        verb_definer: NOTHING,
        debug: true,
        env: base_env(ctx, &Var::obj(-1), &Var::obj(-1), "eval", Var::empty_list()),
        index_lens: Vec::new(),
        saved_progr: ctx.progr,
    };
    ctx.push_frame(FrameInfo {
        this: act.this.clone(),
        verb: act.verb_name.clone(),
        progr: ctx.progr,
        verb_loc: NOTHING,
        player: ctx.player,
        line: 1,
        debug: true,
    });
    let result = exec_stmts(ctx, &mut act, &program.stmts);
    ctx.pop_frame();
    finish_root(result)
}

/// Root of a forked task: the deep-copied environment arrives ready-made.
pub fn run_fork_body(
    ctx: &mut TaskCtx,
    this: Var,
    verb_name: String,
    verb_loc: Objid,
    line: usize,
    body: &[Stmt],
    env: HashMap<String, Var>,
) -> Result<Var, Raise> {
    let mut act = Activation {
        this: this.clone(),
        caller: Var::obj(-1),
        verb_name: verb_name.clone(),
        verb_definer: verb_loc,
        debug: true,
        env,
        index_lens: Vec::new(),
        saved_progr: ctx.progr,
    };
    ctx.push_frame(FrameInfo {
        this,
        verb: verb_name,
        progr: ctx.progr,
        verb_loc,
        player: ctx.player,
        line,
        debug: true,
    });
    let result = exec_stmts(ctx, &mut act, body);
    ctx.pop_frame();
    finish_root(result)
}

fn finish_root(result: Result<Flow, Raise>) -> Result<Var, Raise> {
    match result {
        Ok(Flow::Return(v)) => Ok(v),
        Ok(_) => Ok(Var::Int(0)),
        Err(e) => Err(e),
    }
}

/// Parameters of one verb-program run.
pub struct VerbRun {
    pub this: Var,
    pub caller: Var,
    pub verb_name: String,
    pub definer: Objid,
    pub debug: bool,
    /// The programmer the callee runs as (the verb's owner).
    pub progr: Objid,
    pub program: Arc<Program>,
    pub args: Vec<Var>,
}

/// Push an activation, run a verb program, restore the caller's
/// permissions on the way out. Unwinding MOO errors collect a traceback
/// line per frame.
pub fn run_verb_program(ctx: &mut TaskCtx, run: VerbRun) -> Result<Var, Raise> {
    if ctx.frame_depth() >= ctx.world.config.max_stack_depth {
        return Err(Raise::error(Error::MaxRec));
    }
    let args_list = Var::list(run.args);
    let mut act = Activation {
        this: run.this.clone(),
        caller: run.caller.clone(),
        verb_name: run.verb_name.clone(),
        verb_definer: run.definer,
        debug: run.debug,
        env: base_env(ctx, &run.this, &run.caller, &run.verb_name, args_list),
        index_lens: Vec::new(),
        saved_progr: ctx.progr,
    };
    ctx.push_frame(FrameInfo {
        this: run.this.clone(),
        verb: run.verb_name.clone(),
        progr: run.progr,
        verb_loc: run.definer,
        player: ctx.player,
        line: 1,
        debug: run.debug,
    });
    ctx.progr = run.progr;

    let result = exec_stmts(ctx, &mut act, &run.program.stmts);

    let line = ctx
        .stack
        .lock()
        .expect("task stack mirror poisoned")
        .last()
        .map(|f| f.line)
        .unwrap_or(0);
    ctx.progr = act.saved_progr;
    ctx.pop_frame();

    match result {
        Ok(Flow::Return(v)) => Ok(v),
        Ok(_) => Ok(Var::Int(0)),
        Err(Raise::Moo(mut e)) => {
            let loc = if run.debug {
                format!("... called from #{}:{}, line {}", run.definer.0, run.verb_name, line)
            } else {
                format!("... called from #{}:{}", run.definer.0, run.verb_name)
            };
            e.traceback.push(loc);
            Err(Raise::Moo(e))
        }
        Err(abort) => Err(abort),
    }
}

/// `obj:verb(args)` from code or from a builtin (initialize, enterfunc,
/// ...). Requires the 'x' bit at the defining site unless the caller is a
/// wizard.
pub fn call_verb(
    ctx: &mut TaskCtx,
    caller: Var,
    target: Var,
    verb: &str,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    let progr = ctx.progr;
    let (program, owner, debug, definer) = ctx.world.with_store(|store| {
        let objref = ObjRef::from_var(&target)?;
        store.deref(&objref)?;
        let loc = verbs::resolve(store, &objref, verb)?;
        let v = &store.get(loc.definer)?.verbs[loc.index];
        if !v.perms.execute && !super::is_wizard(store, progr) {
            return Err(Error::Perm);
        }
        let (owner, debug) = (v.owner, v.perms.debug);
        let program = verbs::program_for(store, loc)?;
        Ok::<_, Error>((program, owner, debug, loc.definer))
    })?;
    run_verb_program(
        ctx,
        VerbRun {
            this: target,
            caller,
            verb_name: verb.to_string(),
            definer,
            debug,
            progr: owner,
            program,
            args,
        },
    )
}

/// Like [`call_verb`] but a missing verb is simply absent (used for the
/// lifecycle hooks: `initialize`, `recycle`, `enterfunc`, `exitfunc`).
pub fn call_verb_if_defined(
    ctx: &mut TaskCtx,
    caller: Var,
    target: Var,
    verb: &str,
    args: Vec<Var>,
) -> Result<Option<Var>, Raise> {
    match call_verb(ctx, caller, target, verb, args) {
        Ok(v) => Ok(Some(v)),
        Err(Raise::Moo(e)) if e.code == Error::VerbNf && e.traceback.is_empty() => Ok(None),
        Err(e) => Err(e),
    }
}

/// The read-only context variables bound on every activation.
fn base_env(
    ctx: &TaskCtx,
    this: &Var,
    caller: &Var,
    verb: &str,
    args: Var,
) -> HashMap<String, Var> {
    let CommandCtx {
        argstr,
        dobj,
        dobjstr,
        prepstr,
        iobj,
        iobjstr,
    } = &ctx.command;
    let mut env = HashMap::new();
    env.insert("this".to_string(), this.clone());
    env.insert("player".to_string(), Var::Obj(ctx.player));
    env.insert("caller".to_string(), caller.clone());
    env.insert("verb".to_string(), Var::str(verb));
    env.insert("args".to_string(), args);
    env.insert("argstr".to_string(), Var::str(argstr));
    env.insert("dobj".to_string(), Var::Obj(*dobj));
    env.insert("dobjstr".to_string(), Var::str(dobjstr));
    env.insert("prepstr".to_string(), Var::str(prepstr));
    env.insert("iobj".to_string(), Var::Obj(*iobj));
    env.insert("iobjstr".to_string(), Var::str(iobjstr));
    env
}

// ----------------------------------------------------------------------
// Statements
// ----------------------------------------------------------------------

pub fn exec_stmts(ctx: &mut TaskCtx, act: &mut Activation, stmts: &[Stmt]) -> Result<Flow, Raise> {
    for stmt in stmts {
        ctx.set_frame_line(stmt.line);
        ctx.charge()?;
        match exec_stmt(ctx, act, stmt)? {
            Flow::Normal => {}
            flow => return Ok(flow),
        }
    }
    Ok(Flow::Normal)
}

fn exec_stmt(ctx: &mut TaskCtx, act: &mut Activation, stmt: &Stmt) -> Result<Flow, Raise> {
    match &stmt.kind {
        StmtKind::Expr(e) => {
            eval_expr(ctx, act, e)?;
            Ok(Flow::Normal)
        }
        StmtKind::Return(e) => {
            let v = match e {
                Some(e) => eval_expr(ctx, act, e)?,
                None => Var::Int(0),
            };
            Ok(Flow::Return(v))
        }
        StmtKind::Break(label) => Ok(Flow::Break(label.clone())),
        StmtKind::Continue(label) => Ok(Flow::Continue(label.clone())),
        StmtKind::Cond { arms, otherwise } => {
            for (cond, body) in arms {
                if eval_expr(ctx, act, cond)?.is_truthy() {
                    return exec_stmts(ctx, act, body);
                }
            }
            exec_stmts(ctx, act, otherwise)
        }
        StmtKind::While { label, cond, body } => {
            loop {
                ctx.charge()?;
                if !eval_expr(ctx, act, cond)?.is_truthy() {
                    break;
                }
                match exec_stmts(ctx, act, body)? {
                    Flow::Normal => {}
                    Flow::Continue(l) if loop_matches(&l, label) => {}
                    Flow::Break(l) if loop_matches(&l, label) => break,
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        }
        StmtKind::ForList {
            label,
            value,
            index,
            expr,
            body,
        } => {
            // The sequence is snapshotted once; later mutation of the
            // source variable does not affect iteration.
            let seq = eval_expr(ctx, act, expr)?;
            match seq {
                Var::List(items) => {
                    for (i, item) in items.iter().enumerate() {
                        act.env.insert(value.clone(), item.clone());
                        if let Some(ivar) = index {
                            act.env.insert(ivar.clone(), Var::Int(i as i64 + 1));
                        }
                        match exec_stmts(ctx, act, body)? {
                            Flow::Normal => {}
                            Flow::Continue(l) if loop_matches(&l, label) => {}
                            Flow::Break(l) if loop_matches(&l, label) => break,
                            flow => return Ok(flow),
                        }
                    }
                }
                Var::Map(pairs) => {
                    for (k, v) in pairs.iter() {
                        act.env.insert(value.clone(), v.clone());
                        if let Some(kvar) = index {
                            act.env.insert(kvar.clone(), k.clone());
                        }
                        match exec_stmts(ctx, act, body)? {
                            Flow::Normal => {}
                            Flow::Continue(l) if loop_matches(&l, label) => {}
                            Flow::Break(l) if loop_matches(&l, label) => break,
                            flow => return Ok(flow),
                        }
                    }
                }
                _ => return Err(Raise::error(Error::Type)),
            }
            Ok(Flow::Normal)
        }
        StmtKind::ForRange {
            label,
            var,
            from,
            to,
            body,
        } => {
            let Var::Int(from) = eval_expr(ctx, act, from)? else {
                return Err(Raise::error(Error::Type));
            };
            let Var::Int(to) = eval_expr(ctx, act, to)? else {
                return Err(Raise::error(Error::Type));
            };
            let mut i = from;
            while i <= to {
                act.env.insert(var.clone(), Var::Int(i));
                match exec_stmts(ctx, act, body)? {
                    Flow::Normal => {}
                    Flow::Continue(l) if loop_matches(&l, label) => {}
                    Flow::Break(l) if loop_matches(&l, label) => break,
                    flow => return Ok(flow),
                }
                match i.checked_add(1) {
                    Some(next) => i = next,
                    None => return Err(Raise::error(Error::Range)),
                }
            }
            Ok(Flow::Normal)
        }
        StmtKind::Fork { var, delay, body } => {
            let delay_v = eval_expr(ctx, act, delay)?;
            let duration = fork_delay(&delay_v)?;
            // Deep copy of the locals: value-level COW makes this a map of
            // cheap handles, and the child's mutations stay its own.
            let mut env = act.env.clone();
            let player = ctx.player;
            let progr = ctx.progr;
            let this = act.this.clone();
            let verb_name = act.verb_name.clone();
            let verb_loc = act.verb_definer;
            let line = stmt.line;
            let body = Arc::new(body.clone());
            let sched = ctx.sched.clone();
            let tid = sched.submit_with(&ctx.world, duration, |tid| {
                // The child's snapshot carries its own id too.
                if let Some(name) = var {
                    env.insert(name.clone(), Var::Int(tid));
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
                }
            });
            // The parent's binding exists before the fork statement ends.
            if let Some(name) = var {
                act.env.insert(name.clone(), Var::Int(tid));
            }
            Ok(Flow::Normal)
        }
        StmtKind::TryExcept { body, excepts } => {
            // Codes are evaluated at entry, before the body runs.
            let mut arms: Vec<Option<Vec<Error>>> = Vec::with_capacity(excepts.len());
            for arm in excepts {
                arms.push(eval_codes(ctx, act, &arm.codes)?);
            }
            match exec_stmts(ctx, act, body) {
                Err(Raise::Moo(e)) => {
                    for (arm, codes) in excepts.iter().zip(arms) {
                        let matched = match &codes {
                            None => true,
                            Some(list) => list.contains(&e.code),
                        };
                        if matched {
                            if let Some(id) = &arm.id {
                                // Only the code survives into the handler.
                                act.env.insert(id.clone(), Var::Err(e.code));
                            }
                            return exec_stmts(ctx, act, &arm.body);
                        }
                    }
                    Err(Raise::Moo(e))
                }
                other => other,
            }
        }
        StmtKind::TryFinally { body, handler } => {
            match exec_stmts(ctx, act, body) {
                Err(Raise::Abort(abort)) => {
                    // Cleanup runs on a bounded allowance; whatever it does
                    // cannot cancel the abort.
                    let saved = ctx.enter_cleanup();
                    let _ = exec_stmts(ctx, act, handler);
                    ctx.leave_cleanup(saved);
                    Err(Raise::Abort(abort))
                }
                body_result => match exec_stmts(ctx, act, handler) {
                    Ok(Flow::Normal) => body_result,
                    // A return/break/continue in finally overrides.
                    Ok(flow) => Ok(flow),
                    // An error in finally replaces the pending one.
                    Err(e) => Err(e),
                },
            }
        }
    }
}

fn loop_matches(flow_label: &Option<String>, loop_label: &Option<String>) -> bool {
    match flow_label {
        None => true,
        Some(l) => loop_label.as_deref() == Some(l.as_str()),
    }
}

fn fork_delay(v: &Var) -> Result<Duration, Raise> {
    match v {
        Var::Int(n) if *n >= 0 => Ok(Duration::from_secs(*n as u64)),
        Var::Float(f) if *f >= 0.0 => Ok(Duration::from_secs_f64(*f)),
        Var::Int(_) | Var::Float(_) => Err(Raise::error(Error::InvArg)),
        _ => Err(Raise::error(Error::Type)),
    }
}

/// Evaluate an except/catch code list: `None` is ANY, otherwise every
/// element must be an error value.
fn eval_codes(
    ctx: &mut TaskCtx,
    act: &mut Activation,
    codes: &Codes,
) -> Result<Option<Vec<Error>>, Raise> {
    match codes {
        Codes::Any => Ok(None),
        Codes::List(args) => {
            let values = eval_args(ctx, act, args)?;
            let mut list = Vec::with_capacity(values.len());
            for v in values {
                match v {
                    Var::Err(e) => list.push(e),
                    _ => return Err(Raise::error(Error::InvArg)),
                }
            }
            Ok(Some(list))
        }
    }
}

// ----------------------------------------------------------------------
// Expressions
// ----------------------------------------------------------------------

pub fn eval_expr(ctx: &mut TaskCtx, act: &mut Activation, expr: &Expr) -> Result<Var, Raise> {
    ctx.charge()?;
    match expr {
        Expr::Value(v) => Ok(v.clone()),
        Expr::Id(name) => act
            .env
            .get(name)
            .cloned()
            .ok_or_else(|| Raise::error(Error::VarNf)),
        Expr::Sysprop(name) => read_prop(ctx, Var::obj(0), name),
        Expr::List(args) => {
            let items = eval_args(ctx, act, args)?;
            let v = Var::list(items);
            ctx.check_limits(&v)?;
            Ok(v)
        }
        Expr::Map(pairs) => {
            let mut m = Arc::new(Vec::with_capacity(pairs.len()));
            for (k, vexpr) in pairs {
                let key = eval_expr(ctx, act, k)?;
                let value = eval_expr(ctx, act, vexpr)?;
                m = map::set(m, key, value);
            }
            let v = Var::Map(m);
            ctx.check_limits(&v)?;
            Ok(v)
        }
        Expr::And(a, b) => {
            let left = eval_expr(ctx, act, a)?;
            if left.is_truthy() {
                eval_expr(ctx, act, b)
            } else {
                Ok(left)
            }
        }
        Expr::Or(a, b) => {
            let left = eval_expr(ctx, act, a)?;
            if left.is_truthy() {
                Ok(left)
            } else {
                eval_expr(ctx, act, b)
            }
        }
        Expr::Not(e) => {
            let v = eval_expr(ctx, act, e)?;
            Ok(Var::Int(!v.is_truthy() as i64))
        }
        Expr::Neg(e) => {
            let v = eval_expr(ctx, act, e)?;
            Ok(ops::neg(&v)?)
        }
        Expr::Binary(op, a, b) => {
            let left = eval_expr(ctx, act, a)?;
            let right = eval_expr(ctx, act, b)?;
            eval_binary(ctx, *op, left, right)
        }
        Expr::Index(base, idx) => {
            let container = eval_expr(ctx, act, base)?;
            let len = container_len(&container);
            act.index_lens.push(len);
            let index = eval_expr(ctx, act, idx);
            act.index_lens.pop();
            Ok(list::index(&container, &index?)?)
        }
        Expr::Range { base, from, to } => {
            let container = eval_expr(ctx, act, base)?;
            let len = container_len(&container);
            act.index_lens.push(len);
            let bounds = (|| {
                let a = eval_expr(ctx, act, from)?;
                let b = eval_expr(ctx, act, to)?;
                Ok::<_, Raise>((a, b))
            })();
            act.index_lens.pop();
            let (a, b) = bounds?;
            let (Var::Int(a), Var::Int(b)) = (&a, &b) else {
                return Err(Raise::error(Error::Type));
            };
            Ok(list::range(&container, *a, *b)?)
        }
        Expr::RangeStart => Ok(Var::Int(1)),
        Expr::RangeEnd => {
            let len = act.index_lens.last().copied().unwrap_or(0);
            Ok(Var::Int(len))
        }
        Expr::Cond { cond, yes, no } => {
            if eval_expr(ctx, act, cond)?.is_truthy() {
                eval_expr(ctx, act, yes)
            } else {
                eval_expr(ctx, act, no)
            }
        }
        Expr::Catch { expr, codes, except } => {
            let codes = eval_codes(ctx, act, codes)?;
            match eval_expr(ctx, act, expr) {
                Ok(v) => Ok(v),
                Err(Raise::Moo(e)) => {
                    let matched = match &codes {
                        None => true,
                        Some(list) => list.contains(&e.code),
                    };
                    if matched {
                        match except {
                            Some(default) => eval_expr(ctx, act, default),
                            None => Ok(Var::Err(e.code)),
                        }
                    } else {
                        Err(Raise::Moo(e))
                    }
                }
                Err(abort) => Err(abort),
            }
        }
        Expr::Prop { obj, name } => {
            let target = eval_expr(ctx, act, obj)?;
            let name = eval_name(ctx, act, name)?;
            read_prop(ctx, target, &name)
        }
        Expr::Verb { obj, name, args } => {
            let target = eval_expr(ctx, act, obj)?;
            let name = eval_name(ctx, act, name)?;
            let args = eval_args(ctx, act, args)?;
            let caller = act.this.clone();
            call_verb(ctx, caller, target, &name, args)
        }
        Expr::Call { func, args } => {
            let args = eval_args(ctx, act, args)?;
            builtins::dispatch(ctx, act, func, args)
        }
        Expr::Assign { lhs, rhs } => {
            let value = eval_expr(ctx, act, rhs)?;
            assign_to(ctx, act, lhs, value.clone())?;
            Ok(value)
        }
        Expr::Scatter { targets, rhs } => {
            let value = eval_expr(ctx, act, rhs)?;
            scatter_assign(ctx, act, targets, &value)?;
            Ok(value)
        }
    }
}

fn eval_binary(ctx: &mut TaskCtx, op: BinaryOp, a: Var, b: Var) -> Result<Var, Raise> {
    let v = match op {
        BinaryOp::Add => {
            let v = ops::add(&a, &b)?;
            ctx.check_limits(&v)?;
            v
        }
        BinaryOp::Sub => ops::sub(&a, &b)?,
        BinaryOp::Mul => ops::mul(&a, &b)?,
        BinaryOp::Div => ops::div(&a, &b)?,
        BinaryOp::Rem => ops::rem(&a, &b)?,
        BinaryOp::Pow => ops::pow(&a, &b)?,
        BinaryOp::Eq => Var::Int((a == b) as i64),
        BinaryOp::Ne => Var::Int((a != b) as i64),
        BinaryOp::Lt => Var::Int((a.compare(&b)? == std::cmp::Ordering::Less) as i64),
        BinaryOp::Le => Var::Int((a.compare(&b)? != std::cmp::Ordering::Greater) as i64),
        BinaryOp::Gt => Var::Int((a.compare(&b)? == std::cmp::Ordering::Greater) as i64),
        BinaryOp::Ge => Var::Int((a.compare(&b)? != std::cmp::Ordering::Less) as i64),
        BinaryOp::In => Var::Int(list::is_member(&a, &b)?),
        BinaryOp::BitAnd => ops::bit_and(&a, &b)?,
        BinaryOp::BitOr => ops::bit_or(&a, &b)?,
        BinaryOp::BitXor => ops::bit_xor(&a, &b)?,
        BinaryOp::Shl => ops::shl(&a, &b)?,
        BinaryOp::Shr => ops::shr(&a, &b)?,
    };
    Ok(v)
}

fn container_len(v: &Var) -> i64 {
    list::length(v).unwrap_or(0)
}

/// A property or verb name position must evaluate to a string.
fn eval_name(ctx: &mut TaskCtx, act: &mut Activation, e: &Expr) -> Result<String, Raise> {
    match eval_expr(ctx, act, e)? {
        Var::Str(s) => Ok(s.to_string_lossy()),
        _ => Err(Raise::error(Error::Type)),
    }
}

/// Property read with waif instance-bag handling.
pub fn read_prop(ctx: &mut TaskCtx, target: Var, name: &str) -> Result<Var, Raise> {
    if let Var::Waif(w) = &target {
        return waif_read(ctx, w, name);
    }
    let progr = ctx.progr;
    let v = ctx.world.with_store(|store| {
        let objref = ObjRef::from_var(&target)?;
        let wizard = super::is_wizard(store, progr);
        props::get_value(store, &objref, name, progr, wizard)
    })?;
    Ok(v)
}

/// Waif properties live in the instance bag; an unset name falls back to
/// the class object's `:name` property, which is where waif classes keep
/// their defaults.
fn waif_read(ctx: &mut TaskCtx, w: &Arc<WaifRef>, name: &str) -> Result<Var, Raise> {
    let key = name.to_ascii_lowercase();
    if let Some(v) = w.props.lock().expect("waif bag poisoned").get(&key) {
        return Ok(v.clone());
    }
    let progr = ctx.progr;
    let class = w.class;
    let fallback = ctx.world.with_store(|store| {
        let wizard = super::is_wizard(store, progr);
        props::get_value(store, &ObjRef::Obj(class), &format!(":{key}"), progr, wizard)
    });
    fallback.map_err(|_| Raise::error(Error::PropNf))
}

fn write_prop(ctx: &mut TaskCtx, target: Var, name: &str, value: Var) -> Result<(), Raise> {
    if let Var::Waif(w) = &target {
        w.props
            .lock()
            .expect("waif bag poisoned")
            .insert(name.to_ascii_lowercase(), value);
        return Ok(());
    }
    let progr = ctx.progr;
    ctx.world.with_store(|store| {
        let objref = ObjRef::from_var(&target)?;
        let wizard = super::is_wizard(store, progr);
        props::set_value(store, &objref, name, value, progr, wizard)
    })?;
    Ok(())
}

/// Assignment targets: variables, properties, indexes and ranges. Nested
/// index paths (`a[1][2] = v`) rebuild each level copy-on-write and write
/// the new container back into the level above.
fn assign_to(
    ctx: &mut TaskCtx,
    act: &mut Activation,
    lhs: &Expr,
    value: Var,
) -> Result<(), Raise> {
    match lhs {
        Expr::Id(name) => {
            act.env.insert(name.clone(), value);
            Ok(())
        }
        Expr::Prop { obj, name } => {
            let target = eval_expr(ctx, act, obj)?;
            let name = eval_name(ctx, act, name)?;
            write_prop(ctx, target, &name, value)
        }
        Expr::Index(base, idx) => {
            let container = eval_expr(ctx, act, base)?;
            let len = container_len(&container);
            act.index_lens.push(len);
            let index = eval_expr(ctx, act, idx);
            act.index_lens.pop();
            let updated = list::index_set(container, &index?, value)?;
            ctx.check_limits(&updated)?;
            assign_to(ctx, act, base, updated)
        }
        Expr::Range { base, from, to } => {
            let container = eval_expr(ctx, act, base)?;
            let len = container_len(&container);
            act.index_lens.push(len);
            let bounds = (|| {
                let a = eval_expr(ctx, act, from)?;
                let b = eval_expr(ctx, act, to)?;
                Ok::<_, Raise>((a, b))
            })();
            act.index_lens.pop();
            let (a, b) = bounds?;
            let (Var::Int(a), Var::Int(b)) = (&a, &b) else {
                return Err(Raise::error(Error::Type));
            };
            let updated = list::range_set(container, *a, *b, value)?;
            ctx.check_limits(&updated)?;
            assign_to(ctx, act, base, updated)
        }
        _ => Err(Raise::error(Error::Type)),
    }
}

/// Scatter assignment. Required targets must all be fed; optionals are
/// filled left to right while surplus lasts; the rest target takes
/// whatever remains.
fn scatter_assign(
    ctx: &mut TaskCtx,
    act: &mut Activation,
    targets: &[ScatterTarget],
    value: &Var,
) -> Result<(), Raise> {
    let Var::List(items) = value else {
        return Err(Raise::error(Error::Type));
    };
    let nargs = items.len();
    let required = targets
        .iter()
        .filter(|t| matches!(t.kind, ScatterKind::Required))
        .count();
    let optional = targets
        .iter()
        .filter(|t| matches!(t.kind, ScatterKind::Optional(_)))
        .count();
    let has_rest = targets.iter().any(|t| matches!(t.kind, ScatterKind::Rest));

    if nargs < required || (!has_rest && nargs > required + optional) {
        return Err(Raise::error(Error::Args));
    }

    // Surplus beyond the required targets feeds optionals left to right;
    // whatever remains after that goes to the rest target.
    let mut opt_fill = (nargs - required).min(optional);
    let rest_take = nargs - required - opt_fill;
    let mut pos = 0usize;
    for target in targets {
        match &target.kind {
            ScatterKind::Required => {
                act.env.insert(target.name.clone(), items[pos].clone());
                pos += 1;
            }
            ScatterKind::Optional(default) => {
                if opt_fill > 0 {
                    act.env.insert(target.name.clone(), items[pos].clone());
                    pos += 1;
                    opt_fill -= 1;
                } else if let Some(default) = default {
                    let v = eval_expr(ctx, act, default)?;
                    act.env.insert(target.name.clone(), v);
                }
            }
            ScatterKind::Rest => {
                let rest: Vec<Var> = items[pos..pos + rest_take].to_vec();
                act.env.insert(target.name.clone(), Var::list(rest));
                pos += rest_take;
            }
        }
    }
    Ok(())
}

/// Evaluate an argument list, flattening `@` splices one level.
pub fn eval_args(
    ctx: &mut TaskCtx,
    act: &mut Activation,
    args: &[Arg],
) -> Result<Vec<Var>, Raise> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Arg::Normal(e) => out.push(eval_expr(ctx, act, e)?),
            Arg::Splice(e) => match eval_expr(ctx, act, e)? {
                Var::List(items) => out.extend(items.iter().cloned()),
                _ => return Err(Raise::error(Error::Type)),
            },
        }
    }
    Ok(out)
}
