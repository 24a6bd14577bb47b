//! Builtin functions
//!
//! A builtin is a named function `(ctx, activation, args) -> Result`. The
//! dispatch table is built once; modules register themselves by concern,
//! mirroring the split of the evaluator itself: values, objects,
//! properties, verbs, lists, strings, tasks/server, JSON.
//!
//! Calling a name with no entry raises E_VERBNF, like an undefined verb.

pub mod bf_json;
pub mod bf_lists;
pub mod bf_objects;
pub mod bf_props;
pub mod bf_strings;
pub mod bf_tasks;
pub mod bf_values;
pub mod bf_verbs;

use crate::vm::{Activation, Raise, TaskCtx};
use byre_core::{Error, MooStr, Objid, Var};
use std::collections::HashMap;
use std::sync::OnceLock;

pub type BfFn = fn(&mut TaskCtx, &mut Activation, Vec<Var>) -> Result<Var, Raise>;

static REGISTRY: OnceLock<HashMap<&'static str, BfFn>> = OnceLock::new();

fn registry() -> &'static HashMap<&'static str, BfFn> {
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<&'static str, BfFn> = HashMap::new();
        bf_values::register(&mut map);
        bf_objects::register(&mut map);
        bf_props::register(&mut map);
        bf_verbs::register(&mut map);
        bf_lists::register(&mut map);
        bf_strings::register(&mut map);
        bf_tasks::register(&mut map);
        bf_json::register(&mut map);
        map
    })
}

pub fn dispatch(
    ctx: &mut TaskCtx,
    act: &mut Activation,
    name: &str,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    match registry().get(name) {
        Some(f) => f(ctx, act, args),
        None => Err(Raise::error_msg(
            Error::VerbNf,
            format!("unknown builtin {name}()"),
        )),
    }
}

pub fn is_builtin(name: &str) -> bool {
    registry().contains_key(name)
}

// ----------------------------------------------------------------------
// Argument plumbing shared by every bf_ module
// ----------------------------------------------------------------------

/// Arity check: E_ARGS outside `[min, max]` (`max` None = unbounded).
pub fn need_args(args: &[Var], min: usize, max: Option<usize>) -> Result<(), Raise> {
    if args.len() < min || max.map(|m| args.len() > m).unwrap_or(false) {
        return Err(Raise::error(Error::Args));
    }
    Ok(())
}

pub fn want_int(v: &Var) -> Result<i64, Raise> {
    match v {
        Var::Int(n) => Ok(*n),
        _ => Err(Raise::error(Error::Type)),
    }
}

pub fn want_str(v: &Var) -> Result<MooStr, Raise> {
    match v {
        Var::Str(s) => Ok(s.clone()),
        _ => Err(Raise::error(Error::Type)),
    }
}

pub fn want_obj(v: &Var) -> Result<Objid, Raise> {
    match v {
        Var::Obj(o) => Ok(*o),
        _ => Err(Raise::error(Error::Type)),
    }
}

pub fn want_list(v: &Var) -> Result<Vec<Var>, Raise> {
    match v {
        Var::List(l) => Ok(l.as_ref().clone()),
        _ => Err(Raise::error(Error::Type)),
    }
}

/// An OBJ or a LIST of OBJs, normalized (`create`, `chparents`).
pub fn want_obj_or_list(v: &Var) -> Result<Vec<Objid>, Raise> {
    match v {
        Var::Obj(o) => Ok(vec![*o]),
        Var::List(l) => l
            .iter()
            .map(|x| match x {
                Var::Obj(o) => Ok(*o),
                _ => Err(Raise::error(Error::Type)),
            })
            .collect(),
        _ => Err(Raise::error(Error::Type)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_contains_the_core_surface() {
        for name in [
            "typeof",
            "tostr",
            "toliteral",
            "value_bytes",
            "create",
            "recycle",
            "move",
            "add_property",
            "clear_property",
            "set_verb_code",
            "disassemble",
            "suspend",
            "resume",
            "kill_task",
            "queued_tasks",
            "callers",
            "yin",
            "raise",
            "notify",
            "generate_json",
            "parse_json",
            "listappend",
            "setremove",
            "strsub",
            "match",
            "substitute",
            "encode_binary",
        ] {
            assert!(is_builtin(name), "missing builtin {name}");
        }
        assert!(!is_builtin("no_such_builtin"));
    }

    #[test]
    fn need_args_bounds() {
        let args = vec![Var::Int(1), Var::Int(2)];
        assert!(need_args(&args, 2, Some(2)).is_ok());
        assert!(need_args(&args, 3, None).is_err());
        assert!(need_args(&args, 0, Some(1)).is_err());
    }
}
