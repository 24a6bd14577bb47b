//! Type and value builtins: conversion, inspection, numerics, time.

use super::{need_args, want_int, BfFn};
use crate::vm::{Activation, Raise, TaskCtx};
use byre_core::literal::{to_display, to_literal};
use byre_core::{list, ops, Error, MooStr, Var};
use byre_db::store::ObjRef;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub fn register(map: &mut HashMap<&'static str, BfFn>) {
    map.insert("typeof", bf_typeof);
    map.insert("tostr", bf_tostr);
    map.insert("toliteral", bf_toliteral);
    map.insert("toint", bf_toint);
    map.insert("tonum", bf_toint);
    map.insert("tofloat", bf_tofloat);
    map.insert("toobj", bf_toobj);
    map.insert("toerr", bf_toerr);
    map.insert("value_bytes", bf_value_bytes);
    map.insert("value_hash", bf_value_hash);
    map.insert("valid", bf_valid);
    map.insert("length", bf_length);
    map.insert("random", bf_random);
    map.insert("min", bf_min);
    map.insert("max", bf_max);
    map.insert("abs", bf_abs);
    map.insert("sqrt", bf_sqrt);
    map.insert("sin", bf_sin);
    map.insert("cos", bf_cos);
    map.insert("tan", bf_tan);
    map.insert("exp", bf_exp);
    map.insert("log", bf_log);
    map.insert("floor", bf_floor);
    map.insert("ceil", bf_ceil);
    map.insert("time", bf_time);
    map.insert("ftime", bf_ftime);
    map.insert("ctime", bf_ctime);
    map.insert("server_version", bf_server_version);
}

fn bf_typeof(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    Ok(Var::Int(args[0].type_code()))
}

fn bf_tostr(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    let mut out = Vec::new();
    for a in &args {
        out.extend_from_slice(to_display(a).as_bytes());
    }
    Ok(Var::Str(MooStr::from_bytes(out)))
}

fn bf_toliteral(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    Ok(Var::Str(to_literal(&args[0])))
}

fn bf_toint(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let v = match &args[0] {
        Var::Int(n) => Var::Int(*n),
        Var::Float(f) => {
            if f.is_finite() && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                Var::Int(*f as i64)
            } else {
                return Err(Raise::error(Error::Float));
            }
        }
        Var::Str(s) => Var::Int(
            s.to_string_lossy()
                .trim()
                .parse::<i64>()
                .or_else(|_| s.to_string_lossy().trim().parse::<f64>().map(|f| f as i64))
                .unwrap_or(0),
        ),
        Var::Obj(o) => Var::Int(o.0),
        Var::Err(e) => Var::Int(e.code()),
        Var::Bool(b) => Var::Int(*b as i64),
        _ => return Err(Raise::error(Error::Type)),
    };
    Ok(v)
}

fn bf_tofloat(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let v = match &args[0] {
        Var::Int(n) => Var::Float(*n as f64),
        Var::Float(f) => Var::Float(*f),
        Var::Str(s) => Var::Float(s.to_string_lossy().trim().parse::<f64>().unwrap_or(0.0)),
        Var::Err(e) => Var::Float(e.code() as f64),
        Var::Bool(b) => Var::Float(*b as i64 as f64),
        _ => return Err(Raise::error(Error::Type)),
    };
    if let Var::Float(f) = v {
        if !f.is_finite() {
            return Err(Raise::error(Error::Float));
        }
    }
    Ok(v)
}

fn bf_toobj(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let v = match &args[0] {
        Var::Int(n) => Var::obj(*n),
        Var::Obj(o) => Var::Obj(*o),
        Var::Float(f) => Var::obj(*f as i64),
        Var::Str(s) => {
            let text = s.to_string_lossy();
            let trimmed = text.trim();
            let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
            Var::obj(digits.parse::<i64>().unwrap_or(0))
        }
        _ => return Err(Raise::error(Error::Type)),
    };
    Ok(v)
}

fn bf_toerr(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    match &args[0] {
        Var::Int(n) => Error::from_code(*n)
            .map(Var::Err)
            .ok_or_else(|| Raise::error(Error::InvArg)),
        Var::Err(e) => Ok(Var::Err(*e)),
        Var::Str(s) => Error::parse(&s.to_string_lossy())
            .map(Var::Err)
            .ok_or_else(|| Raise::error(Error::InvArg)),
        _ => Err(Raise::error(Error::Type)),
    }
}

fn bf_value_bytes(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    Ok(Var::Int(args[0].value_bytes() as i64))
}

/// SHA-256 of the literal rendering, hex-encoded.
fn bf_value_hash(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let lit = to_literal(&args[0]);
    let digest = Sha256::digest(lit.as_bytes());
    Ok(Var::str(&hex::encode(digest)))
}

fn bf_valid(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    let objref = match ObjRef::from_var(&args[0]) {
        Ok(r) => r,
        Err(_) => return Err(Raise::error(Error::Type)),
    };
    let valid = ctx.world.with_store(|s| s.is_valid_ref(&objref));
    Ok(Var::Int(valid as i64))
}

fn bf_length(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    Ok(Var::Int(list::length(&args[0])?))
}

/// `random()` -> huge range; `random(n)` -> 1..=n.
fn bf_random(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(1))?;
    use rand::Rng;
    let mut rng = rand::thread_rng();
    match args.first() {
        None => Ok(Var::Int(rng.gen_range(1..=i32::MAX as i64))),
        Some(v) => {
            let n = want_int(v)?;
            if n < 1 {
                return Err(Raise::error(Error::InvArg));
            }
            Ok(Var::Int(rng.gen_range(1..=n)))
        }
    }
}

fn bf_min(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    fold_extremum(args, std::cmp::Ordering::Less)
}

fn bf_max(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    fold_extremum(args, std::cmp::Ordering::Greater)
}

/// All arguments must share one ordered type; returns the extreme one.
fn fold_extremum(args: Vec<Var>, keep: std::cmp::Ordering) -> Result<Var, Raise> {
    need_args(&args, 1, None)?;
    let mut best = args[0].clone();
    for v in &args[1..] {
        if v.compare(&best)? == keep {
            best = v.clone();
        }
    }
    Ok(best)
}

fn bf_abs(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(1))?;
    match &args[0] {
        Var::Int(n) => Ok(Var::Int(n.wrapping_abs())),
        Var::Float(f) => Ok(Var::Float(f.abs())),
        _ => Err(Raise::error(Error::Type)),
    }
}

fn float_arg(args: &[Var]) -> Result<f64, Raise> {
    need_args(args, 1, Some(1))?;
    match &args[0] {
        Var::Float(f) => Ok(*f),
        Var::Int(n) => Ok(*n as f64),
        _ => Err(Raise::error(Error::Type)),
    }
}

macro_rules! float_fn {
    ($name:ident, $method:ident) => {
        fn $name(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
            let f = float_arg(&args)?;
            Ok(ops::check_float(f.$method())?)
        }
    };
}

float_fn!(bf_sqrt, sqrt);
float_fn!(bf_sin, sin);
float_fn!(bf_cos, cos);
float_fn!(bf_tan, tan);
float_fn!(bf_exp, exp);
float_fn!(bf_log, ln);
float_fn!(bf_floor, floor);
float_fn!(bf_ceil, ceil);

fn bf_time(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    Ok(Var::Int(unix_now().0))
}

fn bf_ftime(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    let (secs, nanos) = unix_now();
    Ok(Var::Float(secs as f64 + nanos as f64 / 1e9))
}

/// Readable UTC timestamp; the classic ctime format without a timezone
/// database dependency.
fn bf_ctime(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 0, Some(1))?;
    let secs = match args.first() {
        Some(v) => want_int(v)?,
        None => unix_now().0,
    };
    Ok(Var::str(&format_utc(secs)))
}

fn bf_server_version(
    _ctx: &mut TaskCtx,
    _act: &mut Activation,
    args: Vec<Var>,
) -> Result<Var, Raise> {
    need_args(&args, 0, Some(0))?;
    Ok(Var::str(concat!("byre/", env!("CARGO_PKG_VERSION"))))
}

fn unix_now() -> (i64, u32) {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => (d.as_secs() as i64, d.subsec_nanos()),
        Err(_) => (0, 0),
    }
}

/// Civil-from-days conversion, UTC only.
fn format_utc(secs: i64) -> String {
    let days = secs.div_euclid(86_400);
    let tod = secs.rem_euclid(86_400);
    let (h, m, s) = (tod / 3600, (tod % 3600) / 60, tod % 60);

    // Howard Hinnant's civil_from_days.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let mth = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if mth <= 2 { y + 1 } else { y };

    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    format!(
        "{} {:2} {:02}:{:02}:{:02} {} UTC",
        MONTHS[(mth - 1) as usize],
        d,
        h,
        m,
        s,
        year
    )
}
