//! JSON builtins.
//!
//! Three modes, mirroring the classic server:
//! - `"common-subset"` (the default): only values both sides understand;
//!   objects, errors and other MOO-only types render as their display
//!   strings, and parsing yields only INT/FLOAT/STR/LIST/MAP.
//! - `"embedded-types"`: MOO-only scalars travel as `"value|type"` strings
//!   and round-trip back to their original types.
//! - `"pretty"`: common-subset with indented output (generate only).

use super::{need_args, want_str, BfFn};
use crate::vm::{Activation, Raise, TaskCtx};
use byre_core::literal::to_display;
use byre_core::{Error, Objid, Var};
use serde_json::{json, Value as Json};
use std::collections::HashMap;

pub fn register(map: &mut HashMap<&'static str, BfFn>) {
    map.insert("generate_json", bf_generate_json);
    map.insert("parse_json", bf_parse_json);
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    CommonSubset,
    EmbeddedTypes,
    Pretty,
}

fn mode_arg(args: &[Var], at: usize) -> Result<Mode, Raise> {
    match args.get(at) {
        None => Ok(Mode::CommonSubset),
        Some(v) => match want_str(v)?.to_string_lossy().as_str() {
            "common-subset" | "default" => Ok(Mode::CommonSubset),
            "embedded-types" => Ok(Mode::EmbeddedTypes),
            "pretty" => Ok(Mode::Pretty),
            _ => Err(Raise::error(Error::InvArg)),
        },
    }
}

fn bf_generate_json(ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let mode = mode_arg(&args, 1)?;
    let value = to_json(&args[0], mode)?;
    let text = if mode == Mode::Pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .map_err(|_| Raise::error(Error::InvArg))?;
    let v = Var::string(text);
    ctx.check_limits(&v)?;
    Ok(v)
}

fn to_json(v: &Var, mode: Mode) -> Result<Json, Raise> {
    let json = match v {
        Var::Int(n) => json!(n),
        Var::Float(f) => json!(f),
        Var::Bool(b) => json!(b),
        Var::Str(s) => match mode {
            Mode::EmbeddedTypes => json!(format!("{}|str", s.to_string_lossy())),
            _ => json!(s.to_string_lossy()),
        },
        Var::Obj(o) => match mode {
            Mode::EmbeddedTypes => json!(format!("{o}|obj")),
            _ => json!(o.to_string()),
        },
        Var::Err(e) => match mode {
            Mode::EmbeddedTypes => json!(format!("{}|err", e.name())),
            _ => json!(e.name()),
        },
        Var::List(items) => {
            let mut arr = Vec::with_capacity(items.len());
            for item in items.iter() {
                arr.push(to_json(item, mode)?);
            }
            Json::Array(arr)
        }
        Var::Map(pairs) => {
            let mut obj = serde_json::Map::new();
            for (k, val) in pairs.iter() {
                let key = match k {
                    Var::Str(s) => s.to_string_lossy(),
                    other => to_display(other).to_string_lossy(),
                };
                obj.insert(key, to_json(val, mode)?);
            }
            Json::Object(obj)
        }
        // Anonymous objects and waifs have no JSON story.
        Var::Anon(_) | Var::Waif(_) => return Err(Raise::error(Error::InvArg)),
    };
    Ok(json)
}

fn bf_parse_json(_ctx: &mut TaskCtx, _act: &mut Activation, args: Vec<Var>) -> Result<Var, Raise> {
    need_args(&args, 1, Some(2))?;
    let text = want_str(&args[0])?;
    let mode = mode_arg(&args, 1)?;
    let parsed: Json = serde_json::from_str(&text.to_string_lossy())
        .map_err(|_| Raise::error(Error::InvArg))?;
    from_json(&parsed, mode)
}

fn from_json(j: &Json, mode: Mode) -> Result<Var, Raise> {
    let v = match j {
        Json::Null => Var::obj(-1),
        Json::Bool(b) => Var::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Var::Int(i)
            } else {
                let f = n.as_f64().ok_or_else(|| Raise::error(Error::InvArg))?;
                if !f.is_finite() {
                    return Err(Raise::error(Error::Float));
                }
                Var::Float(f)
            }
        }
        Json::String(s) => match mode {
            Mode::EmbeddedTypes => decode_embedded(s),
            _ => Var::str(s),
        },
        Json::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(from_json(item, mode)?);
            }
            Var::list(out)
        }
        Json::Object(entries) => {
            let mut pairs = Vec::with_capacity(entries.len());
            for (k, val) in entries {
                let key = match mode {
                    Mode::EmbeddedTypes => decode_embedded(k),
                    _ => Var::str(k),
                };
                pairs.push((key, from_json(val, mode)?));
            }
            Var::map(pairs)
        }
    };
    Ok(v)
}

/// `"value|type"` strings back to their tagged values; anything without a
/// recognized suffix stays a string.
fn decode_embedded(s: &str) -> Var {
    if let Some((body, tag)) = s.rsplit_once('|') {
        match tag {
            "str" => return Var::str(body),
            "obj" => {
                if let Some(n) = body.strip_prefix('#').and_then(|d| d.parse::<i64>().ok()) {
                    return Var::Obj(Objid(n));
                }
            }
            "err" => {
                if let Some(e) = Error::parse(body) {
                    return Var::Err(e);
                }
            }
            "int" => {
                if let Ok(n) = body.parse::<i64>() {
                    return Var::Int(n);
                }
            }
            "float" => {
                if let Ok(f) = body.parse::<f64>() {
                    if f.is_finite() {
                        return Var::Float(f);
                    }
                }
            }
            _ => {}
        }
    }
    Var::str(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_subset_round_trips_plain_data() {
        let v = Var::list(vec![
            Var::Int(1),
            Var::str("two"),
            Var::map(vec![(Var::str("k"), Var::Float(0.5))]),
        ]);
        let j = to_json(&v, Mode::CommonSubset).unwrap();
        let text = serde_json::to_string(&j).unwrap();
        let back: Json = serde_json::from_str(&text).unwrap();
        assert_eq!(from_json(&back, Mode::CommonSubset).unwrap(), v);
    }

    #[test]
    fn embedded_types_round_trip_moo_scalars() {
        let v = Var::list(vec![Var::obj(5), Var::Err(Error::Perm), Var::str("plain")]);
        let j = to_json(&v, Mode::EmbeddedTypes).unwrap();
        let back = from_json(&j, Mode::EmbeddedTypes).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn common_subset_degrades_objects_to_strings() {
        let j = to_json(&Var::obj(7), Mode::CommonSubset).unwrap();
        assert_eq!(j, json!("#7"));
    }

    #[test]
    fn unknown_suffix_stays_a_string() {
        assert_eq!(decode_embedded("x|y"), Var::str("x|y"));
        assert_eq!(decode_embedded("plain"), Var::str("plain"));
    }
}
