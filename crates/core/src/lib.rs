//! byre core: the MOO value model
//!
//! Key design principles:
//! - `Var`: what MOO programs talk about (Int, Str, Obj, List, Map, ...)
//! - Composites (List, Map, Str) are `Arc`-shared and copy-on-write:
//!   cloning a `Var` is O(1), mutation clones the payload only when shared
//! - No implicit coercion anywhere: every operation is type-strict and
//!   returns `Result` with a MOO `Error` code on mismatch

pub mod error;
pub mod list;
pub mod literal;
pub mod map;
pub mod objid;
pub mod ops;
pub mod string;
pub mod value;

pub use error::Error;
pub use objid::{Objid, AMBIGUOUS, FAILED_MATCH, NOTHING, SYSTEM_OBJECT};
pub use string::MooStr;
pub use value::{AnonRef, Sequence, Var, WaifRef};
