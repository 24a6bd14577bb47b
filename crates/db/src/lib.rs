//! byre object store
//!
//! A versioned in-memory database of persistent objects with multiple
//! inheritance, copy-on-write property slots, verbs carrying MOO code, and
//! anonymous-object lifetime tracking.
//!
//! The store itself is single-threaded data: the kernel wraps it in one
//! process-wide mutex and serializes every operation through it. Every
//! operation here either fully succeeds or fails with a MOO `Error` and no
//! partial effects; the kernel layers verb invocations (`initialize`,
//! `recycle`, `enterfunc`/`exitfunc`) around the pure mutations.

pub mod object;
pub mod props;
pub mod snapshot;
pub mod store;
pub mod verbs;

pub use object::{ArgSpec, Flags, Object, PrepSpec, PropPerms, PropertySlot, VerbArgs, VerbDef, VerbPerms};
pub use store::{ObjRef, Store};
