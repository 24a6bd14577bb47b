//! byre kernel: the MOO execution engine
//!
//! Ties the pieces together: the tree-walking evaluator (`vm`), the task
//! scheduler (`tasks`), the builtin dispatch table (`builtins`), player
//! sessions, and server configuration.
//!
//! Concurrency model: every task runs its evaluator on its own May green
//! thread. The object store sits behind one process-wide mutex; the
//! scheduler's task registry behind a second. The two are never held at
//! once. Suspension is a cooperative blocking receive on the task's wake
//! channel; `resume` is a send; `kill_task` is a flag checked at every
//! instruction boundary plus a message on the same channel.

pub mod builtins;
pub mod config;
pub mod diagnostics;
pub mod sessions;
pub mod tasks;
pub mod vm;
pub mod world;

pub use config::Config;
pub use tasks::{Scheduler, TaskId, TaskKind, TaskState};
pub use vm::{Abort, Exception, Raise};
pub use world::World;
