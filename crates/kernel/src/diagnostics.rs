//! Runtime diagnostics
//!
//! On Unix, `kill -QUIT <pid>` dumps scheduler state to stderr without
//! disturbing running tasks: task counts and the lifecycle counters. The
//! handler thread only reads atomics and takes no locks, so it is safe at
//! any point.

use crate::tasks::Scheduler;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[cfg(unix)]
pub fn install_signal_handler(sched: Arc<Scheduler>) {
    use signal_hook::consts::SIGQUIT;
    use signal_hook::iterator::Signals;

    let mut signals = match Signals::new([SIGQUIT]) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "cannot install SIGQUIT handler");
            return;
        }
    };
    std::thread::Builder::new()
        .name("byre-diagnostics".to_string())
        .spawn(move || {
            for _ in signals.forever() {
                dump(&sched);
            }
        })
        .ok();
}

#[cfg(not(unix))]
pub fn install_signal_handler(_sched: Arc<Scheduler>) {}

pub fn dump(sched: &Scheduler) {
    let active = sched.active.load(Ordering::Acquire);
    let spawned = sched.total_spawned.load(Ordering::Relaxed);
    let completed = sched.total_completed.load(Ordering::Relaxed);
    eprintln!("=== byre scheduler diagnostics ===");
    eprintln!("active tasks:    {active}");
    eprintln!("total spawned:   {spawned}");
    eprintln!("total completed: {completed}");
    // spawned - completed - active > 0 would mean lost tasks.
    eprintln!(
        "unaccounted:     {}",
        spawned.saturating_sub(completed).saturating_sub(active as u64)
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_does_not_panic_on_fresh_scheduler() {
        dump(&Scheduler::new());
    }
}
