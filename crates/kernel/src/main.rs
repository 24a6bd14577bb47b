//! byred: load a world, evaluate MOO code, checkpoint.
//!
//! The network transport is an external collaborator; this binary covers
//! the core loop a developer needs: create or load a snapshot, run eval
//! tasks against it, and write the world back out.

use byre_kernel::tasks::{Submission, TaskSpec};
use byre_kernel::{Config, Scheduler, World};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "byred", version, about = "byre MOO kernel")]
struct Cli {
    /// World snapshot to load; a minimal world is created if absent.
    #[arg(long, default_value = "world.db")]
    db: PathBuf,

    /// Optional TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Evaluate one MOO expression (wrapped in `return ...;`) and print
    /// the result.
    #[arg(long)]
    eval: Option<String>,

    /// Write the world back to the snapshot on exit.
    #[arg(long)]
    checkpoint: bool,
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let store = if cli.db.exists() {
        let file = std::fs::File::open(&cli.db)
            .map_err(|e| format!("cannot open {}: {e}", cli.db.display()))?;
        byre_db::snapshot::load(std::io::BufReader::new(file)).map_err(|e| e.to_string())?
    } else {
        info!(db = %cli.db.display(), "no snapshot; starting a minimal world");
        byre_db::Store::minimal()
    };

    let world = Arc::new(World::new(store, config));
    let sched = Arc::new(Scheduler::new());
    byre_kernel::diagnostics::install_signal_handler(sched.clone());

    if let Some(source) = &cli.eval {
        let wizard = byre_core::Objid(1);
        let rx = world.sessions.attach(wizard);
        let source = format!("return {source};");
        sched.submit(
            &world,
            Submission {
                spec: TaskSpec::Eval {
                    player: wizard,
                    progr: wizard,
                    source,
                },
                delay: Duration::ZERO,
            },
        );
        sched.wait_idle();
        while let Ok(line) = rx.try_recv() {
            println!("{line}");
        }
    }

    if cli.checkpoint {
        let file = std::fs::File::create(&cli.db)
            .map_err(|e| format!("cannot write {}: {e}", cli.db.display()))?;
        let mut out = std::io::BufWriter::new(file);
        world
            .with_store(|store| byre_db::snapshot::save(store, &mut out))
            .map_err(|e| e.to_string())?;
        info!(db = %cli.db.display(), "checkpoint written");
    }
    Ok(())
}
