//! Player sessions
//!
//! The transport layer is an external collaborator; what the kernel owns is
//! the registry mapping a player to an outbound line channel. `notify`
//! enqueues a line for delivery and quietly drops it when the player has no
//! live connection, which is the MOO tradition.

use byre_core::Objid;
use may::sync::mpmc;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::trace;

#[derive(Default)]
pub struct SessionRegistry {
    lines: Mutex<HashMap<Objid, mpmc::Sender<String>>>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry::default()
    }

    /// Attach a connection; returns the receiving end the transport drains.
    pub fn attach(&self, player: Objid) -> mpmc::Receiver<String> {
        let (tx, rx) = mpmc::channel();
        self.lines
            .lock()
            .expect("session registry lock poisoned")
            .insert(player, tx);
        rx
    }

    pub fn detach(&self, player: Objid) {
        self.lines
            .lock()
            .expect("session registry lock poisoned")
            .remove(&player);
    }

    /// Queue one line of text for the player. Lines to unconnected players
    /// vanish without error.
    pub fn notify(&self, player: Objid, line: &str) {
        let guard = self.lines.lock().expect("session registry lock poisoned");
        if let Some(tx) = guard.get(&player) {
            if tx.send(line.to_string()).is_err() {
                trace!(player = player.0, "notify to closed session dropped");
            }
        } else {
            trace!(player = player.0, "notify to unconnected player dropped");
        }
    }

    pub fn connected_players(&self) -> Vec<Objid> {
        let mut players: Vec<Objid> = self
            .lines
            .lock()
            .expect("session registry lock poisoned")
            .keys()
            .copied()
            .collect();
        players.sort();
        players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_reaches_attached_sessions() {
        let reg = SessionRegistry::new();
        let rx = reg.attach(Objid(5));
        reg.notify(Objid(5), "hello");
        assert_eq!(rx.recv().unwrap(), "hello");
    }

    #[test]
    fn notify_to_unconnected_is_dropped() {
        let reg = SessionRegistry::new();
        reg.notify(Objid(9), "void");
        // No panic, nothing to assert: the line is gone.
    }

    #[test]
    fn detach_removes_the_channel() {
        let reg = SessionRegistry::new();
        let _rx = reg.attach(Objid(5));
        assert_eq!(reg.connected_players(), vec![Objid(5)]);
        reg.detach(Objid(5));
        assert!(reg.connected_players().is_empty());
    }
}
