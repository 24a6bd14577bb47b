//! The shared world
//!
//! One mutex over the object store, the session registry, and the config.
//! Every store access goes through [`World::with_store`], which takes and
//! releases the lock inside one operation; nothing holds the store lock
//! across a verb call or a suspension.

use crate::config::Config;
use crate::sessions::SessionRegistry;
use byre_db::Store;
use std::sync::Mutex;

pub struct World {
    store: Mutex<Store>,
    pub sessions: SessionRegistry,
    pub config: Config,
}

impl World {
    pub fn new(store: Store, config: Config) -> World {
        World {
            store: Mutex::new(store),
            sessions: SessionRegistry::new(),
            config,
        }
    }

    /// Run one operation against the store under the lock. The closure must
    /// not call back into the evaluator or the scheduler.
    pub fn with_store<T>(&self, f: impl FnOnce(&mut Store) -> T) -> T {
        let mut guard = self.store.lock().expect("store lock poisoned");
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byre_core::Objid;

    #[test]
    fn with_store_serializes_access() {
        let world = World::new(Store::minimal(), Config::default());
        let max = world.with_store(|s| s.max_object());
        assert_eq!(max, Objid(1));
    }
}
