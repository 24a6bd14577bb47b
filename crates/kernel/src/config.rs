//! Server configuration
//!
//! Loaded from a TOML file by `byred`, with every field optional and
//! defaulted. Limits are deliberately conservative; a hostile verb should
//! run out of budget long before it hurts anyone else.

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Tick budget for tasks started from player input.
    pub input_ticks: i64,
    /// Wall-clock budget (seconds) for input tasks.
    pub input_seconds: u64,
    /// Tick budget for forked and resumed tasks.
    pub background_ticks: i64,
    /// Wall-clock budget (seconds) for forked and resumed tasks.
    pub background_seconds: u64,
    /// Extra ticks granted to `finally` bodies during an abort.
    pub cleanup_ticks: i64,
    /// Maximum nested verb-call depth before E_MAXREC.
    pub max_stack_depth: usize,
    /// Value-size ceilings checked by value-constructing builtins.
    pub max_string_length: usize,
    pub max_list_value_bytes: usize,
    pub max_map_value_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input_ticks: 60_000,
            input_seconds: 5,
            background_ticks: 30_000,
            background_seconds: 3,
            cleanup_ticks: 2_000,
            max_stack_depth: 50,
            max_string_length: 65_536,
            max_list_value_bytes: 1_048_576,
            max_map_value_bytes: 1_048_576,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Config, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        toml::from_str(&text).map_err(|e| format!("cannot parse {}: {e}", path.display()))
    }
}
