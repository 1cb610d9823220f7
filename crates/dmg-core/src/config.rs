// ── Engine configuration ────────────────────────────────────────────────────

use crate::joypad::DEFAULT_POLL_CYCLES;
use crate::CoreError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Warn on reads and writes that hit no device.
    pub log_unmapped: bool,
    /// `trace!` every executed instruction.
    pub trace_instructions: bool,
    /// Cycles between button polls.
    pub joypad_poll_cycles: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { log_unmapped: true, trace_instructions: false, joypad_poll_cycles: DEFAULT_POLL_CYCLES }
    }
}

impl EngineConfig {
    pub fn from_json(s: &str) -> Result<Self, CoreError> {
        let cfg: EngineConfig = serde_json::from_str(s).map_err(|e| CoreError::Config(e.to_string()))?;
        if cfg.joypad_poll_cycles == 0 { return Err(CoreError::Config("joypad_poll_cycles must be nonzero".into())); }
        Ok(cfg)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
