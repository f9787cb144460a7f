//! Engine configuration options.

use crate::config::ProtocolConfig;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of events to retain in memory.
    pub max_events: usize,
    /// Fee, margin and liquidation parameters. Replaced only via `Engine::set_protocol_config`.
    pub protocol: ProtocolConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_events: 100_000,
            protocol: ProtocolConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_protocol(protocol: ProtocolConfig) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }
}
