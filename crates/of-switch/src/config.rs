//! Switch-wide configuration, plain-struct style matching
//! `of_forwarding::config`.

use std::time::Duration;

use of_forwarding::{MacTableConfig, PipelineConfig, RibConfig};

use crate::failmode::FailMode;

#[derive(Clone, Copy, Debug)]
pub struct SwitchConfig {
    pub mac_table: MacTableConfig,
    pub rib: RibConfig,
    pub pipeline: PipelineConfig,
    pub default_fail_mode: FailMode,
    pub echo_interval: Duration,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            mac_table: MacTableConfig::default(),
            rib: RibConfig::default(),
            pipeline: PipelineConfig::default(),
            default_fail_mode: FailMode::Secure,
            echo_interval: Duration::from_secs(1),
        }
    }
}
