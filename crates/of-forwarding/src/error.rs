//! Forwarding-core error domain, mirrored on `of_channel::error::OfpError`:
//! a `thiserror`-derived enum plus a `From` conversion into `CoreError`.

use of_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForwardingError {
    #[error("mac table at capacity ({max_entries} entries); new entry dropped")]
    MacTableFull { max_entries: usize },

    #[error("updater cycle aborted: worker {worker_id} still referring old side")]
    UpdaterCycleAborted { worker_id: usize },

    #[error("route table entry rejected: prefix_len {prefix_len} out of range (0..=32)")]
    InvalidPrefixLen { prefix_len: u8 },

    #[error("pipeline stage queue closed while submitting work")]
    StageQueueClosed,
}

impl From<ForwardingError> for CoreError {
    fn from(value: ForwardingError) -> Self {
        let code = match &value {
            ForwardingError::MacTableFull { .. } => "forwarding.mac_table_full",
            ForwardingError::UpdaterCycleAborted { .. } => "forwarding.updater_cycle_aborted",
            ForwardingError::InvalidPrefixLen { .. } => "forwarding.invalid_prefix_len",
            ForwardingError::StageQueueClosed => "forwarding.stage_queue_closed",
        };
        CoreError::new(code, value.to_string())
    }
}
