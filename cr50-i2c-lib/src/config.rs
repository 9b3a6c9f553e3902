use crate::registers::{CR50_DID_VID, CR50_TIMEOUT_LONG_MS, CR50_TIMEOUT_SHORT_MS, TPM_TIMEOUT_MS};

/// Driver tunables. The defaults match what the cr50 firmware expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Deadline for status, burst count, command ready, locality and probe
    /// polling.
    pub timeout_long_ms: u32,
    /// Settle delay after every register access and between status polls.
    pub timeout_short_ms: u32,
    /// Interval between locality grant checks.
    pub locality_poll_ms: u32,
    pub did_vid: u32,
    /// Log every command sent and response received at debug level.
    pub dump_transfers: bool,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            timeout_long_ms: CR50_TIMEOUT_LONG_MS,
            timeout_short_ms: CR50_TIMEOUT_SHORT_MS,
            locality_poll_ms: TPM_TIMEOUT_MS,
            did_vid: CR50_DID_VID,
            dump_transfers: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
