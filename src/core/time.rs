//! Shared timestamp/id helpers for decisions and RPC envelopes.

use std::time::{SystemTime, UNIX_EPOCH};
use ulid::Ulid;

/// Current unix time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    format!("{}Z", unix_now())
}

pub fn new_decision_id() -> String {
    Ulid::new().to_string()
}
