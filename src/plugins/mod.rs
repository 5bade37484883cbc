//! Decision logic and host adapters.

pub mod classify;
pub mod decide;
pub mod escalation;
pub mod guidance;
pub mod hook;
pub mod intent;
pub mod issues;
pub mod serve;
