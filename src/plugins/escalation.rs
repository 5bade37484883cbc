//! Escalation tracker.
//!
//! Counts repeated non-ALLOW outcomes per `(branch, topic)` within one
//! session and maps the count to a severity tier. Counters live in process
//! memory only; a tracker is owned by the engine and never shared between
//! sessions.

use crate::core::config::EscalationConfig;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// New work requested while the workspace has uncommitted changes.
    NewWorkOnDirty,
    /// A branch, spec or issue created on a dirty workspace.
    CreationOnDirty,
    /// Intent unclear while the workspace is dirty.
    AmbiguousOnDirty,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewWorkOnDirty => "new-work-on-dirty",
            Self::CreationOnDirty => "creation-on-dirty",
            Self::AmbiguousOnDirty => "ambiguous-on-dirty",
        }
    }

    /// Only new work on a dirty workspace may reach the `Block` tier.
    pub fn can_reach_block(self) -> bool {
        matches!(self, Self::NewWorkOnDirty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeverityTier {
    Nudge,
    Reminder,
    Warning,
    Block,
}

impl SeverityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nudge => "nudge",
            Self::Reminder => "reminder",
            Self::Warning => "warning",
            Self::Block => "block",
        }
    }

    pub fn shows_override_hint(self) -> bool {
        self >= Self::Warning
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EscalationKey {
    pub branch: String,
    pub topic: Topic,
}

impl EscalationKey {
    pub fn new(branch: &str, topic: Topic) -> Self {
        Self {
            branch: branch.to_string(),
            topic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationState {
    pub attempt_count: u32,
    pub first_attempt_time: SystemTime,
}

pub fn tier_for(count: u32, topic: Topic, thresholds: &EscalationConfig) -> SeverityTier {
    let tier = if count >= thresholds.block_at {
        SeverityTier::Block
    } else if count >= thresholds.warning_at {
        SeverityTier::Warning
    } else if count >= thresholds.reminder_at {
        SeverityTier::Reminder
    } else {
        SeverityTier::Nudge
    };
    if tier == SeverityTier::Block && !topic.can_reach_block() {
        SeverityTier::Warning
    } else {
        tier
    }
}

pub struct EscalationTracker {
    thresholds: EscalationConfig,
    counters: Mutex<FxHashMap<EscalationKey, EscalationState>>,
}

impl EscalationTracker {
    pub fn new(thresholds: EscalationConfig) -> Self {
        Self {
            thresholds,
            counters: Mutex::new(FxHashMap::default()),
        }
    }

    fn counters(&self) -> std::sync::MutexGuard<'_, FxHashMap<EscalationKey, EscalationState>> {
        self.counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Count one more attempt and return the new count with its tier.
    /// Increment and read happen under one lock.
    pub fn record(&self, key: EscalationKey) -> (u32, SeverityTier) {
        let topic = key.topic;
        let mut counters = self.counters();
        let state = counters.entry(key).or_insert_with(|| EscalationState {
            attempt_count: 0,
            first_attempt_time: SystemTime::now(),
        });
        state.attempt_count = state.attempt_count.saturating_add(1);
        let count = state.attempt_count;
        (count, tier_for(count, topic, &self.thresholds))
    }

    pub fn get(&self, key: &EscalationKey) -> Option<EscalationState> {
        self.counters().get(key).cloned()
    }

    pub fn attempt_count(&self, key: &EscalationKey) -> u32 {
        self.get(key).map(|s| s.attempt_count).unwrap_or(0)
    }

    /// Clear every topic for `branch`.
    pub fn reset_branch(&self, branch: &str) {
        self.counters().retain(|key, _| key.branch != branch);
    }

    pub fn reset_all(&self) {
        self.counters().clear();
    }

    pub fn thresholds(&self) -> &EscalationConfig {
        &self.thresholds
    }
}
