//! Intent analyzer.
//!
//! Scores a natural-language message against the maintenance and new-work
//! pattern sets. Each set scores `distinct matches / set size`; the category
//! is the set with the strictly higher score, provided it reached
//! `min_matches`. When both sets match, the winner must also dominate the
//! loser by `dominance_ratio`, otherwise the result is ambiguous.

use crate::core::config::{PatternSpec, WorkgateConfig};
use crate::core::error::WorkgateError;
use crate::core::output::truncate_bytes;
use crate::core::workspace::WorkspaceState;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Longest message prefix that is analyzed.
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentCategory {
    Maintenance,
    NewWork,
    Ambiguous,
}

impl IntentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Maintenance => "maintenance",
            Self::NewWork => "new-work",
            Self::Ambiguous => "ambiguous",
        }
    }

    /// Parse an explicit work-type override (`maintenance`, `new-work`).
    pub fn parse_override(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "maintenance" | "fix" | "bugfix" => Some(Self::Maintenance),
            "new-work" | "new" | "feature" => Some(Self::NewWork),
            _ => None,
        }
    }

    /// Override flag written into a message: `--force-new-work` or
    /// `--force-maintenance`. New work wins when both appear.
    pub fn from_flags(text: &str) -> Option<Self> {
        let mut found = None;
        for word in text.split_whitespace() {
            match word.trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | ',' | '.')) {
                "--force-new-work" => return Some(Self::NewWork),
                "--force-maintenance" => found = Some(Self::Maintenance),
                _ => {}
            }
        }
        found
    }
}

/// Where an intent came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntentSource {
    /// Analyzed from the message that accompanied the action.
    Message,
    /// Analyzed earlier in this working directory and reused.
    Remembered,
    /// Forced by the caller.
    Override,
    /// Nothing to analyze.
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub category: IntentCategory,
    pub confidence: f64,
    pub matched_patterns: Vec<String>,
    pub source: IntentSource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<String>,
}

impl IntentResult {
    pub fn overridden(category: IntentCategory) -> Self {
        Self {
            category,
            confidence: 1.0,
            matched_patterns: Vec::new(),
            source: IntentSource::Override,
            signals: vec!["explicit override".to_string()],
        }
    }

    pub fn unknown() -> Self {
        Self {
            category: IntentCategory::Ambiguous,
            confidence: 0.0,
            matched_patterns: Vec::new(),
            source: IntentSource::None,
            signals: Vec::new(),
        }
    }

    /// Mark a reused result. An explicit override stays an override.
    pub fn remembered(mut self) -> Self {
        if self.source != IntentSource::Override {
            self.source = IntentSource::Remembered;
        }
        self
    }
}

struct PatternSet {
    ids: Vec<String>,
    regexes: Vec<Regex>,
}

impl PatternSet {
    fn compile(set: &str, specs: &[PatternSpec]) -> Result<Self, WorkgateError> {
        let mut ids = Vec::with_capacity(specs.len());
        let mut regexes = Vec::with_capacity(specs.len());
        for spec in specs {
            let re = RegexBuilder::new(spec.pattern())
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    WorkgateError::ValidationError(format!("{} pattern '{}': {}", set, spec.id(), e))
                })?;
            ids.push(spec.id().to_string());
            regexes.push(re);
        }
        Ok(Self { ids, regexes })
    }

    fn len(&self) -> usize {
        self.regexes.len()
    }
}

pub struct IntentAnalyzer {
    maintenance: PatternSet,
    new_work: PatternSet,
    min_matches: usize,
    dominance_ratio: f64,
    budget: Duration,
}

impl IntentAnalyzer {
    pub fn from_config(config: &WorkgateConfig) -> Result<Self, WorkgateError> {
        Ok(Self {
            maintenance: PatternSet::compile("maintenance", &config.intent.maintenance)?,
            new_work: PatternSet::compile("new_work", &config.intent.new_work)?,
            min_matches: config.intent.min_matches.max(1),
            dominance_ratio: config.intent.dominance_ratio.max(1.0),
            budget: config.analysis_budget(),
        })
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn analyze(
        &self,
        message: &str,
        workspace: &WorkspaceState,
    ) -> Result<IntentResult, WorkgateError> {
        let deadline = Instant::now() + self.budget;
        let text = truncate_bytes(message, MAX_MESSAGE_BYTES);

        let maintenance = self.matches(&self.maintenance, text, deadline)?;
        let new_work = self.matches(&self.new_work, text, deadline)?;

        let m_score = normalized(maintenance.len(), self.maintenance.len());
        let n_score = normalized(new_work.len(), self.new_work.len());

        let (category, confidence) = self.pick(maintenance.len(), m_score, new_work.len(), n_score);

        let mut signals = Vec::new();
        if !maintenance.is_empty() && !new_work.is_empty() {
            signals.push(format!(
                "both sets matched (maintenance {:.3}, new-work {:.3})",
                m_score, n_score
            ));
        }
        match workspace.is_dirty() {
            Some(false) => signals.push("workspace is clean".to_string()),
            Some(true) => signals.push(format!(
                "workspace has {} uncommitted change(s)",
                workspace.changed_file_paths().len()
            )),
            None => signals.push("workspace status unknown".to_string()),
        }
        if let Some(issue) = workspace.issue_number() {
            signals.push(format!("branch references issue #{}", issue));
        }

        let mut matched_patterns = maintenance;
        matched_patterns.extend(new_work);
        tracing::debug!(
            category = category.as_str(),
            confidence,
            matched = ?matched_patterns,
            "intent analyzed"
        );

        Ok(IntentResult {
            category,
            confidence,
            matched_patterns,
            source: IntentSource::Message,
            signals,
        })
    }

    fn matches(
        &self,
        set: &PatternSet,
        text: &str,
        deadline: Instant,
    ) -> Result<Vec<String>, WorkgateError> {
        let mut hits = Vec::new();
        for (id, re) in set.ids.iter().zip(&set.regexes) {
            if Instant::now() >= deadline {
                return Err(WorkgateError::IntentAnalysisTimeout(
                    self.budget.as_millis() as u64,
                ));
            }
            if re.is_match(text) && !hits.contains(id) {
                hits.push(id.clone());
            }
        }
        Ok(hits)
    }

    fn pick(
        &self,
        m_hits: usize,
        m_score: f64,
        n_hits: usize,
        n_score: f64,
    ) -> (IntentCategory, f64) {
        let m_ok = m_hits >= self.min_matches;
        let n_ok = n_hits >= self.min_matches;
        let best = m_score.max(n_score);

        // Equal scores never pick a side.
        if m_score == n_score {
            return (IntentCategory::Ambiguous, best);
        }
        let (winner, winner_ok, winner_score, loser_score) = if m_score > n_score {
            (IntentCategory::Maintenance, m_ok, m_score, n_score)
        } else {
            (IntentCategory::NewWork, n_ok, n_score, m_score)
        };
        if !winner_ok {
            return (IntentCategory::Ambiguous, best);
        }
        if loser_score > 0.0 && winner_score < loser_score * self.dominance_ratio {
            return (IntentCategory::Ambiguous, best);
        }
        (winner, winner_score)
    }
}

fn normalized(hits: usize, set_size: usize) -> f64 {
    if set_size == 0 {
        0.0
    } else {
        hits as f64 / set_size as f64
    }
}
