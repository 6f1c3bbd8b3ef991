use crate::session::{SessionExit, SessionResult};
use crate::validate::ValidationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// ScenarioReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub exit: SessionExit,
    pub duration_ms: i64,
    pub passed: usize,
    pub total: usize,
    pub outcomes: Vec<ValidationOutcome>,
}

// ---------------------------------------------------------------------------
// RankEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankEntry {
    /// 1-based; scenarios with equal scores share a rank.
    pub rank: usize,
    pub scenario_id: String,
    pub passed: usize,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// AnalysisReport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    /// The `benchmark-results-*` file this report was computed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub scenarios: BTreeMap<String, ScenarioReport>,
    pub ranking: Vec<RankEntry>,
}

impl AnalysisReport {
    /// Build a report from per-session outcomes. `entries` must be in
    /// registry order; that order breaks ranking ties.
    pub fn build(entries: Vec<(&SessionResult, Vec<ValidationOutcome>)>) -> Self {
        let mut scenarios = BTreeMap::new();
        let mut order = Vec::with_capacity(entries.len());

        for (session, outcomes) in entries {
            let passed = outcomes.iter().filter(|o| o.passed).count();
            order.push((session.scenario_id.clone(), passed, outcomes.len()));
            scenarios.insert(
                session.scenario_id.clone(),
                ScenarioReport {
                    scenario_id: session.scenario_id.clone(),
                    exit: session.exit.clone(),
                    duration_ms: session.duration_ms(),
                    passed,
                    total: outcomes.len(),
                    outcomes,
                },
            );
        }

        Self {
            generated_at: Utc::now(),
            source: None,
            scenarios,
            ranking: rank(order),
        }
    }

    pub fn winner(&self) -> Option<&RankEntry> {
        self.ranking.first()
    }
}

/// Sort by passed checks, descending. The sort is stable, so equal scores
/// keep their input order.
fn rank(mut order: Vec<(String, usize, usize)>) -> Vec<RankEntry> {
    order.sort_by(|a, b| b.1.cmp(&a.1));
    let mut out: Vec<RankEntry> = Vec::with_capacity(order.len());
    for (i, (scenario_id, passed, total)) in order.into_iter().enumerate() {
        let rank = match out.last() {
            Some(prev) if prev.passed == passed => prev.rank,
            _ => i + 1,
        };
        out.push(RankEntry {
            rank,
            scenario_id,
            passed,
            total,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
