//! Team History Index
//!
//! Per-team results of finished matches, kept in ascending date order so a
//! rolling window "strictly before date D" is a suffix scan.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::types::{Match, MatchId, TeamId, VenueContext};

/// One finished match seen from one team's side.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamResult {
    pub match_id: MatchId,
    pub date: DateTime<Utc>,
    pub is_home: bool,
    pub goals_for: u32,
    pub goals_against: u32,
}

impl TeamResult {
    pub fn matches_context(&self, context: VenueContext) -> bool {
        match context {
            VenueContext::Overall => true,
            VenueContext::Home => self.is_home,
            VenueContext::Away => !self.is_home,
        }
    }
}

/// Finished-match history indexed by team.
#[derive(Debug, Clone, Default)]
pub struct HistoryIndex {
    /// team_id -> results sorted by (date, match_id) ascending
    by_team: HashMap<TeamId, Vec<TeamResult>>,
    matches: usize,
}

impl HistoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every finished match in `matches`; unfinished ones are ignored.
    pub fn from_matches<'a>(matches: impl IntoIterator<Item = &'a Match>) -> Self {
        let mut index = Self::new();
        for m in matches {
            index.record(m);
        }
        index
    }

    /// Add a finished match to both teams' histories.
    ///
    /// Returns false (and records nothing) if the match has no final score.
    pub fn record(&mut self, m: &Match) -> bool {
        let Some((home, away)) = m.score() else {
            return false;
        };

        self.insert(
            m.home_team_id,
            TeamResult {
                match_id: m.id,
                date: m.date,
                is_home: true,
                goals_for: home,
                goals_against: away,
            },
        );
        self.insert(
            m.away_team_id,
            TeamResult {
                match_id: m.id,
                date: m.date,
                is_home: false,
                goals_for: away,
                goals_against: home,
            },
        );
        self.matches += 1;
        true
    }

    fn insert(&mut self, team: TeamId, result: TeamResult) {
        let results = self.by_team.entry(team).or_default();
        // Appends are the common case; out-of-order inserts keep the sort.
        let key = (result.date, result.match_id);
        let pos = results.partition_point(|r| (r.date, r.match_id) <= key);
        results.insert(pos, result);
    }

    /// Up to `limit` results for `team` dated strictly before `before` and
    /// played in `context`, most recent first.
    pub fn recent(
        &self,
        team: TeamId,
        before: DateTime<Utc>,
        context: VenueContext,
        limit: usize,
    ) -> Vec<&TeamResult> {
        let Some(results) = self.by_team.get(&team) else {
            return Vec::new();
        };
        let end = results.partition_point(|r| r.date < before);
        results[..end]
            .iter()
            .rev()
            .filter(|r| r.matches_context(context))
            .take(limit)
            .collect()
    }

    /// Number of finished matches indexed.
    pub fn len(&self) -> usize {
        self.matches
    }

    pub fn is_empty(&self) -> bool {
        self.matches == 0
    }

    pub fn team_count(&self) -> usize {
        self.by_team.len()
    }
}
