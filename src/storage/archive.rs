//! Match archive.
//!
//! Read-only snapshot of teams, matches, odds and strategy definitions,
//! persisted as a single JSON document. Engines query it through
//! [`MatchQuery`]; nothing in the engine mutates it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::strategy::odds::normalise_name;
use crate::types::{
    Match, MatchId, MatchStatus, OddsRecord, Strategy, StrategyId, Team, TeamId,
};

/// On-disk layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveSnapshot {
    #[serde(default)]
    pub teams: Vec<Team>,
    #[serde(default)]
    pub matches: Vec<Match>,
    #[serde(default)]
    pub odds: Vec<OddsRecord>,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
}

/// Filter over the archive's matches. Empty/`None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MatchQuery {
    pub leagues: Vec<String>,
    pub season: Option<String>,
    pub statuses: Vec<MatchStatus>,
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
    /// Either side must be one of these.
    pub team_ids: Vec<TeamId>,
}

impl MatchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: MatchStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn league(mut self, league: impl Into<String>) -> Self {
        self.leagues.push(league.into());
        self
    }

    pub fn leagues(mut self, leagues: &[String]) -> Self {
        self.leagues.extend(leagues.iter().cloned());
        self
    }

    pub fn season(mut self, season: impl Into<String>) -> Self {
        self.season = Some(season.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.until = Some(until);
        self
    }

    pub fn team(mut self, team_id: TeamId) -> Self {
        self.team_ids.push(team_id);
        self
    }

    pub fn matches(&self, m: &Match) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&m.status) {
            return false;
        }
        if !self.leagues.is_empty()
            && !self
                .leagues
                .iter()
                .any(|l| normalise_name(l) == normalise_name(&m.league))
        {
            return false;
        }
        if let Some(season) = &self.season {
            if m.season.as_deref() != Some(season.as_str()) {
                return false;
            }
        }
        if self.from.is_some_and(|from| m.date < from) {
            return false;
        }
        if self.until.is_some_and(|until| m.date >= until) {
            return false;
        }
        self.team_ids.is_empty() || self.team_ids.iter().any(|t| m.involves(*t))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Archive {
    teams: HashMap<TeamId, Team>,
    /// Sorted by (date, id).
    matches: Vec<Match>,
    odds: HashMap<MatchId, Vec<OddsRecord>>,
    strategies: Vec<Strategy>,
}

impl Archive {
    /// Build indices from a snapshot, dropping matches whose scores
    /// contradict their status.
    pub fn from_snapshot(snapshot: ArchiveSnapshot) -> Self {
        let teams = snapshot.teams.into_iter().map(|t| (t.id, t)).collect();

        let mut matches: Vec<Match> = snapshot
            .matches
            .into_iter()
            .filter(|m| {
                let ok = m.is_consistent();
                if !ok {
                    warn!(
                        match_id = m.id,
                        status = %m.status,
                        "Scores inconsistent with status — match dropped"
                    );
                }
                ok
            })
            .collect();
        matches.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

        let mut odds: HashMap<MatchId, Vec<OddsRecord>> = HashMap::new();
        for row in snapshot.odds {
            odds.entry(row.match_id).or_default().push(row);
        }

        let mut strategies = snapshot.strategies;
        strategies.sort_by_key(|s| s.id);

        Self {
            teams,
            matches,
            odds,
            strategies,
        }
    }

    pub fn to_snapshot(&self) -> ArchiveSnapshot {
        let mut teams: Vec<Team> = self.teams.values().cloned().collect();
        teams.sort_by_key(|t| t.id);
        let mut odds: Vec<OddsRecord> = self.odds.values().flatten().cloned().collect();
        odds.sort_by(|a, b| {
            a.match_id
                .cmp(&b.match_id)
                .then(a.captured_at.cmp(&b.captured_at))
                .then(a.bookmaker.cmp(&b.bookmaker))
        });
        ArchiveSnapshot {
            teams,
            matches: self.matches.clone(),
            odds,
            strategies: self.strategies.clone(),
        }
    }

    /// Load an archive from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read archive from {}", path.display()))?;
        let snapshot: ArchiveSnapshot = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse archive from {}", path.display()))?;
        let archive = Self::from_snapshot(snapshot);
        info!(
            path = %path.display(),
            teams = archive.teams.len(),
            matches = archive.matches.len(),
            strategies = archive.strategies.len(),
            "Archive loaded"
        );
        Ok(archive)
    }

    /// Save the archive as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.to_snapshot())
            .context("Failed to serialise archive")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write archive to {}", path.display()))?;
        debug!(path = %path.display(), "Archive saved");
        Ok(())
    }

    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.get(&id)
    }

    /// Display name, or empty when the team is unknown.
    pub fn team_name(&self, id: TeamId) -> &str {
        self.teams.get(&id).map_or("", |t| t.name.as_str())
    }

    pub fn team_by_name(&self, name: &str) -> Option<&Team> {
        let wanted = normalise_name(name);
        self.teams.values().find(|t| normalise_name(&t.name) == wanted)
    }

    pub fn get_match(&self, id: MatchId) -> Option<&Match> {
        self.matches.iter().find(|m| m.id == id)
    }

    /// All matches in (date, id) order.
    pub fn all_matches(&self) -> &[Match] {
        &self.matches
    }

    /// Matches selected by `query`, in (date, id) order.
    pub fn query(&self, query: &MatchQuery) -> Vec<&Match> {
        self.matches.iter().filter(|m| query.matches(m)).collect()
    }

    pub fn finished_matches(&self) -> Vec<&Match> {
        self.matches.iter().filter(|m| m.is_finished()).collect()
    }

    pub fn odds_for(&self, match_id: MatchId) -> &[OddsRecord] {
        self.odds.get(&match_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn strategy(&self, id: StrategyId) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.id == id)
    }

    pub fn active_strategies(&self) -> Vec<&Strategy> {
        self.strategies.iter().filter(|s| s.is_active).collect()
    }
}
