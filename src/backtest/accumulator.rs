//! Accumulator builder.
//!
//! Groups single selections by `season|round` (or ISO week when either is
//! missing), ranks each group's legs by estimated EV and greedily combines
//! up to `leg_count` distinct matches into one parlay per group.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::strategy::odds::OddsSource;
use crate::strategy::probability::expected_value;
use crate::types::{MatchId, Outcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccumulatorConfig {
    /// Maximum legs per parlay.
    pub leg_count: usize,
    pub stake: Decimal,
    /// Rolling window used to estimate leg probabilities.
    pub form_window: usize,
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            leg_count: 3,
            stake: dec!(10),
            form_window: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Legs
// ---------------------------------------------------------------------------

/// One single selection eligible to become an accumulator leg.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leg {
    pub match_id: MatchId,
    pub date: DateTime<Utc>,
    pub season: Option<String>,
    pub round: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub selection: Outcome,
    pub odds: Decimal,
    pub odds_source: OddsSource,
    /// `None` while the match is unplayed.
    pub won: Option<bool>,
    /// Form-derived probability, when history allowed an estimate.
    pub probability: Option<f64>,
}

impl Leg {
    /// EV from the form estimate; neutral (0) without one.
    pub fn expected_value(&self) -> f64 {
        self.probability
            .and_then(|p| expected_value(p, self.odds))
            .unwrap_or(0.0)
    }

    pub fn group_key(&self) -> GroupKey {
        GroupKey::for_match(self.season.as_deref(), self.round.as_deref(), self.date)
    }
}

// ---------------------------------------------------------------------------
// Group key
// ---------------------------------------------------------------------------

/// Accumulator grouping: a league round, or an ISO calendar week.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    SeasonRound { season: String, round: String },
    IsoWeek { year: i32, week: u32 },
}

/// `2024/2025`, `2024_2025` and `2024 - 2025` all become `2024-2025`.
pub fn normalise_season(season: &str) -> String {
    let replaced: String = season
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '_' | '\\') { '-' } else { c })
        .collect();
    replaced
        .split('-')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn leading_year(text: &str) -> i32 {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 4)
        .and_then(|part| part.parse().ok())
        .unwrap_or(0)
}

fn round_number(round: &str) -> Option<u32> {
    round
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .last()
        .and_then(|part| part.parse().ok())
}

impl GroupKey {
    pub fn for_match(season: Option<&str>, round: Option<&str>, date: DateTime<Utc>) -> Self {
        let season = season.map(normalise_season).filter(|s| !s.is_empty());
        let round = round.map(str::trim).filter(|r| !r.is_empty());
        match (season, round) {
            (Some(season), Some(round)) => GroupKey::SeasonRound {
                season,
                round: round.to_string(),
            },
            _ => {
                let iso = date.iso_week();
                GroupKey::IsoWeek {
                    year: iso.year(),
                    week: iso.week(),
                }
            }
        }
    }

    /// (year, kind, number, text) so numeric rounds order as numbers.
    fn sort_key(&self) -> (i32, u8, u32, &str) {
        match self {
            GroupKey::SeasonRound { season, round } => (
                leading_year(season),
                1,
                round_number(round).unwrap_or(0),
                round.as_str(),
            ),
            GroupKey::IsoWeek { year, week } => (*year, 0, *week, ""),
        }
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.to_string().cmp(&other.to_string()))
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::SeasonRound { season, round } => write!(f, "{season}|{round}"),
            GroupKey::IsoWeek { year, week } => write!(f, "{year}|W{week:02}"),
        }
    }
}

impl Serialize for GroupKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccumulatorStatus {
    Won,
    Lost,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Accumulator {
    pub key: GroupKey,
    pub legs: Vec<Leg>,
    pub combined_odds: Decimal,
    pub stake: Decimal,
    pub status: AccumulatorStatus,
    /// Set once every leg is decided (or any leg lost).
    pub profit: Option<Decimal>,
    /// Sum of leg EVs, for ranking upcoming parlays.
    pub expected_value: f64,
}

impl Accumulator {
    fn from_legs(key: GroupKey, legs: Vec<Leg>, stake: Decimal) -> Self {
        let combined_odds = legs.iter().fold(Decimal::ONE, |acc, leg| acc * leg.odds);
        let status = if legs.iter().any(|l| l.won == Some(false)) {
            AccumulatorStatus::Lost
        } else if legs.iter().any(|l| l.won.is_none()) {
            AccumulatorStatus::Pending
        } else {
            AccumulatorStatus::Won
        };
        let profit = match status {
            AccumulatorStatus::Won => Some(stake * combined_odds - stake),
            AccumulatorStatus::Lost => Some(-stake),
            AccumulatorStatus::Pending => None,
        };
        let expected_value = legs.iter().map(Leg::expected_value).sum();
        Self {
            key,
            legs,
            combined_odds,
            stake,
            status,
            profit,
            expected_value,
        }
    }

    pub fn has_defaulted_odds(&self) -> bool {
        self.legs.iter().any(|l| l.odds_source == OddsSource::Default)
    }
}

fn by_ev_then_date(a: &Leg, b: &Leg) -> Ordering {
    b.expected_value()
        .total_cmp(&a.expected_value())
        .then(a.date.cmp(&b.date))
        .then(a.match_id.cmp(&b.match_id))
}

/// Build at most one parlay per group. Groups with fewer than two distinct
/// matches are dropped; output is ordered by key, most recent first.
pub fn build_accumulators(legs: &[Leg], config: &AccumulatorConfig) -> Vec<Accumulator> {
    let mut groups: HashMap<GroupKey, Vec<&Leg>> = HashMap::new();
    for leg in legs {
        groups.entry(leg.group_key()).or_default().push(leg);
    }

    let mut accumulators: Vec<Accumulator> = groups
        .into_iter()
        .filter_map(|(key, mut candidates)| {
            candidates.sort_by(|a, b| by_ev_then_date(a, b));

            let mut selected: Vec<Leg> = Vec::with_capacity(config.leg_count);
            for leg in candidates {
                if selected.len() >= config.leg_count {
                    break;
                }
                if selected.iter().any(|s| s.match_id == leg.match_id) {
                    debug!(group = %key, match_id = leg.match_id, "Duplicate match — leg rejected");
                    continue;
                }
                selected.push(leg.clone());
            }

            if selected.len() < 2 {
                debug!(group = %key, legs = selected.len(), "Too few legs — group dropped");
                return None;
            }
            Some(Accumulator::from_legs(key, selected, config.stake))
        })
        .collect();

    accumulators.sort_by(|a, b| b.key.cmp(&a.key));
    accumulators
}
