//! Strategy preview.
//!
//! Bounded backtest for unsaved conditions: replays finished matches with
//! an incremental history index, keeps the most recent matched results
//! (ranked newest first, like the sample it returns), and projects the same rule onto upcoming fixtures. Both horizons are
//! also folded into accumulators.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::accumulator::{build_accumulators, Accumulator, AccumulatorConfig, Leg};
use crate::history::HistoryIndex;
use crate::storage::{Archive, MatchQuery};
use crate::strategy::odds::{OddsConfig, OddsResolver, OddsSource, ResolvedOdds};
use crate::strategy::probability::{estimate_probability, expected_value, implied_probability};
use crate::strategy::{Decision, Scope, StrategyEvaluator};
use crate::types::{Condition, Match, MatchId, MatchStatus, Outcome, Strategy, TargetOutcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Most recent matched results kept for statistics.
    pub limit: usize,
    /// Rows returned in the sample.
    pub sample_size: usize,
    /// Horizon for upcoming projections.
    pub upcoming_days: i64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            limit: 100,
            sample_size: 5,
            upcoming_days: 14,
        }
    }
}

/// An ad-hoc rule being authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub target_outcome: TargetOutcome,
    #[serde(default)]
    pub leagues: Vec<String>,
    #[serde(default)]
    pub teams: Vec<String>,
    /// Overrides the configured result limit.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PreviewRequest {
    fn as_strategy(&self) -> Strategy {
        Strategy {
            id: 0,
            name: "preview".to_string(),
            description: None,
            target_outcome: self.target_outcome,
            is_active: true,
            leagues: self.leagues.clone(),
            teams: self.teams.clone(),
            conditions: self.conditions.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewMatch {
    pub match_id: MatchId,
    pub date: DateTime<Utc>,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub selection: Outcome,
    pub odds: Decimal,
    pub odds_source: OddsSource,
    pub home_score: u32,
    pub away_score: u32,
    pub won: bool,
    pub profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpcomingProjection {
    pub match_id: MatchId,
    pub date: DateTime<Utc>,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub selection: Outcome,
    pub odds: Decimal,
    pub odds_source: OddsSource,
    /// Form-derived probability; `None` when either side lacks history.
    pub probability: Option<f64>,
    pub implied_probability: Option<f64>,
    pub expected_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResult {
    pub matches_found: usize,
    pub wins: usize,
    pub losses: usize,
    /// Percent.
    pub win_rate: f64,
    /// Percent of total staked.
    pub roi: f64,
    pub total_profit: Decimal,
    pub defaulted_odds: usize,
    /// The newest `sample_size` results of the limited set, ordered by
    /// kick-off descending (match id descending on equal kick-off).
    pub sample: Vec<PreviewMatch>,
    pub accumulators: Vec<Accumulator>,
    pub upcoming: Vec<UpcomingProjection>,
    pub upcoming_accumulators: Vec<Accumulator>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct PreviewEngine {
    config: PreviewConfig,
    accumulator: AccumulatorConfig,
    resolver: OddsResolver,
    stake: Decimal,
}

fn make_leg(m: &Match, home: &str, away: &str, resolved: &ResolvedOdds, won: Option<bool>, probability: Option<f64>) -> Leg {
    Leg {
        match_id: m.id,
        date: m.date,
        season: m.season.clone(),
        round: m.round.clone(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        selection: resolved.outcome,
        odds: resolved.odds,
        odds_source: resolved.source.clone(),
        won,
        probability,
    }
}

impl PreviewEngine {
    pub fn new(
        config: PreviewConfig,
        accumulator: AccumulatorConfig,
        odds_config: OddsConfig,
        stake: Decimal,
    ) -> Self {
        Self {
            config,
            accumulator,
            resolver: OddsResolver::new(odds_config),
            stake,
        }
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn run(&self, archive: &Archive, request: &PreviewRequest, now: DateTime<Utc>) -> PreviewResult {
        let strategy = request.as_strategy();
        let limit = request.limit.unwrap_or(self.config.limit);

        let (history, mut matched) = self.replay(archive, &strategy);
        if matched.len() > limit {
            matched = matched.split_off(matched.len() - limit);
        }

        let results: Vec<&(PreviewMatch, Leg)> = matched.iter().collect();
        let wins = results.iter().filter(|(p, _)| p.won).count();
        let losses = results.len() - wins;
        let total_profit: Decimal = results.iter().map(|(p, _)| p.profit).sum();
        let total_staked = self.stake * Decimal::from(results.len());
        let defaulted_odds = results
            .iter()
            .filter(|(p, _)| p.odds_source == OddsSource::Default)
            .count();

        let win_rate = if results.is_empty() {
            0.0
        } else {
            wins as f64 / results.len() as f64 * 100.0
        };
        let roi = if total_staked > Decimal::ZERO {
            (total_profit / total_staked * dec!(100)).to_f64().unwrap_or(0.0)
        } else {
            0.0
        };

        let sample: Vec<PreviewMatch> = results
            .iter()
            .rev()
            .take(self.config.sample_size)
            .map(|(p, _)| p.clone())
            .collect();

        let legs: Vec<Leg> = results.iter().map(|(_, leg)| leg.clone()).collect();
        let accumulators = build_accumulators(&legs, &self.accumulator);

        let (upcoming, upcoming_legs) = self.project(archive, &strategy, &history, now);
        let upcoming_accumulators = build_accumulators(&upcoming_legs, &self.accumulator);

        info!(
            matches = results.len(),
            win_rate = format!("{:.1}%", win_rate),
            roi = format!("{:.1}%", roi),
            accumulators = accumulators.len(),
            upcoming = upcoming.len(),
            "Preview complete"
        );

        PreviewResult {
            matches_found: results.len(),
            wins,
            losses,
            win_rate,
            roi,
            total_profit,
            defaulted_odds,
            sample,
            accumulators,
            upcoming,
            upcoming_accumulators,
        }
    }

    /// Chronological replay. Returns the full history index and every
    /// matched result, oldest first.
    fn replay(&self, archive: &Archive, strategy: &Strategy) -> (HistoryIndex, Vec<(PreviewMatch, Leg)>) {
        let evaluator = StrategyEvaluator::new(&self.resolver);
        let scope = Scope::of(strategy);
        let mut history = HistoryIndex::new();
        let mut matched = Vec::new();

        for m in archive.finished_matches() {
            let home = archive.team_name(m.home_team_id);
            let away = archive.team_name(m.away_team_id);

            if scope.is_head_to_head(home, away) {
                debug!(match_id = m.id, "Head-to-head between selected teams — skipped");
            } else if let (Decision::Triggered(resolved), Some((hs, aw))) = (
                evaluator.evaluate(strategy, m, home, away, archive.odds_for(m.id), &history),
                m.score(),
            ) {
                let won = resolved.outcome.is_hit(hs, aw);
                let profit = if won {
                    self.stake * resolved.odds - self.stake
                } else {
                    -self.stake
                };
                let probability = estimate_probability(
                    &history,
                    m,
                    resolved.outcome,
                    m.date,
                    self.accumulator.form_window,
                );
                let leg = make_leg(m, home, away, &resolved, Some(won), probability);
                matched.push((
                    PreviewMatch {
                        match_id: m.id,
                        date: m.date,
                        league: m.league.clone(),
                        home_team: home.to_string(),
                        away_team: away.to_string(),
                        selection: resolved.outcome,
                        odds: resolved.odds,
                        odds_source: resolved.source,
                        home_score: hs,
                        away_score: aw,
                        won,
                        profit,
                    },
                    leg,
                ));
            }

            history.record(m);
        }
        (history, matched)
    }

    fn project(
        &self,
        archive: &Archive,
        strategy: &Strategy,
        history: &HistoryIndex,
        now: DateTime<Utc>,
    ) -> (Vec<UpcomingProjection>, Vec<Leg>) {
        let evaluator = StrategyEvaluator::new(&self.resolver);
        let scope = Scope::of(strategy);
        let query = MatchQuery::new()
            .status(MatchStatus::Scheduled)
            .between(now, now + Duration::days(self.config.upcoming_days));

        let mut projections = Vec::new();
        let mut legs = Vec::new();
        for m in archive.query(&query) {
            let home = archive.team_name(m.home_team_id);
            let away = archive.team_name(m.away_team_id);
            if scope.is_head_to_head(home, away) {
                continue;
            }
            let Decision::Triggered(resolved) =
                evaluator.evaluate(strategy, m, home, away, archive.odds_for(m.id), history)
            else {
                continue;
            };

            let probability = estimate_probability(
                history,
                m,
                resolved.outcome,
                m.date,
                self.accumulator.form_window,
            );
            let ev = probability.and_then(|p| expected_value(p, resolved.odds));
            legs.push(make_leg(m, home, away, &resolved, None, probability));
            projections.push(UpcomingProjection {
                match_id: m.id,
                date: m.date,
                league: m.league.clone(),
                home_team: home.to_string(),
                away_team: away.to_string(),
                selection: resolved.outcome,
                odds: resolved.odds,
                odds_source: resolved.source,
                probability,
                implied_probability: implied_probability(resolved.odds),
                expected_value: ev,
            });
        }
        (projections, legs)
    }
}
