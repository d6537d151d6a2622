//! Upcoming-fixture signal scanner.
//!
//! Evaluates every active strategy against scheduled matches inside a
//! horizon. The history index is built once from all finished matches;
//! nothing is staked or simulated.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::history::HistoryIndex;
use crate::storage::{Archive, MatchQuery};
use crate::strategy::odds::{OddsConfig, OddsResolver, OddsSource};
use crate::strategy::{Decision, StrategyEvaluator};
use crate::types::{MatchId, MatchStatus, Outcome, Strategy, StrategyId, TargetOutcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// How far ahead of `now` fixtures are considered.
    pub horizon_hours: i64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { horizon_hours: 48 }
    }
}

/// A strategy that fires on an upcoming match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub match_id: MatchId,
    pub date: DateTime<Utc>,
    pub league: String,
    pub home_team: String,
    pub away_team: String,
    pub strategy_id: StrategyId,
    pub strategy_name: String,
    pub target: TargetOutcome,
    /// Concrete outcome; differs from `target` only for `win`.
    pub selection: Outcome,
    pub odds: Decimal,
    pub odds_source: OddsSource,
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct SignalScanner {
    config: ScannerConfig,
    resolver: OddsResolver,
}

impl SignalScanner {
    pub fn new(config: ScannerConfig, odds_config: OddsConfig) -> Self {
        Self {
            config,
            resolver: OddsResolver::new(odds_config),
        }
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Scan the archive's active strategies.
    pub fn scan(&self, archive: &Archive, now: DateTime<Utc>) -> Vec<Signal> {
        self.scan_strategies(archive, &archive.active_strategies(), now)
    }

    /// Scan the given strategies. Signals are ordered by kick-off, then
    /// match id, then strategy id.
    pub fn scan_strategies(
        &self,
        archive: &Archive,
        strategies: &[&Strategy],
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        let history = HistoryIndex::from_matches(archive.finished_matches());
        let query = MatchQuery::new()
            .status(MatchStatus::Scheduled)
            .between(now, now + Duration::hours(self.config.horizon_hours));
        let candidates = archive.query(&query);
        let evaluator = StrategyEvaluator::new(&self.resolver);

        let mut signals = Vec::new();
        for m in &candidates {
            let home = archive.team_name(m.home_team_id);
            let away = archive.team_name(m.away_team_id);
            for strategy in strategies {
                let decision =
                    evaluator.evaluate(strategy, m, home, away, archive.odds_for(m.id), &history);
                let Decision::Triggered(resolved) = decision else {
                    continue;
                };
                debug!(
                    match_id = m.id,
                    strategy = %strategy.name,
                    selection = %resolved.outcome,
                    "Signal"
                );
                signals.push(Signal {
                    match_id: m.id,
                    date: m.date,
                    league: m.league.clone(),
                    home_team: home.to_string(),
                    away_team: away.to_string(),
                    strategy_id: strategy.id,
                    strategy_name: strategy.name.clone(),
                    target: strategy.target_outcome,
                    selection: resolved.outcome,
                    odds: resolved.odds,
                    odds_source: resolved.source,
                });
            }
        }
        signals.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then(a.match_id.cmp(&b.match_id))
                .then(a.strategy_id.cmp(&b.strategy_id))
        });

        info!(
            candidates = candidates.len(),
            strategies = strategies.len(),
            signals = signals.len(),
            horizon_hours = self.config.horizon_hours,
            "Scan complete"
        );
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::archive::ArchiveSnapshot;
    use crate::types::{Condition, Entity, Match, Metric, Operator, Team, VenueContext};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn make_match(id: i64, home: i64, away: i64, hours: i64, score: Option<(u32, u32)>) -> Match {
        Match {
            id,
            home_team_id: home,
            away_team_id: away,
            league: "Premier League".to_string(),
            season: Some("2024/2025".to_string()),
            round: None,
            date: now() + Duration::hours(hours),
            status: if score.is_some() {
                MatchStatus::Finished
            } else {
                MatchStatus::Scheduled
            },
            home_score: score.map(|s| s.0),
            away_score: score.map(|s| s.1),
            statistics: None,
        }
    }

    fn make_strategy(id: i64, target: TargetOutcome, teams: &[&str], conditions: Vec<Condition>) -> Strategy {
        Strategy {
            id,
            name: format!("strategy-{id}"),
            description: None,
            target_outcome: target,
            is_active: true,
            leagues: vec![],
            teams: teams.iter().map(|t| t.to_string()).collect(),
            conditions,
        }
    }

    fn scoring_home_side() -> Condition {
        Condition {
            entity: Entity::HomeTeam,
            context: VenueContext::Overall,
            metric: Metric::AvgGoalsScored,
            operator: Operator::Ge,
            threshold: 2.0,
            window: 2,
        }
    }

    fn make_archive(strategies: Vec<Strategy>) -> Archive {
        let teams = ["Arsenal", "Chelsea", "Everton", "Fulham"]
            .iter()
            .enumerate()
            .map(|(i, name)| Team {
                id: i as i64 + 1,
                name: name.to_string(),
                country: None,
                league: None,
            })
            .collect();
        Archive::from_snapshot(ArchiveSnapshot {
            teams,
            matches: vec![
                make_match(1, 1, 3, -240, Some((3, 0))),
                make_match(2, 4, 1, -120, Some((1, 2))),
                make_match(3, 2, 4, -100, Some((0, 0))),
                make_match(4, 3, 2, -90, Some((1, 1))),
                make_match(10, 1, 2, 24, None),
                make_match(11, 3, 4, 30, None),
                make_match(12, 2, 1, 72, None),
            ],
            odds: vec![crate::types::OddsRecord {
                match_id: 10,
                bookmaker: "Pinnacle".to_string(),
                market: "1x2".to_string(),
                data: json!({"home": "1.72", "away": 4.8}),
                captured_at: now(),
            }],
            strategies,
        })
    }

    #[test]
    fn test_signals_within_horizon() {
        let archive = make_archive(vec![make_strategy(
            1,
            TargetOutcome::Fixed(Outcome::HomeWin),
            &[],
            vec![scoring_home_side()],
        )]);
        let scanner = SignalScanner::new(ScannerConfig::default(), OddsConfig::default());
        let signals = scanner.scan(&archive, now());

        // Arsenal scored 3 and 2 in their last two; Everton only 0 and 1.
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.match_id, 10);
        assert_eq!(signal.home_team, "Arsenal");
        assert_eq!(signal.strategy_name, "strategy-1");
        assert_eq!(signal.selection, Outcome::HomeWin);
        assert_eq!(signal.odds, dec!(1.72));
        assert_eq!(
            signal.odds_source,
            OddsSource::Observed {
                bookmaker: "Pinnacle".to_string()
            }
        );
    }

    #[test]
    fn test_wider_horizon_and_ordering() {
        let archive = make_archive(vec![
            make_strategy(2, TargetOutcome::Fixed(Outcome::Draw), &[], vec![]),
            make_strategy(1, TargetOutcome::Fixed(Outcome::BttsYes), &[], vec![]),
        ]);
        let scanner = SignalScanner::new(ScannerConfig { horizon_hours: 96 }, OddsConfig::default());
        let signals = scanner.scan(&archive, now());

        let pairs: Vec<_> = signals.iter().map(|s| (s.match_id, s.strategy_id)).collect();
        assert_eq!(pairs, vec![(10, 1), (10, 2), (11, 1), (11, 2), (12, 1), (12, 2)]);
    }

    #[test]
    fn test_win_target_resolves_side() {
        let archive = make_archive(vec![make_strategy(3, TargetOutcome::Win, &["arsenal"], vec![])]);
        let scanner = SignalScanner::new(ScannerConfig { horizon_hours: 96 }, OddsConfig::default());
        let signals = scanner.scan(&archive, now());

        let picks: Vec<_> = signals.iter().map(|s| (s.match_id, s.selection)).collect();
        assert_eq!(picks, vec![(10, Outcome::HomeWin), (12, Outcome::AwayWin)]);
        assert_eq!(signals[0].target, TargetOutcome::Win);
        assert_eq!(signals[1].odds, Outcome::AwayWin.default_odds());
    }

    #[test]
    fn test_inactive_strategies_ignored() {
        let mut inactive = make_strategy(4, TargetOutcome::Fixed(Outcome::Draw), &[], vec![]);
        inactive.is_active = false;
        let archive = make_archive(vec![inactive]);
        let scanner = SignalScanner::new(ScannerConfig::default(), OddsConfig::default());
        assert!(scanner.scan(&archive, now()).is_empty());
    }
}
