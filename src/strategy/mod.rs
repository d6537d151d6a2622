//! Strategy engine: rolling form, condition evaluation, odds resolution,
//! Kelly sizing and risk alerts.

pub mod condition;
pub mod form;
pub mod kelly;
pub mod odds;
pub mod probability;
pub mod risk;

use tracing::debug;

use crate::history::HistoryIndex;
use crate::types::{Match, OddsRecord, Strategy};
use odds::{normalise_name, OddsResolver, ResolvedOdds};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// League and team filters of a strategy. Empty lists admit everything.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub leagues: &'a [String],
    pub teams: &'a [String],
}

impl<'a> Scope<'a> {
    pub fn of(strategy: &'a Strategy) -> Self {
        Self {
            leagues: &strategy.leagues,
            teams: &strategy.teams,
        }
    }

    pub fn admits_league(&self, league: &str) -> bool {
        self.leagues.is_empty()
            || self
                .leagues
                .iter()
                .any(|l| normalise_name(l) == normalise_name(league))
    }

    fn contains_team(&self, name: &str) -> bool {
        let name = normalise_name(name);
        self.teams.iter().any(|t| normalise_name(t) == name)
    }

    /// League filter, then team filter (either side in the list).
    pub fn admits(&self, m: &Match, home_name: &str, away_name: &str) -> bool {
        if !self.admits_league(&m.league) {
            return false;
        }
        self.teams.is_empty() || self.contains_team(home_name) || self.contains_team(away_name)
    }

    /// Both sides belong to the team list.
    pub fn is_head_to_head(&self, home_name: &str, away_name: &str) -> bool {
        !self.teams.is_empty() && self.contains_team(home_name) && self.contains_team(away_name)
    }
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Result of evaluating one strategy against one match.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// League/team filters excluded the match.
    OutOfScope,
    /// At least one condition was false (or lacked history).
    ConditionsFailed,
    /// A `win` target matched neither side.
    SelectionUnresolved,
    /// All conditions held; the selection is priced.
    Triggered(ResolvedOdds),
}

impl Decision {
    pub fn triggered(self) -> Option<ResolvedOdds> {
        match self {
            Decision::Triggered(resolved) => Some(resolved),
            _ => None,
        }
    }
}

/// Pipelines scope → conditions → selection/odds for one match.
pub struct StrategyEvaluator<'a> {
    resolver: &'a OddsResolver,
}

impl<'a> StrategyEvaluator<'a> {
    pub fn new(resolver: &'a OddsResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &OddsResolver {
        self.resolver
    }

    pub fn evaluate(
        &self,
        strategy: &Strategy,
        m: &Match,
        home_name: &str,
        away_name: &str,
        odds_rows: &[OddsRecord],
        history: &HistoryIndex,
    ) -> Decision {
        if !Scope::of(strategy).admits(m, home_name, away_name) {
            return Decision::OutOfScope;
        }
        if !condition::evaluate_all(&strategy.conditions, m, history) {
            return Decision::ConditionsFailed;
        }
        match self.resolver.resolve(
            strategy.target_outcome,
            home_name,
            away_name,
            &strategy.teams,
            odds_rows,
        ) {
            Some(resolved) => {
                debug!(
                    match_id = m.id,
                    strategy = %strategy.name,
                    selection = %resolved.outcome,
                    odds = %resolved.odds,
                    source = %resolved.source,
                    "Strategy triggered"
                );
                Decision::Triggered(resolved)
            }
            None => {
                debug!(
                    match_id = m.id,
                    strategy = %strategy.name,
                    "Win target matches neither side — excluded"
                );
                Decision::SelectionUnresolved
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Condition, Entity, MatchStatus, Metric, Operator, Outcome, TargetOutcome, VenueContext,
    };
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn make_match(id: i64, home: i64, away: i64, day: i64, score: Option<(u32, u32)>) -> Match {
        Match {
            id,
            home_team_id: home,
            away_team_id: away,
            league: "Primeira Liga".to_string(),
            season: None,
            round: None,
            date: Utc.with_ymd_and_hms(2024, 9, 1, 20, 0, 0).unwrap() + Duration::days(day),
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

    fn make_strategy(target: TargetOutcome, teams: &[&str], conditions: Vec<Condition>) -> Strategy {
        Strategy {
            id: 1,
            name: "test".to_string(),
            description: None,
            target_outcome: target,
            is_active: true,
            leagues: vec![],
            teams: teams.iter().map(|t| t.to_string()).collect(),
            conditions,
        }
    }

    #[test]
    fn test_scope_filters() {
        let strategy = Strategy {
            leagues: vec!["primeira  liga".to_string()],
            ..make_strategy(TargetOutcome::Win, &["Porto"], vec![])
        };
        let scope = Scope::of(&strategy);
        let m = make_match(1, 1, 2, 0, None);

        assert!(scope.admits(&m, "Porto", "Benfica"));
        assert!(scope.admits(&m, "Braga", "porto"));
        assert!(!scope.admits(&m, "Braga", "Benfica"));

        let other = Match {
            league: "La Liga".to_string(),
            ..m.clone()
        };
        assert!(!scope.admits(&other, "Porto", "Benfica"));
    }

    #[test]
    fn test_head_to_head() {
        let strategy = make_strategy(TargetOutcome::Win, &["Porto", "Benfica"], vec![]);
        let scope = Scope::of(&strategy);
        assert!(scope.is_head_to_head("Porto", "Benfica"));
        assert!(!scope.is_head_to_head("Porto", "Braga"));

        let open = make_strategy(TargetOutcome::Win, &[], vec![]);
        assert!(!Scope::of(&open).is_head_to_head("Porto", "Benfica"));
    }

    #[test]
    fn test_evaluator_decisions() {
        let resolver = OddsResolver::default();
        let evaluator = StrategyEvaluator::new(&resolver);
        let history = HistoryIndex::from_matches(&[make_match(1, 1, 2, 0, Some((2, 0)))]);
        let target = make_match(2, 1, 3, 7, None);

        let cond = Condition {
            entity: Entity::HomeTeam,
            context: VenueContext::Overall,
            metric: Metric::WinRate,
            operator: Operator::Ge,
            threshold: 100.0,
            window: 1,
        };

        let strategy = make_strategy(TargetOutcome::Fixed(Outcome::HomeWin), &[], vec![cond.clone()]);
        let decision = evaluator.evaluate(&strategy, &target, "A", "C", &[], &history);
        let resolved = decision.triggered().unwrap();
        assert_eq!(resolved.outcome, Outcome::HomeWin);
        assert_eq!(resolved.odds, dec!(2.0));

        let strict = make_strategy(
            TargetOutcome::Fixed(Outcome::HomeWin),
            &[],
            vec![Condition { window: 2, ..cond.clone() }],
        );
        assert_eq!(
            evaluator.evaluate(&strict, &target, "A", "C", &[], &history),
            Decision::ConditionsFailed
        );

        let unresolved = Strategy {
            teams: vec![],
            ..make_strategy(TargetOutcome::Win, &[], vec![])
        };
        assert_eq!(
            evaluator.evaluate(&unresolved, &target, "A", "C", &[], &history),
            Decision::SelectionUnresolved
        );

        let scoped = make_strategy(TargetOutcome::Win, &["Z"], vec![]);
        assert_eq!(
            evaluator.evaluate(&scoped, &target, "A", "C", &[], &history),
            Decision::OutOfScope
        );
    }
}
