//! Season replay through the backtest, scanner and preview engines.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;

use betlab::backtest::{
    AccumulatorConfig, BacktestConfig, Backtester, PreviewConfig, PreviewEngine, PreviewRequest,
    TeamAnalyzer, TeamReportConfig, TeamReportQuery,
};
use betlab::engine::{ScannerConfig, SignalScanner};
use betlab::history::HistoryIndex;
use betlab::storage::archive::ArchiveSnapshot;
use betlab::storage::Archive;
use betlab::strategy::condition::evaluate_all;
use betlab::strategy::odds::{OddsConfig, OddsSource};
use betlab::types::{
    Condition, Entity, LedgerReason, MatchStatus, Metric, Operator, Outcome, Strategy,
    TargetOutcome, VenueContext,
};

use crate::fixtures::{self, make_archive, now, PLAYED_ROUNDS, TEAMS};

fn make_strategy(id: i64, target: TargetOutcome, conditions: Vec<Condition>) -> Strategy {
    Strategy {
        id,
        name: format!("fixture-{id}"),
        description: None,
        target_outcome: target,
        is_active: true,
        leagues: vec!["primeira liga".to_string()],
        teams: vec![],
        conditions,
    }
}

fn scoring_hosts() -> Strategy {
    make_strategy(
        1,
        TargetOutcome::Fixed(Outcome::HomeWin),
        vec![Condition {
            entity: Entity::HomeTeam,
            context: VenueContext::Overall,
            metric: Metric::AvgGoalsScored,
            operator: Operator::Ge,
            threshold: 1.0,
            window: 2,
        }],
    )
}

fn backtester() -> Backtester {
    Backtester::new(BacktestConfig::default(), OddsConfig::default())
}

#[test]
fn test_decisions_only_use_prior_matches() {
    let strategy = scoring_hosts();
    let archive = make_archive(vec![strategy.clone()]);
    let report = backtester().run(&archive, &strategy);
    assert!(!report.bets.is_empty());
    assert_eq!(report.skipped_insufficient_funds, 0);

    let finished = archive.finished_matches();
    let bet_ids: HashSet<_> = report.bets.iter().map(|b| b.match_id).collect();
    for m in &finished {
        let prior = HistoryIndex::from_matches(finished.iter().copied().filter(|p| p.date < m.date));
        assert_eq!(
            evaluate_all(&strategy.conditions, m, &prior),
            bet_ids.contains(&m.id),
            "match {}",
            m.id
        );
    }
}

#[test]
fn test_later_results_do_not_change_earlier_decisions() {
    let strategy = scoring_hosts();
    let archive = make_archive(vec![strategy.clone()]);
    let baseline = backtester().run(&archive, &strategy);

    // Rewrite the last played round.
    let mut snapshot: ArchiveSnapshot = archive.to_snapshot();
    let cutoff = fixtures::season_start() + Duration::weeks(PLAYED_ROUNDS as i64 - 1);
    for m in snapshot.matches.iter_mut().filter(|m| m.date >= cutoff && m.is_finished()) {
        m.home_score = Some(9);
        m.away_score = Some(0);
    }
    let altered = backtester().run(&Archive::from_snapshot(snapshot), &strategy);

    let before = |bets: &[betlab::backtest::runner::BacktestBet]| {
        bets.iter()
            .filter(|b| b.date < cutoff)
            .map(|b| (b.match_id, b.won, b.balance))
            .collect::<Vec<_>>()
    };
    assert_eq!(before(&baseline.bets), before(&altered.bets));
}

#[tokio::test]
async fn test_backtest_is_deterministic() {
    let strategies = vec![
        scoring_hosts(),
        make_strategy(2, TargetOutcome::Fixed(Outcome::Over25), vec![]),
        make_strategy(3, TargetOutcome::Fixed(Outcome::BttsNo), vec![]),
    ];
    let archive = Arc::new(make_archive(strategies.clone()));

    let first = backtester().run_all(Arc::clone(&archive), strategies.clone()).await.unwrap();
    let second = backtester().run_all(Arc::clone(&archive), strategies.clone()).await.unwrap();

    for ((a, b), strategy) in first.iter().zip(&second).zip(&strategies) {
        assert_eq!(a.strategy_id, strategy.id);
        assert_eq!(a.bets, b.bets);
        assert_eq!(a.final_balance, b.final_balance);

        let sequential = backtester().run(&archive, strategy);
        assert_eq!(sequential.bets, a.bets);
    }
}

#[test]
fn test_report_economics() {
    let strategy = make_strategy(2, TargetOutcome::Fixed(Outcome::Over25), vec![]);
    let archive = make_archive(vec![strategy.clone()]);
    let report = backtester().run(&archive, &strategy);

    // Empty conditions trigger on every finished match.
    assert_eq!(report.total_bets(), PLAYED_ROUNDS * TEAMS.len() / 2);
    assert_eq!(report.wins + report.losses, report.total_bets());

    let profit: Decimal = report.bets.iter().map(|b| b.profit).sum();
    assert_eq!(report.total_profit, profit);
    assert_eq!(report.final_balance, report.initial_balance + profit);
    assert!(report.peak_balance >= report.initial_balance);
    assert!(report.max_drawdown >= Decimal::ZERO);

    // Every third match carries an observed over_2.5 price.
    let observed = report.bets.iter().filter(|b| b.match_id % 3 == 0).count();
    assert_eq!(report.defaulted_odds, report.total_bets() - observed);
    for bet in report.bets.iter().filter(|b| b.match_id % 3 == 0) {
        assert_eq!(bet.odds, rust_decimal_macros::dec!(1.95));
        assert_eq!(
            bet.odds_source,
            OddsSource::Observed {
                bookmaker: "Bet365".to_string()
            }
        );
    }
}

#[test]
fn test_ledger_projection_preserves_asymmetry() {
    let strategy = scoring_hosts();
    let archive = make_archive(vec![strategy.clone()]);
    let report = backtester().run(&archive, &strategy);
    let entries = report.ledger_entries();

    assert_eq!(entries.len(), report.total_bets() + report.wins);
    assert_eq!(
        entries.iter().filter(|e| e.reason == LedgerReason::BetPlaced).count(),
        report.total_bets()
    );
    assert_eq!(entries.last().map(|e| e.balance), Some(report.final_balance));

    let mut balance = report.initial_balance;
    for entry in &entries {
        balance += entry.change;
        assert_eq!(entry.balance, balance);
    }
}

#[test]
fn test_scan_only_upcoming_fixtures() {
    let strategy = make_strategy(4, TargetOutcome::Fixed(Outcome::Draw), vec![]);
    let archive = make_archive(vec![strategy]);
    let scanner = SignalScanner::new(ScannerConfig::default(), OddsConfig::default());
    let signals = scanner.scan(&archive, now());

    // Only the first scheduled round falls inside 48 hours.
    assert_eq!(signals.len(), TEAMS.len() / 2);
    for signal in &signals {
        let m = archive.get_match(signal.match_id).unwrap();
        assert_eq!(m.status, MatchStatus::Scheduled);
        assert!(m.date >= now() && m.date < now() + Duration::hours(48));
        assert_eq!(signal.selection, Outcome::Draw);
    }
}

#[test]
fn test_preview_excludes_head_to_head_and_builds_clean_parlays() {
    let archive = make_archive(vec![]);
    let engine = PreviewEngine::new(
        PreviewConfig {
            sample_size: 100,
            ..PreviewConfig::default()
        },
        AccumulatorConfig::default(),
        OddsConfig::default(),
        rust_decimal_macros::dec!(10),
    );
    let request = PreviewRequest {
        conditions: vec![],
        target_outcome: TargetOutcome::Win,
        leagues: vec![],
        teams: vec!["Porto".to_string(), "Benfica".to_string(), "Braga".to_string()],
        limit: None,
    };
    let result = engine.run(&archive, &request, now());

    assert!(!result.sample.is_empty());
    for m in &result.sample {
        let selected = ["Porto", "Benfica", "Braga"];
        let both = selected.contains(&m.home_team.as_str()) && selected.contains(&m.away_team.as_str());
        assert!(!both, "head-to-head {} v {} included", m.home_team, m.away_team);
    }

    for acc in result.accumulators.iter().chain(&result.upcoming_accumulators) {
        assert!(acc.legs.len() >= 2 && acc.legs.len() <= 3);
        let ids: HashSet<_> = acc.legs.iter().map(|l| l.match_id).collect();
        assert_eq!(ids.len(), acc.legs.len());
    }
    let keys: Vec<_> = result.accumulators.iter().map(|a| a.key.clone()).collect();
    let mut sorted = keys.clone();
    sorted.sort_by(|a, b| b.cmp(a));
    assert_eq!(keys, sorted);
}

#[test]
fn test_team_report_covers_every_finished_match() {
    let archive = make_archive(vec![]);
    let finished = archive.finished_matches();
    let analyzer = TeamAnalyzer::new(
        TeamReportConfig::default(),
        OddsConfig::default(),
        rust_decimal_macros::dec!(10),
    );
    let report = analyzer.run(&archive, &TeamReportQuery::default());

    assert_eq!(report.teams.len(), TEAMS.len());
    assert_eq!(report.excluded, 0);
    assert_eq!(report.top.len(), 1);
    assert_eq!(report.top[0], report.teams[0]);
    assert_eq!(
        report.teams.iter().map(|t| t.matches).sum::<usize>(),
        2 * finished.len()
    );
    for team in &report.teams {
        assert_eq!(team.matches, PLAYED_ROUNDS);
        assert_eq!(team.staked, Decimal::from(10 * team.matches as i64));
    }
    for pair in report.teams.windows(2) {
        assert!(pair[0].roi() >= pair[1].roi());
    }

    let league = &report.league;
    assert_eq!(league.matches, finished.len());
    assert_eq!(league.home_wins + league.draws + league.away_wins, league.matches);

    let over = report.markets.iter().find(|m| m.outcome == Outcome::Over25).unwrap();
    let observed = finished.iter().filter(|m| m.id % 3 == 0).count();
    assert_eq!(over.bets, finished.len());
    assert_eq!(over.defaulted_odds, finished.len() - observed);
}
