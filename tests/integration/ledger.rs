//! Bankroll, sizing and worked examples against the persistent store.

use std::path::PathBuf;

use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use betlab::backtest::{build_accumulators, AccumulatorConfig, Leg};
use betlab::backtest::accumulator::AccumulatorStatus;
use betlab::engine::{Bankroll, BankrollConfig};
use betlab::history::HistoryIndex;
use betlab::storage::{LedgerStore, SqliteLedgerStore};
use betlab::strategy::condition::evaluate_condition;
use betlab::strategy::form::team_form;
use betlab::strategy::kelly::kelly_stake;
use betlab::strategy::odds::OddsSource;
use betlab::strategy::risk::RiskConfig;
use betlab::types::{
    Condition, Entity, LedgerError, LedgerReason, Match, MatchStatus, Metric, NewWager, Operator,
    Outcome, VenueContext, WagerStatus,
};

async fn sqlite_bankroll(initial: Decimal) -> Bankroll<SqliteLedgerStore> {
    bankroll_on("sqlite::memory:", initial).await
}

async fn bankroll_on(url: &str, initial: Decimal) -> Bankroll<SqliteLedgerStore> {
    let store = SqliteLedgerStore::connect(url).await.unwrap();
    Bankroll::new(
        store,
        BankrollConfig {
            initial_balance: initial,
            ..BankrollConfig::default()
        },
        RiskConfig::default(),
    )
}

fn make_wager(stake: Decimal, odds: Decimal) -> NewWager {
    NewWager {
        match_id: 1,
        strategy_id: Some(1),
        market: "1x2".to_string(),
        selection: "home_win".to_string(),
        odds,
        stake,
        is_paper_trade: true,
        notes: None,
    }
}

#[tokio::test]
async fn test_winning_settlement_credits_stake_times_odds() {
    let bankroll = sqlite_bankroll(dec!(100)).await;
    let wager = bankroll.place_bet(make_wager(dec!(10), dec!(2.5))).await.unwrap();
    assert_eq!(bankroll.get_current_balance().await.unwrap(), dec!(90));

    let settled = bankroll.settle_bet(wager.id, true).await.unwrap();
    assert_eq!(settled.profit_loss, Some(dec!(15)));
    assert_eq!(bankroll.get_current_balance().await.unwrap(), dec!(115));

    let stored = bankroll.store().wager(wager.id).await.unwrap().unwrap();
    assert_eq!(stored.status, WagerStatus::Won);
    assert!(stored.settled_at.is_some());
}

#[tokio::test]
async fn test_losing_settlement_leaves_balance() {
    let bankroll = sqlite_bankroll(dec!(100)).await;
    let wager = bankroll.place_bet(make_wager(dec!(10), dec!(2.5))).await.unwrap();
    let settled = bankroll.settle_bet(wager.id, false).await.unwrap();

    assert_eq!(settled.profit_loss, Some(dec!(-10)));
    assert_eq!(bankroll.get_current_balance().await.unwrap(), dec!(90));
    let history = bankroll.history(10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reason, LedgerReason::BetPlaced);

    assert!(matches!(
        bankroll.settle_bet(wager.id, true).await,
        Err(LedgerError::AlreadySettled { .. })
    ));
    assert_eq!(bankroll.get_current_balance().await.unwrap(), dec!(90));
}

#[tokio::test]
async fn test_persistent_exposure_and_funds_check() {
    let bankroll = sqlite_bankroll(dec!(50)).await;
    bankroll.place_bet(make_wager(dec!(20), dec!(1.8))).await.unwrap();
    bankroll.place_bet(make_wager(dec!(20), dec!(2.2))).await.unwrap();
    assert_eq!(bankroll.get_active_exposure().await.unwrap(), dec!(40));

    let err = bankroll.place_bet(make_wager(dec!(20), dec!(2.0))).await.unwrap_err();
    assert_eq!(err.to_string(), "Insufficient funds: need €20.00, have €10.00");

    let summary = bankroll.summary().await.unwrap();
    assert_eq!(summary.balance, dec!(10));
    assert_eq!(summary.pending, 2);
}

/// A fresh database file under the system temp directory.
struct TempDb(PathBuf);

impl TempDb {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("betlab-{}.db", uuid::Uuid::new_v4())))
    }

    fn url(&self) -> String {
        format!("sqlite://{}", self.0.display())
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-journal"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.0.display()));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_handles_on_one_database_cannot_double_spend() {
    for _ in 0..5 {
        let db = TempDb::new();
        let a = bankroll_on(&db.url(), dec!(100)).await;
        let b = bankroll_on(&db.url(), dec!(100)).await;

        let (first, second) = tokio::join!(
            a.place_bet(make_wager(dec!(60), dec!(2.0))),
            b.place_bet(make_wager(dec!(60), dec!(2.0)))
        );
        let accepted = [&first, &second].iter().filter(|r| r.is_ok()).count();
        assert_eq!(accepted, 1);
        let rejected = if first.is_err() { first } else { second };
        assert!(matches!(
            rejected,
            Err(LedgerError::InsufficientFunds { available, .. }) if available == dec!(40)
        ));

        assert_eq!(a.get_current_balance().await.unwrap(), dec!(40));
        assert_eq!(b.get_current_balance().await.unwrap(), dec!(40));
        assert_eq!(b.get_active_exposure().await.unwrap(), dec!(60));
        assert_eq!(a.history(10).await.unwrap().len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_handles_settle_once() {
    let db = TempDb::new();
    let a = bankroll_on(&db.url(), dec!(100)).await;
    let b = bankroll_on(&db.url(), dec!(100)).await;
    let wager = a.place_bet(make_wager(dec!(10), dec!(3.0))).await.unwrap();

    let (first, second) = tokio::join!(a.settle_bet(wager.id, true), b.settle_bet(wager.id, true));
    assert_eq!([&first, &second].iter().filter(|r| r.is_ok()).count(), 1);
    let rejected = if first.is_err() { first } else { second };
    assert!(matches!(rejected, Err(LedgerError::AlreadySettled { .. })));

    // One €30 return on top of the €90 left after placement.
    assert_eq!(b.get_current_balance().await.unwrap(), dec!(120));
    let entries = a.history(10).await.unwrap();
    assert_eq!(entries.iter().filter(|e| e.reason == LedgerReason::BetWon).count(), 1);
}

#[test]
fn test_kelly_monotone_and_zero_without_edge() {
    let odds = dec!(2.4);
    let mut previous = Decimal::ZERO;
    for step in 0..=100 {
        let p = step as f64 / 100.0;
        let stake = kelly_stake(dec!(1000), odds, p, 0.5, 0.05);
        assert!(stake >= previous, "p = {p}");
        if p * 2.4 <= 1.0 {
            assert_eq!(stake, Decimal::ZERO, "p = {p}");
        }
        previous = stake;
    }
    assert_eq!(previous, dec!(50));
}

fn make_match(id: i64, home: i64, away: i64, day: i64, score: (u32, u32)) -> Match {
    Match {
        id,
        home_team_id: home,
        away_team_id: away,
        league: "La Liga".to_string(),
        season: Some("2024/2025".to_string()),
        round: Some("10".to_string()),
        date: Utc.with_ymd_and_hms(2024, 9, 1, 20, 0, 0).unwrap() + Duration::days(day),
        status: MatchStatus::Finished,
        home_score: Some(score.0),
        away_score: Some(score.1),
        statistics: None,
    }
}

#[test]
fn test_average_goals_example() {
    let matches = vec![
        make_match(1, 7, 2, 0, (2, 0)),
        make_match(2, 3, 7, 7, (2, 1)),
        make_match(3, 7, 4, 14, (0, 0)),
        make_match(4, 5, 7, 21, (1, 3)),
        make_match(5, 7, 6, 28, (1, 1)),
    ];
    let history = HistoryIndex::from_matches(&matches);
    let target = make_match(6, 7, 8, 35, (0, 0));

    let form = team_form(&history, 7, target.date, VenueContext::Overall, 5).unwrap();
    assert!((form.avg_goals_scored() - 1.4).abs() < 1e-9);

    let condition = Condition {
        entity: Entity::HomeTeam,
        context: VenueContext::Overall,
        metric: Metric::AvgGoalsScored,
        operator: Operator::Gt,
        threshold: 1.5,
        window: 5,
    };
    assert!(!evaluate_condition(&condition, &target, &history));
}

#[test]
fn test_two_leg_accumulator_example() {
    let date = Utc.with_ymd_and_hms(2024, 11, 9, 15, 0, 0).unwrap();
    let leg = |match_id: i64, odds: Decimal| Leg {
        match_id,
        date,
        season: Some("2024/2025".to_string()),
        round: Some("10".to_string()),
        home_team: format!("home-{match_id}"),
        away_team: format!("away-{match_id}"),
        selection: Outcome::HomeWin,
        odds,
        odds_source: OddsSource::Default,
        won: Some(true),
        probability: None,
    };

    let accs = build_accumulators(&[leg(1, dec!(1.8)), leg(2, dec!(2.0))], &AccumulatorConfig::default());
    assert_eq!(accs.len(), 1);
    assert_eq!(accs[0].key.to_string(), "2024-2025|10");
    assert_eq!(accs[0].combined_odds, dec!(3.6));
    assert_eq!(accs[0].status, AccumulatorStatus::Won);
    assert_eq!(accs[0].profit, Some(dec!(26)));
}
