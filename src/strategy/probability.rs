//! Form-derived outcome probability and expected value.
//!
//! A deliberately simple estimator: each side's rolling rate for the
//! outcome (or its complement from the opponent's perspective) averaged
//! over both teams. Used to rank accumulator legs and to project EV for
//! upcoming fixtures.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::form::{team_form, FormStats};
use crate::history::HistoryIndex;
use crate::types::{Match, Outcome, VenueContext};

/// Probability of `outcome` given both sides' form, in [0, 1].
pub fn outcome_probability(outcome: Outcome, home: &FormStats, away: &FormStats) -> f64 {
    let pct = match outcome {
        Outcome::HomeWin => (home.win_rate() + away.loss_rate()) / 2.0,
        Outcome::AwayWin => (away.win_rate() + home.loss_rate()) / 2.0,
        Outcome::Draw => (home.draw_rate() + away.draw_rate()) / 2.0,
        Outcome::Over25 => (home.over_2_5_rate() + away.over_2_5_rate()) / 2.0,
        Outcome::Under25 => (home.under_2_5_rate() + away.under_2_5_rate()) / 2.0,
        Outcome::Over15 => (home.over_1_5_rate() + away.over_1_5_rate()) / 2.0,
        Outcome::Under15 => 100.0 - (home.over_1_5_rate() + away.over_1_5_rate()) / 2.0,
        Outcome::BttsYes => (home.btts_rate() + away.btts_rate()) / 2.0,
        Outcome::BttsNo => 100.0 - (home.btts_rate() + away.btts_rate()) / 2.0,
    };
    (pct / 100.0).clamp(0.0, 1.0)
}

/// Estimate the probability of `outcome` for `m` from each team's overall
/// form over `window` matches strictly before `before`.
///
/// `None` when either side lacks a full window.
pub fn estimate_probability(
    history: &HistoryIndex,
    m: &Match,
    outcome: Outcome,
    before: DateTime<Utc>,
    window: usize,
) -> Option<f64> {
    let home = team_form(history, m.home_team_id, before, VenueContext::Overall, window)?;
    let away = team_form(history, m.away_team_id, before, VenueContext::Overall, window)?;
    Some(outcome_probability(outcome, &home, &away))
}

/// `probability · odds − 1`.
pub fn expected_value(probability: f64, odds: Decimal) -> Option<f64> {
    let odds = odds.to_f64()?;
    Some(probability * odds - 1.0)
}

/// Implied probability of a decimal price, used as the neutral estimate when
/// form is unavailable (EV = 0).
pub fn implied_probability(odds: Decimal) -> Option<f64> {
    let odds = odds.to_f64()?;
    (odds > 0.0).then(|| 1.0 / odds)
}
