//! Condition evaluation.
//!
//! A condition reads one rolling-form metric for one side of a fixture and
//! compares it to a threshold. A strategy triggers when every condition
//! holds.

use tracing::debug;

use super::form::team_form;
use crate::history::HistoryIndex;
use crate::types::{Condition, Entity, Match, Operator};

/// Tolerance applied to `==` and `!=` comparisons.
pub const EQ_TOLERANCE: f64 = 0.01;

impl Operator {
    pub fn compare(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Gt => lhs > rhs,
            Operator::Ge => lhs >= rhs,
            Operator::Lt => lhs < rhs,
            Operator::Le => lhs <= rhs,
            Operator::Eq => (lhs - rhs).abs() < EQ_TOLERANCE,
            Operator::Ne => (lhs - rhs).abs() >= EQ_TOLERANCE,
        }
    }
}

/// Evaluate one condition for `m` against history strictly before its date.
///
/// Insufficient history makes the condition false.
pub fn evaluate_condition(condition: &Condition, m: &Match, history: &HistoryIndex) -> bool {
    let team = match condition.entity {
        Entity::HomeTeam => m.home_team_id,
        Entity::AwayTeam => m.away_team_id,
    };

    let Some(form) = team_form(history, team, m.date, condition.context, condition.window) else {
        debug!(
            match_id = m.id,
            team_id = team,
            window = condition.window,
            "Insufficient history — condition fails"
        );
        return false;
    };

    let value = form.value(condition.metric);
    let passed = condition.operator.compare(value, condition.threshold);
    if !passed {
        debug!(
            match_id = m.id,
            condition = %condition,
            value = format!("{:.3}", value),
            "Condition not met"
        );
    }
    passed
}

/// AND over all conditions; an empty list always triggers.
pub fn evaluate_all(conditions: &[Condition], m: &Match, history: &HistoryIndex) -> bool {
    conditions
        .iter()
        .all(|condition| evaluate_condition(condition, m, history))
}
