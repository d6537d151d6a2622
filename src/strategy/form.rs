//! Form calculator.
//!
//! Aggregates a team's last N finished matches (strictly before a date,
//! optionally restricted to home or away fixtures) into rolling statistics.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::{HistoryIndex, TeamResult};
use crate::types::{Metric, TeamId, VenueContext};

/// Rolling statistics over a fixed window of matches.
///
/// Rates are percentages (0–100).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormStats {
    pub matches: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    pub goals_scored: u32,
    pub goals_conceded: u32,
    pub clean_sheets: usize,
    pub btts: usize,
    pub over_1_5: usize,
    pub over_2_5: usize,
    pub scored_in: usize,
}

impl FormStats {
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a TeamResult>) -> Self {
        let mut stats = FormStats::default();
        for r in results {
            let total = r.goals_for + r.goals_against;
            stats.matches += 1;
            stats.goals_scored += r.goals_for;
            stats.goals_conceded += r.goals_against;
            match r.goals_for.cmp(&r.goals_against) {
                std::cmp::Ordering::Greater => stats.wins += 1,
                std::cmp::Ordering::Equal => stats.draws += 1,
                std::cmp::Ordering::Less => stats.losses += 1,
            }
            if r.goals_against == 0 {
                stats.clean_sheets += 1;
            }
            if r.goals_for > 0 {
                stats.scored_in += 1;
            }
            if r.goals_for > 0 && r.goals_against > 0 {
                stats.btts += 1;
            }
            if total > 1 {
                stats.over_1_5 += 1;
            }
            if total > 2 {
                stats.over_2_5 += 1;
            }
        }
        stats
    }

    fn per_match(&self, total: u32) -> f64 {
        if self.matches == 0 {
            return 0.0;
        }
        f64::from(total) / self.matches as f64
    }

    fn pct(&self, count: usize) -> f64 {
        if self.matches == 0 {
            return 0.0;
        }
        count as f64 / self.matches as f64 * 100.0
    }

    pub fn avg_goals_scored(&self) -> f64 {
        self.per_match(self.goals_scored)
    }

    pub fn avg_goals_conceded(&self) -> f64 {
        self.per_match(self.goals_conceded)
    }

    pub fn avg_total_goals(&self) -> f64 {
        self.per_match(self.goals_scored + self.goals_conceded)
    }

    pub fn win_rate(&self) -> f64 {
        self.pct(self.wins)
    }

    pub fn draw_rate(&self) -> f64 {
        self.pct(self.draws)
    }

    pub fn loss_rate(&self) -> f64 {
        self.pct(self.losses)
    }

    pub fn clean_sheet_rate(&self) -> f64 {
        self.pct(self.clean_sheets)
    }

    pub fn btts_rate(&self) -> f64 {
        self.pct(self.btts)
    }

    pub fn over_1_5_rate(&self) -> f64 {
        self.pct(self.over_1_5)
    }

    pub fn over_2_5_rate(&self) -> f64 {
        self.pct(self.over_2_5)
    }

    pub fn under_2_5_rate(&self) -> f64 {
        self.pct(self.matches - self.over_2_5)
    }

    pub fn scoring_rate(&self) -> f64 {
        self.pct(self.scored_in)
    }

    pub fn points_per_game(&self) -> f64 {
        if self.matches == 0 {
            return 0.0;
        }
        (self.wins * 3 + self.draws) as f64 / self.matches as f64
    }

    /// Value of a metric, in the units conditions compare against.
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::AvgGoalsScored => self.avg_goals_scored(),
            Metric::AvgGoalsConceded => self.avg_goals_conceded(),
            Metric::AvgTotalGoals => self.avg_total_goals(),
            Metric::WinRate => self.win_rate(),
            Metric::DrawRate => self.draw_rate(),
            Metric::LossRate => self.loss_rate(),
            Metric::CleanSheetRate => self.clean_sheet_rate(),
            Metric::BttsRate => self.btts_rate(),
            Metric::Over25Rate => self.over_2_5_rate(),
            Metric::Under25Rate => self.under_2_5_rate(),
            Metric::ScoringRate => self.scoring_rate(),
            Metric::PointsPerGame => self.points_per_game(),
        }
    }
}

/// Form for `team` over exactly `window` matches before `before`.
///
/// Returns `None` when fewer than `window` qualifying matches exist, or
/// when `window` is zero.
pub fn team_form(
    history: &HistoryIndex,
    team: TeamId,
    before: DateTime<Utc>,
    context: VenueContext,
    window: usize,
) -> Option<FormStats> {
    if window == 0 {
        return None;
    }
    let recent = history.recent(team, before, context, window);
    if recent.len() < window {
        return None;
    }
    Some(FormStats::from_results(recent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn make_result(day: i64, is_home: bool, gf: u32, ga: u32) -> TeamResult {
        TeamResult {
            match_id: day,
            date: Utc.with_ymd_and_hms(2024, 9, 1, 15, 0, 0).unwrap() + Duration::days(day),
            is_home,
            goals_for: gf,
            goals_against: ga,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_from_results_counts() {
        let results = vec![
            make_result(0, true, 2, 0),
            make_result(1, false, 1, 1),
            make_result(2, true, 0, 3),
            make_result(3, false, 3, 2),
        ];
        let stats = FormStats::from_results(&results);

        assert_eq!(stats.matches, 4);
        assert_eq!((stats.wins, stats.draws, stats.losses), (2, 1, 1));
        assert!(approx(stats.avg_goals_scored(), 1.5));
        assert!(approx(stats.avg_goals_conceded(), 1.5));
        assert!(approx(stats.avg_total_goals(), 3.0));
        assert!(approx(stats.win_rate(), 50.0));
        assert!(approx(stats.draw_rate(), 25.0));
        assert!(approx(stats.loss_rate(), 25.0));
        assert!(approx(stats.clean_sheet_rate(), 25.0));
        assert!(approx(stats.btts_rate(), 50.0));
        // totals: 2, 2, 3, 5
        assert!(approx(stats.over_2_5_rate(), 50.0));
        assert!(approx(stats.under_2_5_rate(), 50.0));
        assert!(approx(stats.over_1_5_rate(), 100.0));
        assert!(approx(stats.scoring_rate(), 75.0));
        assert!(approx(stats.points_per_game(), 7.0 / 4.0));
    }

    #[test]
    fn test_value_matches_accessors() {
        let results = vec![make_result(0, true, 1, 0), make_result(1, true, 0, 0)];
        let stats = FormStats::from_results(&results);
        assert!(approx(stats.value(Metric::WinRate), 50.0));
        assert!(approx(stats.value(Metric::CleanSheetRate), 100.0));
        assert!(approx(stats.value(Metric::PointsPerGame), 2.0));
        assert!(approx(stats.value(Metric::Under25Rate), 100.0));
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = FormStats::default();
        assert_eq!(stats.win_rate(), 0.0);
        assert_eq!(stats.avg_goals_scored(), 0.0);
        assert_eq!(stats.points_per_game(), 0.0);
    }

    #[test]
    fn test_team_form_requires_full_window() {
        use crate::types::{Match, MatchStatus};

        let start = Utc.with_ymd_and_hms(2024, 9, 1, 15, 0, 0).unwrap();
        let matches: Vec<Match> = (0..3)
            .map(|i| Match {
                id: i,
                home_team_id: 1,
                away_team_id: 100 + i,
                league: "La Liga".to_string(),
                season: None,
                round: None,
                date: start + Duration::days(i * 7),
                status: MatchStatus::Finished,
                home_score: Some(2),
                away_score: Some(1),
                statistics: None,
            })
            .collect();
        let history = HistoryIndex::from_matches(&matches);
        let later = start + Duration::days(30);

        assert!(team_form(&history, 1, later, VenueContext::Overall, 4).is_none());
        let form = team_form(&history, 1, later, VenueContext::Overall, 3).unwrap();
        assert_eq!(form.matches, 3);
        assert!(approx(form.win_rate(), 100.0));

        // No away fixtures for team 1.
        assert!(team_form(&history, 1, later, VenueContext::Away, 1).is_none());
        assert!(team_form(&history, 1, later, VenueContext::Overall, 0).is_none());
    }
}
