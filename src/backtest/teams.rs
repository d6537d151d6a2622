//! Team and market returns.
//!
//! Season-level analysis over finished matches: flat-stake ROI from backing
//! each team to win every match it played, the top share of teams by a
//! chosen metric, the home/draw/away split with league goal rates, and
//! flat-stake ROI for every market outcome. Prices go through the odds
//! resolver, so estimated prices are counted apart from observed ones.
//!
//! This ranks teams after the fact. It makes no per-match decisions and
//! needs no history index.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::storage::{Archive, MatchQuery};
use crate::strategy::odds::{OddsConfig, OddsResolver, ResolvedOdds};
use crate::types::{MatchStatus, Outcome, ParseError, TeamId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamReportConfig {
    /// Teams with fewer finished matches are left out of the ranking.
    pub min_matches: usize,
    /// Share of ranked teams kept as the top group (at least one team).
    pub top_share: f64,
}

impl Default for TeamReportConfig {
    fn default() -> Self {
        Self {
            min_matches: 5,
            top_share: 0.2,
        }
    }
}

/// Metric teams are ranked by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RankBy {
    #[default]
    #[serde(rename = "roi")]
    Roi,
    #[serde(rename = "win_rate")]
    WinRate,
    #[serde(rename = "over_2.5")]
    Over25,
    #[serde(rename = "btts_yes")]
    BttsYes,
    /// Win rate in home matches only.
    #[serde(rename = "home_win")]
    HomeWin,
}

impl fmt::Display for RankBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RankBy::Roi => "roi",
            RankBy::WinRate => "win_rate",
            RankBy::Over25 => "over_2.5",
            RankBy::BttsYes => "btts_yes",
            RankBy::HomeWin => "home_win",
        };
        f.write_str(label)
    }
}

impl FromStr for RankBy {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "roi" => Ok(RankBy::Roi),
            "win_rate" | "winrate" => Ok(RankBy::WinRate),
            "over_2.5" | "over_2_5" | "over25" => Ok(RankBy::Over25),
            "btts_yes" | "btts" => Ok(RankBy::BttsYes),
            "home_win" | "home" => Ok(RankBy::HomeWin),
            _ => Err(ParseError::unknown("ranking", s)),
        }
    }
}

/// Which slice of the archive to analyse.
#[derive(Debug, Clone, Default)]
pub struct TeamReportQuery {
    pub leagues: Vec<String>,
    pub season: Option<String>,
    pub rank_by: RankBy,
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn roi(profit: Decimal, staked: Decimal) -> f64 {
    if staked > Decimal::ZERO {
        (profit / staked * dec!(100)).to_f64().unwrap_or(0.0)
    } else {
        0.0
    }
}

/// Flat-stake settlement of one priced selection: (returned, profit).
fn settle(priced: &ResolvedOdds, won: bool, stake: Decimal) -> (Decimal, Decimal) {
    if won {
        let returned = stake * priced.odds;
        (returned, returned - stake)
    } else {
        (Decimal::ZERO, -stake)
    }
}

/// One team's record and the result of backing it to win every match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamRecord {
    pub team_id: TeamId,
    pub name: String,
    pub matches: usize,
    pub wins: usize,
    pub draws: usize,
    pub losses: usize,
    /// 3 per win, 1 per draw.
    pub points: usize,
    pub home_matches: usize,
    pub home_wins: usize,
    /// Matches with more than 2.5 total goals.
    pub over_25: usize,
    /// Matches where both sides scored.
    pub btts: usize,
    pub staked: Decimal,
    pub profit: Decimal,
    /// Wagers priced from the default table.
    pub defaulted_odds: usize,
}

impl TeamRecord {
    fn new(team_id: TeamId, name: &str) -> Self {
        Self {
            team_id,
            name: name.to_string(),
            matches: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            points: 0,
            home_matches: 0,
            home_wins: 0,
            over_25: 0,
            btts: 0,
            staked: Decimal::ZERO,
            profit: Decimal::ZERO,
            defaulted_odds: 0,
        }
    }

    fn record(&mut self, at_home: bool, scored: u32, conceded: u32, priced: &ResolvedOdds, stake: Decimal) {
        let won = scored > conceded;
        self.matches += 1;
        match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => {
                self.wins += 1;
                self.points += 3;
            }
            std::cmp::Ordering::Equal => {
                self.draws += 1;
                self.points += 1;
            }
            std::cmp::Ordering::Less => self.losses += 1,
        }
        if at_home {
            self.home_matches += 1;
            if won {
                self.home_wins += 1;
            }
        }
        if scored + conceded > 2 {
            self.over_25 += 1;
        }
        if scored > 0 && conceded > 0 {
            self.btts += 1;
        }

        let (_, profit) = settle(priced, won, stake);
        self.staked += stake;
        self.profit += profit;
        if priced.is_default() {
            self.defaulted_odds += 1;
        }
    }

    pub fn win_rate(&self) -> f64 {
        percent(self.wins, self.matches)
    }

    pub fn points_percentage(&self) -> f64 {
        percent(self.points, self.matches * 3)
    }

    pub fn roi(&self) -> f64 {
        roi(self.profit, self.staked)
    }

    pub fn metric(&self, rank_by: RankBy) -> f64 {
        match rank_by {
            RankBy::Roi => self.roi(),
            RankBy::WinRate => self.win_rate(),
            RankBy::Over25 => percent(self.over_25, self.matches),
            RankBy::BttsYes => percent(self.btts, self.matches),
            RankBy::HomeWin => percent(self.home_wins, self.home_matches),
        }
    }
}

/// Flat stake on one outcome in every match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketRecord {
    pub outcome: Outcome,
    pub market: String,
    pub bets: usize,
    pub wins: usize,
    pub staked: Decimal,
    pub returned: Decimal,
    pub profit: Decimal,
    pub defaulted_odds: usize,
}

impl MarketRecord {
    fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            market: outcome.market().to_string(),
            bets: 0,
            wins: 0,
            staked: Decimal::ZERO,
            returned: Decimal::ZERO,
            profit: Decimal::ZERO,
            defaulted_odds: 0,
        }
    }

    fn record(&mut self, priced: &ResolvedOdds, won: bool, stake: Decimal) {
        let (returned, profit) = settle(priced, won, stake);
        self.bets += 1;
        if won {
            self.wins += 1;
        }
        self.staked += stake;
        self.returned += returned;
        self.profit += profit;
        if priced.is_default() {
            self.defaulted_odds += 1;
        }
    }

    /// Percent of matches where the outcome occurred.
    pub fn hit_rate(&self) -> f64 {
        percent(self.wins, self.bets)
    }

    pub fn roi(&self) -> f64 {
        roi(self.profit, self.staked)
    }
}

/// Home/draw/away split and goal rates across the analysed matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LeagueSummary {
    pub matches: usize,
    pub home_wins: usize,
    pub draws: usize,
    pub away_wins: usize,
    pub goals: u32,
    pub over_25: usize,
    pub btts: usize,
}

impl LeagueSummary {
    fn record(&mut self, home: u32, away: u32) {
        self.matches += 1;
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => self.home_wins += 1,
            std::cmp::Ordering::Equal => self.draws += 1,
            std::cmp::Ordering::Less => self.away_wins += 1,
        }
        self.goals += home + away;
        if home + away > 2 {
            self.over_25 += 1;
        }
        if home > 0 && away > 0 {
            self.btts += 1;
        }
    }

    pub fn home_win_rate(&self) -> f64 {
        percent(self.home_wins, self.matches)
    }

    pub fn draw_rate(&self) -> f64 {
        percent(self.draws, self.matches)
    }

    pub fn away_win_rate(&self) -> f64 {
        percent(self.away_wins, self.matches)
    }

    pub fn avg_goals(&self) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            f64::from(self.goals) / self.matches as f64
        }
    }

    pub fn over_25_rate(&self) -> f64 {
        percent(self.over_25, self.matches)
    }

    pub fn btts_rate(&self) -> f64 {
        percent(self.btts, self.matches)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamReport {
    pub rank_by: RankBy,
    pub league: LeagueSummary,
    /// Teams meeting the match minimum, best first.
    pub teams: Vec<TeamRecord>,
    /// Leading share of `teams`.
    pub top: Vec<TeamRecord>,
    /// Teams left out for too few matches.
    pub excluded: usize,
    /// Best ROI first.
    pub markets: Vec<MarketRecord>,
}

impl TeamReport {
    pub fn top_team_ids(&self) -> Vec<TeamId> {
        self.top.iter().map(|t| t.team_id).collect()
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

pub struct TeamAnalyzer {
    config: TeamReportConfig,
    resolver: OddsResolver,
    stake: Decimal,
}

impl TeamAnalyzer {
    pub fn new(config: TeamReportConfig, odds_config: OddsConfig, stake: Decimal) -> Self {
        Self {
            config,
            resolver: OddsResolver::new(odds_config),
            stake,
        }
    }

    pub fn config(&self) -> &TeamReportConfig {
        &self.config
    }

    pub fn run(&self, archive: &Archive, query: &TeamReportQuery) -> TeamReport {
        let mut match_query = MatchQuery::new()
            .status(MatchStatus::Finished)
            .leagues(&query.leagues);
        if let Some(season) = &query.season {
            match_query = match_query.season(season.clone());
        }

        let mut league = LeagueSummary::default();
        let mut teams: HashMap<TeamId, TeamRecord> = HashMap::new();
        let mut markets: Vec<MarketRecord> = Outcome::ALL.iter().map(|o| MarketRecord::new(*o)).collect();

        for m in archive.query(&match_query) {
            let Some((home, away)) = m.score() else {
                continue;
            };
            let rows = archive.odds_for(m.id);
            league.record(home, away);

            for market in markets.iter_mut() {
                let priced = self.resolver.price(market.outcome, rows);
                market.record(&priced, market.outcome.is_hit(home, away), self.stake);
            }

            let sides = [
                (m.home_team_id, Outcome::HomeWin, home, away),
                (m.away_team_id, Outcome::AwayWin, away, home),
            ];
            for (team_id, outcome, scored, conceded) in sides {
                let priced = self.resolver.price(outcome, rows);
                teams
                    .entry(team_id)
                    .or_insert_with(|| TeamRecord::new(team_id, archive.team_name(team_id)))
                    .record(outcome == Outcome::HomeWin, scored, conceded, &priced, self.stake);
            }
        }

        let total = teams.len();
        let mut ranked: Vec<TeamRecord> = teams
            .into_values()
            .filter(|t| {
                let keep = t.matches >= self.config.min_matches;
                if !keep {
                    debug!(team = %t.name, matches = t.matches, "Too few matches, not ranked");
                }
                keep
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.metric(query.rank_by)
                .total_cmp(&a.metric(query.rank_by))
                .then_with(|| a.name.cmp(&b.name))
        });
        let excluded = total - ranked.len();

        let top_count = if ranked.is_empty() {
            0
        } else {
            ((ranked.len() as f64 * self.config.top_share) as usize).clamp(1, ranked.len())
        };
        let top = ranked[..top_count].to_vec();

        // Stable: equal ROI keeps the outcome table order.
        markets.sort_by(|a, b| b.roi().total_cmp(&a.roi()));

        info!(
            matches = league.matches,
            teams = ranked.len(),
            excluded,
            rank_by = %query.rank_by,
            top = top.len(),
            "Team report complete"
        );

        TeamReport {
            rank_by: query.rank_by,
            league,
            teams: ranked,
            top,
            excluded,
            markets,
        }
    }
}
