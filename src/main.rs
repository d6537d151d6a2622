//! BETLAB: football strategy backtester, signal scanner and paper bankroll.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches one CLI command against the match archive or the ledger
//! database.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use betlab::backtest::{
    BacktestReport, Backtester, PreviewEngine, PreviewRequest, PreviewResult, RankBy, TeamAnalyzer,
    TeamReport, TeamReportQuery,
};
use betlab::config::AppConfig;
use betlab::engine::{Bankroll, Signal, SignalScanner};
use betlab::storage::{Archive, SqliteLedgerStore};
use betlab::types::{NewWager, Outcome, Strategy, StrategyId};

#[derive(Parser)]
#[command(name = "betlab")]
#[command(author, version, about = "Football wagering strategy lab", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Path to the JSON match archive
    #[arg(long, env = "BETLAB_ARCHIVE", default_value = "data/archive.json")]
    archive: PathBuf,

    /// Print machine-readable JSON instead of tables
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest strategies over every finished match
    Backtest {
        /// Strategy ids (default: all active strategies)
        #[arg(short, long)]
        strategy: Vec<StrategyId>,

        /// Print every simulated wager
        #[arg(long)]
        bets: bool,
    },

    /// List signals for upcoming fixtures
    Scan {
        /// Reference time (RFC 3339, default: now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,

        /// Override the configured horizon
        #[arg(long)]
        horizon_hours: Option<i64>,
    },

    /// Preview an unsaved rule described in a JSON file
    Preview {
        /// JSON file with conditions, target_outcome, leagues, teams, limit
        request: PathBuf,

        /// Reference time for upcoming projections (RFC 3339, default: now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },

    /// Flat-stake returns per team and per market over finished matches
    Teams {
        /// Restrict to these leagues (repeatable)
        #[arg(short, long)]
        league: Vec<String>,

        #[arg(long)]
        season: Option<String>,

        /// roi, win_rate, over_2.5, btts_yes or home_win
        #[arg(long, default_value = "roi")]
        rank_by: RankBy,

        /// Override the configured match minimum
        #[arg(long)]
        min_matches: Option<usize>,
    },

    /// Paper-trading bankroll
    Bankroll {
        #[command(subcommand)]
        command: BankrollCommand,
    },
}

#[derive(Subcommand)]
enum BankrollCommand {
    /// Balance, exposure and results
    Summary,

    /// Place a wager
    Place {
        #[arg(long)]
        match_id: i64,

        /// Outcome key, e.g. home_win, over_2.5, btts_yes
        #[arg(long)]
        selection: Outcome,

        #[arg(long)]
        odds: Decimal,

        #[arg(long)]
        stake: Decimal,

        #[arg(long)]
        strategy_id: Option<StrategyId>,

        #[arg(long)]
        notes: Option<String>,

        /// Record as a real-money wager
        #[arg(long)]
        real: bool,
    },

    /// Settle a pending wager
    Settle {
        id: i64,

        /// Settle as won (default: lost)
        #[arg(long)]
        won: bool,
    },

    /// Void a pending wager and refund the stake
    Void { id: i64 },

    Deposit {
        amount: Decimal,
        #[arg(long)]
        notes: Option<String>,
    },

    Withdraw {
        amount: Decimal,
        #[arg(long)]
        notes: Option<String>,
    },

    /// Recent ledger entries
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Current risk alerts
    Risk,

    /// Fractional-Kelly stake suggestion
    Stake {
        #[arg(long)]
        odds: Decimal,

        /// Estimated win probability (0–1)
        #[arg(long)]
        probability: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    match cli.command {
        Commands::Backtest { strategy, bets } => {
            run_backtest(&cfg, &cli.archive, &strategy, bets, cli.json).await
        }
        Commands::Scan { now, horizon_hours } => {
            run_scan(&cfg, &cli.archive, now.unwrap_or_else(Utc::now), horizon_hours, cli.json)
        }
        Commands::Preview { request, now } => {
            run_preview(&cfg, &cli.archive, &request, now.unwrap_or_else(Utc::now), cli.json)
        }
        Commands::Teams {
            league,
            season,
            rank_by,
            min_matches,
        } => {
            let query = TeamReportQuery {
                leagues: league,
                season,
                rank_by,
            };
            run_teams(&cfg, &cli.archive, &query, min_matches, cli.json)
        }
        Commands::Bankroll { command } => run_bankroll(&cfg, command, cli.json).await,
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run_backtest(
    cfg: &AppConfig,
    archive_path: &Path,
    ids: &[StrategyId],
    show_bets: bool,
    json: bool,
) -> Result<()> {
    let archive = Arc::new(Archive::load(archive_path)?);
    let strategies: Vec<Strategy> = if ids.is_empty() {
        archive.active_strategies().into_iter().cloned().collect()
    } else {
        ids.iter()
            .map(|id| {
                archive
                    .strategy(*id)
                    .cloned()
                    .with_context(|| format!("Unknown strategy id {id}"))
            })
            .collect::<Result<_>>()?
    };
    info!(strategies = strategies.len(), "Starting backtest");

    let backtester = Backtester::new(cfg.engine.clone(), cfg.odds.clone());
    let reports = backtester.run_all(archive, strategies).await?;

    if json {
        return print_json(&reports);
    }
    for report in &reports {
        print_report(report, show_bets);
    }
    Ok(())
}

fn run_scan(
    cfg: &AppConfig,
    archive_path: &Path,
    now: DateTime<Utc>,
    horizon_hours: Option<i64>,
    json: bool,
) -> Result<()> {
    let archive = Archive::load(archive_path)?;
    let mut scanner_cfg = cfg.scanner.clone();
    if let Some(hours) = horizon_hours {
        scanner_cfg.horizon_hours = hours;
    }
    let scanner = SignalScanner::new(scanner_cfg, cfg.odds.clone());
    let signals = scanner.scan(&archive, now);

    if json {
        return print_json(&signals);
    }
    print_signals(&signals);
    Ok(())
}

fn run_preview(
    cfg: &AppConfig,
    archive_path: &Path,
    request_path: &Path,
    now: DateTime<Utc>,
    json: bool,
) -> Result<()> {
    let archive = Archive::load(archive_path)?;
    let raw = std::fs::read_to_string(request_path)
        .with_context(|| format!("Failed to read preview request {}", request_path.display()))?;
    let request: PreviewRequest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse preview request {}", request_path.display()))?;

    let engine = PreviewEngine::new(
        cfg.preview.clone(),
        cfg.accumulator.clone(),
        cfg.odds.clone(),
        cfg.engine.flat_stake,
    );
    let result = engine.run(&archive, &request, now);

    if json {
        return print_json(&result);
    }
    print_preview(&result);
    Ok(())
}

fn run_teams(
    cfg: &AppConfig,
    archive_path: &Path,
    query: &TeamReportQuery,
    min_matches: Option<usize>,
    json: bool,
) -> Result<()> {
    let archive = Archive::load(archive_path)?;
    let mut teams_cfg = cfg.teams.clone();
    if let Some(min) = min_matches {
        teams_cfg.min_matches = min;
    }
    let analyzer = TeamAnalyzer::new(teams_cfg, cfg.odds.clone(), cfg.engine.flat_stake);
    let report = analyzer.run(&archive, query);

    if json {
        return print_json(&report);
    }
    print_teams(&report);
    Ok(())
}

async fn run_bankroll(cfg: &AppConfig, command: BankrollCommand, json: bool) -> Result<()> {
    let store = SqliteLedgerStore::connect(&cfg.bankroll.database_url).await?;
    let bankroll = Bankroll::new(store, cfg.bankroll.clone(), cfg.risk.clone());

    match command {
        BankrollCommand::Summary => {
            let summary = bankroll.summary().await?;
            if json {
                return print_json(&summary);
            }
            println!("Balance:        €{:.2}", summary.balance);
            println!("Exposure:       €{:.2}", summary.active_exposure);
            println!("Realised P/L:   €{:.2}", summary.realised_profit);
            println!(
                "Wagers:         {} pending, {} won, {} lost, {} void",
                summary.pending, summary.won, summary.lost, summary.void
            );
            println!("Win rate:       {:.1}%", summary.win_rate);
            println!("ROI:            {:.1}%", summary.roi);
        }
        BankrollCommand::Place {
            match_id,
            selection,
            odds,
            stake,
            strategy_id,
            notes,
            real,
        } => {
            let wager = bankroll
                .place_bet(NewWager {
                    match_id,
                    strategy_id,
                    market: selection.market().to_string(),
                    selection: selection.as_str().to_string(),
                    odds,
                    stake,
                    is_paper_trade: !real,
                    notes,
                })
                .await?;
            if json {
                return print_json(&wager);
            }
            println!("Placed {wager}");
        }
        BankrollCommand::Settle { id, won } => {
            let wager = bankroll.settle_bet(id, won).await?;
            if json {
                return print_json(&wager);
            }
            println!("Settled {wager}");
        }
        BankrollCommand::Void { id } => {
            let wager = bankroll.void_bet(id).await?;
            if json {
                return print_json(&wager);
            }
            println!("Voided {wager}");
        }
        BankrollCommand::Deposit { amount, notes } => {
            let entry = bankroll.deposit(amount, notes).await?;
            println!("{entry}");
        }
        BankrollCommand::Withdraw { amount, notes } => {
            let entry = bankroll.withdraw(amount, notes).await?;
            println!("{entry}");
        }
        BankrollCommand::History { limit } => {
            let entries = bankroll.history(limit).await?;
            if json {
                return print_json(&entries);
            }
            for entry in &entries {
                println!("{entry}");
            }
        }
        BankrollCommand::Risk => {
            let alerts = bankroll.risk_alerts().await?;
            if json {
                return print_json(&alerts);
            }
            if alerts.is_empty() {
                println!("No risk alerts");
            }
            for alert in &alerts {
                println!("{alert}");
            }
        }
        BankrollCommand::Stake { odds, probability } => {
            let stake = bankroll.suggest_stake(odds, probability).await?;
            println!("Suggested stake: €{stake:.2}");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialise output")?);
    Ok(())
}

fn print_report(report: &BacktestReport, show_bets: bool) {
    println!("== {} (#{}) ==", report.strategy_name, report.strategy_id);
    println!(
        "  bets {} ({}W/{}L) of {} matches   win rate {:.1}%",
        report.total_bets(),
        report.wins,
        report.losses,
        report.matches_evaluated,
        report.win_rate
    );
    println!(
        "  staked €{:.2}   profit €{:.2}   ROI {:.1}%",
        report.total_staked, report.total_profit, report.roi
    );
    println!(
        "  balance €{:.2} → €{:.2}   peak €{:.2}   max drawdown €{:.2} ({:.1}%)",
        report.initial_balance,
        report.final_balance,
        report.peak_balance,
        report.max_drawdown,
        report.max_drawdown_pct
    );
    if report.defaulted_odds > 0 || report.skipped_insufficient_funds > 0 {
        println!(
            "  {} wagers priced from default odds, {} skipped for low balance",
            report.defaulted_odds, report.skipped_insufficient_funds
        );
    }
    if show_bets {
        for bet in &report.bets {
            println!(
                "  {} {:>6} {} v {} {} @ {} ({}) {}-{} {} €{:.2} → €{:.2}",
                bet.date.format("%Y-%m-%d"),
                bet.match_id,
                bet.home_team,
                bet.away_team,
                bet.selection,
                bet.odds,
                bet.odds_source,
                bet.home_score,
                bet.away_score,
                if bet.won { "WON " } else { "LOST" },
                bet.profit,
                bet.balance
            );
        }
    }
}

fn print_signals(signals: &[Signal]) {
    if signals.is_empty() {
        println!("No signals");
        return;
    }
    for s in signals {
        println!(
            "{} {:>6} {} v {} [{}]  {} → {} @ {} ({})",
            s.date.format("%Y-%m-%d %H:%M"),
            s.match_id,
            s.home_team,
            s.away_team,
            s.league,
            s.strategy_name,
            s.selection,
            s.odds,
            s.odds_source
        );
    }
}

fn print_preview(result: &PreviewResult) {
    println!(
        "{} matches   {}W/{}L   win rate {:.1}%   ROI {:.1}%   profit €{:.2}",
        result.matches_found,
        result.wins,
        result.losses,
        result.win_rate,
        result.roi,
        result.total_profit
    );
    for m in &result.sample {
        println!(
            "  {} {} v {} {}-{} {} @ {} {}",
            m.date.format("%Y-%m-%d"),
            m.home_team,
            m.away_team,
            m.home_score,
            m.away_score,
            m.selection,
            m.odds,
            if m.won { "WON" } else { "LOST" }
        );
    }
    println!("{} historical accumulators", result.accumulators.len());
    for acc in result.accumulators.iter().take(5) {
        println!(
            "  {} {} legs @ {:.2} {:?}",
            acc.key,
            acc.legs.len(),
            acc.combined_odds,
            acc.status
        );
    }
    println!("{} upcoming matches", result.upcoming.len());
    for u in &result.upcoming {
        let ev = u
            .expected_value
            .map_or_else(|| "n/a".to_string(), |ev| format!("{:+.3}", ev));
        println!(
            "  {} {} v {} {} @ {} EV {}",
            u.date.format("%Y-%m-%d %H:%M"),
            u.home_team,
            u.away_team,
            u.selection,
            u.odds,
            ev
        );
    }
    println!("{} upcoming accumulators", result.upcoming_accumulators.len());
}

fn print_teams(report: &TeamReport) {
    let league = &report.league;
    println!(
        "{} matches   home {:.1}%   draw {:.1}%   away {:.1}%   {:.2} goals/game   over 2.5 {:.1}%   BTTS {:.1}%",
        league.matches,
        league.home_win_rate(),
        league.draw_rate(),
        league.away_win_rate(),
        league.avg_goals(),
        league.over_25_rate(),
        league.btts_rate()
    );
    println!(
        "Top {} of {} teams by {} ({} below the match minimum)",
        report.top.len(),
        report.teams.len(),
        report.rank_by,
        report.excluded
    );
    for t in &report.teams {
        println!(
            "  {:<20} {:>3} played {:>2}W/{:>2}D/{:>2}L   win {:>5.1}%   pts {:>5.1}%   profit €{:>8.2}   ROI {:>6.1}%   {}",
            t.name,
            t.matches,
            t.wins,
            t.draws,
            t.losses,
            t.win_rate(),
            t.points_percentage(),
            t.profit,
            t.roi(),
            if report.top.iter().any(|top| top.team_id == t.team_id) { "*" } else { "" }
        );
    }
    println!("Markets");
    for m in &report.markets {
        println!(
            "  {:<10} hit {:>5.1}%   staked €{:>8.2}   profit €{:>8.2}   ROI {:>6.1}%   ({} default-priced)",
            m.outcome,
            m.hit_rate(),
            m.staked,
            m.profit,
            m.roi(),
            m.defaulted_odds
        );
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("betlab=info"));

    let json_logging = std::env::var("BETLAB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
