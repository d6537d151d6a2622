//! SQLite-backed ledger store (sqlx).
//!
//! Money columns are TEXT holding the exact decimal representation. Every
//! write runs inside `BEGIN IMMEDIATE`, so the balance read, the funds check
//! and the append hold the database write lock together, across processes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite};
use std::str::FromStr;
use tracing::{debug, info};

use super::{next_balance, LedgerStore};
use crate::types::{
    LedgerEntry, LedgerError, LedgerReason, NewLedgerEntry, NewWager, Wager, WagerId, WagerStatus,
};

/// Idempotent schema statements.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS wagers (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        match_id        INTEGER NOT NULL,
        strategy_id     INTEGER,
        market          TEXT NOT NULL,
        selection       TEXT NOT NULL,
        odds            TEXT NOT NULL,
        stake           TEXT NOT NULL,
        status          TEXT NOT NULL DEFAULT 'pending',
        is_paper_trade  INTEGER NOT NULL DEFAULT 1,
        profit_loss     TEXT,
        placed_at       TEXT NOT NULL,
        settled_at      TEXT,
        notes           TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_wagers_status ON wagers(status)",
    "CREATE TABLE IF NOT EXISTS ledger_entries (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        balance     TEXT NOT NULL,
        change      TEXT NOT NULL,
        reason      TEXT NOT NULL,
        wager_id    INTEGER REFERENCES wagers(id),
        timestamp   TEXT NOT NULL,
        notes       TEXT
    )",
];

const WAGER_COLUMNS: &str = "id, match_id, strategy_id, market, selection, odds, stake, status, \
     is_paper_trade, profit_loss, placed_at, settled_at, notes";

const ENTRY_COLUMNS: &str = "id, balance, change, reason, wager_id, timestamp, notes";

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw).with_context(|| format!("Invalid decimal in column {column}: {raw}"))
}

fn wager_from_row(row: &SqliteRow) -> Result<Wager> {
    let status: String = row.try_get("status")?;
    let profit_loss: Option<String> = row.try_get("profit_loss")?;
    Ok(Wager {
        id: row.try_get("id")?,
        match_id: row.try_get("match_id")?,
        strategy_id: row.try_get("strategy_id")?,
        market: row.try_get("market")?,
        selection: row.try_get("selection")?,
        odds: parse_decimal(&row.try_get::<String, _>("odds")?, "odds")?,
        stake: parse_decimal(&row.try_get::<String, _>("stake")?, "stake")?,
        status: status.parse::<WagerStatus>()?,
        is_paper_trade: row.try_get("is_paper_trade")?,
        profit_loss: profit_loss
            .as_deref()
            .map(|raw| parse_decimal(raw, "profit_loss"))
            .transpose()?,
        placed_at: row.try_get::<DateTime<Utc>, _>("placed_at")?,
        settled_at: row.try_get::<Option<DateTime<Utc>>, _>("settled_at")?,
        notes: row.try_get("notes")?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<LedgerEntry> {
    let reason: String = row.try_get("reason")?;
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        balance: parse_decimal(&row.try_get::<String, _>("balance")?, "balance")?,
        change: parse_decimal(&row.try_get::<String, _>("change")?, "change")?,
        reason: reason.parse::<LedgerReason>()?,
        wager_id: row.try_get("wager_id")?,
        timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
        notes: row.try_get("notes")?,
    })
}

pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Open (or create) the database at `url` and apply the schema.
    ///
    /// `sqlite::memory:` is supported; the pool is then pinned to a single
    /// connection so every query sees the same database.
    pub async fn connect(url: &str) -> Result<Self> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options.max_connections(4);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open ledger database {url}"))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(url, "Ledger database ready");
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply ledger schema")?;
        }
        debug!("Ledger schema applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Take the database write lock before reading anything.
    async fn begin_immediate(&self) -> Result<PoolConnection<Sqlite>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire ledger connection")?;
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .context("Failed to lock ledger")?;
        Ok(conn)
    }
}

/// Commit on success, roll back otherwise. Either way the connection goes
/// back to the pool outside any transaction.
async fn finish<T>(
    mut conn: PoolConnection<Sqlite>,
    outcome: Result<T, LedgerError>,
) -> Result<T, LedgerError> {
    let statement = if outcome.is_ok() { "COMMIT" } else { "ROLLBACK" };
    sqlx::query(statement)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Ledger {statement} failed"))?;
    outcome
}

async fn current_balance(conn: &mut SqliteConnection, opening: Decimal) -> Result<Decimal> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT balance FROM ledger_entries ORDER BY id DESC LIMIT 1")
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to read current balance")?;
    row.map_or(Ok(opening), |(raw,)| parse_decimal(&raw, "balance"))
}

/// Derive the balance from the latest entry and append `entry`.
async fn append_entry(
    conn: &mut SqliteConnection,
    entry: NewLedgerEntry,
    opening: Decimal,
) -> Result<LedgerEntry, LedgerError> {
    let current = current_balance(conn, opening).await?;
    let balance = next_balance(current, entry.change)?;
    let now = Utc::now();

    let result = sqlx::query(
        "INSERT INTO ledger_entries (balance, change, reason, wager_id, timestamp, notes)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(balance.to_string())
    .bind(entry.change.to_string())
    .bind(entry.reason.to_string())
    .bind(entry.wager_id)
    .bind(now)
    .bind(entry.notes.as_deref())
    .execute(&mut *conn)
    .await
    .context("Failed to insert ledger entry")?;

    Ok(LedgerEntry {
        id: result.last_insert_rowid(),
        balance,
        change: entry.change,
        reason: entry.reason,
        wager_id: entry.wager_id,
        timestamp: now,
        notes: entry.notes,
    })
}

async fn place(
    conn: &mut SqliteConnection,
    wager: NewWager,
    entry: NewLedgerEntry,
    opening: Decimal,
) -> Result<(Wager, LedgerEntry), LedgerError> {
    // Funds are checked before the wager row exists.
    let current = current_balance(conn, opening).await?;
    next_balance(current, entry.change)?;

    let now = Utc::now();
    let result = sqlx::query(
        "INSERT INTO wagers (match_id, strategy_id, market, selection, odds, stake, status,
                             is_paper_trade, placed_at, notes)
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?)",
    )
    .bind(wager.match_id)
    .bind(wager.strategy_id)
    .bind(&wager.market)
    .bind(&wager.selection)
    .bind(wager.odds.to_string())
    .bind(wager.stake.to_string())
    .bind(wager.is_paper_trade)
    .bind(now)
    .bind(wager.notes.as_deref())
    .execute(&mut *conn)
    .await
    .context("Failed to insert wager")?;
    let id = result.last_insert_rowid();

    let entry = append_entry(
        conn,
        NewLedgerEntry {
            wager_id: Some(id),
            ..entry
        },
        opening,
    )
    .await?;

    let wager = Wager {
        id,
        match_id: wager.match_id,
        strategy_id: wager.strategy_id,
        market: wager.market,
        selection: wager.selection,
        odds: wager.odds,
        stake: wager.stake,
        status: WagerStatus::Pending,
        is_paper_trade: wager.is_paper_trade,
        profit_loss: None,
        placed_at: now,
        settled_at: None,
        notes: wager.notes,
    };
    Ok((wager, entry))
}

async fn settle(
    conn: &mut SqliteConnection,
    wager: &Wager,
    entry: Option<NewLedgerEntry>,
    opening: Decimal,
) -> Result<Option<LedgerEntry>, LedgerError> {
    let result = sqlx::query(
        "UPDATE wagers SET status = ?, profit_loss = ?, settled_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(wager.status.to_string())
    .bind(wager.profit_loss.map(|p| p.to_string()))
    .bind(wager.settled_at)
    .bind(wager.id)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to settle wager {}", wager.id))?;

    if result.rows_affected() != 1 {
        let stored: Option<(String,)> = sqlx::query_as("SELECT status FROM wagers WHERE id = ?")
            .bind(wager.id)
            .fetch_optional(&mut *conn)
            .await
            .with_context(|| format!("Failed to read wager {}", wager.id))?;
        return Err(match stored {
            Some((status,)) => LedgerError::AlreadySettled {
                id: wager.id,
                status: status.parse::<WagerStatus>().map_err(anyhow::Error::from)?,
            },
            None => LedgerError::WagerNotFound(wager.id),
        });
    }

    match entry {
        Some(entry) => Ok(Some(append_entry(conn, entry, opening).await?)),
        None => Ok(None),
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn latest_entry(&self) -> Result<Option<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY id DESC LIMIT 1");
        let row = sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to read latest ledger entry")?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn wager(&self, id: WagerId) -> Result<Option<Wager>> {
        let sql = format!("SELECT {WAGER_COLUMNS} FROM wagers WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read wager {id}"))?;
        row.as_ref().map(wager_from_row).transpose()
    }

    async fn wagers_by_status(&self, status: WagerStatus) -> Result<Vec<Wager>> {
        let sql = format!("SELECT {WAGER_COLUMNS} FROM wagers WHERE status = ? ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(status.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list wagers")?;
        rows.iter().map(wager_from_row).collect()
    }

    async fn all_wagers(&self) -> Result<Vec<Wager>> {
        let sql = format!("SELECT {WAGER_COLUMNS} FROM wagers ORDER BY id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list wagers")?;
        rows.iter().map(wager_from_row).collect()
    }

    async fn ledger_entries(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY id DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list ledger entries")?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn record_placement(
        &self,
        wager: NewWager,
        entry: NewLedgerEntry,
        opening: Decimal,
    ) -> Result<(Wager, LedgerEntry), LedgerError> {
        let mut conn = self.begin_immediate().await?;
        let outcome = place(&mut conn, wager, entry, opening).await;
        finish(conn, outcome).await
    }

    async fn record_settlement(
        &self,
        wager: &Wager,
        entry: Option<NewLedgerEntry>,
        opening: Decimal,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let mut conn = self.begin_immediate().await?;
        let outcome = settle(&mut conn, wager, entry, opening).await;
        finish(conn, outcome).await
    }

    async fn record_adjustment(
        &self,
        entry: NewLedgerEntry,
        opening: Decimal,
    ) -> Result<LedgerEntry, LedgerError> {
        let mut conn = self.begin_immediate().await?;
        let outcome = append_entry(&mut conn, entry, opening).await;
        finish(conn, outcome).await
    }
}
