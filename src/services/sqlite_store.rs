//! SQLite persistence for bars, indicator snapshots and signals.
//!
//! Conflict policies differ per table: bars are insert-or-ignore, snapshots
//! are upserted on recompute and signals keep their first write.

use crate::error::{AppError, Result};
use crate::types::{
    Bar, IndicatorSet, IndicatorSnapshot, SignalDetail, SignalKey, SignalRecord, Timeframe,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Instruments tracked when the watchlist is empty.
pub const DEFAULT_SYMBOLS: &[&str] = &["AAPL", "NVDA", "SPY", "BTC-USD", "ETH-USD"];

fn ts_from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

/// Upper-case, trim and de-duplicate symbols, keeping first-seen order.
pub fn normalize_symbols<I, S>(symbols: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for symbol in symbols {
        let symbol = symbol.as_ref().trim().to_uppercase();
        if !symbol.is_empty() && !out.contains(&symbol) {
            out.push(symbol);
        }
    }
    out
}

/// SQLite store shared by the pipeline.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::Internal(format!("Cannot create {:?}: {}", parent, e)))?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("SQLite connection mutex poisoned".to_string()))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS prices (
                symbol TEXT NOT NULL,
                venue TEXT NOT NULL,
                tf TEXT NOT NULL,
                ts INTEGER NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                PRIMARY KEY (symbol, tf, ts)
            );

            CREATE TABLE IF NOT EXISTS indicators (
                symbol TEXT NOT NULL,
                tf TEXT NOT NULL,
                ts INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (symbol, tf, ts)
            );

            CREATE TABLE IF NOT EXISTS signals (
                symbol TEXT NOT NULL,
                tf TEXT NOT NULL,
                ts INTEGER NOT NULL,
                rule_id TEXT NOT NULL,
                fired INTEGER NOT NULL,
                score REAL NOT NULL,
                detail TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (symbol, tf, ts, rule_id)
            );

            CREATE TABLE IF NOT EXISTS watchlists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL DEFAULT 'Default',
                symbols TEXT NOT NULL DEFAULT '[]'
            );

            CREATE INDEX IF NOT EXISTS idx_watchlists_user ON watchlists(user_id);",
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    // ========== Price History ==========

    /// Insert bars, ignoring any whose key already exists. Returns rows inserted.
    pub fn insert_bars(&self, bars: &[Bar], venue: &str) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO prices (symbol, venue, tf, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (symbol, tf, ts) DO NOTHING",
            )?;
            for bar in bars {
                inserted += stmt.execute(params![
                    bar.symbol,
                    venue,
                    bar.timeframe.code(),
                    bar.ts.timestamp_millis(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;

        debug!("Inserted {}/{} bars from {}", inserted, bars.len(), venue);
        Ok(inserted)
    }

    /// Number of stored bars for a symbol/timeframe.
    pub fn count_bars(&self, symbol: &str, timeframe: Timeframe) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM prices WHERE symbol = ?1 AND tf = ?2",
            params![symbol, timeframe.code()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Most recent `limit` bars, oldest first.
    pub fn recent_bars(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Bar>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ts, open, high, low, close, volume
             FROM prices
             WHERE symbol = ?1 AND tf = ?2
             ORDER BY ts DESC
             LIMIT ?3",
        )?;

        let mut bars = stmt
            .query_map(params![symbol, timeframe.code(), limit as i64], |row| {
                Ok(Bar {
                    symbol: symbol.to_string(),
                    timeframe,
                    ts: ts_from_millis(row.get(0)?)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        bars.reverse();
        Ok(bars)
    }

    /// Timestamp of the newest stored bar.
    pub fn latest_bar_ts(&self, symbol: &str, timeframe: Timeframe) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn()?;
        let ms: Option<i64> = conn.query_row(
            "SELECT MAX(ts) FROM prices WHERE symbol = ?1 AND tf = ?2",
            params![symbol, timeframe.code()],
            |row| row.get(0),
        )?;
        Ok(ms.map(ts_from_millis).transpose()?)
    }

    // ========== Indicator Snapshots ==========

    /// Insert or replace the metrics for a snapshot key.
    pub fn upsert_snapshot(&self, snapshot: &IndicatorSnapshot) -> Result<()> {
        let data = serde_json::to_string(&snapshot.data)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO indicators (symbol, tf, ts, data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (symbol, tf, ts) DO UPDATE SET data = excluded.data",
            params![
                snapshot.symbol,
                snapshot.timeframe.code(),
                snapshot.ts.timestamp_millis(),
                data,
            ],
        )?;
        Ok(())
    }

    /// Latest snapshot for a symbol/timeframe.
    pub fn latest_snapshot(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<IndicatorSnapshot>> {
        self.query_snapshot(
            "SELECT ts, data FROM indicators
             WHERE symbol = ?1 AND tf = ?2
             ORDER BY ts DESC LIMIT 1",
            params![symbol, timeframe.code()],
            symbol,
            timeframe,
        )
    }

    /// Snapshot at an exact bar timestamp.
    pub fn snapshot_at(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        ts: DateTime<Utc>,
    ) -> Result<Option<IndicatorSnapshot>> {
        self.query_snapshot(
            "SELECT ts, data FROM indicators
             WHERE symbol = ?1 AND tf = ?2 AND ts = ?3",
            params![symbol, timeframe.code(), ts.timestamp_millis()],
            symbol,
            timeframe,
        )
    }

    fn query_snapshot(
        &self,
        sql: &str,
        args: &[&dyn ToSql],
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<IndicatorSnapshot>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(sql, args, |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .optional()?;

        let Some((ts, data)) = row else {
            return Ok(None);
        };
        let data: IndicatorSet = serde_json::from_str(&data)?;
        Ok(Some(IndicatorSnapshot {
            symbol: symbol.to_string(),
            timeframe,
            ts: ts_from_millis(ts)?,
            data,
        }))
    }

    /// Number of stored snapshots for a symbol/timeframe.
    pub fn count_snapshots(&self, symbol: &str, timeframe: Timeframe) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM indicators WHERE symbol = ?1 AND tf = ?2",
            params![symbol, timeframe.code()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========== Signals ==========

    /// Store a signal unless one already exists for its key.
    /// Returns `true` when this call wrote the row.
    pub fn insert_signal_if_absent(&self, signal: &SignalRecord) -> Result<bool> {
        let detail = serde_json::to_string(&signal.detail)?;
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO signals (symbol, tf, ts, rule_id, fired, score, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT (symbol, tf, ts, rule_id) DO NOTHING",
            params![
                signal.symbol,
                signal.timeframe.code(),
                signal.ts.timestamp_millis(),
                signal.rule_id.to_string(),
                signal.fired,
                signal.score,
                detail,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(changed == 1)
    }

    /// Signal stored at a key, if any.
    pub fn signal_at(&self, key: &SignalKey) -> Result<Option<SignalRecord>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT ts, rule_id, fired, score, detail FROM signals
                 WHERE symbol = ?1 AND tf = ?2 AND ts = ?3 AND rule_id = ?4",
                params![
                    key.symbol,
                    key.timeframe.code(),
                    key.ts.timestamp_millis(),
                    key.rule_id.to_string()
                ],
                SignalRow::from_row,
            )
            .optional()?;

        row.map(|r| r.into_record(&key.symbol, key.timeframe)).transpose()
    }

    /// Most recent signals for a symbol/timeframe, newest first.
    pub fn signals_for(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<SignalRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT ts, rule_id, fired, score, detail FROM signals
             WHERE symbol = ?1 AND tf = ?2
             ORDER BY ts DESC
             LIMIT ?3",
        )?;

        let rows = stmt
            .query_map(params![symbol, timeframe.code(), limit as i64], SignalRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|r| r.into_record(symbol, timeframe))
            .collect()
    }

    // ========== Watchlists ==========

    /// Symbols of the user's first watchlist, or the default set when empty.
    pub fn load_watchlist(&self, user_id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT symbols FROM watchlists WHERE user_id = ?1 ORDER BY id ASC LIMIT 1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;

        let stored: Vec<String> = match raw {
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Malformed watchlist for {}: {}", user_id, e);
                Vec::new()
            }),
            None => Vec::new(),
        };

        let symbols = normalize_symbols(stored);
        if symbols.is_empty() {
            debug!("Watchlist for {} is empty, using default symbols", user_id);
            return Ok(normalize_symbols(DEFAULT_SYMBOLS));
        }
        Ok(symbols)
    }

    /// Make sure the user has a (possibly empty) watchlist row.
    pub fn ensure_watchlist(&self, user_id: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO watchlists (user_id, name, symbols)
             SELECT ?1, 'Default', '[]'
             WHERE NOT EXISTS (SELECT 1 FROM watchlists WHERE user_id = ?1)",
            params![user_id],
        )?;
        Ok(())
    }

    /// Replace the symbols of the user's first watchlist.
    pub fn save_watchlist(&self, user_id: &str, symbols: &[&str]) -> Result<()> {
        self.ensure_watchlist(user_id)?;
        let json = serde_json::to_string(symbols)?;
        let conn = self.conn()?;
        conn.execute(
            "UPDATE watchlists SET symbols = ?2
             WHERE id = (SELECT id FROM watchlists WHERE user_id = ?1 ORDER BY id ASC LIMIT 1)",
            params![user_id, json],
        )?;
        Ok(())
    }
}

struct SignalRow {
    ts: i64,
    rule_id: String,
    fired: bool,
    score: f64,
    detail: String,
}

impl SignalRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            ts: row.get(0)?,
            rule_id: row.get(1)?,
            fired: row.get(2)?,
            score: row.get(3)?,
            detail: row.get(4)?,
        })
    }

    fn into_record(self, symbol: &str, timeframe: Timeframe) -> Result<SignalRecord> {
        let rule_id = Uuid::parse_str(&self.rule_id)
            .map_err(|e| AppError::Internal(format!("Bad rule id {}: {}", self.rule_id, e)))?;
        let detail: SignalDetail = serde_json::from_str(&self.detail)?;
        Ok(SignalRecord {
            symbol: symbol.to_string(),
            timeframe,
            ts: ts_from_millis(self.ts)?,
            rule_id,
            fired: self.fired,
            score: self.score,
            detail,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, TREND_BREAKOUT_RULE_ID};
    use chrono::Duration;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn bar(symbol: &str, n: i64, close: f64) -> Bar {
        Bar::daily(symbol, day(n), close, close + 1.0, close - 1.0, close, 100.0)
    }

    fn snapshot(ma50: f64) -> IndicatorSnapshot {
        IndicatorSnapshot {
            symbol: "AAPL".to_string(),
            timeframe: Timeframe::Daily,
            ts: day(5),
            data: IndicatorSet {
                ma50,
                ma200: 2.0,
                rsi14: 60.0,
                vol_sma20: 1000.0,
            },
        }
    }

    #[test]
    fn test_insert_bars_is_idempotent() {
        let store = SqliteStore::new_in_memory().unwrap();
        let bars: Vec<Bar> = (0..10).map(|i| bar("AAPL", i, 10.0 + i as f64)).collect();

        assert_eq!(store.insert_bars(&bars, "provider").unwrap(), 10);
        assert_eq!(store.insert_bars(&bars, "provider").unwrap(), 0);
        assert_eq!(store.count_bars("AAPL", Timeframe::Daily).unwrap(), 10);
    }

    #[test]
    fn test_latest_bar_ts() {
        let store = SqliteStore::new_in_memory().unwrap();
        assert_eq!(store.latest_bar_ts("AAPL", Timeframe::Daily).unwrap(), None);

        let bars: Vec<Bar> = [3, 0, 7, 2].iter().map(|i| bar("AAPL", *i, 10.0)).collect();
        store.insert_bars(&bars, "provider").unwrap();
        assert_eq!(store.latest_bar_ts("AAPL", Timeframe::Daily).unwrap(), Some(day(7)));
    }

    #[test]
    fn test_insert_bars_ignores_conflicting_values() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.insert_bars(&[bar("AAPL", 0, 10.0)], "provider").unwrap();
        store.insert_bars(&[bar("AAPL", 0, 99.0)], "synthetic").unwrap();

        let bars = store.recent_bars("AAPL", Timeframe::Daily, 10).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 10.0);
    }

    #[test]
    fn test_recent_bars_returns_latest_ascending() {
        let store = SqliteStore::new_in_memory().unwrap();
        let bars: Vec<Bar> = (0..10).map(|i| bar("AAPL", i, i as f64 + 1.0)).collect();
        store.insert_bars(&bars, "provider").unwrap();

        let recent = store.recent_bars("AAPL", Timeframe::Daily, 3).unwrap();
        let closes: Vec<f64> = recent.iter().map(|b| b.close).collect();
        assert_eq!(closes, vec![8.0, 9.0, 10.0]);
        assert_eq!(recent[2].ts, day(9));
    }

    #[test]
    fn test_counts_are_per_symbol() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.insert_bars(&[bar("AAPL", 0, 1.0), bar("NVDA", 0, 1.0)], "provider").unwrap();
        assert_eq!(store.count_bars("AAPL", Timeframe::Daily).unwrap(), 1);
        assert_eq!(store.count_bars("MSFT", Timeframe::Daily).unwrap(), 0);
    }

    #[test]
    fn test_upsert_snapshot_overwrites_metrics() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.upsert_snapshot(&snapshot(1.0)).unwrap();
        store.upsert_snapshot(&snapshot(3.0)).unwrap();

        assert_eq!(store.count_snapshots("AAPL", Timeframe::Daily).unwrap(), 1);
        let latest = store.latest_snapshot("AAPL", Timeframe::Daily).unwrap().unwrap();
        assert_eq!(latest.data.ma50, 3.0);
        assert_eq!(latest.ts, day(5));

        let at = store.snapshot_at("AAPL", Timeframe::Daily, day(5)).unwrap();
        assert_eq!(at, Some(latest));
        assert!(store.snapshot_at("AAPL", Timeframe::Daily, day(6)).unwrap().is_none());
    }

    #[test]
    fn test_signal_first_write_wins() {
        let store = SqliteStore::new_in_memory().unwrap();
        let first = SignalRecord::trend_breakout("AAPL", Timeframe::Daily, day(5), 0.3);
        let second = SignalRecord::trend_breakout("AAPL", Timeframe::Daily, day(5), 0.9);

        assert!(store.insert_signal_if_absent(&first).unwrap());
        assert!(!store.insert_signal_if_absent(&second).unwrap());

        let stored = store.signal_at(&first.key()).unwrap().unwrap();
        assert_eq!(stored.score, 0.3);
        assert!(!stored.fired);
        assert_eq!(stored.detail.direction, Direction::Down);
        assert_eq!(stored.rule_id, TREND_BREAKOUT_RULE_ID);
        assert_eq!(store.signals_for("AAPL", Timeframe::Daily, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_load_watchlist_defaults_when_missing_or_empty() {
        let store = SqliteStore::new_in_memory().unwrap();
        let expected: Vec<String> = DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect();

        assert_eq!(store.load_watchlist("user").unwrap(), expected);
        store.ensure_watchlist("user").unwrap();
        assert_eq!(store.load_watchlist("user").unwrap(), expected);
    }

    #[test]
    fn test_load_watchlist_normalizes_symbols() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.save_watchlist("user", &["aapl", "btc-usd", "AAPL", " "]).unwrap();
        assert_eq!(
            store.load_watchlist("user").unwrap(),
            vec!["AAPL".to_string(), "BTC-USD".to_string()]
        );
        assert_eq!(store.load_watchlist("other").unwrap().len(), DEFAULT_SYMBOLS.len());
    }
}
