//! End-to-end cycle tests over an in-memory store

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use markets_analysis::services::{
    generate_daily_bars, CycleRunner, HistorySeeder, SeedOutcome, SqliteStore, SymbolOutcome,
};
use markets_analysis::sources::PriceProvider;
use markets_analysis::types::{Bar, Direction, SignalKey, SignalRecord, Timeframe, TREND_BREAKOUT_RULE_ID};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Provider that never has data and counts how often it was asked.
#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl PriceProvider for CountingProvider {
    async fn fetch_daily(&self, _symbol: &str, _days: u32) -> Option<Vec<Bar>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }
}

/// Provider that parks until released, to hold a cycle open.
struct BlockingProvider {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl PriceProvider for BlockingProvider {
    async fn fetch_daily(&self, _symbol: &str, _days: u32) -> Option<Vec<Bar>> {
        self.entered.notify_one();
        self.release.notified().await;
        None
    }
}

const USER: &str = "11111111-1111-1111-1111-111111111111";

fn setup(symbols: &[&str]) -> (Arc<SqliteStore>, Arc<CountingProvider>, CycleRunner) {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    store.save_watchlist(USER, symbols).unwrap();
    let provider = Arc::new(CountingProvider::default());
    let seeder = HistorySeeder::new(store.clone(), provider.clone());
    let runner = CycleRunner::new(store.clone(), seeder, USER);
    (store, provider, runner)
}

#[tokio::test]
async fn test_single_symbol_without_providers() {
    let (store, provider, runner) = setup(&["AAPL"]);

    let report = runner.run_cycle().await.unwrap();

    assert_eq!(report.symbols, 1);
    assert_eq!(report.scored, 1);
    assert_eq!(report.seeded, 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count_bars("AAPL", Timeframe::Daily).unwrap(), 320);
    assert_eq!(store.count_snapshots("AAPL", Timeframe::Daily).unwrap(), 1);

    let last_ts = store.latest_bar_ts("AAPL", Timeframe::Daily).unwrap().unwrap();

    let snapshot = store
        .latest_snapshot("AAPL", Timeframe::Daily)
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.ts, last_ts);

    let signals = store.signals_for("AAPL", Timeframe::Daily, 10).unwrap();
    assert!(signals.len() <= 1);
    for signal in &signals {
        assert_eq!(signal.ts, last_ts);
        assert_eq!(signal.rule_id, TREND_BREAKOUT_RULE_ID);
        assert!((0.0..=1.0).contains(&signal.score));
        assert_eq!(signal.fired, signal.score >= 0.6);
        assert_eq!(signal.detail.direction, Direction::from_score(signal.score));
    }
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (store, provider, runner) = setup(&["AAPL", "BTC-USD"]);

    let first = runner.run_cycle().await.unwrap();
    let snapshot_before = store.latest_snapshot("AAPL", Timeframe::Daily).unwrap();
    let signals_before = store.signals_for("AAPL", Timeframe::Daily, 10).unwrap();

    let second = runner.run_cycle().await.unwrap();

    assert_eq!(first.seeded, 2);
    assert_eq!(second.seeded, 0);
    assert_eq!(second.signals_inserted, 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.count_bars("AAPL", Timeframe::Daily).unwrap(), 320);
    assert_eq!(store.count_snapshots("AAPL", Timeframe::Daily).unwrap(), 1);
    assert_eq!(store.latest_snapshot("AAPL", Timeframe::Daily).unwrap(), snapshot_before);
    assert_eq!(store.signals_for("AAPL", Timeframe::Daily, 10).unwrap(), signals_before);
}

#[tokio::test]
async fn test_seeder_skips_symbols_with_enough_history() {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    store
        .insert_bars(&generate_daily_bars("NVDA", start, 250), "synthetic")
        .unwrap();

    let provider = Arc::new(CountingProvider::default());
    let seeder = HistorySeeder::new(store.clone(), provider.clone());

    let outcome = seeder.ensure_history("NVDA").await.unwrap();

    assert_eq!(outcome, SeedOutcome::Sufficient { count: 250 });
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.count_bars("NVDA", Timeframe::Daily).unwrap(), 250);
}

#[tokio::test]
async fn test_seeder_tops_up_short_history() {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    store
        .insert_bars(&generate_daily_bars("SPY", start, 40), "synthetic")
        .unwrap();

    let provider = Arc::new(CountingProvider::default());
    let seeder = HistorySeeder::new(store.clone(), provider.clone());

    let outcome = seeder.ensure_history("SPY").await.unwrap();

    assert!(matches!(outcome, SeedOutcome::Synthetic { generated: 320, .. }));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert!(store.count_bars("SPY", Timeframe::Daily).unwrap() >= 250);
}

#[tokio::test]
async fn test_signal_first_write_wins() {
    let (store, _provider, runner) = setup(&["ETH-USD"]);
    runner.run_cycle().await.unwrap();

    let last = store.recent_bars("ETH-USD", Timeframe::Daily, 1).unwrap()[0].ts;
    let key = SignalKey {
        symbol: "ETH-USD".to_string(),
        timeframe: Timeframe::Daily,
        ts: last,
        rule_id: TREND_BREAKOUT_RULE_ID,
    };
    let stored = store.signal_at(&key).unwrap().unwrap();

    // A later evaluation for the same bar never replaces the first one
    let other = if stored.score >= 0.5 { 0.0 } else { 1.0 };
    let rescored = SignalRecord::trend_breakout("ETH-USD", Timeframe::Daily, last, other);
    assert!(!store.insert_signal_if_absent(&rescored).unwrap());
    assert_eq!(store.signal_at(&key).unwrap().unwrap().score, stored.score);

    match runner.process_symbol("ETH-USD").await.unwrap() {
        SymbolOutcome::Scored { signal_inserted, .. } => assert!(!signal_inserted),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_watchlist_uses_defaults() {
    let (store, _provider, runner) = setup(&[]);

    let report = runner.run_cycle().await.unwrap();

    assert_eq!(report.symbols, 5);
    for symbol in ["AAPL", "NVDA", "SPY", "BTC-USD", "ETH-USD"] {
        assert_eq!(store.count_snapshots(symbol, Timeframe::Daily).unwrap(), 1, "{symbol}");
    }
}

#[tokio::test]
async fn test_overlapping_tick_is_skipped() {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    store.save_watchlist(USER, &["AAPL"]).unwrap();
    let provider = Arc::new(BlockingProvider {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let seeder = HistorySeeder::new(store.clone(), provider.clone());
    let runner = Arc::new(CycleRunner::new(store.clone(), seeder, USER));

    let first = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.try_run_cycle().await })
    };

    tokio::time::timeout(Duration::from_secs(5), provider.entered.notified())
        .await
        .unwrap();
    assert!(runner.is_running());
    assert!(runner.try_run_cycle().await.is_none());

    provider.release.notify_one();
    let report = first.await.unwrap().unwrap().unwrap();
    assert_eq!(report.scored, 1);
    assert!(!runner.is_running());
    assert_eq!(store.count_snapshots("AAPL", Timeframe::Daily).unwrap(), 1);
}

#[tokio::test]
async fn test_failed_symbol_does_not_stop_the_cycle() {
    let path = std::env::temp_dir().join(format!(
        "markets-analysis-isolation-{}.db",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);

    let store = Arc::new(SqliteStore::new(&path).unwrap());
    store.save_watchlist(USER, &["NVDA", "AAPL", "SPY"]).unwrap();

    // Reject snapshot writes for one symbol from a second connection
    let admin = rusqlite::Connection::open(&path).unwrap();
    admin
        .execute_batch(
            "CREATE TRIGGER reject_nvda BEFORE INSERT ON indicators
             WHEN NEW.symbol = 'NVDA'
             BEGIN SELECT RAISE(ABORT, 'snapshot rejected'); END;",
        )
        .unwrap();
    drop(admin);

    let seeder = HistorySeeder::new(store.clone(), Arc::new(CountingProvider::default()));
    let runner = CycleRunner::new(store.clone(), seeder, USER);

    let report = runner.run_cycle().await.unwrap();

    assert_eq!(report.symbols, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.scored, 2);
    assert_eq!(store.count_snapshots("NVDA", Timeframe::Daily).unwrap(), 0);
    assert_eq!(store.count_snapshots("AAPL", Timeframe::Daily).unwrap(), 1);
    assert_eq!(store.count_snapshots("SPY", Timeframe::Daily).unwrap(), 1);

    drop(runner);
    drop(store);
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_process_symbol_is_case_insensitive() {
    let (store, provider, runner) = setup(&[]);

    runner.process_symbol("nvda").await.unwrap();
    let outcome = runner.process_symbol("nvda").await.unwrap();

    assert!(matches!(outcome, SymbolOutcome::Scored { signal_inserted: false, .. }));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.count_bars("NVDA", Timeframe::Daily).unwrap(), 320);
}
