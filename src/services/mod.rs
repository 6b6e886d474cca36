pub mod cycle;
pub mod historical;
pub mod signals;
pub mod sqlite_store;
pub mod synthetic;

pub use cycle::{CycleReport, CycleRunner, SymbolOutcome};
pub use historical::{HistorySeeder, SeedOutcome, SeedStatus};
pub use signals::{compute_indicators, score_signal, ScoreBreakdown};
pub use sqlite_store::SqliteStore;
pub use synthetic::generate_daily_bars;
