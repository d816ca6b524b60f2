//! Prize-tier classification and history backtesting.

pub mod backtest;
pub mod classifier;

pub use backtest::{aggregate, aggregate_with, best_tier, summarise, total_hits, BacktestSummary, TierResult};
pub use classifier::{classify, match_counts, MatchCount, PrizeTable, PrizeTableError};
