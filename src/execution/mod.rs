// Order execution: sizing, the order pipeline and the trade journal
pub mod executor;
pub mod journal;
pub mod sizer;

pub use executor::{ClosedTrade, ExecutionAction, ExecutionOutcome, Executor};
pub use journal::{Journal, JournalEntry, JournalRecord, JournalStats};
pub use sizer::{sizing_tier, PositionSizer, SizingTier, StopCalculator};
