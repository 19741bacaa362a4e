// Risk management: stop maintenance and the account drawdown guard
pub mod equity_guard;
pub mod stop_manager;

pub use equity_guard::{EquityGuard, GuardState};
pub use stop_manager::{compute_stop_adjustment, StopAdjustment, StopManager, StopReport, StopStage};
