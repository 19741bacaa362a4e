// Market observation: multi-timeframe snapshots and their text rendering
pub mod observer;
pub mod snapshot;

pub use observer::MarketObserver;
pub use snapshot::{MarketSnapshot, TimeframeView};
