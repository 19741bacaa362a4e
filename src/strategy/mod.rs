// Signal policies and the decision arbiter
pub mod advisory;
pub mod arbiter;
pub mod rules;

pub use advisory::{parse_advisory_reply, AdvisoryPolicy, AdvisoryReply};
pub use arbiter::{Arbiter, Review};
pub use rules::RulePolicy;

use crate::market::MarketSnapshot;
use crate::models::DecisionResult;
use async_trait::async_trait;

/// Base trait for the swappable signal policies
///
/// `decide` never fails: every failure mode is a HOLD with a rationale.
#[async_trait]
pub trait SignalPolicy: Send + Sync {
    async fn decide(&self, snapshot: &MarketSnapshot) -> DecisionResult;

    /// Policy name for logs and the journal
    fn name(&self) -> &str;
}
