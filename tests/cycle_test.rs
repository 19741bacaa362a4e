use ai_trader::broker::PaperBroker;
use ai_trader::config::{PolicyKind, Settings};
use ai_trader::execution::{JournalEntry, JournalStats};
use ai_trader::market::MarketSnapshot;
use ai_trader::risk::GuardState;
use ai_trader::scheduler::{run_scheduler, SchedulerExit};
use ai_trader::strategy::RulePolicy;
use ai_trader::*;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Policy that always proposes the same decision
struct FixedPolicy(DecisionResult);

#[async_trait]
impl SignalPolicy for FixedPolicy {
    async fn decide(&self, snapshot: &MarketSnapshot) -> DecisionResult {
        DecisionResult {
            atr: snapshot.atr,
            ..self.0.clone()
        }
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn fixed(action: Action, confidence: f64) -> Box<FixedPolicy> {
    Box::new(FixedPolicy(DecisionResult {
        action,
        confidence,
        rationale: "scripted".to_string(),
        atr: None,
        stops: None,
    }))
}

fn candles(n: usize, close_at: impl Fn(usize) -> f64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = close_at(i);
            Candle {
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::minutes(i as i64),
                open: close - 0.5,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
            }
        })
        .collect()
}

/// Sideways market: RSI near 50, ATR positive
fn seed_choppy(broker: &PaperBroker, instrument: &str) {
    for tf in [Timeframe::M1, Timeframe::M5, Timeframe::M15] {
        broker.set_candles(instrument, tf, candles(120, |i| 100.0 + (i % 4) as f64));
    }
    broker.set_quote(instrument, Quote { bid: 102.0, ask: 102.3 });
}

fn settings(dir: &TempDir, instruments: &[&str]) -> Settings {
    Settings {
        instruments: instruments.iter().map(|s| s.to_string()).collect(),
        policy: PolicyKind::Rules,
        max_drawdown_pct: 2.0,
        journal_path: dir.path().join("journal.jsonl").display().to_string(),
        ..Default::default()
    }
}

fn position(ticket: u64, direction: Direction, open_price: f64) -> Position {
    Position {
        instrument: "XAUUSD".to_string(),
        direction,
        volume: 1.0,
        open_price,
        stop_loss: 0.0,
        take_profit: 0.0,
        profit: 0.0,
        ticket,
    }
}

#[tokio::test]
async fn test_buy_cycle_opens_and_journals() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    seed_choppy(&broker, "XAUUSD");

    let mut session = TradingSession::new(
        &settings(&dir, &["XAUUSD"]),
        broker.clone(),
        fixed(Action::Buy, 0.85),
    );
    let summary = session.run_cycle().await.unwrap();

    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].action, Action::Buy);

    let orders = broker.submitted_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].entry_price, 102.3);
    assert_eq!(orders[0].volume, 2.0);

    let records = session.journal().read_all().unwrap();
    assert_eq!(records.len(), 2);
    assert!(matches!(records[0].entry, JournalEntry::Decision { .. }));
    assert!(matches!(records[1].entry, JournalEntry::Order { ticket: 1, .. }));
}

#[tokio::test]
async fn test_capacity_refusal_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    seed_choppy(&broker, "XAUUSD");

    let mut session = TradingSession::new(
        &settings(&dir, &["XAUUSD"]),
        broker.clone(),
        fixed(Action::Buy, 0.5),
    );
    session.run_cycle().await.unwrap();
    let summary = session.run_cycle().await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(broker.submitted_orders().len(), 1);

    let records = session.journal().tail(1).unwrap();
    let JournalEntry::Decision { outcome, .. } = &records[0].entry else {
        panic!("expected a decision record");
    };
    assert!(outcome.contains("already holds"));
}

#[tokio::test]
async fn test_missing_data_skips_only_that_instrument() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    seed_choppy(&broker, "XAUUSD");

    let mut session = TradingSession::new(
        &settings(&dir, &["BTCUSD", "XAUUSD"]),
        broker.clone(),
        fixed(Action::Sell, 0.6),
    );
    let summary = session.run_cycle().await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].instrument, "XAUUSD");
    assert_eq!(broker.submitted_orders()[0].instrument, "XAUUSD");
}

#[tokio::test]
async fn test_equity_guard_halts_for_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    seed_choppy(&broker, "XAUUSD");

    let mut session = TradingSession::new(
        &settings(&dir, &["XAUUSD"]),
        broker.clone(),
        fixed(Action::Hold, 0.0),
    );
    session.run_cycle().await.unwrap();

    broker.set_equity(Some(9_700.0));
    let err = session.run_cycle().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(session.guard().state(), GuardState::Halted);

    // recovery does not resume trading
    broker.set_equity(Some(10_500.0));
    assert!(session.run_cycle().await.is_err());

    let records = session.journal().read_all().unwrap();
    let halts: Vec<_> = records
        .iter()
        .filter(|r| matches!(r.entry, JournalEntry::Halt { .. }))
        .collect();
    assert_eq!(halts.len(), 1);
    // only the first cycle reached the instrument
    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn test_equity_unavailable_does_not_block_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    seed_choppy(&broker, "XAUUSD");
    broker.set_equity(None);

    let mut session = TradingSession::new(
        &settings(&dir, &["XAUUSD"]),
        broker.clone(),
        fixed(Action::Buy, 0.5),
    );
    session.run_cycle().await.unwrap();

    assert_eq!(session.guard().baseline(), None);
    assert_eq!(broker.submitted_orders().len(), 1);
}

#[tokio::test]
async fn test_close_journals_trade_results() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    seed_choppy(&broker, "XAUUSD");
    broker.add_position(position(1, Direction::Long, 100.0));
    broker.add_position(position(2, Direction::Short, 101.0));

    let mut session = TradingSession::new(
        &settings(&dir, &["XAUUSD"]),
        broker.clone(),
        fixed(Action::Close, 0.7),
    );
    session.run_cycle().await.unwrap();

    assert!(broker.positions("XAUUSD").is_empty());
    assert_eq!(broker.closed_positions(), vec![(1, 102.0), (2, 102.3)]);

    let records = session.journal().read_all().unwrap();
    let stats = JournalStats::from_records(&records);
    assert_eq!(stats.total_trades, 2);
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.losses, 1);
    assert_eq!(stats.win_rate_pct, 50.0);
}

#[tokio::test]
async fn test_rsi_filter_blocks_buy_into_rally() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    for tf in [Timeframe::M1, Timeframe::M5, Timeframe::M15] {
        broker.set_candles("XAUUSD", tf, candles(120, |i| 100.0 + i as f64));
    }
    broker.set_quote("XAUUSD", Quote { bid: 220.0, ask: 220.3 });

    let mut session = TradingSession::new(
        &settings(&dir, &["XAUUSD"]),
        broker.clone(),
        fixed(Action::Buy, 1.0),
    );
    let summary = session.run_cycle().await.unwrap();

    assert_eq!(summary.reports[0].proposed, Action::Buy);
    assert_eq!(summary.reports[0].action, Action::Hold);
    assert!(broker.submitted_orders().is_empty());

    let records = session.journal().read_all().unwrap();
    let JournalEntry::Decision {
        action,
        original_action,
        rationale,
        ..
    } = &records[0].entry
    else {
        panic!("expected a decision record");
    };
    assert_eq!(*action, Action::Hold);
    assert_eq!(*original_action, Some(Action::Buy));
    assert!(rationale.ends_with("[BLOCKED BY RSI FILTER]"));
}

#[tokio::test]
async fn test_stops_managed_every_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    broker.add_position(position(5, Direction::Long, 90.0));
    seed_choppy(&broker, "XAUUSD");

    let mut session = TradingSession::new(
        &settings(&dir, &["XAUUSD"]),
        broker.clone(),
        fixed(Action::Hold, 0.0),
    );
    let summary = session.run_cycle().await.unwrap();

    assert_eq!(summary.reports[0].stops.modified, 1);
    let modifications = broker.modifications();
    assert_eq!(modifications.len(), 1);
    assert_eq!(modifications[0].0, 5);
    // trailing stop sits below the bid, above entry
    assert!(modifications[0].1 > 90.0 && modifications[0].1 < 102.0);
}

#[tokio::test]
async fn test_scheduler_runs_once_then_stops_on_halt() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));
    seed_choppy(&broker, "XAUUSD");

    let mut session = TradingSession::new(
        &settings(&dir, &["XAUUSD"]),
        broker.clone(),
        fixed(Action::Hold, 0.0),
    );

    let exit = run_scheduler(&mut session, Duration::from_millis(10), Some(1)).await;
    assert_eq!(exit, SchedulerExit::Completed);
    assert_eq!(session.cycle(), 1);

    broker.set_equity(Some(9_000.0));
    let exit = run_scheduler(&mut session, Duration::from_millis(10), Some(10)).await;
    assert_eq!(exit, SchedulerExit::Halted);
    assert_eq!(session.cycle(), 2);
}

#[tokio::test]
async fn test_rule_policy_cycle_opens_pullback() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Arc::new(PaperBroker::new(10_000.0));

    let mut fast = candles(60, |i| 100.0 + i as f64 * 0.5);
    // last closed bar dips through EMA20 and closes green; RSI stays near 65
    fast[58] = Candle {
        open: 120.0,
        high: 126.0,
        low: 119.0,
        close: 125.0,
        ..fast[58].clone()
    };
    broker.set_candles("XAUUSD", Timeframe::M1, fast);
    for tf in [Timeframe::M5, Timeframe::M15] {
        broker.set_candles("XAUUSD", tf, candles(60, |i| 100.0 + i as f64));
    }
    broker.set_quote("XAUUSD", Quote { bid: 125.0, ask: 125.3 });

    let settings = settings(&dir, &["XAUUSD"]);
    assert_eq!(settings.policy, PolicyKind::Rules);
    let mut session = TradingSession::new(&settings, broker.clone(), Box::new(RulePolicy::new()));
    let summary = session.run_cycle().await.unwrap();

    assert_eq!(summary.reports[0].proposed, Action::Buy);
    assert_eq!(summary.reports[0].action, Action::Buy);

    let orders = broker.submitted_orders();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.entry_price, 125.3);
    // confidence 1.0 lands in the top tier
    assert_eq!(order.volume, 3.0);
    // 14-bar mean true range of the fast frame is 71/28
    let atr = 71.0 / 28.0;
    assert!((order.stop_loss - (125.3 - 2.0 * atr)).abs() < 1e-9);
    assert!((order.take_profit - (125.3 + 1.5 * atr)).abs() < 1e-9);

    let records = session.journal().read_all().unwrap();
    let JournalEntry::Decision { policy, confidence, .. } = &records[0].entry else {
        panic!("expected a decision record");
    };
    assert_eq!(policy, "rules");
    assert_eq!(*confidence, 1.0);
}
