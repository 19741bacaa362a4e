use super::SignalPolicy;
use crate::api::AdvisoryClient;
use crate::market::MarketSnapshot;
use crate::models::{Action, DecisionResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Strategy playbook sent as the system prompt with every request
pub const SYSTEM_PROMPT: &str = r#"You are a senior risk manager and a patient sniper trader.
Your goal is to protect capital by taking fewer, higher-quality trades.
PRIORITY: CAPITAL PRESERVATION OVER PROFIT.

STRATEGY 1: MOMENTUM PULLBACK (Trend)
- REGIME: slow timeframe Price > EMA20 > EMA50 (bullish) or Price < EMA20 < EMA50 (bearish).
- TRIGGER: fast timeframe pullback to EMA20 or EMA9.
- ACTION: trade WITH the trend.

STRATEGY 2: RANGE MEAN-REVERSION (Chop)
- REGIME: slow timeframe EMAs flat or crossed, price INSIDE the Bollinger Bands.
- TRIGGER: price touches the upper band (SELL) or the lower band (BUY).
- ACTION: fade the move.

STRATEGY 3: BREAKOUT CONTINUATION (Volatility Expansion)
- REGIME: Bollinger Bands were tight (squeeze) and price is now breaking out.
- TRIGGER: price closes OUTSIDE the bands with momentum.
- ACTION: trade WITH the breakout.

STRATEGY 4: BIG BREAKOUT (Hourly Hold)
- REGIME: major support/resistance breach on the higher timeframes.
- TRIGGER: strong impulse candle.
- ACTION: extended hold, aim for one to two hours of trend riding. Use HIGH confidence.

EXIT STRATEGY: SMART PROFIT TAKING
- If an open position is in profit AND market structure reverses (candle closes back inside the bands, pin bar at resistance), CLOSE.
- If the position came from a Big Breakout, tolerate minor pullbacks.

DECISION LOGIC:
1. Identify the slow timeframe regime (trend, range or breakout).
2. Select a strategy.
3. Check the fast timeframe trigger.
4. Check existing positions: if green and reversing, CLOSE.
5. Set confidence, which controls position size:
   - Base (0.60-0.79): base lot.
   - High (0.80-0.89): double lot.
   - Sniper (0.90 and above): triple lot.

Respond with JSON ONLY:
{
  "strategy": "Momentum Pullback" | "Range Mean-Reversion" | "Breakout" | "Big Breakout" | "Smart Exit",
  "regime": "Bullish Trend" | "Bearish Trend" | "Range" | "Breakout",
  "thought": "reasoning",
  "action": "BUY" | "SELL" | "HOLD" | "CLOSE",
  "confidence": 0.0 to 1.0
}"#;

const NO_RATIONALE: &str = "No rationale provided";

/// Structured advisory reply with every field optional and untyped on the wire
#[derive(Debug, Default, Deserialize)]
struct RawReply {
    strategy: Option<Value>,
    regime: Option<Value>,
    thought: Option<Value>,
    rationale: Option<Value>,
    action: Option<Value>,
    confidence: Option<Value>,
}

/// Non-empty string value, anything else is treated as absent
fn text_value(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

/// Advisory reply after the fallback table has been applied
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryReply {
    pub strategy: Option<String>,
    pub regime: Option<String>,
    pub rationale: String,
    pub action: Action,
    pub confidence: f64,
}

impl AdvisoryReply {
    fn from_raw(raw: RawReply) -> Self {
        let action = raw
            .action
            .as_ref()
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<Action>().ok());

        let confidence = match action {
            // unknown or missing action is a zero-confidence hold
            None => 0.0,
            Some(_) => raw
                .confidence
                .as_ref()
                .and_then(confidence_value)
                .filter(|c| c.is_finite())
                .map(|c| c.clamp(0.0, 1.0))
                .unwrap_or(0.0),
        };

        let rationale = text_value(raw.thought)
            .or_else(|| text_value(raw.rationale))
            .unwrap_or_else(|| NO_RATIONALE.to_string());

        Self {
            strategy: text_value(raw.strategy),
            regime: text_value(raw.regime),
            rationale,
            action: action.unwrap_or(Action::Hold),
            confidence,
        }
    }

    fn into_decision(self, atr: Option<f64>) -> DecisionResult {
        let rationale = match &self.strategy {
            Some(strategy) => format!("[{}] {}", strategy, self.rationale),
            None => self.rationale,
        };

        DecisionResult {
            action: self.action,
            confidence: self.confidence,
            rationale,
            atr,
            stops: None,
        }
    }
}

fn confidence_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// First balanced `{...}` object in `text`, honouring JSON string escapes
fn extract_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..=i];
                        if serde_json::from_str::<Value>(candidate).is_ok() {
                            return Some(candidate);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
        search_from = start + 1;
    }

    None
}

/// Parse the free-text advisory reply into a well-formed reply
///
/// Never fails: anything unparsable becomes a HOLD with confidence 0.
pub fn parse_advisory_reply(text: &str) -> AdvisoryReply {
    let body = strip_code_fences(text);

    let parsed = serde_json::from_str::<RawReply>(body).or_else(|direct| {
        extract_object(body)
            .ok_or(direct)
            .and_then(|object| serde_json::from_str::<RawReply>(object))
    });

    match parsed {
        Ok(raw) => AdvisoryReply::from_raw(raw),
        Err(e) => {
            tracing::error!("Failed to parse advisory reply: {}", e);
            AdvisoryReply {
                strategy: None,
                regime: None,
                rationale: format!("parse error: {}", e),
                action: Action::Hold,
                confidence: 0.0,
            }
        }
    }
}

/// Delegates the decision to the external advisory service
pub struct AdvisoryPolicy {
    client: AdvisoryClient,
    display_decimals: usize,
}

impl AdvisoryPolicy {
    pub fn new(client: AdvisoryClient, display_decimals: usize) -> Self {
        Self {
            client,
            display_decimals,
        }
    }
}

#[async_trait]
impl SignalPolicy for AdvisoryPolicy {
    async fn decide(&self, snapshot: &MarketSnapshot) -> DecisionResult {
        let observation = snapshot.render_text(self.display_decimals);

        match self.client.request(SYSTEM_PROMPT, &observation).await {
            Ok(text) => {
                let reply = parse_advisory_reply(&text);
                tracing::info!(
                    instrument = %snapshot.instrument,
                    action = %reply.action,
                    confidence = reply.confidence,
                    regime = reply.regime.as_deref().unwrap_or("-"),
                    "🧠 Advisory decision"
                );
                reply.into_decision(snapshot.atr)
            }
            Err(e) => {
                tracing::error!(instrument = %snapshot.instrument, "Advisory request failed: {}", e);
                DecisionResult {
                    atr: snapshot.atr,
                    ..DecisionResult::hold(format!("advisory request failed: {}", e))
                }
            }
        }
    }

    fn name(&self) -> &str {
        "advisory"
    }
}
