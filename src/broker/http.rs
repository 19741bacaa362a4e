use super::{Broker, BrokerResult, OrderReceipt};
use crate::error::BrokerError;
use crate::models::{Candle, InstrumentSpec, OrderRequest, Position, Quote, Timeframe};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Response wrapper used by every bridge endpoint
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    equity: f64,
}

#[derive(Debug, Deserialize)]
struct ReceiptData {
    ticket: u64,
    price: f64,
}

#[derive(Debug, Serialize)]
struct ModifyBody {
    stop_loss: f64,
    take_profit: f64,
}

#[derive(Debug, Serialize)]
struct CloseBody {
    volume: f64,
    price: f64,
}

/// Client for a JSON/REST gateway in front of the trading terminal
#[derive(Clone)]
pub struct HttpBroker {
    client: Client,
    base_url: String,
}

impl HttpBroker {
    pub fn new(base_url: &str, timeout: Duration) -> BrokerResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> BrokerResult<Envelope<T>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Transport(format!("HTTP {}: {}", status, body)));
        }

        response
            .json::<Envelope<T>>()
            .await
            .map_err(|e| BrokerError::Decode(e.to_string()))
    }

    /// GET that treats `ok: false` as missing data
    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        what: String,
    ) -> BrokerResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let envelope = Self::read::<T>(response).await?;
        if !envelope.ok {
            tracing::debug!(what = %what, message = %envelope.message, "bridge reported no data");
            return Err(BrokerError::Unavailable { what });
        }
        envelope.data.ok_or(BrokerError::Unavailable { what })
    }

    /// POST that treats `ok: false` as a broker rejection
    async fn send<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> BrokerResult<Option<T>> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| BrokerError::Transport(e.to_string()))?;

        let envelope = Self::read::<T>(response).await?;
        if !envelope.ok {
            return Err(BrokerError::Rejected {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(envelope.data)
    }
}

#[async_trait]
impl Broker for HttpBroker {
    async fn candles(
        &self,
        instrument: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> BrokerResult<Vec<Candle>> {
        let candles: Vec<Candle> = self
            .fetch(
                "/candles",
                &[
                    ("instrument", instrument.to_string()),
                    ("timeframe", timeframe.to_string()),
                    ("count", count.to_string()),
                ],
                format!("{} {} candles", instrument, timeframe),
            )
            .await?;

        if candles.is_empty() {
            return Err(BrokerError::Unavailable {
                what: format!("{} {} candles", instrument, timeframe),
            });
        }
        Ok(candles)
    }

    async fn quote(&self, instrument: &str) -> BrokerResult<Quote> {
        self.fetch(
            &format!("/tick/{}", instrument),
            &[],
            format!("{} tick", instrument),
        )
        .await
    }

    async fn open_positions(&self, instrument: &str) -> BrokerResult<Vec<Position>> {
        self.fetch(
            "/positions",
            &[("instrument", instrument.to_string())],
            format!("{} positions", instrument),
        )
        .await
    }

    async fn account_equity(&self) -> BrokerResult<f64> {
        let account: AccountData = self
            .fetch("/account", &[], "account equity".to_string())
            .await?;
        Ok(account.equity)
    }

    async fn instrument_spec(&self, instrument: &str) -> BrokerResult<InstrumentSpec> {
        self.fetch(
            &format!("/instruments/{}", instrument),
            &[],
            format!("{} instrument spec", instrument),
        )
        .await
    }

    async fn submit_order(&self, order: &OrderRequest) -> BrokerResult<OrderReceipt> {
        let receipt: ReceiptData = self
            .send("/orders", order)
            .await?
            .ok_or_else(|| BrokerError::Decode("order accepted without a ticket".to_string()))?;

        Ok(OrderReceipt {
            ticket: receipt.ticket,
            price: receipt.price,
        })
    }

    async fn modify_position(&self, ticket: u64, stop_loss: f64, take_profit: f64) -> BrokerResult<()> {
        self.send::<_, serde_json::Value>(
            &format!("/positions/{}/modify", ticket),
            &ModifyBody {
                stop_loss,
                take_profit,
            },
        )
        .await?;
        Ok(())
    }

    async fn close_position(&self, position: &Position, price: f64) -> BrokerResult<()> {
        self.send::<_, serde_json::Value>(
            &format!("/positions/{}/close", position.ticket),
            &CloseBody {
                volume: position.volume,
                price,
            },
        )
        .await?;
        Ok(())
    }
}
