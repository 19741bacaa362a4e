use crate::models::{Action, Direction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One line of the trade journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
    #[serde(flatten)]
    pub entry: JournalEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    Decision {
        policy: String,
        action: Action,
        /// Set when the arbiter replaced the proposed action
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_action: Option<Action>,
        confidence: f64,
        rationale: String,
        outcome: String,
    },
    Order {
        direction: Direction,
        volume: f64,
        entry_price: f64,
        stop_loss: f64,
        take_profit: f64,
        ticket: u64,
    },
    TradeResult {
        ticket: u64,
        direction: Direction,
        open_price: f64,
        close_price: f64,
        diff: f64,
    },
    Halt {
        drawdown_pct: f64,
        limit_pct: f64,
    },
}

/// Append-only JSON-lines journal
///
/// Writes never fail the caller; problems are logged and the record dropped.
#[derive(Debug, Clone)]
pub struct Journal {
    path: PathBuf,
}

impl Journal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, cycle: u64, instrument: Option<&str>, entry: JournalEntry) {
        let record = JournalRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            cycle,
            instrument: instrument.map(str::to_string),
            entry,
        };

        if let Err(e) = self.write(&record).await {
            tracing::warn!(path = %self.path.display(), "Failed to write journal record: {}", e);
        }
    }

    async fn write(&self, record: &JournalRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Every readable record in file order; a missing journal is empty
    pub fn read_all(&self) -> anyhow::Result<Vec<JournalRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping journal line {}: {}", number + 1, e),
            }
        }
        Ok(records)
    }

    pub fn tail(&self, n: usize) -> anyhow::Result<Vec<JournalRecord>> {
        let mut records = self.read_all()?;
        let start = records.len().saturating_sub(n);
        Ok(records.split_off(start))
    }
}

/// Win/loss statistics over closed trades
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct JournalStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate_pct: f64,
}

impl JournalStats {
    pub fn from_records(records: &[JournalRecord]) -> Self {
        let mut stats = Self::default();
        for record in records {
            if let JournalEntry::TradeResult { diff, .. } = record.entry {
                stats.total_trades += 1;
                if diff > 0.0 {
                    stats.wins += 1;
                } else {
                    stats.losses += 1;
                }
            }
        }

        if stats.total_trades > 0 {
            stats.win_rate_pct = stats.wins as f64 / stats.total_trades as f64 * 100.0;
        }
        stats
    }
}
