//! History listing command.

use crate::config::Config;
use crate::format::Formatter;
use crate::history::Stores;
use anyhow::Result;
use tracing::info;

/// Lists the most recent stored observations.
pub struct HistoryCommand {
    config: Config,
    stores: Stores,
}

impl HistoryCommand {
    pub fn new(config: Config) -> Self {
        let stores = Stores::from_config(&config);
        Self::with_stores(config, stores)
    }

    pub fn with_stores(config: Config, stores: Stores) -> Self {
        Self { config, stores }
    }

    /// Returns up to `limit` observations, newest first, formatted.
    pub async fn execute(&self, limit: usize) -> Result<String> {
        if limit == 0 {
            anyhow::bail!("History limit must be at least 1");
        }

        self.stores.open().await;
        let observations = self.stores.most_recent(limit).await;
        self.stores.close().await;

        info!("Loaded {} observations", observations.len());

        let records: Vec<_> = observations.iter().map(|o| o.to_record()).collect();
        Ok(Formatter::new(self.config.format).format_history(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use crate::extract::{Observation, ParsedPrice, Reading};
    use crate::history::{HistoryStore, MemoryStore};
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn observation(minute: i64, price: f64) -> Observation {
        Observation::new(
            Utc.with_ymd_and_hms(2025, 3, 24, 12, 0, 0).unwrap() + Duration::minutes(minute),
            Reading::Value("Widget".to_string()),
            Ok(ParsedPrice { display: format!("$ {:.2}", price), numeric: Some(price) }),
            Reading::Unavailable,
            Reading::Unavailable,
            Reading::Unavailable,
        )
    }

    async fn command(format: OutputFormat) -> HistoryCommand {
        let memory = Arc::new(MemoryStore::new());
        for (minute, price) in [(0, 10.0), (1, 11.0), (2, 12.0)] {
            memory.append(&observation(minute, price)).await.unwrap();
        }

        let mut config = Config::new();
        config.format = format;
        HistoryCommand::with_stores(config, Stores::single(memory))
    }

    #[tokio::test]
    async fn test_history_json_newest_first() {
        let output = command(OutputFormat::Json).await.execute(2).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["price"], "$ 12.00");
        assert_eq!(rows[1]["timestamp"], "2025-03-24 12:01:00");
    }

    #[tokio::test]
    async fn test_history_table() {
        let output = command(OutputFormat::Table).await.execute(5).await.unwrap();
        assert!(output.contains("Widget"));
        assert!(output.contains("Total: 3 observations"));
    }

    #[tokio::test]
    async fn test_history_zero_limit() {
        let result = command(OutputFormat::Table).await.execute(0).await;
        assert!(result.unwrap_err().to_string().contains("at least 1"));
    }

    #[tokio::test]
    async fn test_history_empty() {
        let mut config = Config::new();
        config.format = OutputFormat::Table;
        let cmd = HistoryCommand::with_stores(config, Stores::single(Arc::new(MemoryStore::new())));
        assert_eq!(cmd.execute(5).await.unwrap(), "No observations recorded.");
    }
}
