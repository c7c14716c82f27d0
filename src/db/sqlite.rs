use crate::models::{NewTrade, TradeAction, TradeRecord};
use crate::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};

/// Append-only SQLite ledger of trading decisions
#[derive(Clone)]
pub struct TradeLedger {
    pool: SqlitePool,
}

/// Fixed-width UTC text so timestamps compare correctly as strings
fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

impl TradeLedger {
    /// Open (creating if needed) the database at `database_url` and run migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        // Every connection to sqlite::memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::debug!("Trade ledger ready");
        Ok(Self { pool })
    }

    /// Append a trade stamped with the current time
    pub async fn log_trade(&self, trade: &NewTrade<'_>) -> Result<i64> {
        self.insert_trade(trade, Utc::now()).await
    }

    /// Append a trade with an explicit timestamp, returning its id
    pub async fn insert_trade(&self, trade: &NewTrade<'_>, timestamp: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO trades (
                timestamp, decision, percentage, reason, btc_balance, krw_balance,
                btc_avg_buy_price, btc_krw_price, reflection
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(encode_timestamp(timestamp))
        .bind(trade.decision.as_str())
        .bind(trade.percentage as i64)
        .bind(trade.reason)
        .bind(trade.btc_balance)
        .bind(trade.krw_balance)
        .bind(trade.btc_avg_buy_price)
        .bind(trade.btc_krw_price)
        .bind(trade.reflection)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        tracing::info!(
            "Logged trade #{}: {} {}%",
            id,
            trade.decision,
            trade.percentage
        );

        Ok(id)
    }

    /// Trades from the last `days` days, newest first
    pub async fn recent_trades(&self, days: i64) -> Result<Vec<TradeRecord>> {
        self.trades_since(Utc::now() - chrono::Duration::days(days))
            .await
    }

    /// Trades strictly after `cutoff`, newest first
    pub async fn trades_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, decision, percentage, reason, btc_balance, krw_balance,
                   btc_avg_buy_price, btc_krw_price, reflection
            FROM trades
            WHERE timestamp > ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(encode_timestamp(cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Every trade, oldest first
    pub async fn all_trades(&self) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, decision, percentage, reason, btc_balance, krw_balance,
                   btc_avg_buy_price, btc_krw_price, reflection
            FROM trades
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Reflection stored with the most recently inserted trade
    pub async fn latest_reflection(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT reflection FROM trades ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.and_then(|row| row.get::<Option<String>, _>("reflection")))
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TradeRecord> {
    let timestamp: String = row.get("timestamp");
    let decision: String = row.get("decision");
    let percentage: i64 = row.get("percentage");

    Ok(TradeRecord {
        id: row.get("id"),
        timestamp: decode_timestamp(&timestamp)?,
        decision: decision.parse::<TradeAction>()?,
        percentage: percentage.clamp(0, 100) as u8,
        reason: row.get("reason"),
        btc_balance: row.get("btc_balance"),
        krw_balance: row.get("krw_balance"),
        btc_avg_buy_price: row.get("btc_avg_buy_price"),
        btc_krw_price: row.get("btc_krw_price"),
        reflection: row.get("reflection"),
    })
}
