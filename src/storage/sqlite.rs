//! SQLite implementation of StateStore.

use crate::config::CorruptStatePolicy;
use crate::domain::RiskState;
use crate::storage::{StateStore, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::{info, warn};

/// SqliteStore keeps the risk state in a single-row table. Writing the row
/// is one statement, so a concurrent reader sees either the previous record
/// or the new one.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    on_corrupt: CorruptStatePolicy,
}

/// SqliteStoreConfig holds SQLite store configuration.
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// What to do when the stored record is unreadable.
    pub on_corrupt: CorruptStatePolicy,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: "riskguard.db".to_string(),
            max_connections: 5,
            on_corrupt: CorruptStatePolicy::Allow,
        }
    }
}

impl SqliteStore {
    /// Creates a new SQLite store instance.
    pub async fn new(config: SqliteStoreConfig) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            on_corrupt: config.on_corrupt,
        };

        store.migrate().await?;

        info!(path = %config.path, "SQLite state store initialized");
        Ok(store)
    }

    /// Runs database migrations to create the schema.
    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS risk_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                date TEXT NOT NULL,
                morning_balance TEXT,
                current_balance TEXT,
                max_loss_amount TEXT,
                order_count INTEGER NOT NULL,
                trading_allowed INTEGER NOT NULL,
                blocked_reason TEXT NOT NULL,
                last_check TEXT,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads the stored record, distinguishing "absent" from "unreadable".
    async fn fetch_record(&self) -> Result<Option<RiskState>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT date, morning_balance, current_balance, max_loss_amount,
                order_count, trading_allowed, blocked_reason, last_check
            FROM risk_state WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(parse_state_row(&row)?)),
            None => Ok(None),
        }
    }

    /// The default record handed out when the stored one is unreadable.
    fn corrupt_fallback(&self) -> RiskState {
        let mut state = RiskState::new_for(today());
        if self.on_corrupt == CorruptStatePolicy::Block {
            state.block("persisted state unreadable");
        }
        state
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn load(&self) -> RiskState {
        match self.fetch_record().await {
            Ok(Some(state)) => state,
            Ok(None) => RiskState::new_for(today()),
            Err(e) => {
                warn!(error = %e, policy = ?self.on_corrupt, "stored risk state unreadable, reinitializing");
                self.corrupt_fallback()
            }
        }
    }

    async fn save(&self, state: &RiskState) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO risk_state (
                id, date, morning_balance, current_balance, max_loss_amount,
                order_count, trading_allowed, blocked_reason, last_check
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                date = excluded.date,
                morning_balance = excluded.morning_balance,
                current_balance = excluded.current_balance,
                max_loss_amount = excluded.max_loss_amount,
                order_count = excluded.order_count,
                trading_allowed = excluded.trading_allowed,
                blocked_reason = excluded.blocked_reason,
                last_check = excluded.last_check,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(state.date.format("%Y-%m-%d").to_string())
        .bind(state.morning_balance.map(|d| d.to_string()))
        .bind(state.current_balance.map(|d| d.to_string()))
        .bind(state.max_loss_amount.map(|d| d.to_string()))
        .bind(state.order_count as i64)
        .bind(state.trading_allowed as i64)
        .bind(&state.blocked_reason)
        .bind(state.last_check.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parses a risk state from a database row.
fn parse_state_row(row: &sqlx::sqlite::SqliteRow) -> Result<RiskState, StorageError> {
    let date_str: String = row.try_get("date")?;
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|e| StorageError::InvalidData(format!("Invalid date: {}", e)))?;

    let morning_balance = parse_optional_decimal(row, "morning_balance")?;
    let current_balance = parse_optional_decimal(row, "current_balance")?;
    let max_loss_amount = parse_optional_decimal(row, "max_loss_amount")?;

    let order_count: i64 = row.try_get("order_count")?;
    let order_count = u32::try_from(order_count)
        .map_err(|_| StorageError::InvalidData(format!("Invalid order_count: {}", order_count)))?;

    let trading_allowed: i64 = row.try_get("trading_allowed")?;

    let last_check_str: Option<String> = row.try_get("last_check")?;
    let last_check = match last_check_str {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map_err(|e| StorageError::InvalidData(format!("Invalid last_check: {}", e)))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(RiskState {
        date,
        morning_balance,
        current_balance,
        max_loss_amount,
        order_count,
        trading_allowed: trading_allowed != 0,
        blocked_reason: row.try_get("blocked_reason")?,
        last_check,
    })
}

fn parse_optional_decimal(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Option<Decimal>, StorageError> {
    let value: Option<String> = row.try_get(column)?;
    match value {
        Some(s) => Decimal::from_str(&s)
            .map(Some)
            .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e))),
        None => Ok(None),
    }
}
