//! Cost parameter sources.
//!
//! The costing engine takes a [`CostParameters`](quoteforge_costing::CostParameters)
//! snapshot; these sources supply the raw key/value table it is built from.

use std::collections::HashMap;
use std::sync::RwLock;

use sqlx::{PgPool, Row};
use tracing::instrument;

use quoteforge_core::Decimal;

use crate::store::StoreError;

/// Read access to the current cost parameter table.
#[async_trait::async_trait]
pub trait CostParameterSource: Send + Sync {
    async fn lookup(&self) -> Result<HashMap<String, Decimal>, StoreError>;
}

/// In-memory parameter table (dev/test).
#[derive(Debug, Default)]
pub struct InMemoryParameterSource {
    values: RwLock<HashMap<String, Decimal>>,
}

impl InMemoryParameterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: Decimal) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value);
        }
    }
}

#[async_trait::async_trait]
impl CostParameterSource for InMemoryParameterSource {
    async fn lookup(&self) -> Result<HashMap<String, Decimal>, StoreError> {
        self.values
            .read()
            .map(|v| v.clone())
            .map_err(|_| StoreError::Backend("parameter table lock poisoned".to_string()))
    }
}

/// Reads the `cost_parameters` table.
#[derive(Debug, Clone)]
pub struct PostgresParameterSource {
    pool: PgPool,
}

impl PostgresParameterSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CostParameterSource for PostgresParameterSource {
    #[instrument(skip(self), err)]
    async fn lookup(&self) -> Result<HashMap<String, Decimal>, StoreError> {
        let rows = sqlx::query("SELECT key, value FROM cost_parameters")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to load cost parameters: {e}")))?;

        rows.iter()
            .map(|row| {
                let key: String = row
                    .try_get("key")
                    .map_err(|e| StoreError::Corrupt(format!("cost parameter key: {e}")))?;
                let value: Decimal = row
                    .try_get("value")
                    .map_err(|e| StoreError::Corrupt(format!("cost parameter '{key}': {e}")))?;
                Ok((key, value))
            })
            .collect()
    }
}
