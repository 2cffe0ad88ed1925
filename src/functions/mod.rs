pub mod clinic;
pub mod dashboard;
pub mod emails;
pub mod invoices;
pub mod leads;
pub mod transactions;

pub use clinic::*;
pub use dashboard::*;
pub use emails::*;
pub use invoices::*;
pub use leads::*;
pub use transactions::*;

use crate::schema::decode_rows;
use crate::services::{RowStore, Select};
use chrono::{DateTime, Duration, Utc};
use forge::prelude::ForgeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_LIST_LIMIT: u64 = 50;
pub(crate) const MAX_LIST_LIMIT: u64 = 200;

/// Reads a whole screen's worth of rows. A failed read is logged and shows
/// up as an empty collection rather than failing the screen.
pub(crate) async fn fetch_or_empty<T: DeserializeOwned>(
    store: &dyn RowStore,
    table: &str,
    query: Select,
) -> Vec<T> {
    match store.select(table, &query).await {
        Ok(rows) => decode_rows(table, rows),
        Err(e) => {
            tracing::warn!(table, error = %e, "read failed, showing empty");
            Vec::new()
        }
    }
}

pub(crate) fn db_error(e: anyhow::Error) -> ForgeError {
    ForgeError::Database(e.to_string())
}

/// Reads a status filter from a screen. Blank and `all` mean no filter.
pub(crate) fn status_filter<S: DeserializeOwned>(
    raw: Option<String>,
) -> Result<Option<S>, ForgeError> {
    let Some(raw) = raw.map(|r| r.trim().to_string()) else {
        return Ok(None);
    };
    if raw.is_empty() || raw.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    serde_json::from_value(serde_json::Value::String(raw.clone()))
        .map(Some)
        .map_err(|_| ForgeError::Validation(format!("unknown status: {raw}")))
}

pub(crate) fn list_limit(limit: Option<u64>) -> u64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// Look-back window selected on the billing screens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
    #[serde(rename = "1y")]
    Year,
    #[default]
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let days = match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
            Self::Year => 365,
            Self::All => return None,
        };
        Some(now - Duration::days(days))
    }
}

/// 1-based page window used by the clinic lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub const DEFAULT_LIMIT: u64 = 10;

    pub fn new(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, MAX_LIST_LIMIT),
        }
    }

    pub fn offset(self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}
