use super::{Monetary, lenient};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TABLE: &str = "transactions";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(default)]
    pub invoice_id: Option<Uuid>,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub currency: String,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub transaction_date: DateTime<Utc>,
}

impl Monetary for Transaction {
    fn amount(&self) -> Decimal {
        self.amount
    }
}
