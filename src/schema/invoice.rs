use super::{Monetary, lenient};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TABLE: &str = "invoices";

#[forge::forge_enum]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Paid, Self::Overdue];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    #[serde(default, deserialize_with = "lenient::amount")]
    pub amount: Decimal,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub currency: String,
    pub status: InvoiceStatus,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub issued_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl Monetary for Invoice {
    fn amount(&self) -> Decimal {
        self.amount
    }
}
