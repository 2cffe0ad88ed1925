use super::lenient;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TABLE: &str = "emails";

#[forge::forge_enum]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

impl EmailStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Sent, Self::Failed];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: Uuid,
    #[serde(default)]
    pub lead_id: Option<Uuid>,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub subject: String,
    #[serde(default, deserialize_with = "lenient::null_default")]
    pub body: String,
    pub status: EmailStatus,
    #[serde(default, deserialize_with = "lenient::opt_timestamp")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient::timestamp")]
    pub created_at: DateTime<Utc>,
}
