pub mod appointment;
pub mod email;
pub mod invoice;
pub mod lead;
pub mod lenient;
pub mod patient;
pub mod transaction;

pub use appointment::*;
pub use email::*;
pub use invoice::*;
pub use lead::*;
pub use patient::*;
pub use transaction::*;

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

/// Rows that carry a money amount.
pub trait Monetary {
    fn amount(&self) -> Decimal;
}

/// Decodes raw store rows into `T`, dropping the ones that do not fit.
///
/// Optional fields are normalised by the `lenient` decoders; a row is only
/// rejected when an identifier, timestamp or status cannot be read at all.
pub fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<serde_json::Value>) -> Vec<T> {
    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value(row) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(table, error = %e, "skipping malformed row");
                None
            }
        })
        .collect();

    if decoded.len() < total {
        tracing::debug!(table, total, kept = decoded.len(), "decoded rows");
    }
    decoded
}
