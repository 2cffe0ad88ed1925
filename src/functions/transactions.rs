use super::{TimeRange, fetch_or_empty};
use crate::reporting::{TransactionStats, transaction_stats};
use crate::schema::lenient::parse_timestamp;
use crate::schema::{Transaction, transaction};
use crate::services::{AppServices, Filter, Select};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use forge::prelude::*;
use serde::{Deserialize, Serialize};

pub const CSV_HEADERS: [&str; 6] = [
    "ID",
    "Invoice ID",
    "Amount",
    "Currency",
    "Payment Method",
    "Date",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilterInput {
    pub range: Option<TimeRange>,
    /// Inclusive lower bound, RFC 3339 or `YYYY-MM-DD`.
    pub from: Option<String>,
    /// Inclusive upper bound; a bare date covers that whole day.
    pub to: Option<String>,
    pub payment_method: Option<String>,
    /// Matches id, invoice id, payment method or currency. Only applied to
    /// the list; stats and exports cover the whole window.
    pub search: Option<String>,
}

fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if end_of_day && let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc() + chrono::Duration::days(1)
            - chrono::Duration::nanoseconds(1));
    }
    parse_timestamp(raw).ok_or_else(|| ForgeError::Validation(format!("invalid date: {raw}")))
}

impl TransactionFilterInput {
    fn window(&self, now: DateTime<Utc>) -> Result<Vec<Filter>> {
        let mut filters = Vec::new();
        if let Some(since) = self.range.unwrap_or_default().since(now) {
            filters.push(Filter::gte("transaction_date", since));
        }
        if let Some(from) = self.from.as_deref().filter(|f| !f.trim().is_empty()) {
            filters.push(Filter::gte("transaction_date", parse_bound(from, false)?));
        }
        if let Some(to) = self.to.as_deref().filter(|t| !t.trim().is_empty()) {
            filters.push(Filter::lte("transaction_date", parse_bound(to, true)?));
        }
        if let Some(method) = self.payment_method.as_deref().filter(|m| !m.trim().is_empty()) {
            filters.push(Filter::eq("payment_method", method.trim()));
        }
        Ok(filters)
    }

    fn query(&self, now: DateTime<Utc>, with_search: bool) -> Result<Select> {
        let mut query = Select::all()
            .filters(self.window(now)?)
            .order_desc("transaction_date");
        if with_search && let Some(search) = self.search.as_deref().filter(|s| !s.trim().is_empty())
        {
            query = query.filter(Filter::any_ilike(
                &["id", "invoice_id", "payment_method", "currency"],
                search.trim(),
            ));
        }
        Ok(query)
    }
}

pub async fn load_transactions(
    services: &AppServices,
    input: &TransactionFilterInput,
    now: DateTime<Utc>,
    with_search: bool,
) -> Result<Vec<Transaction>> {
    let query = input.query(now, with_search)?;
    Ok(fetch_or_empty(services.store.as_ref(), transaction::TABLE, query).await)
}

#[forge::query(public)]
pub async fn list_transactions(
    ctx: &QueryContext,
    input: TransactionFilterInput,
) -> Result<Vec<Transaction>> {
    let services = crate::services::for_pool(ctx.db())?;
    load_transactions(&services, &input, Utc::now(), true).await
}

#[forge::query(public)]
pub async fn get_transaction_stats(
    ctx: &QueryContext,
    input: TransactionFilterInput,
) -> Result<TransactionStats> {
    let services = crate::services::for_pool(ctx.db())?;
    let transactions = load_transactions(&services, &input, Utc::now(), false).await?;
    Ok(transaction_stats(&transactions))
}

/// Every field quoted, one record per line, no payment method shown as `N/A`.
pub fn transactions_csv(transactions: &[Transaction]) -> anyhow::Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(CSV_HEADERS)?;
    for t in transactions {
        writer.write_record([
            t.id.to_string(),
            t.invoice_id.map(|id| id.to_string()).unwrap_or_default(),
            t.amount.to_string(),
            t.currency.clone(),
            t.payment_method.clone().unwrap_or_else(|| "N/A".into()),
            t.transaction_date.format("%Y-%m-%d %H:%M:%S").to_string(),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

#[derive(Debug, Serialize)]
pub struct TransactionExport {
    pub filename: String,
    pub rows: u64,
    pub content: String,
}

pub async fn export(
    services: &AppServices,
    input: &TransactionFilterInput,
    now: DateTime<Utc>,
) -> Result<TransactionExport> {
    let transactions = load_transactions(services, input, now, false).await?;
    let content =
        transactions_csv(&transactions).map_err(|e| ForgeError::Internal(e.to_string()))?;
    Ok(TransactionExport {
        filename: format!("transactions-{}.csv", now.format("%Y-%m-%d")),
        rows: transactions.len() as u64,
        content,
    })
}

#[forge::query(public)]
pub async fn export_transactions_csv(
    ctx: &QueryContext,
    input: TransactionFilterInput,
) -> Result<TransactionExport> {
    let services = crate::services::for_pool(ctx.db())?;
    export(&services, &input, Utc::now()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::harness;
    use rust_decimal::Decimal;
    use serde_json::json;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        parse_timestamp("2024-06-30T12:00:00Z").unwrap()
    }

    fn seed(h: &crate::services::testing::Harness) {
        h.store.seed(
            transaction::TABLE,
            vec![
                json!({
                    "id": Uuid::new_v4(),
                    "invoice_id": Uuid::new_v4(),
                    "amount": "100.00",
                    "currency": "USD",
                    "payment_method": "credit_card",
                    "transaction_date": "2024-06-28T09:15:00Z"
                }),
                json!({
                    "id": Uuid::new_v4(),
                    "invoice_id": Uuid::new_v4(),
                    "amount": 50,
                    "currency": "EUR",
                    "payment_method": "paypal",
                    "transaction_date": "2024-06-10T10:00:00Z"
                }),
                json!({
                    "id": Uuid::new_v4(),
                    "invoice_id": null,
                    "amount": 25.5,
                    "currency": "USD",
                    "payment_method": null,
                    "transaction_date": "2024-01-05T08:00:00Z"
                }),
            ],
        );
    }

    #[tokio::test]
    async fn range_and_method_filter() {
        let h = harness();
        seed(&h);

        let week = TransactionFilterInput {
            range: Some(TimeRange::Week),
            ..Default::default()
        };
        assert_eq!(load_transactions(&h.services, &week, now(), true).await.unwrap().len(), 1);

        let paypal = TransactionFilterInput {
            payment_method: Some("paypal".into()),
            ..Default::default()
        };
        let found = load_transactions(&h.services, &paypal, now(), true).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].currency, "EUR");
    }

    #[tokio::test]
    async fn custom_bounds_include_the_whole_end_day() {
        let h = harness();
        seed(&h);
        let custom = TransactionFilterInput {
            from: Some("2024-06-10".into()),
            to: Some("2024-06-28".into()),
            ..Default::default()
        };
        let found = load_transactions(&h.services, &custom, now(), true).await.unwrap();
        assert_eq!(found.len(), 2);

        let bad = TransactionFilterInput {
            from: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(
            load_transactions(&h.services, &bad, now(), true).await,
            Err(ForgeError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn search_narrows_list_but_not_stats() {
        let h = harness();
        seed(&h);
        let input = TransactionFilterInput {
            search: Some("eur".into()),
            ..Default::default()
        };
        assert_eq!(load_transactions(&h.services, &input, now(), true).await.unwrap().len(), 1);

        let all = load_transactions(&h.services, &input, now(), false).await.unwrap();
        let stats = transaction_stats(&all);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.total_amount, Decimal::new(1755, 1));
        assert_eq!(stats.average_amount, Decimal::new(5850, 2));
    }

    #[tokio::test]
    async fn export_quotes_every_field() {
        let h = harness();
        seed(&h);
        let export = export(&h.services, &TransactionFilterInput::default(), now()).await.unwrap();
        assert_eq!(export.filename, "transactions-2024-06-30.csv");
        assert_eq!(export.rows, 3);

        let lines: Vec<&str> = export.content.lines().collect();
        assert_eq!(
            lines[0],
            "\"ID\",\"Invoice ID\",\"Amount\",\"Currency\",\"Payment Method\",\"Date\""
        );
        assert!(lines[1].ends_with("\"100.00\",\"USD\",\"credit_card\",\"2024-06-28 09:15:00\""));
        assert!(lines[3].contains("\"\",\"25.5\",\"USD\",\"N/A\",\"2024-01-05 08:00:00\""));
    }
}
