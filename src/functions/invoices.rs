use super::{db_error, fetch_or_empty, list_limit, status_filter};
use crate::reporting::{InvoiceStats, InvoiceView, invoice_stats, with_leads};
use crate::schema::lenient::parse_timestamp;
use crate::schema::{Invoice, InvoiceStatus, Lead, decode_rows, invoice, lead};
use crate::services::{AppServices, Filter, Select};
use chrono::{DateTime, Utc};
use forge::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListInvoicesInput {
    pub status: Option<String>,
    /// Matches the invoice id or the lead id.
    pub search: Option<String>,
    pub limit: Option<u64>,
}

pub async fn load_invoices(
    services: &AppServices,
    input: ListInvoicesInput,
) -> Result<Vec<InvoiceView>> {
    let mut query = Select::all()
        .order_desc("issued_at")
        .limit(list_limit(input.limit));
    if let Some(status) = status_filter::<InvoiceStatus>(input.status)? {
        query = query.filter(Filter::eq("status", status.as_sql_str()));
    }
    if let Some(search) = input.search.filter(|s| !s.trim().is_empty()) {
        query = query.filter(Filter::any_ilike(&["id", "lead_id"], search.trim()));
    }

    let store = services.store.as_ref();
    let (invoices, leads) = tokio::join!(
        fetch_or_empty::<Invoice>(store, invoice::TABLE, query),
        fetch_or_empty::<Lead>(store, lead::TABLE, Select::all().order_asc("name")),
    );
    Ok(with_leads(&invoices, &leads))
}

#[forge::query(public)]
pub async fn list_invoices(
    ctx: &QueryContext,
    input: ListInvoicesInput,
) -> Result<Vec<InvoiceView>> {
    let services = crate::services::for_pool(ctx.db())?;
    load_invoices(&services, input).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetInvoiceStatsInput {}

#[forge::query(public)]
pub async fn get_invoice_stats(
    ctx: &QueryContext,
    _input: GetInvoiceStatsInput,
) -> Result<InvoiceStats> {
    let services = crate::services::for_pool(ctx.db())?;
    let invoices: Vec<Invoice> =
        fetch_or_empty(services.store.as_ref(), invoice::TABLE, Select::all()).await;
    Ok(invoice_stats(&invoices))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvoiceIdInput {
    pub invoice_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MarkInvoicePaidOutput {
    pub updated: bool,
    pub invoice: Option<Invoice>,
}

pub async fn mark_paid(
    services: &AppServices,
    input: InvoiceIdInput,
    now: DateTime<Utc>,
) -> Result<MarkInvoicePaidOutput> {
    let updated = services
        .store
        .update(
            invoice::TABLE,
            serde_json::json!({ "status": InvoiceStatus::Paid.as_sql_str(), "paid_at": now }),
            &[Filter::eq("id", input.invoice_id)],
        )
        .await
        .map_err(db_error)?;

    let invoice = decode_rows::<Invoice>(invoice::TABLE, updated).into_iter().next();
    if invoice.is_some() {
        tracing::info!(invoice_id = %input.invoice_id, "invoice marked paid");
    }
    Ok(MarkInvoicePaidOutput {
        updated: invoice.is_some(),
        invoice,
    })
}

#[forge::mutation(public)]
pub async fn mark_invoice_paid(
    ctx: &MutationContext,
    input: InvoiceIdInput,
) -> Result<MarkInvoicePaidOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    mark_paid(&services, input, Utc::now()).await
}

#[derive(Debug, Serialize)]
pub struct DeleteInvoiceOutput {
    pub deleted: bool,
}

pub async fn remove_invoice(
    services: &AppServices,
    input: InvoiceIdInput,
) -> Result<DeleteInvoiceOutput> {
    let deleted = services
        .store
        .delete(invoice::TABLE, &[Filter::eq("id", input.invoice_id)])
        .await
        .map_err(db_error)?;
    if deleted > 0 {
        tracing::info!(invoice_id = %input.invoice_id, "invoice deleted");
    }
    Ok(DeleteInvoiceOutput {
        deleted: deleted > 0,
    })
}

#[forge::mutation(public)]
pub async fn delete_invoice(
    ctx: &MutationContext,
    input: InvoiceIdInput,
) -> Result<DeleteInvoiceOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    remove_invoice(&services, input).await
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreateInvoiceInput {
    pub lead_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub due_date: Option<String>,
    pub issued_at: Option<String>,
    pub status: Option<InvoiceStatus>,
}

/// Body posted to the create-invoice hook, which owns the actual insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRequest {
    pub lead_id: Uuid,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub due_date: String,
    pub issued_at: String,
    pub status: InvoiceStatus,
}

impl CreateInvoiceInput {
    pub fn validate(self, now: DateTime<Utc>) -> Result<InvoiceRequest> {
        let currency = self.currency.map(|c| c.trim().to_uppercase());
        let due_date = self.due_date.map(|d| d.trim().to_string());
        let (Some(lead_id), Some(amount), Some(currency), Some(due_date)) =
            (self.lead_id, self.amount, currency, due_date)
        else {
            return Err(ForgeError::Validation("Missing required fields".into()));
        };
        if currency.is_empty() || due_date.is_empty() {
            return Err(ForgeError::Validation("Missing required fields".into()));
        }
        if amount <= Decimal::ZERO {
            return Err(ForgeError::Validation("amount must be greater than zero".into()));
        }
        if parse_timestamp(&due_date).is_none() {
            return Err(ForgeError::Validation(format!("invalid due_date: {due_date}")));
        }

        let issued_at = match self.issued_at.map(|i| i.trim().to_string()) {
            Some(issued) if !issued.is_empty() => {
                if parse_timestamp(&issued).is_none() {
                    return Err(ForgeError::Validation(format!("invalid issued_at: {issued}")));
                }
                issued
            }
            _ => now.to_rfc3339(),
        };

        Ok(InvoiceRequest {
            lead_id,
            amount,
            currency,
            due_date,
            issued_at,
            status: self.status.unwrap_or(InvoiceStatus::Pending),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CreateInvoiceOutput {
    /// Whatever the hook answered with, usually the stored invoice.
    pub invoice: serde_json::Value,
}

pub async fn submit_invoice(
    services: &AppServices,
    input: CreateInvoiceInput,
    now: DateTime<Utc>,
) -> Result<CreateInvoiceOutput> {
    let request = input.validate(now)?;
    let Some(url) = services.settings.create_invoice_webhook.as_deref() else {
        return Err(ForgeError::Internal(
            "create-invoice webhook not configured".into(),
        ));
    };

    let payload =
        serde_json::to_value(&request).map_err(|e| ForgeError::Internal(e.to_string()))?;
    let invoice = services.notifier.post(url, &payload).await.map_err(|e| {
        tracing::error!(lead_id = %request.lead_id, error = %e, "create-invoice webhook failed");
        ForgeError::Internal(format!("create-invoice webhook failed: {e}"))
    })?;

    tracing::info!(lead_id = %request.lead_id, amount = %request.amount, "invoice submitted");
    Ok(CreateInvoiceOutput { invoice })
}

#[forge::mutation(public)]
pub async fn create_invoice(
    ctx: &MutationContext,
    input: CreateInvoiceInput,
) -> Result<CreateInvoiceOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    submit_invoice(&services, input, Utc::now()).await
}
