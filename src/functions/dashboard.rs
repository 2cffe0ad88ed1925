use super::{TimeRange, fetch_or_empty};
use crate::reporting::{BillingDashboard, DashboardOptions, billing_dashboard};
use crate::schema::{Email, Invoice, Lead, email, invoice, lead};
use crate::services::{AppServices, Filter, Select};
use chrono::{DateTime, Utc};
use forge::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BillingDashboardInput {
    pub range: Option<TimeRange>,
    /// Zero-fill days without sent emails before the moving average.
    pub fill_gaps: Option<bool>,
}

pub async fn load_billing_dashboard(
    services: &AppServices,
    input: BillingDashboardInput,
    now: DateTime<Utc>,
) -> BillingDashboard {
    let since = input.range.unwrap_or_default().since(now);
    let window = |column: &str| Select::all().filters(since.map(|s| Filter::gte(column, s)));
    let store = services.store.as_ref();

    let (leads, emails, invoices) = tokio::join!(
        fetch_or_empty::<Lead>(store, lead::TABLE, window("created_at")),
        fetch_or_empty::<Email>(store, email::TABLE, window("created_at")),
        fetch_or_empty::<Invoice>(store, invoice::TABLE, window("issued_at")),
    );

    tracing::debug!(
        leads = leads.len(),
        emails = emails.len(),
        invoices = invoices.len(),
        "billing dashboard loaded"
    );

    billing_dashboard(
        &leads,
        &emails,
        &invoices,
        DashboardOptions {
            fill_gaps: input.fill_gaps.unwrap_or(false),
        },
    )
}

#[forge::query(public)]
pub async fn get_billing_dashboard(
    ctx: &QueryContext,
    input: BillingDashboardInput,
) -> Result<BillingDashboard> {
    let services = crate::services::for_pool(ctx.db())?;
    Ok(load_billing_dashboard(&services, input, Utc::now()).await)
}
