use super::{db_error, fetch_or_empty, list_limit, status_filter};
use crate::reporting::{EmailStats, email_stats};
use crate::schema::{Email, EmailStatus, decode_rows, email};
use crate::services::{AppServices, Filter, Select};
use forge::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListEmailsInput {
    pub status: Option<String>,
    pub search: Option<String>,
    pub limit: Option<u64>,
}

pub async fn load_emails(services: &AppServices, input: ListEmailsInput) -> Result<Vec<Email>> {
    let mut query = Select::all()
        .order_desc("created_at")
        .limit(list_limit(input.limit));
    if let Some(status) = status_filter::<EmailStatus>(input.status)? {
        query = query.filter(Filter::eq("status", status.as_sql_str()));
    }
    if let Some(search) = input.search.filter(|s| !s.trim().is_empty()) {
        query = query.filter(Filter::any_ilike(&["subject", "body", "lead_id"], search.trim()));
    }
    Ok(fetch_or_empty(services.store.as_ref(), email::TABLE, query).await)
}

#[forge::query(public)]
pub async fn list_emails(ctx: &QueryContext, input: ListEmailsInput) -> Result<Vec<Email>> {
    let services = crate::services::for_pool(ctx.db())?;
    load_emails(&services, input).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetEmailStatsInput {}

#[forge::query(public)]
pub async fn get_email_stats(ctx: &QueryContext, _input: GetEmailStatsInput) -> Result<EmailStats> {
    let services = crate::services::for_pool(ctx.db())?;
    let emails: Vec<Email> =
        fetch_or_empty(services.store.as_ref(), email::TABLE, Select::all()).await;
    Ok(email_stats(&emails))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetryEmailInput {
    pub email_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RetryEmailOutput {
    pub retried: bool,
    pub email: Option<Email>,
}

/// Puts a failed email back in the queue. Emails in any other state are
/// left untouched and reported as not retried.
pub async fn retry(services: &AppServices, input: RetryEmailInput) -> Result<RetryEmailOutput> {
    let updated = services
        .store
        .update(
            email::TABLE,
            serde_json::json!({ "status": EmailStatus::Pending.as_sql_str() }),
            &[
                Filter::eq("id", input.email_id),
                Filter::eq("status", EmailStatus::Failed.as_sql_str()),
            ],
        )
        .await
        .map_err(db_error)?;

    let email = decode_rows::<Email>(email::TABLE, updated).into_iter().next();
    if email.is_some() {
        tracing::info!(email_id = %input.email_id, "email queued for retry");
    }
    Ok(RetryEmailOutput {
        retried: email.is_some(),
        email,
    })
}

#[forge::mutation(public)]
pub async fn retry_email(
    ctx: &MutationContext,
    input: RetryEmailInput,
) -> Result<RetryEmailOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    retry(&services, input).await
}
