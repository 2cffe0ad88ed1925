use super::{db_error, fetch_or_empty, list_limit};
use crate::reporting::{LeadStats, lead_stats};
use crate::schema::{Lead, NewLead, decode_rows, lead};
use crate::services::{AppServices, Filter, Select};
use chrono::Utc;
use forge::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

pub const BULK_SOURCE: &str = "bulk";
pub const CSV_SOURCE: &str = "CSV";
pub const MANUAL_SOURCE: &str = "manual";
pub const CONTACTED_SOURCE: &str = "contacted";

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fires the send-email hook for one lead. Returns whether the hook accepted
/// it. With no hook configured there is nothing to reject, so it counts as sent.
pub(crate) async fn notify_lead(services: &AppServices, lead: &Lead) -> bool {
    let Some(url) = services.settings.send_email_webhook.as_deref() else {
        tracing::debug!(lead_id = %lead.id, "send-email webhook not configured, skipping");
        return true;
    };

    let payload = serde_json::json!({
        "lead": {
            "id": lead.id,
            "name": lead.name,
            "email": lead.email,
            "company": lead.company,
        }
    });
    match services.notifier.post(url, &payload).await {
        Ok(_) => {
            tracing::info!(lead_id = %lead.id, "send-email webhook triggered");
            true
        }
        Err(e) => {
            tracing::warn!(lead_id = %lead.id, error = %e, "send-email webhook failed");
            false
        }
    }
}

async fn insert_leads(services: &AppServices, leads: Vec<Lead>) -> Result<Vec<Lead>> {
    let rows = leads
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| ForgeError::Internal(e.to_string()))?;
    let inserted = services
        .store
        .insert(lead::TABLE, rows)
        .await
        .map_err(db_error)?;
    Ok(decode_rows(lead::TABLE, inserted))
}

async fn notify_all(services: &AppServices, leads: &[Lead]) -> u64 {
    let mut notified = 0;
    for lead in leads {
        if notify_lead(services, lead).await {
            notified += 1;
        }
    }
    notified
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListLeadsInput {
    /// Matches name, email or company.
    pub search: Option<String>,
    pub company: Option<String>,
    pub source: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub async fn load_leads(services: &AppServices, input: ListLeadsInput) -> Vec<Lead> {
    let mut query = Select::all()
        .order_desc("created_at")
        .range(input.offset.unwrap_or(0), list_limit(input.limit));
    if let Some(search) = blank_to_none(input.search) {
        query = query.filter(Filter::any_ilike(&["name", "email", "company"], &search));
    }
    if let Some(company) = blank_to_none(input.company) {
        query = query.filter(Filter::ilike("company", &company));
    }
    if let Some(source) = blank_to_none(input.source) {
        query = query.filter(Filter::ilike("source", &source));
    }
    fetch_or_empty(services.store.as_ref(), lead::TABLE, query).await
}

#[forge::query(public)]
pub async fn list_leads(ctx: &QueryContext, input: ListLeadsInput) -> Result<Vec<Lead>> {
    let services = crate::services::for_pool(ctx.db())?;
    Ok(load_leads(&services, input).await)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetLeadStatsInput {}

#[forge::query(public)]
pub async fn get_lead_stats(ctx: &QueryContext, _input: GetLeadStatsInput) -> Result<LeadStats> {
    let services = crate::services::for_pool(ctx.db())?;
    let leads: Vec<Lead> =
        fetch_or_empty(services.store.as_ref(), lead::TABLE, Select::all()).await;
    Ok(lead_stats(&leads))
}

#[derive(Debug, Serialize)]
pub struct CreateLeadOutput {
    pub lead: Lead,
    pub notified: bool,
}

pub async fn add_lead(services: &AppServices, input: NewLead) -> Result<CreateLeadOutput> {
    let name = input.name.trim().to_string();
    let email = input.email.trim().to_string();
    if name.is_empty() {
        return Err(ForgeError::Validation("name is required".into()));
    }
    if !is_valid_email(&email) {
        return Err(ForgeError::Validation(format!("Invalid email: {email}")));
    }

    let new_lead = NewLead {
        name,
        email,
        company: blank_to_none(input.company),
        source: blank_to_none(input.source).or_else(|| Some(MANUAL_SOURCE.into())),
    };
    let lead = insert_leads(services, vec![new_lead.into_lead(Uuid::new_v4(), Utc::now())])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ForgeError::Database("insert returned no row".into()))?;

    let notified = notify_lead(services, &lead).await;
    Ok(CreateLeadOutput { lead, notified })
}

#[forge::mutation(public)]
pub async fn create_lead(ctx: &MutationContext, input: NewLead) -> Result<CreateLeadOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    add_lead(&services, input).await
}

#[derive(Debug, Default, Serialize)]
pub struct ImportLeadsOutput {
    pub inserted: u64,
    pub notified: u64,
    pub errors: Vec<String>,
}

/// Parses `name, email, company` lines. Lines without a name or email are
/// ignored; lines with a malformed email are reported.
pub fn parse_bulk_lines(text: &str) -> (Vec<NewLead>, Vec<String>) {
    let mut leads = Vec::new();
    let mut errors = Vec::new();

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.split(',').map(str::trim);
        let name = parts.next().unwrap_or_default();
        let email = parts.next().unwrap_or_default();
        let company = parts.next().unwrap_or_default();
        if name.is_empty() || email.is_empty() {
            continue;
        }
        if !is_valid_email(email) {
            errors.push(format!("Invalid email: {email}"));
            continue;
        }
        leads.push(NewLead {
            name: name.to_string(),
            email: email.to_string(),
            company: blank_to_none(Some(company.to_string())),
            source: Some(BULK_SOURCE.into()),
        });
    }
    (leads, errors)
}

async fn import(
    services: &AppServices,
    leads: Vec<NewLead>,
    errors: Vec<String>,
) -> Result<ImportLeadsOutput> {
    if leads.is_empty() {
        return Ok(ImportLeadsOutput {
            errors,
            ..Default::default()
        });
    }

    let now = Utc::now();
    let inserted = insert_leads(
        services,
        leads
            .into_iter()
            .map(|l| l.into_lead(Uuid::new_v4(), now))
            .collect(),
    )
    .await?;
    let notified = notify_all(services, &inserted).await;

    tracing::info!(
        inserted = inserted.len(),
        notified,
        rejected = errors.len(),
        "leads imported"
    );
    Ok(ImportLeadsOutput {
        inserted: inserted.len() as u64,
        notified,
        errors,
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BulkAddLeadsInput {
    pub text: String,
}

pub async fn bulk_add(
    services: &AppServices,
    input: BulkAddLeadsInput,
) -> Result<ImportLeadsOutput> {
    let (leads, errors) = parse_bulk_lines(&input.text);
    import(services, leads, errors).await
}

#[forge::mutation(public)]
pub async fn bulk_add_leads(
    ctx: &MutationContext,
    input: BulkAddLeadsInput,
) -> Result<ImportLeadsOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    bulk_add(&services, input).await
}

#[derive(Debug, Deserialize)]
struct CsvLead {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    source: Option<String>,
}

/// Reads a headed CSV (`name,email,company,source`, extra columns ignored).
/// Records without a name or email are skipped; unreadable records are
/// reported by line.
pub fn parse_csv_leads(csv_text: &str) -> (Vec<NewLead>, Vec<String>) {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let mut leads = Vec::new();
    let mut errors = Vec::new();
    for record in reader.deserialize::<CsvLead>() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                errors.push(format!("Unreadable row at line {line}"));
                continue;
            }
        };
        let (Some(name), Some(email)) = (blank_to_none(record.name), blank_to_none(record.email))
        else {
            continue;
        };
        leads.push(NewLead {
            name,
            email,
            company: blank_to_none(record.company),
            source: blank_to_none(record.source).or_else(|| Some(CSV_SOURCE.into())),
        });
    }
    (leads, errors)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportLeadsCsvInput {
    pub csv: String,
}

pub async fn csv_import(
    services: &AppServices,
    input: ImportLeadsCsvInput,
) -> Result<ImportLeadsOutput> {
    let (leads, errors) = parse_csv_leads(&input.csv);
    import(services, leads, errors).await
}

#[forge::mutation(public)]
pub async fn import_leads_csv(
    ctx: &MutationContext,
    input: ImportLeadsCsvInput,
) -> Result<ImportLeadsOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    csv_import(&services, input).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContactLeadInput {
    pub lead_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ContactLeadOutput {
    pub notified: bool,
    pub lead: Option<Lead>,
}

/// Re-sends the outreach email and tags the lead as contacted once the hook
/// accepted it.
pub async fn contact(services: &AppServices, input: ContactLeadInput) -> Result<ContactLeadOutput> {
    let by_id = [Filter::eq("id", input.lead_id)];
    let rows = services
        .store
        .select(lead::TABLE, &Select::all().filters(by_id.clone()).limit(1))
        .await
        .map_err(db_error)?;
    let Some(lead) = decode_rows::<Lead>(lead::TABLE, rows).into_iter().next() else {
        return Ok(ContactLeadOutput {
            notified: false,
            lead: None,
        });
    };

    if !notify_lead(services, &lead).await {
        return Ok(ContactLeadOutput {
            notified: false,
            lead: Some(lead),
        });
    }

    let updated = services
        .store
        .update(
            lead::TABLE,
            serde_json::json!({ "source": CONTACTED_SOURCE }),
            &by_id,
        )
        .await
        .map_err(db_error)?;
    Ok(ContactLeadOutput {
        notified: true,
        lead: decode_rows(lead::TABLE, updated).into_iter().next(),
    })
}

#[forge::mutation(public)]
pub async fn contact_lead(
    ctx: &MutationContext,
    input: ContactLeadInput,
) -> Result<ContactLeadOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    contact(&services, input).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Settings;
    use crate::services::testing::{SEND_EMAIL_URL, harness, harness_with};

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("ada@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.io"));
        assert!(!is_valid_email("ada@example"));
        assert!(!is_valid_email("ada example@x.io"));
        assert!(!is_valid_email("a@b@c.io"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn bulk_lines_report_bad_emails_and_skip_incomplete() {
        let text = "Ada, ada@x.io, Acme\n\nBo, not-an-email\nNameOnly\nCy,cy@y.org";
        let (leads, errors) = parse_bulk_lines(text);
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].company.as_deref(), Some("Acme"));
        assert_eq!(leads[1].company, None);
        assert!(leads.iter().all(|l| l.source.as_deref() == Some("bulk")));
        assert_eq!(errors, vec!["Invalid email: not-an-email".to_string()]);
    }

    #[test]
    fn csv_defaults_source_and_skips_missing_fields() {
        let csv = "name,email,company,source\n\
                   Ada,ada@x.io,Acme,web\n\
                   Bo,bo@x.io,,\n\
                   ,nobody@x.io,Ghost,\n\
                   Cy,,Nowhere,\n";
        let (leads, errors) = parse_csv_leads(csv);
        assert!(errors.is_empty());
        assert_eq!(leads.len(), 2);
        assert_eq!(leads[0].source.as_deref(), Some("web"));
        assert_eq!(leads[1].source.as_deref(), Some("CSV"));
        assert_eq!(leads[1].company, None);
    }

    #[test]
    fn csv_without_name_column_imports_nothing() {
        let (leads, _) = parse_csv_leads("email\nada@x.io\n");
        assert!(leads.is_empty());
    }

    #[tokio::test]
    async fn create_lead_inserts_then_notifies() {
        let h = harness();
        let out = add_lead(
            &h.services,
            NewLead {
                name: " Ada ".into(),
                email: "ada@x.io".into(),
                company: Some("".into()),
                source: None,
            },
        )
        .await
        .unwrap();

        assert!(out.notified);
        assert_eq!(out.lead.name, "Ada");
        assert_eq!(out.lead.source.as_deref(), Some("manual"));
        assert_eq!(h.store.rows(lead::TABLE).len(), 1);

        let calls = h.notifier.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, SEND_EMAIL_URL);
        assert_eq!(calls[0].1["lead"]["email"], "ada@x.io");
    }

    #[tokio::test]
    async fn create_lead_rejects_bad_email_without_writing() {
        let h = harness();
        let err = add_lead(
            &h.services,
            NewLead {
                name: "Ada".into(),
                email: "ada@".into(),
                company: None,
                source: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ForgeError::Validation(_)));
        assert!(h.store.rows(lead::TABLE).is_empty());
    }

    #[tokio::test]
    async fn webhook_failure_keeps_the_lead() {
        let h = harness();
        h.notifier.fail_for("ada@x.io");
        let out = add_lead(
            &h.services,
            NewLead {
                name: "Ada".into(),
                email: "ada@x.io".into(),
                company: None,
                source: None,
            },
        )
        .await
        .unwrap();
        assert!(!out.notified);
        assert_eq!(h.store.rows(lead::TABLE).len(), 1);
    }

    #[tokio::test]
    async fn bulk_notifications_are_independent() {
        let h = harness();
        h.notifier.fail_for("bo@x.io");
        let out = bulk_add(
            &h.services,
            BulkAddLeadsInput {
                text: "Ada,ada@x.io\nBo,bo@x.io\nCy,cy@x\n".into(),
            },
        )
        .await
        .unwrap();

        assert_eq!(out.inserted, 2);
        assert_eq!(out.notified, 1);
        assert_eq!(out.errors, vec!["Invalid email: cy@x".to_string()]);
        assert_eq!(h.notifier.calls().len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_webhook_counts_as_sent() {
        let h = harness_with(Settings::default());
        let out = csv_import(
            &h.services,
            ImportLeadsCsvInput {
                csv: "name,email\nAda,ada@x.io\n".into(),
            },
        )
        .await
        .unwrap();
        assert_eq!(out.inserted, 1);
        assert_eq!(out.notified, 1);
        assert!(h.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn contact_without_webhook_still_tags_lead() {
        let h = harness_with(Settings::default());
        let created = add_lead(
            &h.services,
            NewLead {
                name: "Ada".into(),
                email: "ada@x.io".into(),
                company: None,
                source: None,
            },
        )
        .await
        .unwrap();

        let out = contact(
            &h.services,
            ContactLeadInput {
                lead_id: created.lead.id,
            },
        )
        .await
        .unwrap();
        assert!(out.notified);
        assert_eq!(out.lead.unwrap().source.as_deref(), Some("contacted"));
        assert!(h.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn list_filters_by_search_and_source() {
        let h = harness();
        bulk_add(
            &h.services,
            BulkAddLeadsInput {
                text: "Ada,ada@x.io,Acme\nBo,bo@y.io,Initech".into(),
            },
        )
        .await
        .unwrap();
        add_lead(
            &h.services,
            NewLead {
                name: "Cy".into(),
                email: "cy@acme.io".into(),
                company: None,
                source: None,
            },
        )
        .await
        .unwrap();

        let found = load_leads(
            &h.services,
            ListLeadsInput {
                search: Some("ACME".into()),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(found.len(), 2);

        let manual = load_leads(
            &h.services,
            ListLeadsInput {
                source: Some("manual".into()),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(manual.len(), 1);
        assert_eq!(manual[0].name, "Cy");

        let bulk = load_leads(
            &h.services,
            ListLeadsInput {
                source: Some("ULK".into()),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(bulk.len(), 2);
    }

    #[tokio::test]
    async fn contact_tags_lead_once_notified() {
        let h = harness();
        let created = add_lead(
            &h.services,
            NewLead {
                name: "Ada".into(),
                email: "ada@x.io".into(),
                company: None,
                source: None,
            },
        )
        .await
        .unwrap();

        let out = contact(
            &h.services,
            ContactLeadInput {
                lead_id: created.lead.id,
            },
        )
        .await
        .unwrap();
        assert!(out.notified);
        assert_eq!(out.lead.unwrap().source.as_deref(), Some("contacted"));

        let missing = contact(
            &h.services,
            ContactLeadInput {
                lead_id: Uuid::new_v4(),
            },
        )
        .await
        .unwrap();
        assert!(missing.lead.is_none());
    }
}
