//! View-models for the client engagement and billing screens.

use super::aggregate::{
    CumulativePoint, DailyPoint, MonthBucket, Tally, average_amount, count_by_status,
    count_where, cumulative_series, fill_daily_gaps, group_by_day, group_by_key, group_by_month,
    join_weak, moving_average, rate, sum_amount_where,
};
use crate::schema::{Email, EmailStatus, Invoice, InvoiceStatus, Lead, Transaction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

pub const UNKNOWN_SOURCE: &str = "Unknown";
pub const EMAIL_TREND_WINDOW: usize = 7;

#[derive(Debug, Clone, Copy, Default)]
pub struct DashboardOptions {
    /// Insert zero days into the email series before averaging.
    pub fill_gaps: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingKpis {
    pub total_leads: u64,
    pub emails_sent: u64,
    pub revenue: Decimal,
    pub pending_invoices: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyEmails {
    pub day: NaiveDate,
    pub sent: u64,
    pub ma7: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingDashboard {
    pub kpis: BillingKpis,
    pub monthly_invoice_status: Vec<MonthBucket<InvoiceStatus>>,
    pub cumulative_revenue: Vec<CumulativePoint<Decimal>>,
    pub daily_emails: Vec<DailyEmails>,
    pub invoice_status: Tally<InvoiceStatus>,
    pub leads_by_source: Tally<String>,
}

pub fn billing_dashboard(
    leads: &[Lead],
    emails: &[Email],
    invoices: &[Invoice],
    options: DashboardOptions,
) -> BillingDashboard {
    let invoice_status = count_by_status(invoices, |i| i.status, &InvoiceStatus::ALL);

    let kpis = BillingKpis {
        total_leads: leads.len() as u64,
        emails_sent: count_where(emails, |e| e.status == EmailStatus::Sent),
        revenue: sum_amount_where(invoices, |i| i.status == InvoiceStatus::Paid),
        pending_invoices: invoice_status.get(&InvoiceStatus::Pending),
    };

    let paid_by_day = group_by_day(
        invoices,
        |i| i.issued_at,
        |i| (i.status == InvoiceStatus::Paid).then_some(i.amount),
    );

    BillingDashboard {
        kpis,
        monthly_invoice_status: group_by_month(
            invoices,
            |i| i.issued_at,
            |i| i.status,
            &InvoiceStatus::ALL,
        ),
        cumulative_revenue: cumulative_series(&paid_by_day),
        daily_emails: daily_emails(emails, options),
        invoice_status,
        leads_by_source: lead_sources(leads),
    }
}

pub fn lead_sources(leads: &[Lead]) -> Tally<String> {
    group_by_key(leads, |l| l.source.as_deref(), UNKNOWN_SOURCE)
}

/// Sent emails per day with a trailing 7-day mean rounded to cents.
pub fn daily_emails(emails: &[Email], options: DashboardOptions) -> Vec<DailyEmails> {
    let mut sent: Vec<DailyPoint<u64>> = group_by_day(
        emails,
        |e| e.created_at,
        |e| (e.status == EmailStatus::Sent).then_some(1),
    );
    if options.fill_gaps {
        sent = fill_daily_gaps(&sent, 0);
    }

    let values: Vec<f64> = sent.iter().map(|p| p.value as f64).collect();
    let averages = moving_average(&values, EMAIL_TREND_WINDOW);

    sent.iter()
        .zip(averages)
        .map(|(point, avg)| DailyEmails {
            day: point.day,
            sent: point.value,
            ma7: round2(avg),
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize)]
pub struct LeadStats {
    pub total: u64,
    pub by_source: Tally<String>,
}

pub fn lead_stats(leads: &[Lead]) -> LeadStats {
    LeadStats {
        total: leads.len() as u64,
        by_source: lead_sources(leads),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailStats {
    pub total: u64,
    pub sent: u64,
    pub pending: u64,
    pub failed: u64,
    pub success_rate: u32,
}

pub fn email_stats(emails: &[Email]) -> EmailStats {
    let counts = count_by_status(emails, |e| e.status, &EmailStatus::ALL);
    let total = emails.len() as u64;
    let sent = counts.get(&EmailStatus::Sent);
    EmailStats {
        total,
        sent,
        pending: counts.get(&EmailStatus::Pending),
        failed: counts.get(&EmailStatus::Failed),
        success_rate: rate(sent, total),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceStats {
    pub total: u64,
    pub paid: u64,
    pub pending: u64,
    pub overdue: u64,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
}

pub fn invoice_stats(invoices: &[Invoice]) -> InvoiceStats {
    let counts = count_by_status(invoices, |i| i.status, &InvoiceStatus::ALL);
    InvoiceStats {
        total: invoices.len() as u64,
        paid: counts.get(&InvoiceStatus::Paid),
        pending: counts.get(&InvoiceStatus::Pending),
        overdue: counts.get(&InvoiceStatus::Overdue),
        total_amount: sum_amount_where(invoices, |_| true),
        paid_amount: sum_amount_where(invoices, |i| i.status == InvoiceStatus::Paid),
    }
}

/// Invoice row as listed, with the lead it was issued to when that lead
/// still exists.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub lead: Option<Lead>,
}

pub fn with_leads(invoices: &[Invoice], leads: &[Lead]) -> Vec<InvoiceView> {
    join_weak(invoices, leads, |i| i.lead_id, |l| l.id)
        .into_iter()
        .map(|(invoice, lead)| InvoiceView {
            invoice: invoice.clone(),
            lead: lead.cloned(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionStats {
    pub total: u64,
    pub total_amount: Decimal,
    pub average_amount: Decimal,
}

pub fn transaction_stats(transactions: &[Transaction]) -> TransactionStats {
    TransactionStats {
        total: transactions.len() as u64,
        total_amount: sum_amount_where(transactions, |_| true),
        average_amount: average_amount(transactions),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::lenient::parse_timestamp;
    use uuid::Uuid;

    fn invoice(amount: i64, status: InvoiceStatus, issued: &str) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            lead_id: None,
            amount: Decimal::from(amount),
            currency: "USD".into(),
            status,
            issued_at: parse_timestamp(issued).unwrap(),
            due_date: None,
            paid_at: None,
        }
    }

    fn email(status: EmailStatus, created: &str) -> Email {
        Email {
            id: Uuid::new_v4(),
            lead_id: None,
            subject: "hello".into(),
            body: String::new(),
            status,
            sent_at: None,
            created_at: parse_timestamp(created).unwrap(),
        }
    }

    fn lead(source: Option<&str>) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            company: None,
            source: source.map(str::to_string),
            created_at: parse_timestamp("2024-01-01").unwrap(),
        }
    }

    fn day(text: &str) -> NaiveDate {
        NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn revenue_and_status_counts_from_invoices() {
        let invoices = vec![
            invoice(100, InvoiceStatus::Paid, "2024-01-01"),
            invoice(50, InvoiceStatus::Pending, "2024-01-02"),
            invoice(75, InvoiceStatus::Paid, "2024-01-03"),
        ];
        let dash = billing_dashboard(&[], &[], &invoices, DashboardOptions::default());
        assert_eq!(dash.kpis.revenue, Decimal::from(175));
        assert_eq!(dash.kpis.pending_invoices, 1);
        assert_eq!(dash.invoice_status.get(&InvoiceStatus::Paid), 2);
        assert_eq!(dash.invoice_status.get(&InvoiceStatus::Overdue), 0);
        assert_eq!(
            serde_json::to_value(&dash.invoice_status).unwrap(),
            serde_json::json!({ "pending": 1, "paid": 2, "overdue": 0 })
        );

        let totals: Vec<Decimal> = dash
            .cumulative_revenue
            .iter()
            .map(|p| p.running_total)
            .collect();
        assert_eq!(totals, vec![Decimal::from(100), Decimal::from(175)]);
    }

    #[test]
    fn daily_emails_skip_days_without_sends() {
        let emails = vec![
            email(EmailStatus::Sent, "2024-01-01"),
            email(EmailStatus::Sent, "2024-01-01"),
            email(EmailStatus::Failed, "2024-01-02"),
        ];
        let series = daily_emails(&emails, DashboardOptions::default());
        assert_eq!(
            series,
            vec![DailyEmails {
                day: day("2024-01-01"),
                sent: 2,
                ma7: 2.0
            }]
        );
    }

    #[test]
    fn gap_filling_changes_the_average() {
        let emails = vec![
            email(EmailStatus::Sent, "2024-01-01"),
            email(EmailStatus::Sent, "2024-01-01"),
            email(EmailStatus::Sent, "2024-01-04"),
        ];
        let sparse = daily_emails(&emails, DashboardOptions::default());
        assert_eq!(sparse.len(), 2);
        assert_eq!(sparse[1].ma7, 1.5);

        let dense = daily_emails(&emails, DashboardOptions { fill_gaps: true });
        assert_eq!(dense.len(), 4);
        assert_eq!(dense[3].ma7, 0.75);
    }

    #[test]
    fn moving_average_rounds_to_two_places() {
        let emails = vec![
            email(EmailStatus::Sent, "2024-01-01"),
            email(EmailStatus::Sent, "2024-01-02"),
            email(EmailStatus::Sent, "2024-01-02"),
            email(EmailStatus::Sent, "2024-01-03"),
            email(EmailStatus::Sent, "2024-01-03"),
        ];
        let series = daily_emails(&emails, DashboardOptions::default());
        assert_eq!(series[2].ma7, 1.67);
    }

    #[test]
    fn lead_sources_keep_first_seen_order() {
        let leads = vec![lead(None), lead(Some("manual")), lead(None)];
        let stats = lead_stats(&leads);
        assert_eq!(stats.total, 3);
        assert_eq!(
            stats.by_source.keys().cloned().collect::<Vec<_>>(),
            vec!["Unknown".to_string(), "manual".to_string()]
        );
        assert_eq!(stats.by_source.get(&"Unknown".to_string()), 2);
    }

    #[test]
    fn email_success_rate() {
        let emails = vec![
            email(EmailStatus::Sent, "2024-01-01"),
            email(EmailStatus::Sent, "2024-01-01"),
            email(EmailStatus::Failed, "2024-01-01"),
        ];
        let stats = email_stats(&emails);
        assert_eq!(
            stats,
            EmailStats {
                total: 3,
                sent: 2,
                pending: 0,
                failed: 1,
                success_rate: 67,
            }
        );
        assert_eq!(email_stats(&[]).success_rate, 0);
    }

    #[test]
    fn invoice_stats_split_amounts() {
        let invoices = vec![
            invoice(100, InvoiceStatus::Paid, "2024-01-01"),
            invoice(40, InvoiceStatus::Overdue, "2024-02-01"),
        ];
        let stats = invoice_stats(&invoices);
        assert_eq!(stats.total_amount, Decimal::from(140));
        assert_eq!(stats.paid_amount, Decimal::from(100));
        assert_eq!(stats.overdue, 1);
    }

    #[test]
    fn invoices_keep_dangling_leads() {
        let known = lead(Some("web"));
        let mut linked = invoice(10, InvoiceStatus::Pending, "2024-01-01");
        linked.lead_id = Some(known.id);
        let mut dangling = invoice(20, InvoiceStatus::Pending, "2024-01-01");
        dangling.lead_id = Some(Uuid::new_v4());

        let views = with_leads(&[linked, dangling], &[known.clone()]);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].lead.as_ref().map(|l| l.id), Some(known.id));
        assert!(views[1].lead.is_none());
        let json = serde_json::to_value(&views[1]).unwrap();
        assert_eq!(json["status"], "pending");
        assert!(json["lead"].is_null());
    }

    #[test]
    fn monthly_buckets_cover_every_status() {
        let invoices = vec![
            invoice(1, InvoiceStatus::Paid, "2024-01-05"),
            invoice(1, InvoiceStatus::Overdue, "2024-02-05"),
        ];
        let dash = billing_dashboard(&[], &[], &invoices, DashboardOptions::default());
        let labels: Vec<&str> = dash
            .monthly_invoice_status
            .iter()
            .map(|b| b.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Jan", "Feb"]);
        assert_eq!(
            dash.monthly_invoice_status[0]
                .counts
                .get(&InvoiceStatus::Pending),
            0
        );
    }

    #[test]
    fn empty_dashboard_is_all_zero() {
        let dash = billing_dashboard(&[], &[], &[], DashboardOptions::default());
        assert_eq!(dash.kpis.revenue, Decimal::ZERO);
        assert_eq!(dash.kpis.total_leads, 0);
        assert!(dash.daily_emails.is_empty());
        assert!(dash.cumulative_revenue.is_empty());
        assert_eq!(dash.invoice_status.total(), 0);
        assert!(dash.leads_by_source.is_empty());
    }
}
