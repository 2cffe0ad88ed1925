use forge::prelude::*;

mod functions;
mod reporting;
mod schema;
mod services;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let integrations = services::Integrations::from_env()
        .map_err(|e| ForgeError::Internal(format!("failed to configure services: {e}")))?;
    services::init(integrations);
    tracing::info!("webhooks initialized");

    let config = ForgeConfig::from_file("forge.toml")?;
    let mut builder = Forge::builder();

    let fns = builder.function_registry_mut();
    fns.register_query::<functions::GetBillingDashboardQuery>();
    fns.register_query::<functions::ListLeadsQuery>();
    fns.register_query::<functions::GetLeadStatsQuery>();
    fns.register_query::<functions::ListEmailsQuery>();
    fns.register_query::<functions::GetEmailStatsQuery>();
    fns.register_query::<functions::ListInvoicesQuery>();
    fns.register_query::<functions::GetInvoiceStatsQuery>();
    fns.register_query::<functions::ListTransactionsQuery>();
    fns.register_query::<functions::GetTransactionStatsQuery>();
    fns.register_query::<functions::ExportTransactionsCsvQuery>();
    fns.register_query::<functions::GetClinicAnalyticsQuery>();
    fns.register_query::<functions::ListAppointmentsQuery>();
    fns.register_query::<functions::GetAppointmentCalendarQuery>();
    fns.register_query::<functions::ListPatientsQuery>();

    fns.register_mutation::<functions::CreateLeadMutation>();
    fns.register_mutation::<functions::BulkAddLeadsMutation>();
    fns.register_mutation::<functions::ImportLeadsCsvMutation>();
    fns.register_mutation::<functions::ContactLeadMutation>();
    fns.register_mutation::<functions::RetryEmailMutation>();
    fns.register_mutation::<functions::MarkInvoicePaidMutation>();
    fns.register_mutation::<functions::DeleteInvoiceMutation>();
    fns.register_mutation::<functions::CreateInvoiceMutation>();
    fns.register_mutation::<functions::UpdateAppointmentStatusMutation>();
    fns.register_mutation::<functions::CreatePatientMutation>();
    fns.register_mutation::<functions::UpdatePatientMutation>();
    fns.register_mutation::<functions::DeletePatientMutation>();

    builder.config(config).build()?.run().await
}
