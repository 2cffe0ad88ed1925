use super::{Page, db_error, fetch_or_empty, status_filter};
use crate::reporting::{
    AppointmentView, CalendarMonth, ClinicAnalytics, calendar_month, clinic_analytics,
    with_patients,
};
use crate::schema::{
    Appointment, AppointmentStatus, Patient, PatientFields, appointment, decode_rows, patient,
};
use crate::services::{AppServices, Filter, RowStore, Select};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use forge::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

async fn count_or_zero(store: &dyn RowStore, table: &str, filters: &[Filter]) -> u64 {
    store.count(table, filters).await.unwrap_or_else(|e| {
        tracing::warn!(table, error = %e, "count failed, showing zero");
        0
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetClinicAnalyticsInput {}

pub async fn load_clinic_analytics(services: &AppServices, now: DateTime<Utc>) -> ClinicAnalytics {
    let store = services.store.as_ref();
    let (appointments, patients) = tokio::join!(
        fetch_or_empty::<Appointment>(store, appointment::TABLE, Select::all()),
        fetch_or_empty::<Patient>(store, patient::TABLE, Select::all()),
    );
    let today = now.with_timezone(&services.settings.clinic_timezone).date_naive();
    clinic_analytics(
        &appointments,
        &patients,
        today,
        services.settings.appointment_price,
    )
}

#[forge::query(public)]
pub async fn get_clinic_analytics(
    ctx: &QueryContext,
    _input: GetClinicAnalyticsInput,
) -> Result<ClinicAnalytics> {
    let services = crate::services::for_pool(ctx.db())?;
    Ok(load_clinic_analytics(&services, Utc::now()).await)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentSort {
    #[default]
    CreatedAt,
    /// Appointment date then time, latest first.
    Schedule,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListAppointmentsInput {
    pub date: Option<NaiveDate>,
    pub status: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub sort_by: Option<AppointmentSort>,
    pub sort_order: Option<SortOrder>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentPage {
    pub appointments: Vec<AppointmentView>,
    pub total_count: u64,
    pub total_pages: u64,
    pub current_page: u64,
    pub sort_by: AppointmentSort,
    pub sort_order: SortOrder,
}

pub async fn load_appointments(
    services: &AppServices,
    input: ListAppointmentsInput,
) -> Result<AppointmentPage> {
    let page = Page::new(input.page, input.limit);
    let sort_by = input.sort_by.unwrap_or_default();
    let sort_order = input.sort_order.unwrap_or_default();

    let mut filters = Vec::new();
    if let Some(date) = input.date {
        filters.push(Filter::eq("date", date));
    }
    if let Some(status) = status_filter::<AppointmentStatus>(input.status)? {
        filters.push(Filter::eq("status", status.as_str()));
    }

    let mut query = Select::all().filters(filters.clone());
    query = match (sort_by, sort_order) {
        (AppointmentSort::CreatedAt, SortOrder::Asc) => query.order_asc("created_at"),
        (AppointmentSort::CreatedAt, SortOrder::Desc) => query.order_desc("created_at"),
        (AppointmentSort::Schedule, _) => query.order_desc("date").order_desc("time"),
    };
    query = query.range(page.offset(), page.limit);

    let store = services.store.as_ref();
    let (appointments, patients, total_count) = tokio::join!(
        fetch_or_empty::<Appointment>(store, appointment::TABLE, query),
        fetch_or_empty::<Patient>(store, patient::TABLE, Select::all()),
        count_or_zero(store, appointment::TABLE, &filters),
    );

    Ok(AppointmentPage {
        appointments: with_patients(&appointments, &patients),
        total_count,
        total_pages: page.total_pages(total_count),
        current_page: page.page,
        sort_by,
        sort_order,
    })
}

#[forge::query(public)]
pub async fn list_appointments(
    ctx: &QueryContext,
    input: ListAppointmentsInput,
) -> Result<AppointmentPage> {
    let services = crate::services::for_pool(ctx.db())?;
    load_appointments(&services, input).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AppointmentCalendarInput {
    pub year: i32,
    pub month: u32,
}

pub async fn load_calendar(
    services: &AppServices,
    input: AppointmentCalendarInput,
) -> Result<CalendarMonth> {
    let invalid =
        || ForgeError::Validation(format!("invalid month: {}-{}", input.year, input.month));
    let first = NaiveDate::from_ymd_opt(input.year, input.month, 1).ok_or_else(invalid)?;
    let last = first
        .checked_add_months(chrono::Months::new(1))
        .and_then(|d| d.pred_opt())
        .ok_or_else(invalid)?;

    let query = Select::all()
        .filter(Filter::gte("date", first))
        .filter(Filter::lte("date", last))
        .order_asc("date")
        .order_asc("time");
    let appointments: Vec<Appointment> =
        fetch_or_empty(services.store.as_ref(), appointment::TABLE, query).await;
    calendar_month(&appointments, first.year(), first.month()).ok_or_else(invalid)
}

#[forge::query(public)]
pub async fn get_appointment_calendar(
    ctx: &QueryContext,
    input: AppointmentCalendarInput,
) -> Result<CalendarMonth> {
    let services = crate::services::for_pool(ctx.db())?;
    load_calendar(&services, input).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateAppointmentStatusInput {
    pub appointment_id: Uuid,
    pub status: AppointmentStatus,
}

#[derive(Debug, Serialize)]
pub struct UpdateAppointmentStatusOutput {
    pub updated: bool,
    pub appointment: Option<Appointment>,
}

pub async fn set_appointment_status(
    services: &AppServices,
    input: UpdateAppointmentStatusInput,
) -> Result<UpdateAppointmentStatusOutput> {
    let updated = services
        .store
        .update(
            appointment::TABLE,
            serde_json::json!({ "status": input.status.as_str() }),
            &[Filter::eq("appointment_id", input.appointment_id)],
        )
        .await
        .map_err(db_error)?;
    let appointment = decode_rows::<Appointment>(appointment::TABLE, updated)
        .into_iter()
        .next();
    tracing::info!(
        appointment_id = %input.appointment_id,
        status = input.status.as_str(),
        updated = appointment.is_some(),
        "appointment status changed"
    );
    Ok(UpdateAppointmentStatusOutput {
        updated: appointment.is_some(),
        appointment,
    })
}

#[forge::mutation(public)]
pub async fn update_appointment_status(
    ctx: &MutationContext,
    input: UpdateAppointmentStatusInput,
) -> Result<UpdateAppointmentStatusOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    set_appointment_status(&services, input).await
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListPatientsInput {
    /// Matches name or WhatsApp number.
    pub search: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PatientPage {
    pub patients: Vec<Patient>,
    pub total_count: u64,
    pub total_pages: u64,
    pub current_page: u64,
}

pub async fn load_patients(services: &AppServices, input: ListPatientsInput) -> PatientPage {
    let page = Page::new(input.page, input.limit);
    let filters: Vec<Filter> = input
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Filter::any_ilike(&["name", "whatsapp_number"], s))
        .into_iter()
        .collect();

    let query = Select::all()
        .filters(filters.clone())
        .order_desc("created_at")
        .range(page.offset(), page.limit);
    let store = services.store.as_ref();
    let (patients, total_count) = tokio::join!(
        fetch_or_empty::<Patient>(store, patient::TABLE, query),
        count_or_zero(store, patient::TABLE, &filters),
    );

    PatientPage {
        patients,
        total_count,
        total_pages: page.total_pages(total_count),
        current_page: page.page,
    }
}

#[forge::query(public)]
pub async fn list_patients(ctx: &QueryContext, input: ListPatientsInput) -> Result<PatientPage> {
    let services = crate::services::for_pool(ctx.db())?;
    Ok(load_patients(&services, input).await)
}

fn clean_fields(fields: PatientFields) -> Result<PatientFields> {
    let name = fields.name.trim().to_string();
    let whatsapp_number = fields.whatsapp_number.trim().to_string();
    if name.is_empty() || whatsapp_number.is_empty() {
        return Err(ForgeError::Validation(
            "name and whatsapp_number are required".into(),
        ));
    }
    if fields.age.is_some_and(|age| !(0..=150).contains(&age)) {
        return Err(ForgeError::Validation("age must be between 0 and 150".into()));
    }
    Ok(PatientFields {
        name,
        age: fields.age,
        gender: fields
            .gender
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty()),
        whatsapp_number,
    })
}

pub async fn add_patient(
    services: &AppServices,
    fields: PatientFields,
    now: DateTime<Utc>,
) -> Result<Patient> {
    let fields = clean_fields(fields)?;
    let patient = Patient {
        patient_id: Uuid::new_v4(),
        name: fields.name,
        age: fields.age,
        gender: fields.gender,
        whatsapp_number: fields.whatsapp_number,
        created_at: now,
    };
    let row = serde_json::to_value(&patient).map_err(|e| ForgeError::Internal(e.to_string()))?;
    let inserted = services
        .store
        .insert(patient::TABLE, vec![row])
        .await
        .map_err(db_error)?;
    tracing::info!(patient_id = %patient.patient_id, "patient created");
    decode_rows::<Patient>(patient::TABLE, inserted)
        .into_iter()
        .next()
        .ok_or_else(|| ForgeError::Database("insert returned no row".into()))
}

#[forge::mutation(public)]
pub async fn create_patient(ctx: &MutationContext, input: PatientFields) -> Result<Patient> {
    let services = crate::services::for_pool(ctx.pool())?;
    add_patient(&services, input, Utc::now()).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdatePatientInput {
    pub patient_id: Uuid,
    #[serde(flatten)]
    pub fields: PatientFields,
}

#[derive(Debug, Serialize)]
pub struct UpdatePatientOutput {
    pub updated: bool,
    pub patient: Option<Patient>,
}

pub async fn edit_patient(
    services: &AppServices,
    input: UpdatePatientInput,
) -> Result<UpdatePatientOutput> {
    let fields = clean_fields(input.fields)?;
    let patch = serde_json::to_value(&fields).map_err(|e| ForgeError::Internal(e.to_string()))?;
    let updated = services
        .store
        .update(
            patient::TABLE,
            patch,
            &[Filter::eq("patient_id", input.patient_id)],
        )
        .await
        .map_err(db_error)?;
    let patient = decode_rows::<Patient>(patient::TABLE, updated).into_iter().next();
    Ok(UpdatePatientOutput {
        updated: patient.is_some(),
        patient,
    })
}

#[forge::mutation(public)]
pub async fn update_patient(
    ctx: &MutationContext,
    input: UpdatePatientInput,
) -> Result<UpdatePatientOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    edit_patient(&services, input).await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletePatientInput {
    pub patient_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct DeletePatientOutput {
    pub deleted: bool,
}

/// Appointments keep their dangling `patient_id` and list without a patient.
pub async fn remove_patient(
    services: &AppServices,
    input: DeletePatientInput,
) -> Result<DeletePatientOutput> {
    let deleted = services
        .store
        .delete(patient::TABLE, &[Filter::eq("patient_id", input.patient_id)])
        .await
        .map_err(db_error)?;
    if deleted > 0 {
        tracing::info!(patient_id = %input.patient_id, "patient deleted");
    }
    Ok(DeletePatientOutput {
        deleted: deleted > 0,
    })
}

#[forge::mutation(public)]
pub async fn delete_patient(
    ctx: &MutationContext,
    input: DeletePatientInput,
) -> Result<DeletePatientOutput> {
    let services = crate::services::for_pool(ctx.pool())?;
    remove_patient(&services, input).await
}
