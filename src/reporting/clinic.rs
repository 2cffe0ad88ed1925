//! View-models for the appointment admin panel.

use super::aggregate::{Tally, count_by_status, count_where, join_weak, month_label};
use crate::schema::{Appointment, AppointmentStatus, Patient, PaymentStatus};
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

pub const GENDERS: [&str; 3] = ["Male", "Female", "Other"];

const STATUS_ORDER: [AppointmentStatus; 3] = [
    AppointmentStatus::Confirmed,
    AppointmentStatus::Completed,
    AppointmentStatus::Cancelled,
];

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClinicStats {
    pub total_appointments: u64,
    pub today_appointments: u64,
    pub total_patients: u64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthRevenue {
    pub month: String,
    pub label: String,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClinicAnalytics {
    pub stats: ClinicStats,
    pub appointments_by_status: Tally<AppointmentStatus>,
    pub appointments_by_weekday: Tally<Weekday>,
    pub patients_by_gender: Tally<String>,
    pub revenue_by_month: Vec<MonthRevenue>,
}

/// `price` is the flat amount booked per paid appointment.
pub fn clinic_analytics(
    appointments: &[Appointment],
    patients: &[Patient],
    today: NaiveDate,
    price: Decimal,
) -> ClinicAnalytics {
    let paid = count_where(appointments, |a| a.payment_status == PaymentStatus::Paid);

    let stats = ClinicStats {
        total_appointments: appointments.len() as u64,
        today_appointments: count_where(appointments, |a| {
            a.date == today && a.status == AppointmentStatus::Confirmed
        }),
        total_patients: patients.len() as u64,
        revenue: price * Decimal::from(paid),
    };

    ClinicAnalytics {
        stats,
        appointments_by_status: count_by_status(appointments, |a| a.status, &STATUS_ORDER),
        appointments_by_weekday: count_by_status(appointments, |a| a.date.weekday(), &WEEK),
        patients_by_gender: count_by_status(
            patients,
            |p| gender_bucket(p.gender.as_deref()).to_string(),
            &GENDERS.map(str::to_string),
        ),
        revenue_by_month: revenue_by_month(appointments, price),
    }
}

fn gender_bucket(gender: Option<&str>) -> &'static str {
    match gender.map(str::trim) {
        Some(g) if g.eq_ignore_ascii_case("male") => "Male",
        Some(g) if g.eq_ignore_ascii_case("female") => "Female",
        _ => "Other",
    }
}

fn revenue_by_month(appointments: &[Appointment], price: Decimal) -> Vec<MonthRevenue> {
    let mut by_month: BTreeMap<(i32, u32), u64> = BTreeMap::new();
    for appointment in appointments
        .iter()
        .filter(|a| a.payment_status == PaymentStatus::Paid)
    {
        *by_month
            .entry((appointment.date.year(), appointment.date.month()))
            .or_default() += 1;
    }
    by_month
        .into_iter()
        .map(|((year, month), paid)| MonthRevenue {
            month: format!("{year:04}-{month:02}"),
            label: month_label(month).to_string(),
            revenue: price * Decimal::from(paid),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient: Option<Patient>,
}

pub fn with_patients(appointments: &[Appointment], patients: &[Patient]) -> Vec<AppointmentView> {
    join_weak(appointments, patients, |a| a.patient_id, |p| p.patient_id)
        .into_iter()
        .map(|(appointment, patient)| AppointmentView {
            appointment: appointment.clone(),
            patient: patient.cloned(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub day: u32,
    pub appointments: Vec<Appointment>,
}

/// Month grid starting on Sunday: `leading_blanks` empty cells precede day 1.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    pub leading_blanks: u32,
    pub days: Vec<CalendarDay>,
}

/// `None` when `year`/`month` do not name a real month.
pub fn calendar_month(
    appointments: &[Appointment],
    year: i32,
    month: u32,
) -> Option<CalendarMonth> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let mut by_date: BTreeMap<NaiveDate, Vec<Appointment>> = BTreeMap::new();
    for appointment in appointments {
        if appointment.date.year() == year && appointment.date.month() == month {
            by_date
                .entry(appointment.date)
                .or_default()
                .push(appointment.clone());
        }
    }

    let days = first
        .iter_days()
        .take_while(|d| d.month() == month)
        .map(|date| CalendarDay {
            date,
            day: date.day(),
            appointments: by_date.remove(&date).unwrap_or_default(),
        })
        .collect();

    Some(CalendarMonth {
        year,
        month,
        leading_blanks: first.weekday().num_days_from_sunday(),
        days,
    })
}
