pub mod notifier;
pub mod row_store;

#[cfg(test)]
pub mod memory_store;

pub use notifier::*;
pub use row_store::*;

use chrono_tz::Tz;
use forge::prelude::ForgeError;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_APPOINTMENT_PRICE: i64 = 50;

#[derive(Debug, Clone)]
pub struct Settings {
    pub send_email_webhook: Option<String>,
    pub create_invoice_webhook: Option<String>,
    /// Zone in which "today" is evaluated for the clinic screens.
    pub clinic_timezone: Tz,
    /// Flat amount booked per paid appointment.
    pub appointment_price: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            send_email_webhook: None,
            create_invoice_webhook: None,
            clinic_timezone: Tz::UTC,
            appointment_price: Decimal::from(DEFAULT_APPOINTMENT_PRICE),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let clinic_timezone = match non_empty_var("LEDGERDASH_CLINIC_TIMEZONE") {
            Some(name) => Tz::from_str(&name).unwrap_or_else(|_| {
                tracing::warn!(timezone = %name, "unknown clinic timezone, using UTC");
                defaults.clinic_timezone
            }),
            None => defaults.clinic_timezone,
        };

        let appointment_price = match non_empty_var("LEDGERDASH_APPOINTMENT_PRICE") {
            Some(raw) => Decimal::from_str(&raw).unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "invalid appointment price, using default");
                defaults.appointment_price
            }),
            None => defaults.appointment_price,
        };

        Self {
            send_email_webhook: non_empty_var("LEDGERDASH_SEND_EMAIL_WEBHOOK"),
            create_invoice_webhook: non_empty_var("LEDGERDASH_CREATE_INVOICE_WEBHOOK"),
            clinic_timezone,
            appointment_price,
        }
    }
}

/// Per-request view handed to every screen: the row store over forge's pool
/// plus the process-wide notifier and settings.
pub struct AppServices {
    pub store: Arc<dyn RowStore>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: Arc<Settings>,
}

/// Outbound clients and settings built once at startup.
pub struct Integrations {
    pub notifier: Arc<dyn Notifier>,
    pub settings: Arc<Settings>,
}

impl Integrations {
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = Settings::from_env();
        tracing::info!(
            timezone = %settings.clinic_timezone,
            appointment_price = %settings.appointment_price,
            send_email_webhook = settings.send_email_webhook.is_some(),
            create_invoice_webhook = settings.create_invoice_webhook.is_some(),
            "services configured"
        );
        Ok(Self {
            notifier: Arc::new(WebhookNotifier::from_env()?),
            settings: Arc::new(settings),
        })
    }

    pub fn with_store(&self, store: Arc<dyn RowStore>) -> AppServices {
        AppServices {
            store,
            notifier: self.notifier.clone(),
            settings: self.settings.clone(),
        }
    }
}

static INTEGRATIONS: tokio::sync::OnceCell<Integrations> = tokio::sync::OnceCell::const_new();

pub fn init(integrations: Integrations) {
    if INTEGRATIONS.set(integrations).is_err() {
        tracing::warn!("services already initialized");
    }
}

/// Binds the shared integrations to the pool forge handed this request.
pub fn for_pool(pool: &PgPool) -> Result<AppServices, ForgeError> {
    let integrations = INTEGRATIONS
        .get()
        .ok_or_else(|| ForgeError::Internal("services not initialized".into()))?;
    Ok(integrations.with_store(Arc::new(PgRowStore::new(pool.clone()))))
}
