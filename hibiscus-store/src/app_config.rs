use hibiscus_pricing::PricingConfig;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub pricing: PricingConfig,
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub integrations: IntegrationsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Minimum gap between two sends of the same channel
    #[serde(default = "default_cooldown")]
    pub notification_cooldown_minutes: i64,
    /// Share of the leg price paid to the driver when no override is given
    #[serde(default = "default_payout_ratio")]
    pub driver_payout_ratio: f64,
    #[serde(default = "default_proximity")]
    pub proximity_threshold_minutes: i64,
    #[serde(default = "default_eta_timeout")]
    pub eta_timeout_seconds: u64,
    #[serde(default = "default_urgent_window")]
    pub urgent_window_hours: f64,
    /// Offset of the business's local time from UTC
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
    #[serde(default = "default_reference_retries")]
    pub reference_retry_limit: u32,
}

fn default_cooldown() -> i64 { 5 }
fn default_payout_ratio() -> f64 { 0.8 }
fn default_proximity() -> i64 { 10 }
fn default_eta_timeout() -> u64 { 5 }
fn default_urgent_window() -> f64 { 24.0 }
fn default_utc_offset() -> i32 { 12 }
fn default_reference_retries() -> u32 { 5 }

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            notification_cooldown_minutes: default_cooldown(),
            driver_payout_ratio: default_payout_ratio(),
            proximity_threshold_minutes: default_proximity(),
            eta_timeout_seconds: default_eta_timeout(),
            urgent_window_hours: default_urgent_window(),
            utc_offset_hours: default_utc_offset(),
            reference_retry_limit: default_reference_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    pub admin_email: String,
    pub admin_phone: Option<String>,
    /// Base for driver job links and payment redirects
    pub frontend_url: String,
    /// Public base for customer tracking links
    pub tracking_url_base: String,
    #[serde(default = "default_business_phone")]
    pub business_phone: String,
    pub smtp: Option<SmtpConfig>,
    pub twilio: Option<TwilioConfig>,
    pub google_calendar: Option<GoogleCalendarConfig>,
}

fn default_business_phone() -> String { "021 743 321".to_string() }

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            admin_email: "bookings@example.co.nz".to_string(),
            admin_phone: None,
            frontend_url: "http://localhost:3000".to_string(),
            tracking_url_base: "http://localhost:3000/track".to_string(),
            business_phone: default_business_phone(),
            smtp: None,
            twilio: None,
            google_calendar: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub server: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

fn default_smtp_port() -> u16 { 587 }

#[derive(Debug, Deserialize, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
    /// Prefix applied to local numbers without one, e.g. `+64`
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
}

fn default_country_code() -> String { "+64".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleCalendarConfig {
    pub access_token: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
}

fn default_calendar_id() -> String { "primary".to_string() }

#[derive(Debug, Deserialize, Clone)]
pub struct IntegrationsConfig {
    pub google_maps_api_key: Option<String>,
    pub stripe_secret_key: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_currency() -> String { "nzd".to_string() }
fn default_http_timeout() -> u64 { 10 }

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            google_maps_api_key: None,
            stripe_secret_key: None,
            currency: default_currency(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    /// Keep tracking sessions in Redis instead of process memory
    #[serde(default)]
    pub durable_tracking: bool,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. HIBISCUS_DATABASE__URL
            .add_source(config::Environment::with_prefix("HIBISCUS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rule_defaults() {
        let rules = BusinessRules::default();
        assert_eq!(rules.notification_cooldown_minutes, 5);
        assert_eq!(rules.driver_payout_ratio, 0.8);
        assert_eq!(rules.proximity_threshold_minutes, 10);
    }

    #[test]
    fn test_partial_rules_fill_defaults() {
        let rules: BusinessRules = serde_json::from_value(serde_json::json!({
            "notification_cooldown_minutes": 2
        }))
        .unwrap();
        assert_eq!(rules.notification_cooldown_minutes, 2);
        assert_eq!(rules.eta_timeout_seconds, 5);
    }
}
