use anyhow::Context;
use hibiscus_api::integrations::{GoogleMapsClient, StripeGateway};
use hibiscus_api::{app, AppState, AuthConfig};
use hibiscus_booking::BookingManager;
use hibiscus_core::repository::{BookingRepository, DriverRepository, SessionStore};
use hibiscus_dispatch::{DispatchService, TrackingService};
use hibiscus_notify::providers::{GoogleCalendarClient, SmtpEmailSender, TwilioSmsSender};
use hibiscus_notify::NotificationDispatcher;
use hibiscus_pricing::PricingEngine;
use hibiscus_store::app_config::Config;
use hibiscus_store::{
    DbClient, InMemoryBookingRepository, InMemoryDriverRepository, InMemorySessionStore,
    PgBookingRepository, PgDriverRepository, RedisClient, RedisSessionStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Unconfigured providers stay unset; the dispatcher logs and skips them.
fn build_notifier(config: &Config, timeout: Duration) -> anyhow::Result<NotificationDispatcher> {
    let settings = &config.notifications;
    let mut notifier =
        NotificationDispatcher::new(settings.clone(), config.business_rules.utc_offset_hours);

    if let Some(smtp) = &settings.smtp {
        notifier = notifier.with_email(Arc::new(SmtpEmailSender::new(smtp, timeout)?));
    }
    if let Some(twilio) = &settings.twilio {
        notifier = notifier.with_sms(Arc::new(TwilioSmsSender::new(twilio, timeout)?));
    }
    if let Some(calendar) = &settings.google_calendar {
        notifier = notifier.with_calendar(Arc::new(GoogleCalendarClient::new(calendar, timeout)?));
    }
    Ok(notifier)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hibiscus_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Hibiscus API on port {}", config.server.port);
    let timeout = Duration::from_secs(config.integrations.http_timeout_seconds);

    // Postgres, or process memory when no database is configured
    let (bookings, drivers): (Arc<dyn BookingRepository>, Arc<dyn DriverRepository>) =
        if config.database.url.is_empty() {
            tracing::warn!("No database configured, bookings are kept in memory");
            (
                Arc::new(InMemoryBookingRepository::new()),
                Arc::new(InMemoryDriverRepository::new()),
            )
        } else {
            let db = DbClient::new(&config.database.url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            (
                Arc::new(PgBookingRepository::new(db.pool.clone())),
                Arc::new(PgDriverRepository::new(db.pool.clone())),
            )
        };

    let redis = match &config.redis {
        Some(redis_config) => {
            let client = RedisClient::new(&redis_config.url)
                .await
                .context("Invalid Redis url")?;
            client.ping().await.context("Failed to connect to Redis")?;
            Some(Arc::new(client))
        }
        None => None,
    };
    let durable_tracking = config.redis.as_ref().is_some_and(|r| r.durable_tracking);
    let sessions: Arc<dyn SessionStore> = match (&redis, durable_tracking) {
        (Some(client), true) => Arc::new(RedisSessionStore::new(client)),
        _ => Arc::new(InMemorySessionStore::new()),
    };

    let notifier = build_notifier(&config, timeout)?;
    let rules = config.business_rules.clone();

    let mut booking_manager = BookingManager::new(
        bookings.clone(),
        notifier.clone(),
        PricingEngine::new(config.pricing.clone()),
        rules.clone(),
    );
    let mut tracking = TrackingService::new(
        bookings.clone(),
        drivers.clone(),
        sessions.clone(),
        notifier.clone(),
        rules.clone(),
        tokio::sync::broadcast::channel(100).0,
    );
    if let Some(key) = &config.integrations.google_maps_api_key {
        let maps = Arc::new(GoogleMapsClient::new(key, timeout)?);
        booking_manager = booking_manager.with_distance_lookup(maps.clone());
        tracking = tracking.with_route_estimator(maps);
    }
    if let Some(key) = &config.integrations.stripe_secret_key {
        booking_manager = booking_manager
            .with_payment_gateway(Arc::new(StripeGateway::new(key, timeout)?), &config.integrations.currency);
    }
    let dispatch = DispatchService::new(bookings, drivers.clone(), sessions, notifier, rules);

    let app_state = AppState {
        bookings: Arc::new(booking_manager),
        dispatch: Arc::new(dispatch),
        tracking: Arc::new(tracking),
        drivers,
        redis,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
